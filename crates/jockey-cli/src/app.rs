//! Command dispatch: glue between the parsed vocabulary and the core
//! controller, recovery engine and library.
//!
//! Destructive operations (playlist removal, dropping unavailable entries,
//! discarding orphans on re-import, deep-check persistence) go through a
//! [`Prompt`] round-trip so the user confirms before anything is rewritten.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

use jockey_core::controller::{Controller, SkipOutcome};
use jockey_core::extract::Extractor;
use jockey_core::player::MpvBackend;
use jockey_core::recover::{
    self, is_generic_title, RecoveryEngine, UnavailableEntry, VerifyDepth, VerifyOptions,
};
use jockey_core::store::{ImportPlan, Playlist};

use crate::commands::Command;

pub const HELP: &str = "\
COMMANDS

  playback
    p <query> / play <query>   play a song or search term
    p                          pause / resume toggle
    n / s / next               next track
    stop                       stop the music
    replay                     restart the current track
    history                    recently played tracks
    r / shuffle                shuffle the queue
    a / add <query>            queue without interrupting

  audio
    + / -                      volume up / down
    v <0-200>                  set volume percent
    m / mute, unmute           silence toggle
    listen on|off              voice front-end capture flag
    mic <n>                    voice front-end microphone index

  playlists
    ps                         list imported playlists
    import <url>               import a platform playlist
    pp <name>                  play one of your playlists
    pr <name>                  remove a playlist
    pc / check [name]          verify availability (recover titles)
    pcr / checkr [name]        re-verify recovered entries only
    pcd / deepcheck [name]     deep web-only re-derivation
    pcdr / deepcheckr [name]   deep, recovered entries only

  favorites
    fav                        save the current track
    favlast                    save the previous track
    fp / favorites             play favorites
    fr                         play favorites shuffled
    favlist                    list favorites
    favcheck                   drop unavailable favorites

  session
    ensure <id>                recovery diagnostic for one id
    info                       what's playing
    radio on|off               auto-continue when the queue empties
    filters [on|off]           toggle content filters
    force <word> / force off   require a keyword in radio picks
    h / help                   this list
    exit                       quit";

pub enum Flow {
    Continue,
    Exit,
    Ask(Prompt),
}

pub enum Prompt {
    RemovePlaylist { id: String, title: String },
    ImportOrphans { plan: ImportPlan },
    ConfirmDeepSave { query: Option<String>, only_recovered: bool },
    RemoveUnavailable { entries: Vec<UnavailableEntry> },
}

impl Prompt {
    pub fn question(&self) -> String {
        match self {
            Prompt::RemovePlaylist { title, .. } => {
                format!("Remove playlist '{title}'? (y/n)")
            }
            Prompt::ImportOrphans { plan } => format!(
                "{} local entries are no longer in the upstream playlist. Keep them? (y/n)",
                plan.orphans.len()
            ),
            Prompt::ConfirmDeepSave { .. } => {
                "Deep check re-derives titles from web sources only. Save results when done? (y/n)"
                    .to_string()
            }
            Prompt::RemoveUnavailable { entries } => format!(
                "Remove these {} unavailable track(s) from your playlists? (y/n)",
                entries.len()
            ),
        }
    }
}

fn yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub struct App {
    pub controller: Controller<MpvBackend>,
    pub engine: RecoveryEngine,
    pub extractor: Arc<Extractor>,
}

impl App {
    pub fn new(
        controller: Controller<MpvBackend>,
        engine: RecoveryEngine,
        extractor: Arc<Extractor>,
    ) -> Self {
        Self {
            controller,
            engine,
            extractor,
        }
    }

    pub async fn dispatch(&self, cmd: Command) -> Result<Flow> {
        match cmd {
            Command::Help => println!("{HELP}"),
            Command::Info => println!("{}", self.controller.status_line().await),
            Command::Exit => return Ok(Flow::Exit),

            Command::Play { query } => match self.controller.play(&query).await {
                Ok(Some(media)) => println!("playing: {}", media.title),
                Ok(None) => println!("nothing admissible found for '{query}'"),
                Err(e) => println!("{e}"),
            },
            Command::TogglePause => self.controller.toggle_pause().await,
            Command::Pause => self.controller.pause().await,
            Command::Resume => self.controller.resume().await,
            Command::Stop => self.controller.stop().await,
            Command::Next => match self.controller.skip().await {
                Ok(SkipOutcome::Started(media)) => println!("playing: {}", media.title),
                Ok(SkipOutcome::Exhausted) => {
                    println!("radio is out of fresh material, cooling down")
                }
                Ok(SkipOutcome::Idle) => println!("queue is empty and radio is off"),
                Err(e) => println!("{e}"),
            },
            Command::Replay => {
                if !self.controller.replay().await? {
                    println!("nothing to replay");
                }
            }
            Command::Shuffle => {
                if self.controller.shuffle_queue().await == 0 {
                    println!("queue is empty");
                }
            }
            Command::Add { query } => {
                if let Some((title, count)) = self.controller.add_to_queue(&query).await {
                    println!("queued {count} tracks from '{title}'");
                } else {
                    println!("searching in the background: {query}");
                }
            }
            Command::History => {
                let titles = self.controller.history_titles().await;
                if titles.is_empty() {
                    println!("nothing played yet");
                } else {
                    println!("RECENTLY PLAYED");
                    for (i, t) in titles.iter().enumerate() {
                        println!("  {}. {}", i + 1, t);
                    }
                }
            }

            Command::Volume { percent } => {
                let applied = self.controller.set_volume_percent(percent).await;
                println!("volume: {applied}%");
            }
            Command::VolumeUp => {
                println!("volume: {}%", self.controller.adjust_volume(50).await);
            }
            Command::VolumeDown => {
                println!("volume: {}%", self.controller.adjust_volume(-50).await);
            }
            Command::Mute => self.controller.mute().await,
            Command::Unmute => {
                println!("volume: {}%", self.controller.unmute().await);
            }

            Command::Favorite | Command::FavoritePrevious => {
                let media = if matches!(cmd, Command::Favorite) {
                    self.controller.current_media().await
                } else {
                    self.controller.previous_media().await
                };
                match media {
                    Some(m) => {
                        let mut lib = self.controller.library().lock().await;
                        if lib.add_favorite(&m.id, &m.title)? {
                            println!("added to favorites: {}", m.title);
                        } else {
                            println!("'{}' is already a favorite", m.title);
                        }
                    }
                    None => println!("no track to favorite"),
                }
            }
            Command::FavoriteList => {
                let lib = self.controller.library().lock().await;
                if lib.favorites.is_empty() {
                    println!("favorites list is empty");
                } else {
                    println!("FAVORITES");
                    for (i, f) in lib.favorites.iter().enumerate() {
                        println!("  {}. {}", i + 1, f.title);
                    }
                }
            }
            Command::FavoriteCheck => self.check_favorites().await?,
            Command::PlayFavorites { shuffled } => {
                match self.controller.play_favorites(shuffled).await {
                    Ok(true) => {}
                    Ok(false) => println!("favorites list is empty"),
                    Err(e) => println!("{e}"),
                }
            }

            Command::Import { url } => return self.import_playlist(&url).await,
            Command::Playlists => self.list_playlists().await,
            Command::PlayPlaylist { query } => match query {
                None => self.list_playlists().await,
                Some(q) => match self.controller.play_playlist(&q).await {
                    Ok(Some(title)) => println!("playing playlist: {title}"),
                    Ok(None) => println!("no playlist matches '{q}'"),
                    Err(e) => println!("{e}"),
                },
            },
            Command::RemovePlaylist { query } => {
                let found = {
                    let lib = self.controller.library().lock().await;
                    lib.find_playlist(&query).map(|(id, p)| (id.to_string(), p.title.clone()))
                };
                match found {
                    Some((id, title)) => {
                        return Ok(Flow::Ask(Prompt::RemovePlaylist { id, title }))
                    }
                    None => println!("no playlist matches '{query}'"),
                }
            }
            Command::Check { query, deep, only_recovered } => {
                if deep {
                    return Ok(Flow::Ask(Prompt::ConfirmDeepSave { query, only_recovered }));
                }
                return self
                    .run_check(query.as_deref(), VerifyDepth::Normal, only_recovered, true)
                    .await;
            }

            Command::Radio { enabled } => self.controller.set_radio(enabled).await,
            Command::Filters { enabled } => {
                let value = self.controller.set_filters(enabled).await;
                println!("filters {}", if value { "on" } else { "off" });
            }
            Command::Force { keyword } => {
                let effective = self.controller.set_forced_keyword(keyword).await;
                match effective {
                    Some(kw) => {
                        println!("forcing keyword: {kw}");
                        // Kick the radio straight onto the keyword.
                        if let Ok(Some(media)) = self.controller.play(&kw).await {
                            println!("playing: {}", media.title);
                        }
                    }
                    None => println!("forced keyword cleared"),
                }
            }
            Command::Listen { enabled } => {
                self.controller.set_listen(enabled).await;
                println!("listen {}", if enabled { "on" } else { "off" });
            }
            Command::Microphone { index } => {
                self.controller.set_microphone(index).await;
                println!("microphone index set to {index}");
            }
            Command::Ensure { id } => self.ensure_id(&id).await,
        }
        Ok(Flow::Continue)
    }

    pub async fn resolve(&self, prompt: Prompt, answer: &str) -> Result<Flow> {
        match prompt {
            Prompt::RemovePlaylist { id, title } => {
                if yes(answer) {
                    let mut lib = self.controller.library().lock().await;
                    lib.remove_playlist(&id)?;
                    println!("removed playlist '{title}'");
                } else {
                    println!("kept '{title}'");
                }
            }
            Prompt::ImportOrphans { plan } => {
                let keep = yes(answer);
                let summary = format!(
                    "merged '{}': {} new, {} preserved{}",
                    plan.title,
                    plan.added,
                    plan.preserved,
                    if keep {
                        format!(", {} local kept", plan.orphans.len())
                    } else {
                        format!(", {} local dropped", plan.orphans.len())
                    }
                );
                let mut lib = self.controller.library().lock().await;
                lib.commit_import(plan, keep)?;
                println!("{summary}");
            }
            Prompt::ConfirmDeepSave { query, only_recovered } => {
                let save = yes(answer);
                if !save {
                    println!("read-only scan: results will not be written");
                }
                return self
                    .run_check(query.as_deref(), VerifyDepth::Deep, only_recovered, save)
                    .await;
            }
            Prompt::RemoveUnavailable { entries } => {
                if yes(answer) {
                    let count = entries.len();
                    let mut lib = self.controller.library().lock().await;
                    recover::remove_entries(&mut lib.playlists, &entries);
                    lib.save_playlists()?;
                    println!("removed {count} unavailable track(s)");
                } else {
                    println!("playlists left unchanged");
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn list_playlists(&self) {
        let lib = self.controller.library().lock().await;
        if lib.playlists.is_empty() {
            println!("no playlists imported");
            return;
        }
        println!("PLAYLISTS");
        for (id, p) in &lib.playlists {
            println!("  [{}] {} ({} tracks)", id, p.title, p.songs.len());
        }
    }

    async fn import_playlist(&self, url: &str) -> Result<Flow> {
        println!("importing playlist from {url}");
        let Some(listing) = self.extractor.playlist_entries(url).await else {
            println!("could not extract a playlist from that URL");
            return Ok(Flow::Continue);
        };
        if listing.entries.is_empty() {
            println!("the playlist looks empty");
            return Ok(Flow::Continue);
        }
        let id = listing.id.clone().unwrap_or_else(|| fallback_playlist_id(url));
        let plan = {
            let lib = self.controller.library().lock().await;
            lib.plan_import(&id, &listing.title, &listing.entries)
        };
        if !plan.orphans.is_empty() {
            return Ok(Flow::Ask(Prompt::ImportOrphans { plan }));
        }
        let summary = format!("imported '{}': {} tracks", plan.title, plan.merged.len());
        let mut lib = self.controller.library().lock().await;
        lib.commit_import(plan, false)?;
        println!("{summary}");
        Ok(Flow::Continue)
    }

    async fn run_check(
        &self,
        query: Option<&str>,
        depth: VerifyDepth,
        only_recovered: bool,
        save: bool,
    ) -> Result<Flow> {
        let mut targets: BTreeMap<String, Playlist> = {
            let lib = self.controller.library().lock().await;
            match query {
                Some(q) => match lib.find_playlist(q) {
                    Some((id, p)) => BTreeMap::from([(id.to_string(), p.clone())]),
                    None => {
                        println!("no playlist matches '{q}'");
                        return Ok(Flow::Continue);
                    }
                },
                None => lib.playlists.clone(),
            }
        };
        if targets.is_empty() {
            println!("no playlists to verify");
            return Ok(Flow::Continue);
        }

        let workers = self.controller.config_snapshot().await.verify_workers;
        let opts = VerifyOptions {
            depth,
            only_recovered,
            workers,
        };
        let report = recover::verify_playlists(&self.engine, &mut targets, &opts).await;

        println!(
            "verified {} track(s): {} available, {} recovered, {} unavailable",
            report.checked,
            report.available,
            report.recovered,
            report.unavailable.len()
        );
        for entry in &report.unavailable {
            println!(
                "  unavailable: {} ({}) [{}] in '{}'",
                entry.title,
                entry.id,
                entry.method.map(|m| m.label()).unwrap_or("untagged"),
                entry.playlist_title
            );
        }

        if save && report.changed {
            let mut lib = self.controller.library().lock().await;
            for (id, playlist) in targets {
                lib.playlists.insert(id, playlist);
            }
            lib.save_playlists()?;
            println!("recovered titles written to the playlist document");
        }

        if save && !report.unavailable.is_empty() {
            return Ok(Flow::Ask(Prompt::RemoveUnavailable {
                entries: report.unavailable,
            }));
        }
        Ok(Flow::Continue)
    }

    async fn check_favorites(&self) -> Result<()> {
        let mut favorites = {
            let lib = self.controller.library().lock().await;
            lib.favorites.clone()
        };
        if favorites.is_empty() {
            println!("favorites list is empty");
            return Ok(());
        }
        println!("verifying {} favorite(s)...", favorites.len());
        let workers = self.controller.config_snapshot().await.verify_workers;
        let removed = recover::verify_favorites(&self.engine, &mut favorites, workers).await;
        if removed.is_empty() {
            println!("all favorites are available");
            return Ok(());
        }
        {
            let mut lib = self.controller.library().lock().await;
            lib.favorites = favorites;
            if let Err(e) = lib.save_favorites() {
                warn!("could not save favorites: {}", e);
            }
        }
        println!("dropped {} unavailable favorite(s): {}", removed.len(), removed.join(", "));
        Ok(())
    }

    /// Forced recovery diagnostic for one id, with metadata hints gathered
    /// from the local playlist documents.
    async fn ensure_id(&self, id: &str) {
        println!("recovery diagnostic for {id}");
        let hints: HashMap<String, String> = {
            let lib = self.controller.library().lock().await;
            lib.playlists
                .values()
                .flat_map(|p| p.songs.iter())
                .filter(|s| s.id == id && !is_generic_title(&s.title))
                .map(|s| (s.id.clone(), s.title.clone()))
                .collect()
        };
        match self.engine.recover_title(id, &hints, false).await {
            Some((title, method)) => {
                println!("recovered [{}]: {}", method.label(), title)
            }
            None => println!("could not recover a title for {id} after exhausting every tier"),
        }
    }
}

fn fallback_playlist_id(url: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut h = DefaultHasher::new();
    url.hash(&mut h);
    format!("{:08x}", h.finish() as u32)
}
