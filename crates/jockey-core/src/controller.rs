//! Playback controller: the single owner of the active output, the explicit
//! queue, the pre-fetch slot and the play history.
//!
//! One mutex guards all playback state. Long-running I/O (search, download,
//! archive lookups) happens outside the lock and re-acquires it only to
//! commit results; the deliberate exception is the track transition itself,
//! which holds the lock across teardown, settle delay and construction so
//! that no interleaving can ever produce two live outputs.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extract::Extractor;
use crate::filter;
use crate::media::{History, MediaRef, QueueEntry};
use crate::player::{AudioOutput, OutputBackend};
use crate::select::{self, Selection};
use crate::similar;
use crate::store::{Library, PlaylistSong};

/// Virtual playlist id for favorites playback; resolved against the
/// favorites document instead of the playlist map.
pub const FAVORITES_PLAYLIST_ID: &str = "favorites";

/// The audio subsystem does not guarantee immediate resource release, so a
/// new output is only constructed this long after the old one is torn down.
const SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Pre-fetch triggers when this little playback time remains.
const PREFETCH_REMAINING_SECS: f64 = 20.0;
/// ...or when this fraction of the track has elapsed.
const PREFETCH_ELAPSED_FRACTION: f64 = 0.8;
/// End-of-track tolerance window around the reported duration.
const TRANSITION_WINDOW_SECS: f64 = 0.8;
/// Two polling ticks racing into the same transition are collapsed.
const TRANSITION_COOLDOWN: Duration = Duration::from_secs(2);
/// After radio exhaustion, do not hammer the backend for this long.
const RADIO_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("download failed for '{0}'")]
    DownloadFailed(String),
    #[error("audio output failed: {0}")]
    Output(#[source] anyhow::Error),
}

/// Outcome of a manual or automatic track advance.
#[derive(Debug)]
pub enum SkipOutcome {
    Started(MediaRef),
    /// Radio enabled but every source came up empty; cooldown armed.
    Exhausted,
    /// Nothing queued and radio is off.
    Idle,
}

#[derive(Debug, Clone)]
pub struct ActivePlaylist {
    pub id: String,
    pub title: String,
    pub index: usize,
}

pub(crate) struct CoreState {
    pub config: Config,
    pub queue: VecDeque<QueueEntry>,
    pub history: History,
    pub output: Option<Box<dyn AudioOutput>>,
    pub current: Option<MediaRef>,
    pub previous: Option<MediaRef>,
    pub current_path: Option<PathBuf>,
    pub current_duration: f64,
    pub paused: bool,
    pub manually_stopped: bool,
    pub preload: Option<(MediaRef, PathBuf)>,
    pub preloading: bool,
    pub active_playlist: Option<ActivePlaylist>,
    pub last_query: Option<String>,
    pub last_index: usize,
    pub radio_mode: bool,
    pub radio_cooldown_until: Option<Instant>,
    pub last_transition: Option<Instant>,
    pub saved_gain: Option<f64>,
}

pub(crate) struct Inner<B: OutputBackend> {
    pub(crate) backend: B,
    pub(crate) extractor: Arc<Extractor>,
    pub(crate) library: Mutex<Library>,
    pub(crate) state: Mutex<CoreState>,
    pub(crate) cache_dir: PathBuf,
    pub(crate) config_path: PathBuf,
}

pub struct Controller<B: OutputBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: OutputBackend> Clone for Controller<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: OutputBackend + 'static> Controller<B> {
    pub fn new(
        backend: B,
        extractor: Arc<Extractor>,
        library: Library,
        config: Config,
        config_path: PathBuf,
        cache_dir: PathBuf,
        radio_mode: bool,
    ) -> Self {
        let history = History::new(config.history_limit);
        let state = CoreState {
            config,
            queue: VecDeque::new(),
            history,
            output: None,
            current: None,
            previous: None,
            current_path: None,
            current_duration: 0.0,
            paused: false,
            manually_stopped: true,
            preload: None,
            preloading: false,
            active_playlist: None,
            last_query: None,
            last_index: 0,
            radio_mode,
            radio_cooldown_until: None,
            last_transition: None,
            saved_gain: None,
        };
        Self {
            inner: Arc::new(Inner {
                backend,
                extractor,
                library: Mutex::new(library),
                state: Mutex::new(state),
                cache_dir,
                config_path,
            }),
        }
    }

    // ── explicit play ─────────────────────────────────────────────────────────

    /// Search, screen and start the first admissible hit for `query`.
    /// Cancels playlist mode and resets the radio search context.
    pub async fn play(&self, query: &str) -> Result<Option<MediaRef>, PlaybackError> {
        let (current_id, current_title, config) = {
            let mut st = self.inner.state.lock().await;
            st.active_playlist = None;
            st.last_query = Some(query.to_string());
            st.last_index = 0;
            st.radio_cooldown_until = None;
            (
                st.current.as_ref().map(|m| m.id.clone()),
                st.current.as_ref().map(|m| m.title.clone()),
                st.config.clone(),
            )
        };

        let mut chosen = None;
        for i in 0..10 {
            let Some(candidate) = self.inner.extractor.search(query, i).await else {
                break;
            };
            if current_id.as_deref() == Some(candidate.id.as_str()) {
                debug!("skipping (same id): {}", candidate.title);
                continue;
            }
            if let Some(cur) = &current_title {
                if similar::too_similar(
                    cur,
                    &candidate.title,
                    config.forced_keyword.as_deref(),
                    config.same_track_threshold,
                ) {
                    debug!("skipping (too similar): {}", candidate.title);
                    continue;
                }
            }
            if !filter::is_allowed(&candidate, &config) {
                debug!("skipping (filtered): {}", candidate.title);
                continue;
            }
            chosen = Some(candidate);
            break;
        }
        let Some(media) = chosen else {
            warn!("no admissible result for '{}'", query);
            return Ok(None);
        };

        info!("downloading: {}", media.title);
        let Some(path) = self.inner.extractor.download(&media, &self.inner.cache_dir).await else {
            return Err(PlaybackError::DownloadFailed(media.title));
        };
        self.start_playback(media.clone(), path).await?;
        Ok(Some(media))
    }

    pub(crate) async fn start_playback(
        &self,
        media: MediaRef,
        path: PathBuf,
    ) -> Result<(), PlaybackError> {
        let mut st = self.inner.state.lock().await;
        self.start_locked(&mut st, media, path).await
    }

    /// The transition critical section. The caller holds the state lock for
    /// the whole sequence: teardown of the previous output, removal of its
    /// temp file, settle delay, then construction of the new output in a
    /// paused state, volume, un-pause. The ordering exists to keep the
    /// single-output invariant and to avoid an audible spike from a stream
    /// starting before its volume is applied.
    pub(crate) async fn start_locked(
        &self,
        st: &mut CoreState,
        media: MediaRef,
        path: PathBuf,
    ) -> Result<(), PlaybackError> {
        st.manually_stopped = true;
        if let Some(mut old) = st.output.take() {
            debug!("closing previous output");
            old.close();
        }
        if let Some(old_path) = st.current_path.take() {
            if old_path != path {
                let _ = std::fs::remove_file(&old_path);
            }
        }
        tokio::time::sleep(SETTLE_DELAY).await;

        let mut output = match self.inner.backend.open(&path, true) {
            Ok(out) => out,
            Err(e) => {
                st.current_path = None;
                return Err(PlaybackError::Output(e));
            }
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        output.set_volume(st.config.volume);
        output.set_pause(false);
        st.output = Some(output);

        st.previous = st.current.take();
        st.current_duration = media.duration_secs.unwrap_or(0.0);
        st.current_path = Some(path);
        st.paused = false;
        st.manually_stopped = false;
        st.history.push(media.title.clone());
        // Playback that did not come from the active playlist/favorites
        // context cancels that mode.
        if !media.from_playlist && !media.from_favorites {
            st.active_playlist = None;
        }
        info!("now playing: {}", media.display_title());
        st.current = Some(media);
        st.preload = None;
        st.preloading = false;
        st.radio_cooldown_until = None;

        // Some outputs drop the first volume write while still buffering;
        // re-applying is idempotent.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let mut st = inner.state.lock().await;
            let gain = st.config.volume;
            if let Some(out) = st.output.as_mut() {
                out.set_volume(gain);
            }
        });
        Ok(())
    }

    // ── transport ─────────────────────────────────────────────────────────────

    pub async fn pause(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(out) = st.output.as_mut() {
            out.set_pause(true);
        }
        st.paused = true;
    }

    pub async fn resume(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(out) = st.output.as_mut() {
            out.set_pause(false);
        }
        st.paused = false;
    }

    pub async fn toggle_pause(&self) {
        let paused = {
            let st = self.inner.state.lock().await;
            st.output.is_none() || st.paused
        };
        if paused {
            self.resume().await;
        } else {
            self.pause().await;
        }
    }

    /// Tear down the output. History, queue and the downloaded file stay.
    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        st.manually_stopped = true;
        if let Some(mut out) = st.output.take() {
            out.close();
        }
    }

    /// Advance to the next track: consume the pre-fetched item when ready,
    /// otherwise select synchronously.
    pub async fn skip(&self) -> Result<SkipOutcome, PlaybackError> {
        {
            let mut st = self.inner.state.lock().await;
            if let Some((media, path)) = st.preload.take() {
                // The slot may mirror the queue front; consume both.
                if st.queue.front().map(|e| e.media.id == media.id).unwrap_or(false) {
                    st.queue.pop_front();
                }
                info!("using pre-fetched track: {}", media.title);
                st.radio_cooldown_until = None;
                self.start_locked(&mut st, media.clone(), path).await?;
                return Ok(SkipOutcome::Started(media));
            }
        }

        match select::next_candidate(&self.inner).await {
            Selection::Found(media, path) => {
                self.start_playback(media.clone(), path).await?;
                Ok(SkipOutcome::Started(media))
            }
            Selection::Exhausted => {
                let mut st = self.inner.state.lock().await;
                st.radio_cooldown_until = Some(Instant::now() + RADIO_COOLDOWN);
                warn!(
                    "radio exhausted: no fresh candidate anywhere, cooling down {}s",
                    RADIO_COOLDOWN.as_secs()
                );
                Ok(SkipOutcome::Exhausted)
            }
            Selection::RadioOff => Ok(SkipOutcome::Idle),
        }
    }

    /// Restart the current track from its already-downloaded file.
    pub async fn replay(&self) -> Result<bool, PlaybackError> {
        let snapshot = {
            let st = self.inner.state.lock().await;
            st.current.clone().zip(st.current_path.clone())
        };
        match snapshot {
            Some((media, path)) => {
                self.start_playback(media, path).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── volume ────────────────────────────────────────────────────────────────

    /// Set volume from a user percentage, clamped to 0–200 %.
    /// Persists to config and applies live. Returns the applied percent.
    pub async fn set_volume_percent(&self, percent: i64) -> i64 {
        let gain = Config::gain_from_percent(percent);
        let mut st = self.inner.state.lock().await;
        st.config.volume = gain;
        st.saved_gain = None;
        if let Err(e) = st.config.save_to(&self.inner.config_path) {
            warn!("could not persist volume: {}", e);
        }
        if let Some(out) = st.output.as_mut() {
            out.set_volume(gain);
        }
        let applied = st.config.volume_percent();
        info!("volume: {}%", applied);
        applied
    }

    pub async fn adjust_volume(&self, delta: i64) -> i64 {
        let current = {
            let st = self.inner.state.lock().await;
            st.config.volume_percent()
        };
        self.set_volume_percent((current + delta).clamp(0, 200)).await
    }

    pub async fn mute(&self) {
        let gain = {
            let mut st = self.inner.state.lock().await;
            st.saved_gain = Some(st.config.volume);
            st.config.volume
        };
        debug!("muting (saved {}%)", (gain * 1000.0) as i64);
        self.set_volume_percent(0).await;
        // set_volume_percent clears saved_gain; restore the marker.
        self.inner.state.lock().await.saved_gain = Some(gain);
    }

    pub async fn unmute(&self) -> i64 {
        let gain = {
            let st = self.inner.state.lock().await;
            st.saved_gain.unwrap_or(0.05)
        };
        self.set_volume_percent((gain * 1000.0).round() as i64).await
    }

    // ── polling tick ──────────────────────────────────────────────────────────

    /// Periodic position poll (driven externally, ~0.5 s). Triggers the
    /// pre-fetch near the end of the track and the transition at the end,
    /// tolerating transient position/duration read failures as zero.
    pub async fn update(&self) {
        let transition = {
            let mut st = self.inner.state.lock().await;
            if st.paused || st.manually_stopped || st.output.is_none() {
                return;
            }
            let Some(out) = st.output.as_mut() else {
                return;
            };
            let (pos, reported) = (out.position_secs(), out.duration_secs());
            let duration = if reported > 0.0 { reported } else { st.current_duration };
            if duration <= 0.0 {
                return;
            }
            let remaining = duration - pos;
            let cooling = st
                .radio_cooldown_until
                .map(|t| Instant::now() < t)
                .unwrap_or(false);
            let has_material = !st.queue.is_empty() || st.active_playlist.is_some();

            if st.preload.is_none()
                && !st.preloading
                && (pos > duration * PREFETCH_ELAPSED_FRACTION || remaining < PREFETCH_REMAINING_SECS)
                && (has_material || !cooling)
            {
                st.preloading = true;
                let controller = self.clone();
                tokio::spawn(async move { controller.run_prefetch().await });
            }

            if pos >= duration - TRANSITION_WINDOW_SECS {
                let now = Instant::now();
                let recently = st
                    .last_transition
                    .map(|t| now.duration_since(t) < TRANSITION_COOLDOWN)
                    .unwrap_or(false);
                if !recently && (has_material || !cooling) {
                    st.last_transition = Some(now);
                    if let Some((media, path)) = st.preload.take() {
                        if st.queue.front().map(|e| e.media.id == media.id).unwrap_or(false) {
                            st.queue.pop_front();
                        }
                        if let Err(e) = self.start_locked(&mut st, media, path).await {
                            warn!("transition failed: {}", e);
                        }
                        false
                    } else {
                        true
                    }
                } else {
                    false
                }
            } else {
                false
            }
        };

        if transition {
            if let Err(e) = self.skip().await {
                warn!("automatic advance failed: {}", e);
            }
        }
    }

    // ── pre-fetch ─────────────────────────────────────────────────────────────

    /// Background pre-fetch: complete a pending queue download first (user
    /// intent beats algorithmic suggestion), otherwise ask the selector.
    /// Never propagates failures; an empty slot just means the transition
    /// degrades to synchronous selection.
    async fn run_prefetch(&self) {
        debug!("pre-fetch started");
        let result = self.prefetch_target().await;
        let mut st = self.inner.state.lock().await;
        st.preloading = false;
        match result {
            Some((media, path)) => {
                info!("pre-fetched next track: {}", media.title);
                st.preload = Some((media, path));
            }
            None => debug!("pre-fetch finished without a candidate"),
        }
    }

    async fn prefetch_target(&self) -> Option<(MediaRef, PathBuf)> {
        // 1. JIT-download the first unresolved queue entry.
        let pending = {
            let st = self.inner.state.lock().await;
            st.queue
                .iter()
                .find(|e| e.path.is_none())
                .map(|e| e.media.clone())
        };
        if let Some(media) = pending {
            debug!("pre-fetching queued track: {}", media.title);
            let resolved = self.resolve_for_download(media).await;
            let path = self
                .inner
                .extractor
                .download(&resolved, &self.inner.cache_dir)
                .await;
            let mut st = self.inner.state.lock().await;
            return match path {
                Some(path) => {
                    // Patch in place; the queue may have been reshuffled in
                    // the meantime, so find the entry again by id.
                    let idx = st.queue.iter().position(|e| e.media.id == resolved.id);
                    if let Some(idx) = idx {
                        st.queue[idx].path = Some(path.clone());
                        if idx == 0 {
                            return Some((resolved, path));
                        }
                        None
                    } else {
                        Some((resolved, path))
                    }
                }
                None => {
                    warn!("pre-fetch download failed for '{}'", resolved.title);
                    None
                }
            };
        }

        // Queue fully resolved: mirror its front into the slot for a
        // zero-latency handoff.
        {
            let st = self.inner.state.lock().await;
            if st.preload.is_none() {
                if let Some(front) = st.queue.front() {
                    if let Some(path) = &front.path {
                        return Some((front.media.clone(), path.clone()));
                    }
                }
            }
        }

        // 2. No queue material: consult the selector.
        match select::next_candidate(&self.inner).await {
            Selection::Found(media, path) => Some((media, path)),
            _ => None,
        }
    }

    pub(crate) async fn resolve_for_download(&self, media: MediaRef) -> MediaRef {
        if media.source_url.is_some() {
            return media;
        }
        match self.inner.extractor.full_info(&media.id).await {
            Some(full) => MediaRef {
                recovery: media.recovery,
                from_playlist: media.from_playlist,
                from_favorites: media.from_favorites,
                ..full
            },
            None => media,
        }
    }

    // ── queue ─────────────────────────────────────────────────────────────────

    /// Append a search hit (or a whole stored playlist) to the queue without
    /// interrupting playback. The search itself runs in the background.
    pub async fn add_to_queue(&self, query: &str) -> Option<(String, usize)> {
        let playlist = {
            let lib = self.inner.library.lock().await;
            lib.find_playlist(query)
                .map(|(id, p)| (id.to_string(), p.title.clone(), p.songs.clone()))
        };
        if let Some((_, title, songs)) = playlist {
            let count = songs.len();
            let mut st = self.inner.state.lock().await;
            for s in songs {
                st.queue.push_back(QueueEntry::pending(MediaRef::new(s.id, s.title)));
            }
            info!("queued {} tracks from '{}'", count, title);
            return Some((title, count));
        }

        let controller = self.clone();
        let query = query.to_string();
        info!("searching to enqueue: {}", query);
        tokio::spawn(async move {
            let config = controller.inner.state.lock().await.config.clone();
            let mut found = None;
            for i in 0..10 {
                match controller.inner.extractor.search(&query, i).await {
                    Some(c) if filter::is_allowed(&c, &config) => {
                        found = Some(c);
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            let Some(media) = found else {
                warn!("nothing found to enqueue for '{}'", query);
                return;
            };
            let active = {
                let mut st = controller.inner.state.lock().await;
                st.queue.push_back(QueueEntry::pending(media.clone()));
                st.active_playlist.clone()
            };
            info!("queued: {}", media.title);
            // While a playlist is the active context, an add also lands in
            // the playlist document itself.
            if let Some(ap) = active {
                if ap.id != FAVORITES_PLAYLIST_ID {
                    let mut lib = controller.inner.library.lock().await;
                    match lib.append_to_playlist(&ap.id, PlaylistSong::new(media.id.as_str(), media.title.as_str())) {
                        Ok(true) => info!("added '{}' to playlist '{}'", media.title, ap.title),
                        Ok(false) => {}
                        Err(e) => warn!("could not update playlist '{}': {}", ap.title, e),
                    }
                }
            }
        });
        None
    }

    /// Shuffle the remaining queue in place; invalidates the preload slot.
    pub async fn shuffle_queue(&self) -> usize {
        use rand::seq::SliceRandom;
        let mut st = self.inner.state.lock().await;
        let len = st.queue.len();
        if len > 0 {
            st.queue.make_contiguous().shuffle(&mut rand::thread_rng());
            st.preload = None;
            st.preloading = false;
            info!("queue shuffled ({} tracks)", len);
        }
        len
    }

    // ── playlist / favorites playback ─────────────────────────────────────────

    /// Enter playlist mode: play the first entry JIT and enqueue the rest.
    pub async fn play_playlist(&self, query: &str) -> Result<Option<String>, PlaybackError> {
        let found = {
            let lib = self.inner.library.lock().await;
            lib.find_playlist(query)
                .map(|(id, p)| (id.to_string(), p.title.clone(), p.songs.clone()))
        };
        let Some((id, title, songs)) = found else {
            return Ok(None);
        };
        if songs.is_empty() {
            return Ok(None);
        }
        self.start_song_list(id, title.clone(), songs, false).await?;
        Ok(Some(title))
    }

    /// Favorites as a cyclic playlist, optionally shuffled.
    pub async fn play_favorites(&self, shuffled: bool) -> Result<bool, PlaybackError> {
        use rand::seq::SliceRandom;
        let mut songs: Vec<PlaylistSong> = {
            let lib = self.inner.library.lock().await;
            lib.favorites
                .iter()
                .map(|f| PlaylistSong::new(f.id.as_str(), f.title.as_str()))
                .collect()
        };
        if songs.is_empty() {
            return Ok(false);
        }
        if shuffled {
            songs.shuffle(&mut rand::thread_rng());
        }
        let title = if shuffled { "Favorites (shuffled)" } else { "Favorites" };
        self.start_song_list(
            FAVORITES_PLAYLIST_ID.to_string(),
            title.to_string(),
            songs,
            true,
        )
        .await?;
        Ok(true)
    }

    async fn start_song_list(
        &self,
        id: String,
        title: String,
        songs: Vec<PlaylistSong>,
        favorites: bool,
    ) -> Result<(), PlaybackError> {
        {
            let mut st = self.inner.state.lock().await;
            st.active_playlist = Some(ActivePlaylist {
                id: id.clone(),
                title: title.clone(),
                index: 0,
            });
            st.queue.clear();
            st.preload = None;
        }
        info!("playing '{}' ({} tracks)", title, songs.len());

        let first = &songs[0];
        let mut media = self
            .resolve_for_download(MediaRef::new(first.id.as_str(), first.title.as_str()))
            .await;
        media.from_playlist = !favorites;
        media.from_favorites = favorites;
        let Some(path) = self.inner.extractor.download(&media, &self.inner.cache_dir).await else {
            return Err(PlaybackError::DownloadFailed(media.title));
        };
        self.start_playback(media, path).await?;

        let mut st = self.inner.state.lock().await;
        for s in songs.into_iter().skip(1) {
            let mut m = MediaRef::new(s.id, s.title);
            m.from_playlist = !favorites;
            m.from_favorites = favorites;
            st.queue.push_back(QueueEntry::pending(m));
        }
        Ok(())
    }

    // ── toggles and session context ───────────────────────────────────────────

    pub async fn set_radio(&self, enabled: bool) {
        let mut st = self.inner.state.lock().await;
        st.radio_mode = enabled;
        st.radio_cooldown_until = None;
        info!("radio {}", if enabled { "on" } else { "off" });
    }

    /// `None` toggles; persists to config.
    pub async fn set_filters(&self, enabled: Option<bool>) -> bool {
        let mut st = self.inner.state.lock().await;
        let value = enabled.unwrap_or(!st.config.filters_enabled);
        st.config.filters_enabled = value;
        if let Err(e) = st.config.save_to(&self.inner.config_path) {
            warn!("could not persist filter flag: {}", e);
        }
        info!("filters {}", if value { "on" } else { "off" });
        value
    }

    /// Set or clear the session forced keyword. Returns the effective value.
    pub async fn set_forced_keyword(&self, keyword: Option<String>) -> Option<String> {
        let mut st = self.inner.state.lock().await;
        let keyword = keyword.filter(|k| {
            let low = k.to_lowercase();
            !low.is_empty() && low != "off" && low != "clear" && low != "none"
        });
        st.config.forced_keyword = keyword.clone();
        if let Err(e) = st.config.save_to(&self.inner.config_path) {
            warn!("could not persist forced keyword: {}", e);
        }
        keyword
    }

    pub async fn set_listen(&self, enabled: bool) {
        let mut st = self.inner.state.lock().await;
        st.config.listen_enabled = enabled;
        if let Err(e) = st.config.save_to(&self.inner.config_path) {
            warn!("could not persist listen flag: {}", e);
        }
    }

    pub async fn set_microphone(&self, index: usize) {
        let mut st = self.inner.state.lock().await;
        st.config.microphone_index = Some(index);
        if let Err(e) = st.config.save_to(&self.inner.config_path) {
            warn!("could not persist microphone index: {}", e);
        }
    }

    pub async fn current_media(&self) -> Option<MediaRef> {
        self.inner.state.lock().await.current.clone()
    }

    pub async fn previous_media(&self) -> Option<MediaRef> {
        self.inner.state.lock().await.previous.clone()
    }

    pub async fn history_titles(&self) -> Vec<String> {
        let st = self.inner.state.lock().await;
        st.history.recent().map(String::from).collect()
    }

    pub async fn config_snapshot(&self) -> Config {
        self.inner.state.lock().await.config.clone()
    }

    pub fn library(&self) -> &Mutex<Library> {
        &self.inner.library
    }

    /// One-line playback status for the `info` command.
    pub async fn status_line(&self) -> String {
        let mut st = self.inner.state.lock().await;
        let title = st
            .current
            .as_ref()
            .map(|m| m.display_title())
            .unwrap_or_else(|| "nothing playing".to_string());
        let timeline = st
            .output
            .as_mut()
            .map(|out| (out.position_secs(), out.duration_secs()));
        let position = match timeline {
            Some((pos, dur)) => {
                let dur = if dur > 0.0 { dur } else { st.current_duration };
                format!("{}/{}", fmt_secs(pos), fmt_secs(dur))
            }
            None => "0:00/0:00".to_string(),
        };
        let next = if let Some((m, _)) = &st.preload {
            format!("next: {}", m.title)
        } else if let Some(front) = st.queue.front() {
            format!("next: {} (downloading)", front.media.title)
        } else if st.preloading {
            "next: searching...".to_string()
        } else {
            String::new()
        };
        let playlist = st
            .active_playlist
            .as_ref()
            .map(|p| format!(" | playlist: {}", p.title))
            .unwrap_or_default();
        let queue = if st.queue.is_empty() {
            String::new()
        } else {
            format!(" | queue: {}", st.queue.len())
        };
        format!(
            "playing: {}\n  {}\n  {}\nradio: {} | filters: {} | forced: {}{}{}\nvolume: {}% | listen: {} [mic {}]",
            title,
            position,
            next,
            on_off(st.radio_mode),
            on_off(st.config.filters_enabled),
            st.config.forced_keyword.as_deref().unwrap_or("off"),
            queue,
            playlist,
            st.config.volume_percent(),
            on_off(st.config.listen_enabled),
            st.config
                .microphone_index
                .map(|i| i.to_string())
                .unwrap_or_else(|| "auto".to_string()),
        )
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

fn fmt_secs(s: f64) -> String {
    let s = s.max(0.0) as u64;
    format!("{}:{:02}", s / 60, s % 60)
}
