//! Title recovery for media references whose backing upload has gone
//! offline (deleted or private).
//!
//! The cascade is an ordered sequence of independently failable strategies:
//! local metadata hints, a lightweight live re-extraction, web-archive
//! snapshots of three canonical URL forms, then two external search engines.
//! Each tier swallows its own network errors so the cascade always reaches a
//! definitive answer or exhaustion.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::extract::Extractor;
use crate::media::{watch_url, RecoveryMethod};
use crate::store::{FavoriteSong, Playlist};

/// Placeholder phrases the platform (and the archive frontend) substitute
/// for real titles. Checked as case-insensitive substrings.
const GENERIC_TITLE_MARKERS: &[&str] = &[
    "deleted video",
    "private video",
    "v\u{ed}deo eliminado",
    "v\u{ed}deo privado",
    "wayback machine",
    "internet archive",
];

const MAX_RECOVERY_ATTEMPTS: usize = 3;

pub fn is_generic_title(title: &str) -> bool {
    if title.is_empty() {
        return true;
    }
    let low = title.to_lowercase();
    GENERIC_TITLE_MARKERS.iter().any(|m| low.contains(m))
}

fn playlist_url(id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={id}")
}

#[derive(Clone)]
pub struct RecoveryEngine {
    extractor: Arc<Extractor>,
    http: reqwest::Client,
    archive_api: String,
}

impl RecoveryEngine {
    pub fn new(extractor: Arc<Extractor>) -> Self {
        Self::with_archive_api(extractor, "https://archive.org/wayback/available".to_string())
    }

    /// Archive availability endpoint override, mainly for tests.
    pub fn with_archive_api(extractor: Arc<Extractor>, archive_api: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(8))
            .build()
            .unwrap_or_default();
        Self {
            extractor,
            http,
            archive_api,
        }
    }

    /// Resolve a human-readable title for an unavailable id.
    ///
    /// `hints` is a pre-gathered `id -> title` map from a playlist's bulk
    /// listing. With `web_only` the local tiers (meta, flat) are skipped and
    /// the title is re-derived from web sources alone.
    pub async fn recover_title(
        &self,
        id: &str,
        hints: &HashMap<String, String>,
        web_only: bool,
    ) -> Option<(String, RecoveryMethod)> {
        debug!("[recover] looking up {}", id);

        if !web_only {
            if let Some(hint) = hints.get(id) {
                if !is_generic_title(hint) {
                    info!("[recover] {} via metadata hint: {}", id, hint);
                    return Some((hint.clone(), RecoveryMethod::Meta));
                }
            }

            if let Some(title) = self.extractor.flat_title(&watch_url(id)).await {
                if !is_generic_title(&title) {
                    info!("[recover] {} via live re-extraction: {}", id, title);
                    return Some((title, RecoveryMethod::Flat));
                }
            }
        }

        if let Some(title) = self.archive_lookup(id).await {
            info!("[recover] {} via web archive: {}", id, title);
            return Some((title, RecoveryMethod::Archive));
        }

        if let Some(found) = self.engine_lookup(id).await {
            info!("[recover] {} via {}: {}", id, found.1.label(), found.0);
            return Some(found);
        }

        debug!("[recover] {} exhausted every tier", id);
        None
    }

    /// Query the web archive's closest-snapshot API for each canonical URL
    /// form of the id, then pull the snapshot page title.
    async fn archive_lookup(&self, id: &str) -> Option<String> {
        let forms = [
            watch_url(id),
            format!("https://youtu.be/{id}"),
            format!("https://www.youtube.com/v/{id}"),
        ];
        for form in &forms {
            let Some(snapshot_url) = self.closest_snapshot(form).await else {
                continue;
            };
            // Direct HTML parse first; the extractor understands the
            // snapshot markup better when that fails.
            if let Some(title) = self.snapshot_page_title(&snapshot_url).await {
                let cleaned = clean_archive_title(&title);
                if cleaned.len() > 5 && !is_generic_title(&cleaned) {
                    return Some(cleaned);
                }
            }
            if let Some(title) = self.extractor.flat_title(&snapshot_url).await {
                let cleaned = clean_engine_title(&title, id);
                if cleaned.len() > 5 && !is_generic_title(&cleaned) {
                    return Some(cleaned);
                }
            }
        }
        None
    }

    async fn closest_snapshot(&self, url: &str) -> Option<String> {
        let api = format!("{}?url={}", self.archive_api, url);
        let resp = match self.http.get(&api).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("[recover] archive API unreachable: {}", e);
                return None;
            }
        };
        let data: serde_json::Value = resp.json().await.ok()?;
        let closest = data.get("archived_snapshots")?.get("closest")?;
        if closest.get("available").and_then(|a| a.as_bool()) != Some(true) {
            return None;
        }
        closest.get("url").and_then(|u| u.as_str()).map(String::from)
    }

    async fn snapshot_page_title(&self, url: &str) -> Option<String> {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("[recover] snapshot fetch failed: {}", e);
                return None;
            }
        };
        let html = resp.text().await.ok()?;
        let re = regex::Regex::new(r"(?is)<title>(.*?)</title>").ok()?;
        re.captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Search-engine fallback, in fixed order, with the bare id first and a
    /// platform-qualified query second.
    async fn engine_lookup(&self, id: &str) -> Option<(String, RecoveryMethod)> {
        let engines = [("gvsearch", RecoveryMethod::Google), ("ddgsearch", RecoveryMethod::Ddg)];
        for (prefix, method) in engines {
            for query in [id.to_string(), format!("youtube {id}")] {
                let Some(raw) = self.extractor.engine_search_title(prefix, &query).await else {
                    continue;
                };
                let cleaned = clean_engine_title(&raw, id);
                let acceptable = raw.contains(id) || cleaned.len() > 5;
                if acceptable && !is_generic_title(&cleaned) {
                    return Some((cleaned, method));
                }
            }
        }
        None
    }
}

/// Strip archive/platform boilerplate from a raw `<title>` value.
fn clean_archive_title(raw: &str) -> String {
    let mut t = raw.replace(" - YouTube", "").replace("YouTube", "");
    for (entity, ch) in [("&quot;", "\""), ("&#39;", "'"), ("&amp;", "&")] {
        t = t.replace(entity, ch);
    }
    t.trim().to_string()
}

/// Strip the id and platform suffix a search engine tends to echo back.
fn clean_engine_title(raw: &str, id: &str) -> String {
    raw.replace(id, "")
        .replace(" - YouTube", "")
        .replace("(snapshot)", "")
        .trim()
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

// ── batch verification ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyDepth {
    /// Availability probe, then the full cascade for entries needing it.
    Normal,
    /// Web-only re-derivation, ignoring stale local tags; exhaustion marks
    /// the entry `failed`.
    Deep,
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub depth: VerifyDepth,
    /// Re-check only entries that already carry a recovery tag.
    pub only_recovered: bool,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct UnavailableEntry {
    pub playlist_id: String,
    pub playlist_title: String,
    pub index: usize,
    pub id: String,
    pub title: String,
    pub method: Option<RecoveryMethod>,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub available: usize,
    pub recovered: usize,
    /// Any stored title or tag changed (worth rewriting the document).
    pub changed: bool,
    pub unavailable: Vec<UnavailableEntry>,
}

/// Whether an unavailable entry (re-)enters the recovery cascade.
/// Deep mode always retries; otherwise only entries with a useless stored
/// title or no recovery provenance are worth the network round-trips.
fn should_attempt_recovery(
    title: &str,
    id: &str,
    method: Option<RecoveryMethod>,
    deep: bool,
) -> bool {
    deep || is_generic_title(title) || title == id || method.is_none()
}

struct EntryOutcome {
    playlist_id: String,
    index: usize,
    available: bool,
    skipped: bool,
    /// `(title, method)` to write back, when anything changed.
    patch: Option<(String, Option<RecoveryMethod>)>,
}

/// Probe and repair every entry of `targets` in place.
///
/// Per-entry network round-trips dominate latency, so entries fan out over a
/// bounded worker pool; all mutations of the shared map happen on this task
/// once workers report back (single-writer discipline).
pub async fn verify_playlists(
    engine: &RecoveryEngine,
    targets: &mut BTreeMap<String, Playlist>,
    opts: &VerifyOptions,
) -> VerifyReport {
    let deep = opts.depth == VerifyDepth::Deep;
    let total: usize = targets.values().map(|p| p.songs.len()).sum();
    let mut report = VerifyReport::default();
    if total == 0 {
        return report;
    }
    info!(
        "verifying {} entries across {} playlist(s){}",
        total,
        targets.len(),
        if deep { " (deep, web-only)" } else { "" }
    );

    let sem = Arc::new(Semaphore::new(opts.workers.max(1)));
    let (tx, mut rx) = mpsc::channel::<EntryOutcome>(total.max(16));

    for (pid, playlist) in targets.iter() {
        // Hints from the live playlist listing let deleted entries recover
        // their title without leaving local data. Generated ids (short, or
        // the legacy migration bucket) have no upstream listing to ask.
        let hints: Arc<HashMap<String, String>> = if pid.len() > 5 && pid != "migrated" {
            match engine.extractor.playlist_entries(&playlist_url(pid)).await {
                Some(listing) => Arc::new(
                    listing
                        .entries
                        .into_iter()
                        .filter(|(_, title)| !is_generic_title(title))
                        .collect(),
                ),
                None => Arc::new(HashMap::new()),
            }
        } else {
            Arc::new(HashMap::new())
        };

        for (index, song) in playlist.songs.iter().enumerate() {
            let tx = tx.clone();
            let sem = sem.clone();
            let engine = engine.clone();
            let hints = hints.clone();
            let song = song.clone();
            let pid = pid.clone();
            let only_recovered = opts.only_recovered;
            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let outcome = verify_entry(&engine, &pid, index, song, &hints, deep, only_recovered).await;
                let _ = tx.send(outcome).await;
            });
        }
    }
    drop(tx);

    while let Some(outcome) = rx.recv().await {
        report.checked += 1;
        if outcome.skipped {
            report.available += 1;
            continue;
        }
        let Some(playlist) = targets.get_mut(&outcome.playlist_id) else {
            continue;
        };
        let playlist_title = playlist.title.clone();
        let Some(song) = playlist.songs.get_mut(outcome.index) else {
            continue;
        };
        if let Some((title, method)) = outcome.patch {
            let entry_changed = song.title != title || song.recovery != method;
            if entry_changed {
                report.changed = true;
                if method.map(|m| m != RecoveryMethod::Failed).unwrap_or(false) && !outcome.available
                {
                    report.recovered += 1;
                }
            }
            song.title = title;
            song.recovery = method;
        }
        if outcome.available {
            report.available += 1;
        } else {
            report.unavailable.push(UnavailableEntry {
                playlist_id: outcome.playlist_id,
                playlist_title,
                index: outcome.index,
                id: song.id.clone(),
                title: song.title.clone(),
                method: song.recovery,
            });
        }
    }

    report
}

async fn verify_entry(
    engine: &RecoveryEngine,
    playlist_id: &str,
    index: usize,
    song: crate::store::PlaylistSong,
    hints: &HashMap<String, String>,
    deep: bool,
    only_recovered: bool,
) -> EntryOutcome {
    if only_recovered && song.recovery.is_none() {
        return EntryOutcome {
            playlist_id: playlist_id.to_string(),
            index,
            available: true,
            skipped: true,
            patch: None,
        };
    }

    let title = song.title.trim().to_string();
    let mut method = song.recovery;

    if engine.extractor.probe(&song.id).await {
        // Alive again: clear any stale recovery provenance.
        debug!("[verify] {} available: {}", song.id, title);
        return EntryOutcome {
            playlist_id: playlist_id.to_string(),
            index,
            available: true,
            skipped: false,
            patch: Some((title, None)),
        };
    }

    // A meta-derived title is only trustworthy while the hint still exists.
    if method == Some(RecoveryMethod::Meta) && !hints.contains_key(&song.id) {
        method = None;
    }

    let mut final_title = title.clone();
    if should_attempt_recovery(&title, &song.id, method, deep) {
        for attempt in 1..=MAX_RECOVERY_ATTEMPTS {
            if let Some((recovered, via)) = engine.recover_title(&song.id, hints, deep).await {
                info!(
                    "[verify] recovered {} [{}] (attempt {}): {}",
                    song.id,
                    via.label(),
                    attempt,
                    recovered
                );
                final_title = recovered;
                method = Some(via);
                break;
            }
            if deep && attempt == MAX_RECOVERY_ATTEMPTS {
                // Web-only exhaustion: stop retrying on later runs.
                if method.map(|m| !m.is_web()).unwrap_or(true) {
                    method = Some(RecoveryMethod::Failed);
                }
            }
        }
    }

    // An entry that kept a meaningful title but never gained provenance is
    // marked failed rather than retried forever.
    if method.is_none() && !is_generic_title(&final_title) && final_title != song.id {
        method = Some(RecoveryMethod::Failed);
    }

    warn!(
        "[verify] unavailable: {} ({}) [{}]",
        final_title,
        song.id,
        method.map(|m| m.label()).unwrap_or("untagged")
    );
    EntryOutcome {
        playlist_id: playlist_id.to_string(),
        index,
        available: false,
        skipped: false,
        patch: Some((final_title, method)),
    }
}

/// Drop the reported entries from the playlists, highest index first so
/// earlier removals cannot shift later ones.
pub fn remove_entries(targets: &mut BTreeMap<String, Playlist>, entries: &[UnavailableEntry]) {
    let mut by_playlist: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for e in entries {
        by_playlist.entry(&e.playlist_id).or_default().push(e.index);
    }
    for (pid, mut indices) in by_playlist {
        let Some(playlist) = targets.get_mut(pid) else {
            continue;
        };
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        for idx in indices {
            if idx < playlist.songs.len() {
                playlist.songs.remove(idx);
            }
        }
    }
}

/// Probe every favorite over the worker pool; unavailable entries are
/// dropped. Returns the removed titles.
pub async fn verify_favorites(
    engine: &RecoveryEngine,
    favorites: &mut Vec<FavoriteSong>,
    workers: usize,
) -> Vec<String> {
    if favorites.is_empty() {
        return Vec::new();
    }
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let (tx, mut rx) = mpsc::channel::<(String, bool)>(favorites.len());
    for fav in favorites.iter() {
        let tx = tx.clone();
        let sem = sem.clone();
        let engine = engine.clone();
        let id = fav.id.clone();
        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let alive = engine.extractor.probe(&id).await;
            let _ = tx.send((id, alive)).await;
        });
    }
    drop(tx);

    let mut alive_ids = std::collections::HashSet::new();
    while let Some((id, alive)) = rx.recv().await {
        if alive {
            alive_ids.insert(id);
        }
    }
    let mut removed = Vec::new();
    favorites.retain(|f| {
        if alive_ids.contains(&f.id) {
            true
        } else {
            removed.push(f.title.clone());
            false
        }
    });
    removed
}
