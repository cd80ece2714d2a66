//! Next-candidate selection across the four prioritized sources: explicit
//! queue, active playlist, radio (recommendations, last-search pagination,
//! random favorites, artist fallback), then exhaustion.
//!
//! Strict tiers screen every candidate against the current track, the
//! bounded history and the content filter. Playlist playback is
//! intentionally non-strict so a curated list always plays in full.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::{Inner, FAVORITES_PLAYLIST_ID};
use crate::filter;
use crate::media::MediaRef;
use crate::player::OutputBackend;
use crate::similar;
use crate::store::PlaylistSong;

pub(crate) enum Selection {
    Found(MediaRef, std::path::PathBuf),
    /// Radio enabled but every tier came up empty.
    Exhausted,
    /// No queue or playlist material and radio is disabled.
    RadioOff,
}

/// Screening context snapshotted from the controller state so the network
/// tiers can run without holding the lock.
pub(crate) struct Screen {
    pub current_id: Option<String>,
    pub current_title: Option<String>,
    pub history: HashSet<String>,
    pub config: Config,
}

impl Screen {
    /// Strict admission: never the currently-playing id, never a recently
    /// played title, never a near-duplicate of the current title, and the
    /// content filter must pass.
    pub fn admits(&self, candidate: &MediaRef) -> bool {
        if self.current_id.as_deref() == Some(candidate.id.as_str()) {
            debug!("rejecting (same id): {}", candidate.title);
            return false;
        }
        if self.history.contains(&candidate.title) {
            debug!("rejecting (recently played): {}", candidate.title);
            return false;
        }
        if !filter::is_allowed(candidate, &self.config) {
            debug!("rejecting (filtered): {}", candidate.title);
            return false;
        }
        if let Some(current) = &self.current_title {
            if similar::too_similar(
                current,
                &candidate.title,
                self.config.forced_keyword.as_deref(),
                self.config.radio_duplicate_threshold,
            ) {
                debug!("rejecting (near-duplicate): {}", candidate.title);
                return false;
            }
        }
        true
    }
}

pub(crate) async fn next_candidate<B: OutputBackend + 'static>(
    inner: &Inner<B>,
) -> Selection {
    debug!("selecting next candidate");

    // ── tier 1: explicit queue (FIFO, skip poisoned entries) ─────────────────
    loop {
        let entry = inner.state.lock().await.queue.pop_front();
        let Some(entry) = entry else {
            break;
        };
        if let Some(path) = entry.path {
            return Selection::Found(entry.media, path);
        }
        debug!("JIT download for queued track: {}", entry.media.title);
        let media = resolve(inner, entry.media).await;
        match inner.extractor.download(&media, &inner.cache_dir).await {
            Some(path) => return Selection::Found(media, path),
            None => warn!("skipping unplayable queued track '{}'", media.title),
        }
    }

    // ── tier 2: active playlist, cyclic, non-strict ──────────────────────────
    let active = inner.state.lock().await.active_playlist.clone();
    if let Some(ap) = active {
        let songs = playlist_songs(inner, &ap.id).await;
        match songs {
            Some(songs) if !songs.is_empty() => {
                let next_index = (ap.index + 1) % songs.len();
                {
                    let mut st = inner.state.lock().await;
                    if let Some(cur) = st.active_playlist.as_mut() {
                        if cur.id == ap.id {
                            cur.index = next_index;
                        }
                    }
                }
                let chosen = &songs[next_index];
                info!(
                    "next from '{}' ({}/{})",
                    ap.title,
                    next_index + 1,
                    songs.len()
                );
                let mut media = resolve(inner, MediaRef::new(chosen.id.as_str(), chosen.title.as_str())).await;
                media.from_favorites = ap.id == FAVORITES_PLAYLIST_ID;
                media.from_playlist = !media.from_favorites;
                if let Some(path) = inner.extractor.download(&media, &inner.cache_dir).await {
                    return Selection::Found(media, path);
                }
                warn!("playlist track '{}' failed to resolve", chosen.title);
                // fall through to radio
            }
            _ => {
                warn!("active playlist '{}' no longer exists", ap.title);
                inner.state.lock().await.active_playlist = None;
            }
        }
    }

    // ── tier 3: radio ────────────────────────────────────────────────────────
    let (radio, screen, last_query, last_index) = {
        let st = inner.state.lock().await;
        (
            st.radio_mode,
            Screen {
                current_id: st.current.as_ref().map(|m| m.id.clone()),
                current_title: st.current.as_ref().map(|m| m.title.clone()),
                history: st.history.recent().map(String::from).collect(),
                config: st.config.clone(),
            },
            st.last_query.clone(),
            st.last_index,
        )
    };
    if !radio {
        return Selection::RadioOff;
    }

    // 3a. platform recommendations seeded from the current track
    if let Some(current_id) = &screen.current_id {
        debug!("checking recommendations for {}", current_id);
        for rec in inner.extractor.recommendations(current_id).await {
            if let Some(found) = try_candidate(inner, &screen, rec.id.as_str()).await {
                return Selection::Found(found.0, found.1);
            }
        }
    }

    // 3b. continued pagination of the last explicit search
    if let Some(query) = &last_query {
        debug!("paging results of '{}'", query);
        for i in 1..10 {
            let Some(candidate) = inner.extractor.search(query, last_index + i).await else {
                break;
            };
            if !screen.admits(&candidate) {
                continue;
            }
            if let Some(path) = inner.extractor.download(&candidate, &inner.cache_dir).await {
                return Selection::Found(candidate, path);
            }
        }
    }

    // 3c. a random favorite (bounded draws)
    let favorite_ids: Vec<String> = {
        let lib = inner.library.lock().await;
        use rand::seq::SliceRandom;
        let mut ids: Vec<String> = lib.favorites.iter().map(|f| f.id.clone()).collect();
        ids.shuffle(&mut rand::thread_rng());
        ids.truncate(5);
        ids
    };
    for id in &favorite_ids {
        debug!("trying random favorite {}", id);
        if let Some(found) = try_candidate(inner, &screen, id).await {
            info!("restarting radio from favorite: {}", found.0.title);
            return Selection::Found(found.0, found.1);
        }
    }

    // 3d. fallback search on the artist token of the current title
    if let Some(current_title) = &screen.current_title {
        if let Some(artist) = artist_token(current_title) {
            debug!("searching more from '{}'", artist);
            if let Some(candidate) = inner.extractor.search(&artist, 0).await {
                if screen.admits(&candidate) {
                    if let Some(path) =
                        inner.extractor.download(&candidate, &inner.cache_dir).await
                    {
                        return Selection::Found(candidate, path);
                    }
                }
            }
        }
    }

    warn!("no admissible radio candidate found");
    Selection::Exhausted
}

/// Full-fetch a candidate id, screen it, download it.
async fn try_candidate<B: OutputBackend + 'static>(
    inner: &Inner<B>,
    screen: &Screen,
    id: &str,
) -> Option<(MediaRef, std::path::PathBuf)> {
    let media = inner.extractor.full_info(id).await?;
    if !screen.admits(&media) {
        return None;
    }
    let path = inner.extractor.download(&media, &inner.cache_dir).await?;
    Some((media, path))
}

async fn playlist_songs<B: OutputBackend + 'static>(
    inner: &Inner<B>,
    id: &str,
) -> Option<Vec<PlaylistSong>> {
    let lib = inner.library.lock().await;
    if id == FAVORITES_PLAYLIST_ID {
        return Some(
            lib.favorites
                .iter()
                .map(|f| PlaylistSong::new(f.id.as_str(), f.title.as_str()))
                .collect(),
        );
    }
    lib.playlists.get(id).map(|p| p.songs.clone())
}

async fn resolve<B: OutputBackend + 'static>(inner: &Inner<B>, media: MediaRef) -> MediaRef {
    if media.source_url.is_some() {
        return media;
    }
    match inner.extractor.full_info(&media.id).await {
        Some(full) => MediaRef {
            recovery: media.recovery,
            from_playlist: media.from_playlist,
            from_favorites: media.from_favorites,
            ..full
        },
        None => media,
    }
}

/// Heuristic artist token: text before the first `-` or `(`, if it is long
/// enough to mean anything.
fn artist_token(title: &str) -> Option<String> {
    let cut = title
        .split(['-', '('])
        .next()
        .unwrap_or(title)
        .trim()
        .to_string();
    (cut.len() > 3).then_some(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen_with(current_id: &str, current_title: &str, history: &[&str]) -> Screen {
        Screen {
            current_id: Some(current_id.to_string()),
            current_title: Some(current_title.to_string()),
            history: history.iter().map(|s| s.to_string()).collect(),
            config: Config {
                blacklisted_keywords: Vec::new(),
                ..Config::default()
            },
        }
    }

    fn candidate(id: &str, title: &str) -> MediaRef {
        MediaRef {
            duration_secs: Some(200.0),
            ..MediaRef::new(id, title)
        }
    }

    #[test]
    fn test_screen_rejects_current_id() {
        let screen = screen_with("abc", "Band - Song", &[]);
        assert!(!screen.admits(&candidate("abc", "Anything Else")));
        assert!(screen.admits(&candidate("xyz", "Other Artist - Other Song")));
    }

    #[test]
    fn test_screen_rejects_history() {
        let screen = screen_with("abc", "Band - Song", &["Old Tune", "Older Tune"]);
        assert!(!screen.admits(&candidate("xyz", "Old Tune")));
    }

    #[test]
    fn test_screen_rejects_near_duplicate() {
        let screen = screen_with("abc", "Band - Song (Official Video)", &[]);
        assert!(!screen.admits(&candidate("xyz", "Band - Song (Lyric Video)")));
    }

    #[test]
    fn test_screen_applies_content_filter() {
        let mut screen = screen_with("abc", "Band - Song", &[]);
        screen.config.max_duration_seconds = 100.0;
        assert!(!screen.admits(&candidate("xyz", "Other Artist - Long One")));
    }

    #[test]
    fn test_artist_token() {
        assert_eq!(artist_token("Daft Punk - Around the World"), Some("Daft Punk".into()));
        assert_eq!(artist_token("Unknown (live session)"), Some("Unknown".into()));
        assert_eq!(artist_token("abc - song"), None); // too short
        assert_eq!(artist_token("Standalone Title"), Some("Standalone Title".into()));
    }
}
