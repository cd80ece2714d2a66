//! Favorites and playlist documents.
//!
//! Both persist as whole JSON files, read once at startup and rewritten in
//! full on every mutation (last writer wins on the whole document). The
//! [`Library`] is kept behind a single mutex by the caller so batch
//! verification and manual edits cannot interleave writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::media::RecoveryMethod;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteSong {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistSong {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryMethod>,
}

impl PlaylistSong {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            recovery: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Playlist {
    pub title: String,
    #[serde(default)]
    pub songs: Vec<PlaylistSong>,
}

/// Result of preparing a (re-)import: merged content plus the local entries
/// that no longer exist upstream, which the caller decides to keep or drop.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub playlist_id: String,
    pub title: String,
    pub merged: Vec<PlaylistSong>,
    pub orphans: Vec<PlaylistSong>,
    pub added: usize,
    pub preserved: usize,
}

#[derive(Debug)]
pub struct Library {
    favorites_path: PathBuf,
    playlists_path: PathBuf,
    pub favorites: Vec<FavoriteSong>,
    pub playlists: BTreeMap<String, Playlist>,
}

impl Library {
    /// Load both documents from `dir`. A missing or unreadable document is
    /// an empty one; startup never fails on corruption.
    pub fn open(dir: &Path) -> Self {
        let favorites_path = dir.join("favorites.json");
        let playlists_path = dir.join("playlists.json");
        Self {
            favorites: load_favorites(&favorites_path),
            playlists: load_playlists(&playlists_path),
            favorites_path,
            playlists_path,
        }
    }

    pub fn save_favorites(&self) -> anyhow::Result<()> {
        write_document(&self.favorites_path, &self.favorites)
    }

    pub fn save_playlists(&self) -> anyhow::Result<()> {
        write_document(&self.playlists_path, &self.playlists)
    }

    /// Append to favorites unless the id is already present.
    /// Returns false on a duplicate (append is a no-op).
    pub fn add_favorite(&mut self, id: &str, title: &str) -> anyhow::Result<bool> {
        if self.favorites.iter().any(|f| f.id == id) {
            return Ok(false);
        }
        self.favorites.push(FavoriteSong {
            id: id.to_string(),
            title: title.to_string(),
        });
        self.save_favorites()?;
        Ok(true)
    }

    /// Resolve a user query to a playlist: exact id first, then
    /// case-insensitive substring of id or title.
    pub fn find_playlist(&self, query: &str) -> Option<(&str, &Playlist)> {
        if let Some((id, p)) = self.playlists.get_key_value(query) {
            return Some((id.as_str(), p));
        }
        let low = query.to_lowercase();
        self.playlists
            .iter()
            .find(|(id, p)| id.to_lowercase().contains(&low) || p.title.to_lowercase().contains(&low))
            .map(|(id, p)| (id.as_str(), p))
    }

    pub fn remove_playlist(&mut self, id: &str) -> anyhow::Result<bool> {
        let removed = self.playlists.remove(id).is_some();
        if removed {
            self.save_playlists()?;
        }
        Ok(removed)
    }

    /// Append a song to a stored playlist, id-deduplicated.
    pub fn append_to_playlist(&mut self, playlist_id: &str, song: PlaylistSong) -> anyhow::Result<bool> {
        let Some(playlist) = self.playlists.get_mut(playlist_id) else {
            return Ok(false);
        };
        if playlist.songs.iter().any(|s| s.id == song.id) {
            return Ok(false);
        }
        playlist.songs.push(song);
        self.save_playlists()?;
        Ok(true)
    }

    /// Prepare an import. When the playlist id already exists locally, stored
    /// titles and recovery tags are preserved for ids still present upstream,
    /// and entries that vanished upstream are surfaced as orphans for the
    /// caller to rule on.
    pub fn plan_import(
        &self,
        playlist_id: &str,
        title: &str,
        entries: &[(String, String)],
    ) -> ImportPlan {
        let mut merged = Vec::new();
        let mut added = 0;
        let mut preserved = 0;
        let mut orphans = Vec::new();

        if let Some(existing) = self.playlists.get(playlist_id) {
            let old_map: BTreeMap<&str, &PlaylistSong> =
                existing.songs.iter().map(|s| (s.id.as_str(), s)).collect();
            for (id, entry_title) in entries {
                if let Some(old) = old_map.get(id.as_str()) {
                    merged.push((*old).clone());
                    preserved += 1;
                } else {
                    merged.push(PlaylistSong::new(id.as_str(), entry_title.as_str()));
                    added += 1;
                }
            }
            let new_ids: std::collections::BTreeSet<&str> =
                entries.iter().map(|(id, _)| id.as_str()).collect();
            orphans = existing
                .songs
                .iter()
                .filter(|s| !new_ids.contains(s.id.as_str()))
                .cloned()
                .collect();
        } else {
            for (id, entry_title) in entries {
                merged.push(PlaylistSong::new(id.as_str(), entry_title.as_str()));
                added += 1;
            }
        }

        ImportPlan {
            playlist_id: playlist_id.to_string(),
            title: title.to_string(),
            merged,
            orphans,
            added,
            preserved,
        }
    }

    /// Apply a prepared import, optionally retaining the orphaned entries.
    pub fn commit_import(&mut self, plan: ImportPlan, keep_orphans: bool) -> anyhow::Result<()> {
        let mut songs = plan.merged;
        if keep_orphans {
            info!("keeping {} local-only entries", plan.orphans.len());
            songs.extend(plan.orphans);
        }
        self.playlists.insert(
            plan.playlist_id,
            Playlist {
                title: plan.title,
                songs,
            },
        );
        self.save_playlists()
    }
}

fn load_favorites(path: &Path) -> Vec<FavoriteSong> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str(&content) {
        Ok(favs) => favs,
        Err(e) => {
            warn!("corrupt favorites document {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn load_playlists(path: &Path) -> BTreeMap<String, Playlist> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    if let Ok(map) = serde_json::from_str::<BTreeMap<String, Playlist>>(&content) {
        return map;
    }
    // Legacy shape: a bare song array becomes a single migrated playlist.
    if let Ok(songs) = serde_json::from_str::<Vec<PlaylistSong>>(&content) {
        if songs.is_empty() {
            return BTreeMap::new();
        }
        let mut map = BTreeMap::new();
        map.insert(
            "migrated".to_string(),
            Playlist {
                title: "My List".to_string(),
                songs,
            },
        );
        return map;
    }
    warn!("corrupt playlists document {:?}", path);
    BTreeMap::new()
}

fn write_document<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_favorite_dedupe() {
        let dir = TempDir::new().unwrap();
        let mut lib = Library::open(dir.path());
        assert!(lib.add_favorite("id1", "Song One").unwrap());
        assert!(!lib.add_favorite("id1", "Song One Again").unwrap());
        assert_eq!(lib.favorites.len(), 1);
        assert_eq!(lib.favorites[0].title, "Song One");
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        {
            let mut lib = Library::open(dir.path());
            lib.add_favorite("id1", "Song One").unwrap();
            let plan = lib.plan_import("pl1", "Road Trip", &entries(&[("a", "A"), ("b", "B")]));
            lib.commit_import(plan, false).unwrap();
        }
        let lib = Library::open(dir.path());
        assert_eq!(lib.favorites.len(), 1);
        let (id, playlist) = lib.find_playlist("road").unwrap();
        assert_eq!(id, "pl1");
        assert_eq!(playlist.songs.len(), 2);
    }

    #[test]
    fn test_import_merge_preserves_recovered_titles() {
        let dir = TempDir::new().unwrap();
        let mut lib = Library::open(dir.path());
        let plan = lib.plan_import("pl1", "Mix", &entries(&[("a", "A"), ("b", "B"), ("c", "C")]));
        lib.commit_import(plan, false).unwrap();

        // Simulate a recovered entry, then re-import with "a" renamed
        // upstream and "c" gone.
        lib.playlists.get_mut("pl1").unwrap().songs[0] = PlaylistSong {
            id: "a".into(),
            title: "A (recovered)".into(),
            recovery: Some(RecoveryMethod::Flat),
        };
        let plan = lib.plan_import("pl1", "Mix", &entries(&[("a", "A new"), ("b", "B"), ("d", "D")]));
        assert_eq!(plan.preserved, 2);
        assert_eq!(plan.added, 1);
        assert_eq!(plan.orphans.len(), 1);
        assert_eq!(plan.orphans[0].id, "c");
        assert_eq!(plan.merged[0].title, "A (recovered)");
        assert_eq!(plan.merged[0].recovery, Some(RecoveryMethod::Flat));

        lib.commit_import(plan.clone(), true).unwrap();
        let songs = &lib.playlists["pl1"].songs;
        assert_eq!(songs.len(), 4);
        assert!(songs.iter().any(|s| s.id == "c"));
    }

    #[test]
    fn test_find_playlist_by_id_then_substring() {
        let dir = TempDir::new().unwrap();
        let mut lib = Library::open(dir.path());
        let plan = lib.plan_import("PLxyz", "Evening Jazz", &entries(&[("a", "A")]));
        lib.commit_import(plan, false).unwrap();
        assert!(lib.find_playlist("PLxyz").is_some());
        assert!(lib.find_playlist("jazz").is_some());
        assert!(lib.find_playlist("plx").is_some());
        assert!(lib.find_playlist("nope").is_none());
    }

    #[test]
    fn test_legacy_array_document_migrates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("playlists.json"),
            r#"[{"id": "a", "title": "A"}, {"id": "b", "title": "B"}]"#,
        )
        .unwrap();
        let lib = Library::open(dir.path());
        let playlist = &lib.playlists["migrated"];
        assert_eq!(playlist.songs.len(), 2);
    }

    #[test]
    fn test_corrupt_documents_fall_back_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("favorites.json"), "{{nope").unwrap();
        std::fs::write(dir.path().join("playlists.json"), "also nope").unwrap();
        let lib = Library::open(dir.path());
        assert!(lib.favorites.is_empty());
        assert!(lib.playlists.is_empty());
    }

    #[test]
    fn test_append_to_playlist_dedupes() {
        let dir = TempDir::new().unwrap();
        let mut lib = Library::open(dir.path());
        let plan = lib.plan_import("pl1", "Mix", &entries(&[("a", "A")]));
        lib.commit_import(plan, false).unwrap();
        assert!(lib.append_to_playlist("pl1", PlaylistSong::new("b", "B")).unwrap());
        assert!(!lib.append_to_playlist("pl1", PlaylistSong::new("a", "A")).unwrap());
        assert_eq!(lib.playlists["pl1"].songs.len(), 2);
    }
}
