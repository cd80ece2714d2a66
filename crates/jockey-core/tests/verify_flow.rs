//! Batch verification against a fully offline backend: a nonexistent
//! extractor binary and an unroutable archive endpoint. Every availability
//! probe and every cascade tier fails fast, which pins down the terminal
//! tagging behavior.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use jockey_core::extract::Extractor;
use jockey_core::media::RecoveryMethod;
use jockey_core::recover::{self, RecoveryEngine, VerifyDepth, VerifyOptions};
use jockey_core::store::{FavoriteSong, Playlist, PlaylistSong};

fn offline_engine() -> RecoveryEngine {
    RecoveryEngine::with_archive_api(
        Arc::new(Extractor::new(PathBuf::from("/nonexistent/yt-dlp"))),
        "http://127.0.0.1:1/wayback/available".to_string(),
    )
}

fn one_playlist(songs: Vec<PlaylistSong>) -> BTreeMap<String, Playlist> {
    let mut map = BTreeMap::new();
    map.insert(
        "pl".to_string(),
        Playlist {
            title: "Test List".to_string(),
            songs,
        },
    );
    map
}

#[tokio::test]
async fn deep_mode_tags_exhausted_entries_failed() {
    let engine = offline_engine();
    let mut targets = one_playlist(vec![PlaylistSong::new("aaaaaaaaaaa", "Kept Title")]);
    let opts = VerifyOptions {
        depth: VerifyDepth::Deep,
        only_recovered: false,
        workers: 2,
    };
    let report = recover::verify_playlists(&engine, &mut targets, &opts).await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.available, 0);
    assert_eq!(report.unavailable.len(), 1);
    assert!(report.changed);
    let song = &targets["pl"].songs[0];
    assert_eq!(song.recovery, Some(RecoveryMethod::Failed));
    // The stored title survives; only the provenance changes.
    assert_eq!(song.title, "Kept Title");
}

#[tokio::test]
async fn normal_mode_leaves_prior_failed_tag_alone() {
    let engine = offline_engine();
    let mut targets = one_playlist(vec![PlaylistSong {
        id: "aaaaaaaaaaa".to_string(),
        title: "Kept Title".to_string(),
        recovery: Some(RecoveryMethod::Failed),
    }]);
    let opts = VerifyOptions {
        depth: VerifyDepth::Normal,
        only_recovered: false,
        workers: 2,
    };
    let report = recover::verify_playlists(&engine, &mut targets, &opts).await;

    // Unavailable, but nothing changed: no cascade re-entry, no rewrite.
    assert_eq!(report.unavailable.len(), 1);
    assert!(!report.changed);
    assert_eq!(targets["pl"].songs[0].recovery, Some(RecoveryMethod::Failed));
}

#[tokio::test]
async fn only_recovered_mode_skips_untagged_entries() {
    let engine = offline_engine();
    let mut targets = one_playlist(vec![
        PlaylistSong::new("aaaaaaaaaaa", "Untagged Song"),
        PlaylistSong {
            id: "bbbbbbbbbbb".to_string(),
            title: "Previously Recovered".to_string(),
            recovery: Some(RecoveryMethod::Archive),
        },
    ]);
    let opts = VerifyOptions {
        depth: VerifyDepth::Normal,
        only_recovered: true,
        workers: 2,
    };
    let report = recover::verify_playlists(&engine, &mut targets, &opts).await;

    assert_eq!(report.checked, 2);
    // The untagged entry was skipped without probing; only the recovered one
    // shows up as unavailable.
    assert_eq!(report.unavailable.len(), 1);
    assert_eq!(report.unavailable[0].id, "bbbbbbbbbbb");
    assert_eq!(targets["pl"].songs[0].recovery, None);
}

#[tokio::test]
async fn favorites_check_drops_unreachable_entries() {
    let engine = offline_engine();
    let mut favorites = vec![
        FavoriteSong {
            id: "aaaaaaaaaaa".to_string(),
            title: "Gone One".to_string(),
        },
        FavoriteSong {
            id: "bbbbbbbbbbb".to_string(),
            title: "Gone Two".to_string(),
        },
    ];
    let removed = recover::verify_favorites(&engine, &mut favorites, 2).await;
    assert_eq!(removed, vec!["Gone One".to_string(), "Gone Two".to_string()]);
    assert!(favorites.is_empty());
}
