//! End-to-end controller behavior over the public API, with a counting fake
//! output backend and a dead extractor (every network call fails fast).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use jockey_core::config::Config;
use jockey_core::controller::{Controller, PlaybackError, SkipOutcome};
use jockey_core::extract::Extractor;
use jockey_core::player::{AudioOutput, OutputBackend};
use jockey_core::store::Library;

struct CountingOutput {
    live: Arc<AtomicUsize>,
    closed: bool,
}

impl AudioOutput for CountingOutput {
    fn set_volume(&mut self, _gain: f64) {}
    fn set_pause(&mut self, _paused: bool) {}
    fn position_secs(&mut self) -> f64 {
        0.0
    }
    fn duration_secs(&mut self) -> f64 {
        0.0
    }
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Clone, Default)]
struct CountingBackend {
    opens: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl OutputBackend for CountingBackend {
    fn open(&self, _path: &Path, _start_paused: bool) -> anyhow::Result<Box<dyn AudioOutput>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingOutput {
            live: self.live.clone(),
            closed: false,
        }))
    }
}

fn controller_in(dir: &TempDir, radio: bool) -> Controller<CountingBackend> {
    Controller::new(
        CountingBackend::default(),
        Arc::new(Extractor::new(PathBuf::from("/nonexistent/yt-dlp"))),
        Library::open(dir.path()),
        Config::default(),
        dir.path().join("config.toml"),
        dir.path().join("cache"),
        radio,
    )
}

#[tokio::test(start_paused = true)]
async fn skip_on_empty_session_is_idle_or_exhausted() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, false);
    assert!(matches!(controller.skip().await.unwrap(), SkipOutcome::Idle));

    let controller = controller_in(&dir, true);
    assert!(matches!(
        controller.skip().await.unwrap(),
        SkipOutcome::Exhausted
    ));
}

#[tokio::test(start_paused = true)]
async fn play_favorites_surfaces_download_failure() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, false);
    {
        let mut lib = controller.library().lock().await;
        lib.add_favorite("aaaaaaaaaaa", "Fav One").unwrap();
    }
    // The extractor is dead, so the first favorite cannot be fetched; that
    // is a download failure, not a crash or a silent success.
    match controller.play_favorites(false).await {
        Err(PlaybackError::DownloadFailed(title)) => assert_eq!(title, "Fav One"),
        other => panic!("expected DownloadFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn play_favorites_with_empty_list_reports_empty() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, false);
    assert!(!controller.play_favorites(false).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn queueing_a_stored_playlist_enqueues_all_entries() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, false);
    {
        let mut lib = controller.library().lock().await;
        let entries = vec![
            ("a".to_string(), "A".to_string()),
            ("b".to_string(), "B".to_string()),
        ];
        let plan = lib.plan_import("pl1", "Mix", &entries);
        lib.commit_import(plan, false).unwrap();
    }
    let queued = controller.add_to_queue("mix").await;
    assert_eq!(queued, Some(("Mix".to_string(), 2)));
    // Both entries are undownloadable, so a skip drains the queue and ends
    // idle rather than aborting on the first poisoned entry.
    assert!(matches!(controller.skip().await.unwrap(), SkipOutcome::Idle));
}

#[tokio::test(start_paused = true)]
async fn volume_operations_clamp_and_persist() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, false);
    assert_eq!(controller.set_volume_percent(250).await, 200);
    assert_eq!(controller.adjust_volume(-50).await, 150);
    controller.mute().await;
    assert_eq!(controller.config_snapshot().await.volume_percent(), 0);
    assert_eq!(controller.unmute().await, 150);
    // The clamped value landed in the persisted document.
    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(written.contains("volume"));
}

#[tokio::test(start_paused = true)]
async fn status_line_reflects_session_flags() {
    let dir = TempDir::new().unwrap();
    let controller = controller_in(&dir, true);
    controller.set_filters(Some(false)).await;
    controller.set_forced_keyword(Some("metrika".to_string())).await;
    let status = controller.status_line().await;
    assert!(status.contains("nothing playing"));
    assert!(status.contains("radio: on"));
    assert!(status.contains("filters: off"));
    assert!(status.contains("forced: metrika"));
}
