//! Extraction, search and download backend: a `yt-dlp` subprocess wrapper.
//!
//! Two modes mirror the backend contract: "flat" listing for cheap bulk
//! metadata (no stream resolution) and "full" extraction for a downloadable
//! source. Every invocation is bounded by a timeout; failures are logged and
//! surface as `None` — a missing result, never an exception, since
//! third-party content is expected to vanish.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::media::{watch_url, MediaKind, MediaRef};
use crate::platform::TEMP_AUDIO_PREFIX;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(180);

pub struct Extractor {
    yt_dlp: PathBuf,
}

/// Flat listing of a platform playlist, used by import and by the recovery
/// engine's metadata-hint gathering.
#[derive(Debug, Clone)]
pub struct PlaylistListing {
    pub id: Option<String>,
    pub title: String,
    /// `(id, title)` pairs in upstream order.
    pub entries: Vec<(String, String)>,
}

impl Extractor {
    pub fn new(yt_dlp: PathBuf) -> Self {
        Self { yt_dlp }
    }

    pub fn discover() -> Result<Self> {
        let yt_dlp = crate::platform::find_yt_dlp_binary()
            .context("yt-dlp not found (set YT_DLP_PATH or install it on PATH)")?;
        Ok(Self::new(yt_dlp))
    }

    async fn run_json(&self, args: &[&str], timeout: Duration) -> Result<Value> {
        let mut cmd = Command::new(&self.yt_dlp);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("yt-dlp {:?}", args);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .context("yt-dlp timed out")?
            .context("failed to run yt-dlp")?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp exited with status {:?}", output.status.code());
        }
        let value: Value =
            serde_json::from_slice(&output.stdout).context("bad yt-dlp JSON output")?;
        Ok(value)
    }

    async fn run_flat(&self, target: &str, items: &str) -> Result<Value> {
        self.run_json(
            &["-J", "--flat-playlist", "--playlist-items", items, "--no-warnings", target],
            EXTRACT_TIMEOUT,
        )
        .await
    }

    /// Search by free text or direct URL, returning the `index`-th hit.
    /// Flat entries that lack a duration are upgraded through a full
    /// extraction so the filter has something to work with.
    pub async fn search(&self, query: &str, index: usize) -> Option<MediaRef> {
        let target = if query.starts_with("http") {
            query.to_string()
        } else {
            format!("ytsearch10:{query}")
        };
        let res = match self.run_flat(&target, "1-10").await {
            Ok(v) => v,
            Err(e) => {
                warn!("search '{}' failed: {}", query, e);
                return None;
            }
        };

        let entries = res.get("entries").and_then(|e| e.as_array());
        let entry = match entries {
            Some(list) => list.get(index)?.clone(),
            // A direct URL to a single item comes back without entries.
            None if res.get("title").is_some() => {
                if index > 0 {
                    return None;
                }
                res.clone()
            }
            None => return None,
        };

        let media = media_from_value(&entry)?;
        if media.duration_secs.is_none()
            && matches!(media.kind, MediaKind::Url | MediaKind::UrlTransparent)
        {
            if let Some(url) = &media.source_url {
                if let Some(full) = self.full_info(url).await {
                    return Some(full);
                }
            }
        }
        Some(media)
    }

    /// Full (non-flat) extraction of a single item by id or URL.
    pub async fn full_info(&self, id_or_url: &str) -> Option<MediaRef> {
        let url = if id_or_url.starts_with("http") {
            id_or_url.to_string()
        } else {
            watch_url(id_or_url)
        };
        match self.run_json(&["-J", "--no-warnings", &url], EXTRACT_TIMEOUT).await {
            Ok(v) => media_from_value(&v),
            Err(e) => {
                debug!("full extraction of {} failed: {}", id_or_url, e);
                None
            }
        }
    }

    /// Availability probe: does the id still resolve to playback info?
    pub async fn probe(&self, id: &str) -> bool {
        self.full_info(id).await.is_some()
    }

    /// Platform "radio" recommendations seeded from a video id.
    pub async fn recommendations(&self, id: &str) -> Vec<MediaRef> {
        let url = format!("{}&list=RD{}", watch_url(id), id);
        match self.run_flat(&url, "1-15").await {
            Ok(res) => res
                .get("entries")
                .and_then(|e| e.as_array())
                .map(|list| list.iter().filter_map(media_from_value).collect())
                .unwrap_or_default(),
            Err(e) => {
                debug!("recommendations for {} failed: {}", id, e);
                Vec::new()
            }
        }
    }

    /// Flat listing of a playlist URL (all entries).
    pub async fn playlist_entries(&self, url: &str) -> Option<PlaylistListing> {
        let res = match self
            .run_json(&["-J", "--flat-playlist", "--no-warnings", url], EXTRACT_TIMEOUT)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!("playlist listing {} failed: {}", url, e);
                return None;
            }
        };
        let entries = res.get("entries")?.as_array()?;
        let listing = PlaylistListing {
            id: res.get("id").and_then(|v| v.as_str()).map(String::from),
            title: res
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled playlist")
                .to_string(),
            entries: entries
                .iter()
                .filter_map(|e| {
                    let id = e.get("id")?.as_str()?.to_string();
                    let title = e.get("title").and_then(|t| t.as_str()).unwrap_or("").to_string();
                    Some((id, title))
                })
                .collect(),
        };
        Some(listing)
    }

    /// Flat title of an arbitrary URL (used by the recovery engine when the
    /// direct HTML parse of an archive snapshot fails).
    pub async fn flat_title(&self, url: &str) -> Option<String> {
        match self.run_flat(url, "1").await {
            Ok(res) => res
                .get("title")
                .and_then(|t| t.as_str())
                .map(String::from)
                .filter(|t| !t.is_empty()),
            Err(_) => None,
        }
    }

    /// First result title from an external search engine, via the
    /// extractor's search prefixes (e.g. `gvsearch1`, `ddgsearch1`).
    pub async fn engine_search_title(&self, prefix: &str, query: &str) -> Option<String> {
        let target = format!("{prefix}1:{query}");
        match self
            .run_json(&["-J", "--flat-playlist", "--no-warnings", &target], EXTRACT_TIMEOUT)
            .await
        {
            Ok(res) => res
                .get("entries")
                .and_then(|e| e.as_array())
                .and_then(|list| list.first())
                .and_then(|e| e.get("title"))
                .and_then(|t| t.as_str())
                .map(String::from)
                .filter(|t| !t.is_empty()),
            Err(e) => {
                debug!("{}1 search for '{}' failed: {}", prefix, query, e);
                None
            }
        }
    }

    /// Download best audio into `dest_dir`, returning the file path.
    pub async fn download(&self, media: &MediaRef, dest_dir: &Path) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
            warn!("cannot create cache dir {:?}: {}", dest_dir, e);
            return None;
        }
        let base = temp_base_name(&media.id);
        let template = format!("{}/{}.%(ext)s", dest_dir.display(), base);
        let locator = media.locator();

        let mut cmd = Command::new(&self.yt_dlp);
        cmd.args([
            "-f",
            "bestaudio/best",
            "--no-progress",
            "--no-warnings",
            "-o",
            &template,
            &locator,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let status = match tokio::time::timeout(DOWNLOAD_TIMEOUT, cmd.status()).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                warn!("download of '{}' failed to start: {}", media.title, e);
                return None;
            }
            Err(_) => {
                warn!("download of '{}' timed out", media.title);
                return None;
            }
        };
        if !status.success() {
            warn!("download of '{}' exited with {:?}", media.title, status.code());
            return None;
        }
        match find_downloaded_file(dest_dir, &base).await {
            Some(path) => Some(path),
            None => {
                warn!("download of '{}' produced no file", media.title);
                None
            }
        }
    }
}

/// Unique temp base name for one download.
fn temp_base_name(id: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut h = DefaultHasher::new();
    id.hash(&mut h);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .hash(&mut h);
    format!("{}{:016x}", TEMP_AUDIO_PREFIX, h.finish())
}

async fn find_downloaded_file(dir: &Path, base: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some(base) {
            return Some(path);
        }
    }
    None
}

/// Convert one extractor JSON object (flat entry or full info) to a
/// [`MediaRef`]. Entries without an id are dropped.
fn media_from_value(v: &Value) -> Option<MediaRef> {
    let id = v.get("id")?.as_str()?.to_string();
    let title = v
        .get("title")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();
    let duration_secs = v.get("duration").and_then(|d| d.as_f64());
    let source_url = v
        .get("webpage_url")
        .or_else(|| v.get("url"))
        .and_then(|u| u.as_str())
        .map(String::from);
    let kind = v
        .get("_type")
        .and_then(|t| t.as_str())
        .map(MediaKind::from_type_tag)
        .unwrap_or_default();
    Some(MediaRef {
        id,
        title,
        duration_secs,
        source_url,
        kind,
        ..MediaRef::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_from_flat_entry() {
        let v = json!({
            "id": "abc123DEF00",
            "title": "Band - Song",
            "duration": 245.0,
            "url": "https://www.youtube.com/watch?v=abc123DEF00",
            "_type": "url"
        });
        let m = media_from_value(&v).unwrap();
        assert_eq!(m.id, "abc123DEF00");
        assert_eq!(m.duration_secs, Some(245.0));
        assert_eq!(m.kind, MediaKind::Url);
    }

    #[test]
    fn test_media_prefers_webpage_url() {
        let v = json!({
            "id": "x",
            "title": "t",
            "url": "https://stream.example/raw",
            "webpage_url": "https://www.youtube.com/watch?v=x"
        });
        let m = media_from_value(&v).unwrap();
        assert_eq!(m.source_url.as_deref(), Some("https://www.youtube.com/watch?v=x"));
    }

    #[test]
    fn test_media_without_id_dropped() {
        assert!(media_from_value(&json!({"title": "no id"})).is_none());
    }

    #[test]
    fn test_temp_base_names_are_prefixed_and_distinct() {
        let a = temp_base_name("abc");
        let b = temp_base_name("abc");
        assert!(a.starts_with(TEMP_AUDIO_PREFIX));
        assert_ne!(a, b);
    }
}
