use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// What kind of object the extraction backend handed back for a candidate.
/// Bare playlist/channel containers are never playable as a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Video,
    Url,
    UrlTransparent,
    Playlist,
    Channel,
}

impl MediaKind {
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "url" => Self::Url,
            "url_transparent" => Self::UrlTransparent,
            "playlist" => Self::Playlist,
            "channel" => Self::Channel,
            _ => Self::Video,
        }
    }

    /// Only single playable items pass the content filter.
    pub fn is_playable(self) -> bool {
        matches!(self, Self::Video | Self::Url | Self::UrlTransparent)
    }
}

/// Which tier of the recovery cascade produced a stored title, or `Failed`
/// once deep verification exhausted every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMethod {
    Meta,
    Flat,
    Archive,
    Google,
    Ddg,
    Failed,
}

impl RecoveryMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Flat => "flat",
            Self::Archive => "archive",
            Self::Google => "google",
            Self::Ddg => "ddg",
            Self::Failed => "failed",
        }
    }

    /// True for tiers that derive the title from the open web rather than
    /// local metadata or a live re-extraction.
    pub fn is_web(self) -> bool {
        matches!(self, Self::Archive | Self::Google | Self::Ddg)
    }
}

/// A reference to playable content. Created by a search/extraction call or
/// loaded from a playlist/favorites document; the title may later be
/// overwritten by the recovery engine.
#[derive(Debug, Clone, Default)]
pub struct MediaRef {
    pub id: String,
    pub title: String,
    pub duration_secs: Option<f64>,
    pub source_url: Option<String>,
    pub kind: MediaKind,
    pub recovery: Option<RecoveryMethod>,
    /// Entry originates from the active imported playlist (keeps playlist
    /// mode alive across the track transition).
    pub from_playlist: bool,
    /// Entry originates from favorites playback.
    pub from_favorites: bool,
}

impl MediaRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Best URL to hand to the downloader, falling back to the canonical
    /// watch URL derived from the id.
    pub fn locator(&self) -> String {
        self.source_url
            .clone()
            .unwrap_or_else(|| watch_url(&self.id))
    }

    /// Display title decorated with the recovery provenance, if any.
    pub fn display_title(&self) -> String {
        match self.recovery {
            Some(RecoveryMethod::Failed) => format!("{} [unrecoverable]", self.title),
            Some(m) => format!("{} [recovered:{}]", self.title, m.label()),
            None => self.title.clone(),
        }
    }
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

/// One pending item in the explicit queue. `path` is patched in place by the
/// pre-fetch scheduler as JIT downloads complete.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub media: MediaRef,
    pub path: Option<PathBuf>,
}

impl QueueEntry {
    pub fn pending(media: MediaRef) -> Self {
        Self { media, path: None }
    }
}

/// Bounded FIFO of recently played titles, used to suppress repeats in
/// strict selection tiers.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<String>,
    cap: usize,
}

impl History {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, title: impl Into<String>) {
        self.entries.push_back(title.into());
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    pub fn contains(&self, title: &str) -> bool {
        self.entries.iter().any(|t| t == title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent first.
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bound_fifo() {
        let mut h = History::new(3);
        for t in ["a", "b", "c", "d", "e"] {
            h.push(t);
        }
        assert_eq!(h.len(), 3);
        assert!(!h.contains("a"));
        assert!(!h.contains("b"));
        assert!(h.contains("c"));
        assert!(h.contains("e"));
        let recent: Vec<_> = h.recent().collect();
        assert_eq!(recent, vec!["e", "d", "c"]);
    }

    #[test]
    fn test_kind_playability() {
        assert!(MediaKind::Video.is_playable());
        assert!(MediaKind::Url.is_playable());
        assert!(MediaKind::UrlTransparent.is_playable());
        assert!(!MediaKind::Playlist.is_playable());
        assert!(!MediaKind::Channel.is_playable());
        assert_eq!(MediaKind::from_type_tag("url_transparent"), MediaKind::UrlTransparent);
        assert_eq!(MediaKind::from_type_tag("video"), MediaKind::Video);
    }

    #[test]
    fn test_locator_falls_back_to_watch_url() {
        let m = MediaRef::new("dQw4w9WgXcQ", "Song");
        assert_eq!(m.locator(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        let mut m2 = m.clone();
        m2.source_url = Some("https://example.com/x".into());
        assert_eq!(m2.locator(), "https://example.com/x");
    }

    #[test]
    fn test_recovery_method_serde_labels() {
        let j = serde_json::to_string(&RecoveryMethod::Archive).unwrap();
        assert_eq!(j, "\"archive\"");
        let m: RecoveryMethod = serde_json::from_str("\"google\"").unwrap();
        assert_eq!(m, RecoveryMethod::Google);
        assert!(m.is_web());
        assert!(!RecoveryMethod::Meta.is_web());
    }
}
