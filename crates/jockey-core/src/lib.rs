//! Playback continuity and recovery engine for a text-controlled music agent.
//!
//! The core owns next-track selection under three competing modes (explicit
//! queue, imported playlist, autonomous radio), just-in-time downloading,
//! position-timed pre-fetching, and a multi-tier title recovery cascade for
//! media references whose backing upload has gone offline.
//!
//! External collaborators are kept behind narrow seams: the extraction and
//! download backend is a `yt-dlp` subprocess wrapper ([`extract::Extractor`]),
//! audio output is an [`player::AudioOutput`] trait object produced per track
//! by an [`player::OutputBackend`], and persistence is three flat documents
//! (config TOML, favorites JSON, playlists JSON).

pub mod config;
pub mod controller;
pub mod extract;
pub mod filter;
pub mod media;
pub mod platform;
pub mod player;
pub mod recover;
pub mod select;
pub mod similar;
pub mod store;

pub use config::Config;
pub use controller::Controller;
pub use media::{MediaKind, MediaRef, QueueEntry, RecoveryMethod};
