//! Admissibility predicate for candidate media.
//!
//! Pure and deterministic: safe to call with partial metadata (a missing
//! duration is treated as 0).

use crate::config::Config;
use crate::media::MediaRef;

/// Decide whether a candidate may play under the current configuration.
pub fn is_allowed(media: &MediaRef, config: &Config) -> bool {
    if !config.filters_enabled {
        return true;
    }

    let title = media.title.to_lowercase();
    let duration = media.duration_secs.unwrap_or(0.0);

    if let Some(forced) = &config.forced_keyword {
        if !title.contains(&forced.to_lowercase()) {
            return false;
        }
    }

    if config
        .blacklisted_keywords
        .iter()
        .any(|w| title.contains(&w.to_lowercase()))
    {
        return false;
    }

    if duration > config.max_duration_seconds {
        return false;
    }

    // Short-form content is excluded unless it is long enough to be
    // substantive.
    let is_short_form = config
        .shorts_keywords
        .iter()
        .any(|k| title.contains(&k.to_lowercase()));
    if is_short_form && duration <= config.max_shorts_duration {
        return false;
    }

    media.kind.is_playable()
}
