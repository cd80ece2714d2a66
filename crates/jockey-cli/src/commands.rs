//! Free-text command parser: a closed vocabulary matched by a fixed regex
//! table, first match wins. Unrecognized text yields `None` (a no-op).

use regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { query: String },
    TogglePause,
    Pause,
    Resume,
    Stop,
    Next,
    Replay,
    Shuffle,
    Add { query: String },
    History,
    Info,
    Volume { percent: i64 },
    VolumeUp,
    VolumeDown,
    Mute,
    Unmute,
    Favorite,
    FavoritePrevious,
    FavoriteList,
    FavoriteCheck,
    PlayFavorites { shuffled: bool },
    Import { url: String },
    Playlists,
    PlayPlaylist { query: Option<String> },
    RemovePlaylist { query: String },
    Check { query: Option<String>, deep: bool, only_recovered: bool },
    Radio { enabled: bool },
    Filters { enabled: Option<bool> },
    Force { keyword: Option<String> },
    Listen { enabled: bool },
    Microphone { index: usize },
    Ensure { id: String },
    Help,
    Exit,
}

type Builder = fn(&Captures) -> Command;

pub struct Parser {
    table: Vec<(Regex, Builder)>,
}

fn group(c: &Captures, name: &str) -> Option<String> {
    c.name(name).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty())
}

impl Parser {
    pub fn new() -> Self {
        // Order matters: more specific forms before the generic ones
        // (e.g. "fp" before "p <query>", deep checks before plain check).
        let table: Vec<(&str, Builder)> = vec![
            (r"^(?i)(h|help|commands)$", |_| Command::Help),
            (r"^(?i)(fp|pf|playfav|play favorites|favorites)$", |_| {
                Command::PlayFavorites { shuffled: false }
            }),
            (r"^(?i)(fr|favshuffle|shuffle favorites)$", |_| {
                Command::PlayFavorites { shuffled: true }
            }),
            (r"^(?i)(favlist|my favorites)$", |_| Command::FavoriteList),
            (r"^(?i)(favcheck|check favorites)$", |_| Command::FavoriteCheck),
            (r"^(?i)(favlast|favprev|like previous)$", |_| Command::FavoritePrevious),
            (r"^(?i)(fav|favorite|like)$", |_| Command::Favorite),
            (r"^(?i)(ps|playlists)$", |_| Command::Playlists),
            (r"^(?i)(pcdr|deepcheckr)(\s+(?P<q>.+))?$", |c| Command::Check {
                query: group(c, "q"),
                deep: true,
                only_recovered: true,
            }),
            (r"^(?i)(pcd|deepcheck)(\s+(?P<q>.+))?$", |c| Command::Check {
                query: group(c, "q"),
                deep: true,
                only_recovered: false,
            }),
            (r"^(?i)(pcr|checkr)(\s+(?P<q>.+))?$", |c| Command::Check {
                query: group(c, "q"),
                deep: false,
                only_recovered: true,
            }),
            (r"^(?i)(pc|check)(\s+(?P<q>.+))?$", |c| Command::Check {
                query: group(c, "q"),
                deep: false,
                only_recovered: false,
            }),
            (r"^(?i)(pr|rmlist)\s+(?P<q>.+)$", |c| Command::RemovePlaylist {
                query: group(c, "q").unwrap_or_default(),
            }),
            (r"^(?i)(pp|playlist)(\s+(?P<q>.+))?$", |c| Command::PlayPlaylist {
                query: group(c, "q"),
            }),
            (r"^(?i)import\s+(?P<url>https?://\S+)$", |c| Command::Import {
                url: group(c, "url").unwrap_or_default(),
            }),
            (r"^(?i)(history|played|recent)$", |_| Command::History),
            (r"^(?i)(r|shuffle|mix)$", |_| Command::Shuffle),
            (r"^(?i)(a|add|queue)\s+(?P<q>.+)$", |c| Command::Add {
                query: group(c, "q").unwrap_or_default(),
            }),
            (r"^(?i)pause$", |_| Command::Pause),
            (r"^(?i)(resume|continue)$", |_| Command::Resume),
            (r"^(?i)p$", |_| Command::TogglePause),
            (r"^(?i)(p|play|put on)\s+(?P<q>.+)$", |c| Command::Play {
                query: group(c, "q").unwrap_or_default(),
            }),
            (r"^(?i)(stop|halt)$", |_| Command::Stop),
            (r"^(?i)(exit|quit)$", |_| Command::Exit),
            (r"^(?i)(n|s|next|skip)$", |_| Command::Next),
            (r"^(?i)(info|status|now playing)$", |_| Command::Info),
            (r"^(?i)(m|mute|hush)$", |_| Command::Mute),
            (r"^(?i)(unmute|sound on)$", |_| Command::Unmute),
            (r"^(?i)(replay|again|restart)$", |_| Command::Replay),
            (r"^(?i)(v|vol|volume)\s+(?P<n>\d{1,3})$", |c| Command::Volume {
                percent: group(c, "n").and_then(|n| n.parse().ok()).unwrap_or(0),
            }),
            (r"^(?i)(\+|louder|volume up)$", |_| Command::VolumeUp),
            (r"^(?i)(-|quieter|volume down)$", |_| Command::VolumeDown),
            (r"^(?i)radio(\s+(?P<op>on|off))?$", |c| Command::Radio {
                enabled: group(c, "op").map(|o| o != "off").unwrap_or(true),
            }),
            (r"^(?i)filters?(\s+(?P<op>on|off))?$", |c| Command::Filters {
                enabled: group(c, "op").map(|o| o == "on"),
            }),
            (r"^(?i)force(\s+(?P<kw>.+))?$", |c| Command::Force {
                keyword: group(c, "kw"),
            }),
            (r"^(?i)listen\s+(?P<op>on|off)$", |c| Command::Listen {
                enabled: group(c, "op").map(|o| o == "on").unwrap_or(true),
            }),
            (r"^(?i)mic(rophone)?\s+(?P<n>\d+)$", |c| Command::Microphone {
                index: group(c, "n").and_then(|n| n.parse().ok()).unwrap_or(0),
            }),
            (r"^(?i)ensure\s+(?P<id>[A-Za-z0-9_-]{11})$", |c| Command::Ensure {
                id: group(c, "id").unwrap_or_default(),
            }),
        ];
        let table = table
            .into_iter()
            .map(|(pattern, build)| {
                let re = Regex::new(pattern).expect("command pattern must compile");
                (re, build)
            })
            .collect();
        Self { table }
    }

    pub fn parse(&self, text: &str) -> Option<Command> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        for (re, build) in &self.table {
            if let Some(captures) = re.captures(text) {
                return Some(build(&captures));
            }
        }
        None
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Command> {
        Parser::new().parse(text)
    }

    #[test]
    fn test_play_forms() {
        assert_eq!(
            parse("p daft punk"),
            Some(Command::Play { query: "daft punk".into() })
        );
        assert_eq!(
            parse("play Daft Punk - Around the World"),
            Some(Command::Play { query: "Daft Punk - Around the World".into() })
        );
        assert_eq!(parse("p"), Some(Command::TogglePause));
    }

    #[test]
    fn test_transport() {
        assert_eq!(parse("pause"), Some(Command::Pause));
        assert_eq!(parse("resume"), Some(Command::Resume));
        assert_eq!(parse("stop"), Some(Command::Stop));
        assert_eq!(parse("n"), Some(Command::Next));
        assert_eq!(parse("skip"), Some(Command::Next));
        assert_eq!(parse("replay"), Some(Command::Replay));
    }

    #[test]
    fn test_volume_forms() {
        assert_eq!(parse("v 150"), Some(Command::Volume { percent: 150 }));
        assert_eq!(parse("volume 30"), Some(Command::Volume { percent: 30 }));
        assert_eq!(parse("+"), Some(Command::VolumeUp));
        assert_eq!(parse("-"), Some(Command::VolumeDown));
        assert_eq!(parse("m"), Some(Command::Mute));
        assert_eq!(parse("unmute"), Some(Command::Unmute));
    }

    #[test]
    fn test_favorites_before_play() {
        assert_eq!(parse("fp"), Some(Command::PlayFavorites { shuffled: false }));
        assert_eq!(parse("fr"), Some(Command::PlayFavorites { shuffled: true }));
        assert_eq!(parse("fav"), Some(Command::Favorite));
        assert_eq!(parse("favlast"), Some(Command::FavoritePrevious));
        assert_eq!(parse("favlist"), Some(Command::FavoriteList));
    }

    #[test]
    fn test_check_variants() {
        assert_eq!(
            parse("check"),
            Some(Command::Check { query: None, deep: false, only_recovered: false })
        );
        assert_eq!(
            parse("deepcheck road trip"),
            Some(Command::Check {
                query: Some("road trip".into()),
                deep: true,
                only_recovered: false
            })
        );
        assert_eq!(
            parse("pcr"),
            Some(Command::Check { query: None, deep: false, only_recovered: true })
        );
        assert_eq!(
            parse("pcdr"),
            Some(Command::Check { query: None, deep: true, only_recovered: true })
        );
    }

    #[test]
    fn test_playlist_commands() {
        assert_eq!(
            parse("import https://www.youtube.com/playlist?list=PLx"),
            Some(Command::Import { url: "https://www.youtube.com/playlist?list=PLx".into() })
        );
        assert_eq!(parse("ps"), Some(Command::Playlists));
        assert_eq!(parse("pp"), Some(Command::PlayPlaylist { query: None }));
        assert_eq!(
            parse("pp road trip"),
            Some(Command::PlayPlaylist { query: Some("road trip".into()) })
        );
        assert_eq!(
            parse("pr road trip"),
            Some(Command::RemovePlaylist { query: "road trip".into() })
        );
    }

    #[test]
    fn test_toggles() {
        assert_eq!(parse("radio off"), Some(Command::Radio { enabled: false }));
        assert_eq!(parse("radio"), Some(Command::Radio { enabled: true }));
        assert_eq!(parse("filters on"), Some(Command::Filters { enabled: Some(true) }));
        assert_eq!(parse("filters"), Some(Command::Filters { enabled: None }));
        assert_eq!(
            parse("force metrika"),
            Some(Command::Force { keyword: Some("metrika".into()) })
        );
        assert_eq!(parse("force"), Some(Command::Force { keyword: None }));
        assert_eq!(parse("listen off"), Some(Command::Listen { enabled: false }));
        assert_eq!(parse("mic 2"), Some(Command::Microphone { index: 2 }));
    }

    #[test]
    fn test_ensure_wants_full_id() {
        assert_eq!(
            parse("ensure abc123DEF00"),
            Some(Command::Ensure { id: "abc123DEF00".into() })
        );
        assert_eq!(parse("ensure short"), None);
    }

    #[test]
    fn test_unrecognized_is_none() {
        assert_eq!(parse("garble warble"), None);
        assert_eq!(parse(""), None);
    }
}
