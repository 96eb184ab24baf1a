//! Corpus record types and loaders.
//!
//! Each loader takes the raw downloaded bytes and produces validated
//! records. A record that fails shape validation is skipped with a warning;
//! loaders only fail when the document itself is unreadable.

pub mod anime_list;
pub mod anitrakt;
pub mod kitsu_imdb;
pub mod mapping;
pub mod offline;

pub use anime_list::{AnimeListEntry, AnimeListMapping, DefaultTvdbSeason};
pub use anitrakt::{AnitraktEntry, AnitraktExternals, AnitraktSeason, AnitraktTrakt};
pub use kitsu_imdb::KitsuImdbEntry;
pub use mapping::{AnimeKind, MappingEntry};
pub use offline::{AnimeDetails, AnimeSeason, Season};

/// How much of each corpus is retained in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Skip the database entirely.
    None,
    /// Reduced details, no XML episode mappings.
    Required,
    Full,
}

impl DetailLevel {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "required" => Some(Self::Required),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Normalizes a corpus id that may arrive as a JSON number or string.
/// Empty and null values collapse to `None` so the numeric and string
/// forms of the same id produce identical index keys.
#[must_use]
pub fn normalize_id(raw: Option<&serde_json::Value>) -> Option<String> {
    match raw? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}
