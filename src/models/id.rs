//! Content identifier parsing.
//!
//! Request ids arrive as opaque strings (`tt0111161`, `tt0944947:2:5`,
//! `kitsu:7936:5`, `mal:170942`) and are decomposed into a catalog source,
//! a value and optional season/episode coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// External catalog identities the database can map between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdSource {
    Imdb,
    Tmdb,
    Tvdb,
    Mal,
    Kitsu,
    Anidb,
    Anilist,
    AnimePlanet,
    Anisearch,
    Livechart,
    NotifyMoe,
    Simkl,
    Trakt,
    AnimeCountdown,
}

impl IdSource {
    pub const ALL: &'static [Self] = &[
        Self::Imdb,
        Self::Tmdb,
        Self::Tvdb,
        Self::Mal,
        Self::Kitsu,
        Self::Anidb,
        Self::Anilist,
        Self::AnimePlanet,
        Self::Anisearch,
        Self::Livechart,
        Self::NotifyMoe,
        Self::Simkl,
        Self::Trakt,
        Self::AnimeCountdown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imdb => "imdb",
            Self::Tmdb => "tmdb",
            Self::Tvdb => "tvdb",
            Self::Mal => "mal",
            Self::Kitsu => "kitsu",
            Self::Anidb => "anidb",
            Self::Anilist => "anilist",
            Self::AnimePlanet => "animePlanet",
            Self::Anisearch => "anisearch",
            Self::Livechart => "livechart",
            Self::NotifyMoe => "notifyMoe",
            Self::Simkl => "simkl",
            Self::Trakt => "trakt",
            Self::AnimeCountdown => "animecountdown",
        }
    }

    /// Maps an id prefix as it appears on the wire to a source.
    fn from_prefix(prefix: &str) -> Option<Self> {
        let normalized = prefix.to_ascii_lowercase();
        match normalized.as_str() {
            "imdb" => Some(Self::Imdb),
            "tmdb" => Some(Self::Tmdb),
            "tvdb" => Some(Self::Tvdb),
            "mal" | "myanimelist" => Some(Self::Mal),
            "kitsu" => Some(Self::Kitsu),
            "anidb" => Some(Self::Anidb),
            "anilist" => Some(Self::Anilist),
            "animeplanet" | "anime-planet" => Some(Self::AnimePlanet),
            "anisearch" => Some(Self::Anisearch),
            "livechart" => Some(Self::Livechart),
            "notifymoe" | "notify.moe" => Some(Self::NotifyMoe),
            "simkl" => Some(Self::Simkl),
            "trakt" => Some(Self::Trakt),
            "animecountdown" => Some(Self::AnimeCountdown),
            _ => None,
        }
    }

    /// Sources whose ids are scoped to a single season entry, so a bare
    /// trailing number is an episode rather than a season.
    #[must_use]
    pub const fn is_season_scoped(self) -> bool {
        matches!(
            self,
            Self::Mal | Self::Kitsu | Self::Anilist | Self::Anidb | Self::AnimePlanet
        )
    }
}

impl fmt::Display for IdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An id value as it appears in a catalog: numeric for most sources, free
/// text for slugs (`anime-planet`) and prefixed ids (`tt0111161`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Num(u64),
    Text(String),
}

impl IdValue {
    /// Canonical index key. Numeric and string forms of the same id
    /// collapse to the same key.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    fn from_segment(segment: &str) -> Self {
        segment
            .parse::<u64>()
            .map_or_else(|_| Self::Text(segment.to_string()), Self::Num)
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// The media type of an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
    Unknown,
}

impl MediaType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "movie" => Self::Movie,
            "series" | "tv" => Self::Series,
            _ => Self::Unknown,
        }
    }
}

/// A decomposed content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedId {
    pub source: IdSource,
    pub value: IdValue,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ParsedId {
    /// Parses an opaque id string.
    ///
    /// Recognized shapes:
    /// - `tt<digits>` and `tt<digits>:<season>:<episode>` (IMDb)
    /// - `<source>:<value>` for every other catalog
    /// - `<source>:<value>:<episode>` for season-scoped catalogs
    /// - `<source>:<value>:<season>:<episode>` otherwise
    ///
    /// `media_type` disambiguates nothing today but is part of the call
    /// contract so movie ids with stray coordinates can be rejected later
    /// without changing call sites.
    #[must_use]
    pub fn parse(raw: &str, media_type: MediaType) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let segments: Vec<&str> = raw.split(':').collect();

        if segments[0].starts_with("tt") && segments[0].len() > 2 {
            return Self::parse_imdb(&segments, media_type);
        }

        let source = IdSource::from_prefix(segments[0])?;
        let value = IdValue::from_segment(*segments.get(1)?);

        let (season, episode) = match segments.len() {
            2 => (None, None),
            3 => {
                let n = parse_coordinate(segments[2])?;
                if source.is_season_scoped() {
                    (None, Some(n))
                } else {
                    (Some(n), None)
                }
            }
            4 => (
                Some(parse_coordinate(segments[2])?),
                Some(parse_coordinate(segments[3])?),
            ),
            _ => return None,
        };

        Some(Self {
            source,
            value,
            season,
            episode,
        })
    }

    fn parse_imdb(segments: &[&str], media_type: MediaType) -> Option<Self> {
        let value = IdValue::Text(segments[0].to_string());
        let (season, episode) = match segments.len() {
            1 => (None, None),
            3 if media_type != MediaType::Movie => (
                Some(parse_coordinate(segments[1])?),
                Some(parse_coordinate(segments[2])?),
            ),
            _ => return None,
        };
        Some(Self {
            source: IdSource::Imdb,
            value,
            season,
            episode,
        })
    }

    /// Canonical index key for the value, shared with the corpus indices.
    #[must_use]
    pub fn key(&self) -> String {
        self.value.as_key()
    }
}

fn parse_coordinate(segment: &str) -> Option<u32> {
    segment.parse::<u32>().ok()
}
