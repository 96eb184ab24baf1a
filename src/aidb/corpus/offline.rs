//! Offline catalog: titles, synonyms and broadcast seasons, keyed by the
//! catalog ids embedded in each record's source URLs.

use super::DetailLevel;
use crate::models::IdSource;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
    #[default]
    Undefined,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeSeason {
    pub season: Season,
    pub year: Option<i32>,
}

/// Details for one catalog entry. The trailing fields are only populated at
/// `full` detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimeDetails {
    pub title: String,
    pub synonyms: Vec<String>,
    pub anime_season: Option<AnimeSeason>,
    pub episodes: Option<u32>,
    pub status: Option<String>,
    pub picture: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Root {
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    title: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    episodes: Option<u32>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "animeSeason", default)]
    anime_season: Option<RawSeason>,
}

#[derive(Debug, Deserialize)]
struct RawSeason {
    #[serde(default)]
    season: Option<String>,
    #[serde(default)]
    year: Option<i32>,
}

/// One parsed record plus the catalog ids its source URLs carried.
#[derive(Debug, Clone)]
pub struct OfflineRecord {
    pub details: Arc<AnimeDetails>,
    pub ids: Vec<(IdSource, String)>,
}

fn source_patterns() -> &'static [(IdSource, Regex)] {
    static PATTERNS: OnceLock<Vec<(IdSource, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (IdSource::Anidb, r"anidb\.net/anime/(\d+)"),
            (IdSource::Anilist, r"anilist\.co/anime/(\d+)"),
            (IdSource::AnimePlanet, r"anime-planet\.com/anime/([^/\s]+)"),
            (IdSource::Anisearch, r"anisearch\.com/anime/(\d+)"),
            (IdSource::Kitsu, r"kitsu\.(?:io|app)/anime/([^/\s]+)"),
            (IdSource::Livechart, r"livechart\.me/anime/(\d+)"),
            (IdSource::Mal, r"myanimelist\.net/anime/(\d+)"),
            (IdSource::NotifyMoe, r"notify\.moe/anime/([^/\s]+)"),
            (IdSource::Simkl, r"simkl\.com/anime/(\d+)"),
        ]
        .into_iter()
        .map(|(source, pattern)| {
            (
                source,
                Regex::new(pattern).expect("Invalid regex pattern defined in code"),
            )
        })
        .collect()
    })
}

/// Extracts `(source, id)` pairs from a record's source URLs.
fn extract_ids(sources: &[String]) -> Vec<(IdSource, String)> {
    let mut ids = Vec::new();
    for url in sources {
        for (source, pattern) in source_patterns() {
            if let Some(caps) = pattern.captures(url) {
                ids.push((*source, caps[1].to_string()));
                break;
            }
        }
    }
    ids
}

fn parse_season(raw: Option<&RawSeason>) -> Option<AnimeSeason> {
    let raw = raw?;
    let season = match raw.season.as_deref().map(str::to_ascii_uppercase).as_deref() {
        Some("WINTER") => Season::Winter,
        Some("SPRING") => Season::Spring,
        Some("SUMMER") => Season::Summer,
        Some("FALL") => Season::Fall,
        _ => Season::Undefined,
    };
    Some(AnimeSeason {
        season,
        year: raw.year,
    })
}

/// Parses the offline catalog. The corpus ships zstd-compressed; callers
/// hand over the decompressed JSON document. Records without any
/// recognizable source id are skipped.
pub fn load(bytes: &[u8], detail: DetailLevel) -> Result<Vec<OfflineRecord>> {
    let root: Root =
        serde_json::from_slice(bytes).context("offline catalog is not the expected JSON shape")?;

    let mut records = Vec::with_capacity(root.data.len());
    for (position, value) in root.data.into_iter().enumerate() {
        let raw: RawEntry = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(position, error = %e, "Skipping malformed offline catalog record");
                continue;
            }
        };
        let ids = extract_ids(&raw.sources);
        if ids.is_empty() {
            continue;
        }

        let details = if detail == DetailLevel::Full {
            AnimeDetails {
                title: raw.title,
                synonyms: raw.synonyms,
                anime_season: parse_season(raw.anime_season.as_ref()),
                episodes: raw.episodes,
                status: raw.status,
                picture: raw.picture,
                tags: raw.tags,
            }
        } else {
            AnimeDetails {
                title: raw.title,
                synonyms: raw.synonyms,
                anime_season: parse_season(raw.anime_season.as_ref()),
                ..AnimeDetails::default()
            }
        };
        records.push(OfflineRecord {
            details: Arc::new(details),
            ids,
        });
    }
    Ok(records)
}
