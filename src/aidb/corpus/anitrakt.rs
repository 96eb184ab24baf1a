//! Anitrakt corpora: MyAnimeList → Trakt links, published separately for
//! movies and shows, with per-season externals for split-cour shows.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnitraktExternals {
    pub tvdb: Option<u64>,
    pub tmdb: Option<u64>,
    pub imdb: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnitraktSeason {
    pub id: u64,
    pub number: u32,
    pub externals: AnitraktExternals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnitraktTrakt {
    pub id: u64,
    pub slug: String,
    pub title: String,
    pub is_split_cour: Option<bool>,
    pub season: Option<AnitraktSeason>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnitraktEntry {
    pub mal_id: String,
    pub trakt: AnitraktTrakt,
    pub externals: AnitraktExternals,
    pub release_year: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct RawExternals {
    #[serde(default)]
    tvdb: Option<u64>,
    #[serde(default)]
    tmdb: Option<u64>,
    #[serde(default)]
    imdb: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSeason {
    id: u64,
    number: u32,
    #[serde(default)]
    externals: RawExternals,
}

#[derive(Debug, Deserialize)]
struct RawTrakt {
    id: u64,
    slug: String,
    title: String,
    #[serde(rename = "isSplitCour", default)]
    is_split_cour: Option<bool>,
    #[serde(default)]
    season: Option<RawSeason>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "malId")]
    mal_id: serde_json::Value,
    trakt: RawTrakt,
    #[serde(default)]
    externals: RawExternals,
    #[serde(rename = "releaseYear", default)]
    release_year: Option<i32>,
}

impl From<RawExternals> for AnitraktExternals {
    fn from(raw: RawExternals) -> Self {
        Self {
            tvdb: raw.tvdb,
            tmdb: raw.tmdb,
            imdb: raw.imdb,
        }
    }
}

/// Parses one Anitrakt corpus (movies or shows).
pub fn load(bytes: &[u8], corpus: &str) -> Result<Vec<Arc<AnitraktEntry>>> {
    let raw: Vec<serde_json::Value> = serde_json::from_slice(bytes)
        .with_context(|| format!("anitrakt {corpus} corpus is not a JSON array"))?;

    let mut entries = Vec::with_capacity(raw.len());
    for (position, value) in raw.into_iter().enumerate() {
        let parsed: RawEntry = match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(corpus, position, error = %e, "Skipping malformed anitrakt record");
                continue;
            }
        };
        let mal_id = match super::normalize_id(Some(&parsed.mal_id)) {
            Some(id) => id,
            None => {
                warn!(corpus, position, "Skipping anitrakt record without a mal id");
                continue;
            }
        };
        entries.push(Arc::new(AnitraktEntry {
            mal_id,
            trakt: AnitraktTrakt {
                id: parsed.trakt.id,
                slug: parsed.trakt.slug,
                title: parsed.trakt.title,
                is_split_cour: parsed.trakt.is_split_cour,
                season: parsed.trakt.season.map(|s| AnitraktSeason {
                    id: s.id,
                    number: s.number,
                    externals: s.externals.into(),
                }),
            },
            externals: parsed.externals.into(),
            release_year: parsed.release_year,
        }));
    }
    Ok(entries)
}
