//! Kitsu↔IMDb corpus: maps season-scoped Kitsu entries onto the IMDb/TVDB
//! series they belong to, with the episode window each entry covers.

use super::normalize_id;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KitsuImdbEntry {
    pub kitsu_id: String,
    pub tvdb_id: Option<String>,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub from_season: Option<u32>,
    pub from_episode: Option<u32>,
    pub non_imdb_episodes: Vec<u32>,
    pub fanart_logo_id: Option<String>,
}

impl KitsuImdbEntry {
    /// The first episode of the parent series this entry maps onto;
    /// entries without an explicit start cover from episode 1.
    #[must_use]
    pub fn from_episode_or_first(&self) -> u32 {
        self.from_episode.unwrap_or(1)
    }
}

#[derive(Debug, Deserialize)]
struct RawKitsuEntry {
    #[serde(rename = "tvdbId", default)]
    tvdb_id: Option<serde_json::Value>,
    #[serde(rename = "imdbId", default)]
    imdb_id: Option<serde_json::Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "fromSeason", default)]
    from_season: Option<u32>,
    #[serde(rename = "fromEpisode", default)]
    from_episode: Option<u32>,
    #[serde(rename = "nonImdbEpisodes", default)]
    non_imdb_episodes: Vec<u32>,
    #[serde(rename = "fanartLogoId", default)]
    fanart_logo_id: Option<serde_json::Value>,
}

/// Parses the Kitsu↔IMDb corpus: a JSON object keyed by kitsu id.
pub fn load(bytes: &[u8]) -> Result<Vec<Arc<KitsuImdbEntry>>> {
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(bytes).context("kitsu-imdb corpus is not a JSON object")?;

    let mut entries = Vec::with_capacity(raw.len());
    for (kitsu_id, value) in raw {
        let parsed: RawKitsuEntry = match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(kitsu_id = %kitsu_id, error = %e, "Skipping malformed kitsu-imdb record");
                continue;
            }
        };
        let kitsu_id = kitsu_id.trim().to_string();
        if kitsu_id.is_empty() {
            warn!("Skipping kitsu-imdb record with a blank key");
            continue;
        }
        entries.push(Arc::new(KitsuImdbEntry {
            kitsu_id,
            tvdb_id: normalize_id(parsed.tvdb_id.as_ref()),
            imdb_id: normalize_id(parsed.imdb_id.as_ref()),
            title: parsed.title,
            from_season: parsed.from_season,
            from_episode: parsed.from_episode,
            non_imdb_episodes: parsed.non_imdb_episodes,
            fanart_logo_id: normalize_id(parsed.fanart_logo_id.as_ref()),
        }));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_entries_keyed_by_kitsu_id() {
        let json = serde_json::json!({
            "7936": {
                "tvdbId": 267440,
                "imdbId": "tt2560140",
                "title": "Attack on Titan",
                "fromSeason": 1,
                "fromEpisode": 1,
                "nonImdbEpisodes": [13, 14]
            },
            "11111": {
                "imdbId": "tt2560140",
                "fromSeason": 2,
                "fromEpisode": 1
            }
        });
        let mut entries = load(serde_json::to_vec(&json).unwrap().as_slice()).unwrap();
        entries.sort_by(|a, b| a.kitsu_id.cmp(&b.kitsu_id));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kitsu_id, "7936");
        assert_eq!(entries[1].tvdb_id.as_deref(), Some("267440"));
        assert_eq!(entries[1].non_imdb_episodes, vec![13, 14]);
        assert_eq!(entries[0].from_season, Some(2));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let json = serde_json::json!({
            "1": { "fromSeason": "two" },
            "2": { "fromSeason": 2 }
        });
        let entries = load(serde_json::to_vec(&json).unwrap().as_slice()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kitsu_id, "2");
    }
}
