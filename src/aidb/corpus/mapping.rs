//! Cross-reference corpus: one record per title carrying every external id
//! the community has linked to it.

use super::normalize_id;
use crate::models::IdSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnimeKind {
    Tv,
    Movie,
    Special,
    Ova,
    Ona,
    #[default]
    Unknown,
}

impl AnimeKind {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("TV") => Self::Tv,
            Some("MOVIE") => Self::Movie,
            Some("SPECIAL") => Self::Special,
            Some("OVA") => Self::Ova,
            Some("ONA") => Self::Ona,
            _ => Self::Unknown,
        }
    }
}

/// All known external ids for one title. Ids are stored in their canonical
/// string form so numeric and string corpus variants collide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingEntry {
    pub anidb_id: Option<String>,
    pub anilist_id: Option<String>,
    pub anime_planet_id: Option<String>,
    pub anisearch_id: Option<String>,
    pub imdb_id: Option<String>,
    pub kitsu_id: Option<String>,
    pub livechart_id: Option<String>,
    pub mal_id: Option<String>,
    pub notify_moe_id: Option<String>,
    pub simkl_id: Option<String>,
    pub themoviedb_id: Option<String>,
    pub thetvdb_id: Option<String>,
    pub trakt_id: Option<String>,
    pub animecountdown_id: Option<String>,
    pub kind: AnimeKind,
    pub tvdb_season: Option<i64>,
    pub tmdb_season: Option<i64>,
}

impl MappingEntry {
    #[must_use]
    pub fn id_for(&self, source: IdSource) -> Option<&str> {
        let id = match source {
            IdSource::Imdb => &self.imdb_id,
            IdSource::Tmdb => &self.themoviedb_id,
            IdSource::Tvdb => &self.thetvdb_id,
            IdSource::Mal => &self.mal_id,
            IdSource::Kitsu => &self.kitsu_id,
            IdSource::Anidb => &self.anidb_id,
            IdSource::Anilist => &self.anilist_id,
            IdSource::AnimePlanet => &self.anime_planet_id,
            IdSource::Anisearch => &self.anisearch_id,
            IdSource::Livechart => &self.livechart_id,
            IdSource::NotifyMoe => &self.notify_moe_id,
            IdSource::Simkl => &self.simkl_id,
            IdSource::Trakt => &self.trakt_id,
            IdSource::AnimeCountdown => &self.animecountdown_id,
        };
        id.as_deref()
    }

    /// All `(source, id)` pairs this entry is indexable under, in the
    /// canonical source order.
    pub fn external_ids(&self) -> impl Iterator<Item = (IdSource, &str)> {
        IdSource::ALL
            .iter()
            .filter_map(|&source| self.id_for(source).map(|id| (source, id)))
    }

    fn has_any_id(&self) -> bool {
        self.external_ids().next().is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(default)]
    anidb_id: Option<serde_json::Value>,
    #[serde(default)]
    anilist_id: Option<serde_json::Value>,
    #[serde(rename = "anime-planet_id", default)]
    anime_planet_id: Option<serde_json::Value>,
    #[serde(default)]
    anisearch_id: Option<serde_json::Value>,
    #[serde(default)]
    imdb_id: Option<serde_json::Value>,
    #[serde(default)]
    kitsu_id: Option<serde_json::Value>,
    #[serde(default)]
    livechart_id: Option<serde_json::Value>,
    #[serde(default)]
    mal_id: Option<serde_json::Value>,
    #[serde(rename = "notify.moe_id", default)]
    notify_moe_id: Option<serde_json::Value>,
    #[serde(default)]
    simkl_id: Option<serde_json::Value>,
    #[serde(default)]
    themoviedb_id: Option<serde_json::Value>,
    #[serde(default)]
    thetvdb_id: Option<serde_json::Value>,
    #[serde(default)]
    trakt_id: Option<serde_json::Value>,
    #[serde(default)]
    animecountdown_id: Option<serde_json::Value>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    tvdb_season: Option<i64>,
    #[serde(default)]
    tmdb_season: Option<i64>,
}

/// Parses the cross-reference corpus. Records without a single usable id
/// are skipped with a warning.
pub fn load(bytes: &[u8]) -> Result<Vec<Arc<MappingEntry>>> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_slice(bytes).context("cross-reference corpus is not a JSON array")?;

    let mut entries = Vec::with_capacity(raw.len());
    for (position, value) in raw.into_iter().enumerate() {
        let parsed: RawMapping = match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(position, error = %e, "Skipping malformed cross-reference record");
                continue;
            }
        };
        let entry = MappingEntry {
            anidb_id: normalize_id(parsed.anidb_id.as_ref()),
            anilist_id: normalize_id(parsed.anilist_id.as_ref()),
            anime_planet_id: normalize_id(parsed.anime_planet_id.as_ref()),
            anisearch_id: normalize_id(parsed.anisearch_id.as_ref()),
            imdb_id: normalize_id(parsed.imdb_id.as_ref()),
            kitsu_id: normalize_id(parsed.kitsu_id.as_ref()),
            livechart_id: normalize_id(parsed.livechart_id.as_ref()),
            mal_id: normalize_id(parsed.mal_id.as_ref()),
            notify_moe_id: normalize_id(parsed.notify_moe_id.as_ref()),
            simkl_id: normalize_id(parsed.simkl_id.as_ref()),
            themoviedb_id: normalize_id(parsed.themoviedb_id.as_ref()),
            thetvdb_id: normalize_id(parsed.thetvdb_id.as_ref()),
            trakt_id: normalize_id(parsed.trakt_id.as_ref()),
            animecountdown_id: normalize_id(parsed.animecountdown_id.as_ref()),
            kind: AnimeKind::parse(parsed.kind.as_deref()),
            tvdb_season: parsed.tvdb_season,
            tmdb_season: parsed.tmdb_season,
        };
        if !entry.has_any_id() {
            warn!(position, "Skipping cross-reference record with no ids");
            continue;
        }
        entries.push(Arc::new(entry));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_mixed_id_forms() {
        let json = serde_json::json!([
            {
                "kitsu_id": 7936,
                "imdb_id": "tt2560140",
                "thetvdb_id": "267440",
                "type": "TV"
            }
        ]);
        let entries = load(serde_json::to_vec(&json).unwrap().as_slice()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kitsu_id.as_deref(), Some("7936"));
        assert_eq!(entries[0].thetvdb_id.as_deref(), Some("267440"));
        assert_eq!(entries[0].kind, AnimeKind::Tv);
    }

    #[test]
    fn records_without_ids_are_skipped() {
        let json = serde_json::json!([
            { "type": "TV" },
            { "mal_id": 5114, "type": "TV" }
        ]);
        let entries = load(serde_json::to_vec(&json).unwrap().as_slice()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mal_id.as_deref(), Some("5114"));
    }

    #[test]
    fn malformed_records_do_not_abort_the_load() {
        let json = serde_json::json!([
            { "mal_id": 1, "tvdb_season": "not-a-number" },
            { "mal_id": 2 }
        ]);
        let entries = load(serde_json::to_vec(&json).unwrap().as_slice()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mal_id.as_deref(), Some("2"));
    }

    #[test]
    fn unknown_kind_defaults() {
        assert_eq!(AnimeKind::parse(Some("music")), AnimeKind::Unknown);
        assert_eq!(AnimeKind::parse(Some("ova")), AnimeKind::Ova);
        assert_eq!(AnimeKind::parse(None), AnimeKind::Unknown);
    }
}
