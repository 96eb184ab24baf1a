//! The XML master list: AniDB → TVDB/TMDB season and episode-offset
//! mappings, including per-season mapping lists for split series.

use super::DetailLevel;
use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// `defaulttvdbseason` attribute: a concrete season number, or `a` meaning
/// the entry uses absolute numbering across the whole series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultTvdbSeason {
    Absolute,
    Season(i64),
}

impl DefaultTvdbSeason {
    fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("a") {
            return Some(Self::Absolute);
        }
        raw.parse::<i64>().ok().map(Self::Season)
    }

    /// Whether an entry with this default season serves a request for
    /// `season`.
    #[must_use]
    pub fn matches(self, season: u32) -> bool {
        match self {
            Self::Absolute => true,
            Self::Season(n) => n == i64::from(season),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimeListMapping {
    pub anidb_season: i64,
    pub tvdb_season: Option<i64>,
    pub tmdb_season: Option<i64>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub offset: Option<i64>,
    /// Raw `;from-to;...` episode pair list, kept verbatim.
    pub episodes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimeListEntry {
    pub anidb_id: String,
    pub tvdb_id: Option<String>,
    pub default_tvdb_season: Option<DefaultTvdbSeason>,
    pub episode_offset: Option<u32>,
    pub tmdb_id: Option<String>,
    pub tmdb_tv: Option<String>,
    pub tmdb_season: Option<i64>,
    pub tmdb_offset: Option<u32>,
    pub imdb_id: Option<String>,
    /// Parsed only at `full` detail.
    pub mappings: Option<Vec<AnimeListMapping>>,
}

impl AnimeListEntry {
    /// First series episode this entry maps onto.
    #[must_use]
    pub fn from_episode(&self) -> u32 {
        self.episode_offset.map_or(1, |offset| offset + 1)
    }
}

#[derive(Debug, Deserialize)]
struct RawAnimeList {
    #[serde(rename = "anime", default)]
    anime: Vec<RawAnime>,
}

#[derive(Debug, Deserialize)]
struct RawAnime {
    #[serde(rename = "@anidbid", default)]
    anidbid: Option<String>,
    #[serde(rename = "@tvdbid", default)]
    tvdbid: Option<String>,
    #[serde(rename = "@defaulttvdbseason", default)]
    defaulttvdbseason: Option<String>,
    #[serde(rename = "@episodeoffset", default)]
    episodeoffset: Option<String>,
    #[serde(rename = "@tmdbid", default)]
    tmdbid: Option<String>,
    #[serde(rename = "@tmdbtvid", default)]
    tmdbtvid: Option<String>,
    #[serde(rename = "@tmdbseason", default)]
    tmdbseason: Option<String>,
    #[serde(rename = "@tmdboffset", default)]
    tmdboffset: Option<String>,
    #[serde(rename = "@imdbid", default)]
    imdbid: Option<String>,
    #[serde(rename = "mapping-list", default)]
    mapping_list: Option<RawMappingList>,
}

#[derive(Debug, Deserialize)]
struct RawMappingList {
    #[serde(rename = "mapping", default)]
    mapping: Vec<RawMapping>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(rename = "@anidbseason", default)]
    anidbseason: Option<String>,
    #[serde(rename = "@tvdbseason", default)]
    tvdbseason: Option<String>,
    #[serde(rename = "@tmdbseason", default)]
    tmdbseason: Option<String>,
    #[serde(rename = "@start", default)]
    start: Option<String>,
    #[serde(rename = "@end", default)]
    end: Option<String>,
    #[serde(rename = "@offset", default)]
    offset: Option<String>,
    #[serde(rename = "$text", default)]
    episodes: Option<String>,
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_num<T: std::str::FromStr>(raw: Option<&String>) -> Option<T> {
    raw.and_then(|s| s.trim().parse().ok())
}

/// Ensures the document's root element is `<anime-list>`.
fn check_root(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if start.name().as_ref() == b"anime-list" {
                    return Ok(());
                }
                bail!("unexpected root element in anime-list document");
            }
            Ok(Event::Eof) => bail!("anime-list document has no root element"),
            Ok(_) => {}
            Err(e) => bail!("anime-list document is not well-formed: {e}"),
        }
    }
}

fn convert_mapping(raw: &RawMapping) -> Option<AnimeListMapping> {
    let anidb_season = parse_num::<i64>(raw.anidbseason.as_ref())?;
    Some(AnimeListMapping {
        anidb_season,
        tvdb_season: parse_num(raw.tvdbseason.as_ref()),
        tmdb_season: parse_num(raw.tmdbseason.as_ref()),
        start: parse_num(raw.start.as_ref()),
        end: parse_num(raw.end.as_ref()),
        offset: parse_num(raw.offset.as_ref()),
        episodes: non_blank(raw.episodes.clone()),
    })
}

/// Parses the master list. The `mapping-list` subtree is retained only at
/// `full` detail; entries without a usable anidb id are skipped.
pub fn load(bytes: &[u8], detail: DetailLevel) -> Result<Vec<Arc<AnimeListEntry>>> {
    let xml = std::str::from_utf8(bytes).context("anime-list document is not UTF-8")?;
    check_root(xml)?;

    let raw: RawAnimeList =
        quick_xml::de::from_str(xml).context("failed to deserialize anime-list document")?;

    let mut entries = Vec::with_capacity(raw.anime.len());
    for item in raw.anime {
        let Some(anidb_id) = non_blank(item.anidbid.clone()) else {
            warn!("Skipping anime-list entry without an anidb id");
            continue;
        };

        let mappings = if detail == DetailLevel::Full {
            item.mapping_list.as_ref().map(|list| {
                list.mapping
                    .iter()
                    .filter_map(|raw| {
                        let converted = convert_mapping(raw);
                        if converted.is_none() {
                            warn!(anidb_id = %anidb_id, "Skipping mapping without an anidb season");
                        }
                        converted
                    })
                    .collect()
            })
        } else {
            None
        };

        entries.push(Arc::new(AnimeListEntry {
            anidb_id,
            tvdb_id: non_blank(item.tvdbid),
            default_tvdb_season: item
                .defaulttvdbseason
                .as_deref()
                .and_then(DefaultTvdbSeason::parse),
            episode_offset: parse_num(item.episodeoffset.as_ref()),
            tmdb_id: non_blank(item.tmdbid),
            tmdb_tv: non_blank(item.tmdbtvid),
            tmdb_season: parse_num(item.tmdbseason.as_ref()),
            tmdb_offset: parse_num(item.tmdboffset.as_ref()),
            imdb_id: non_blank(item.imdbid),
            mappings,
        }));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<anime-list>
  <anime anidbid="4521" tvdbid="79481" defaulttvdbseason="1" imdbid="tt0409591">
    <name>Death Note</name>
  </anime>
  <anime anidbid="8692" tvdbid="248035" defaulttvdbseason="a" episodeoffset="12" tmdbtvid="45790">
    <name>Example Split</name>
    <mapping-list>
      <mapping anidbseason="0" tvdbseason="0">;1-2;2-3;</mapping>
      <mapping anidbseason="1" tvdbseason="1" start="1" end="12" offset="12"/>
    </mapping-list>
  </anime>
  <anime tvdbid="999">
    <name>Broken, no anidb id</name>
  </anime>
</anime-list>"#;

    #[test]
    fn parses_entries_and_attributes() {
        let entries = load(DOC.as_bytes(), DetailLevel::Full).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].anidb_id, "4521");
        assert_eq!(entries[0].imdb_id.as_deref(), Some("tt0409591"));
        assert_eq!(
            entries[0].default_tvdb_season,
            Some(DefaultTvdbSeason::Season(1))
        );
    }

    #[test]
    fn absolute_season_and_offsets() {
        let entries = load(DOC.as_bytes(), DetailLevel::Full).unwrap();
        let split = &entries[1];
        assert_eq!(split.default_tvdb_season, Some(DefaultTvdbSeason::Absolute));
        assert_eq!(split.episode_offset, Some(12));
        assert_eq!(split.from_episode(), 13);
        assert!(split.default_tvdb_season.unwrap().matches(7));
    }

    #[test]
    fn full_detail_parses_mapping_lists() {
        let entries = load(DOC.as_bytes(), DetailLevel::Full).unwrap();
        let mappings = entries[1].mappings.as_ref().unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].episodes.as_deref(), Some(";1-2;2-3;"));
        assert_eq!(mappings[1].offset, Some(12));
    }

    #[test]
    fn required_detail_skips_mapping_lists() {
        let entries = load(DOC.as_bytes(), DetailLevel::Required).unwrap();
        assert!(entries[1].mappings.is_none());
    }

    #[test]
    fn rejects_wrong_root() {
        assert!(load(b"<not-a-list></not-a-list>", DetailLevel::Full).is_err());
    }
}
