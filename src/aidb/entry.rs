//! The canonical anime entry: a merged view over every corpus record a
//! lookup resolved, plus the id enrichment applied to incoming requests.

use super::corpus::{
    AnimeDetails, AnimeKind, AnimeListEntry, AnimeListMapping, AnitraktEntry, DefaultTvdbSeason,
    KitsuImdbEntry, MappingEntry,
    offline::AnimeSeason,
};
use crate::models::{IdSource, ParsedId};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// External ids after layering; the canonical answer for "what is this
/// title called in catalog X".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalIds {
    pub imdb: Option<String>,
    pub tvdb: Option<String>,
    pub tmdb: Option<String>,
    pub trakt: Option<String>,
    pub mal: Option<String>,
    pub kitsu: Option<String>,
    pub anilist: Option<String>,
    pub anidb: Option<String>,
}

/// Season placement within an external catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSeason {
    pub season_number: Option<i64>,
    pub season_id: Option<u64>,
    pub from_episode: Option<u32>,
}

impl CatalogSeason {
    fn is_empty(&self) -> bool {
        self.season_number.is_none() && self.season_id.is_none() && self.from_episode.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImdbProjection {
    pub season_number: Option<u32>,
    pub from_episode: Option<u32>,
    pub non_imdb_episodes: Vec<u32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraktProjection {
    pub title: String,
    pub slug: String,
    pub is_split_cour: Option<bool>,
    pub season_id: Option<u64>,
    pub season_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fanart {
    pub logo_id: String,
}

/// What the database hands back for a resolved lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimeEntry {
    pub ids: ExternalIds,
    pub kind: AnimeKind,
    pub title: Option<String>,
    pub synonyms: Option<Vec<String>>,
    pub anime_season: Option<AnimeSeason>,
    pub tvdb: Option<CatalogSeason>,
    pub tmdb: Option<CatalogSeason>,
    pub imdb: Option<ImdbProjection>,
    pub trakt: Option<TraktProjection>,
    pub fanart: Option<Fanart>,
    pub episode_mappings: Option<Vec<AnimeListMapping>>,
}

/// The records a lookup resolved, before layering.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRecords {
    pub mapping: Option<Arc<MappingEntry>>,
    pub details: Option<Arc<AnimeDetails>>,
    pub kitsu: Option<Arc<KitsuImdbEntry>>,
    pub anitrakt: Option<Arc<AnitraktEntry>>,
    pub anime_list: Option<Arc<AnimeListEntry>>,
}

impl ResolvedRecords {
    fn is_empty(&self) -> bool {
        self.mapping.is_none()
            && self.details.is_none()
            && self.kitsu.is_none()
            && self.anitrakt.is_none()
            && self.anime_list.is_none()
    }
}

/// Layers the resolved records into an `AnimeEntry`. Returns `None` when
/// nothing at all resolved.
#[must_use]
pub fn build_entry(records: &ResolvedRecords) -> Option<AnimeEntry> {
    if records.is_empty() {
        return None;
    }
    let mapping = records.mapping.as_deref();
    let details = records.details.as_deref();
    let kitsu = records.kitsu.as_deref();
    let anitrakt = records.anitrakt.as_deref();
    let anime_list = records.anime_list.as_deref();

    let ids = ExternalIds {
        imdb: first_of(&[
            mapping.and_then(|m| m.imdb_id.clone()),
            anime_list.and_then(|a| a.imdb_id.clone()),
            kitsu.and_then(|k| k.imdb_id.clone()),
            anitrakt.and_then(|a| a.externals.imdb.clone()),
        ]),
        tvdb: first_of(&[
            anime_list.and_then(|a| a.tvdb_id.clone()),
            kitsu.and_then(|k| k.tvdb_id.clone()),
            mapping.and_then(|m| m.thetvdb_id.clone()),
            anitrakt.and_then(|a| a.externals.tvdb.map(|id| id.to_string())),
        ]),
        tmdb: first_of(&[
            mapping.and_then(|m| m.themoviedb_id.clone()),
            anime_list.and_then(|a| a.tmdb_tv.clone().or_else(|| a.tmdb_id.clone())),
            anitrakt.and_then(|a| a.externals.tmdb.map(|id| id.to_string())),
        ]),
        trakt: first_of(&[
            mapping.and_then(|m| m.trakt_id.clone()),
            anitrakt.map(|a| a.trakt.id.to_string()),
        ]),
        mal: first_of(&[
            mapping.and_then(|m| m.mal_id.clone()),
            anitrakt.map(|a| a.mal_id.clone()),
        ]),
        kitsu: first_of(&[
            mapping.and_then(|m| m.kitsu_id.clone()),
            kitsu.map(|k| k.kitsu_id.clone()),
        ]),
        anilist: mapping.and_then(|m| m.anilist_id.clone()),
        anidb: first_of(&[
            mapping.and_then(|m| m.anidb_id.clone()),
            anime_list.map(|a| a.anidb_id.clone()),
        ]),
    };

    let anitrakt_season = anitrakt.and_then(|a| a.trakt.season.as_ref());

    let tvdb = {
        let season_number = mapping.and_then(|m| m.tvdb_season).or_else(|| {
            anime_list.and_then(|a| match a.default_tvdb_season {
                Some(DefaultTvdbSeason::Season(n)) => Some(n),
                _ => None,
            })
        });
        let projection = CatalogSeason {
            season_number,
            season_id: anitrakt_season.and_then(|s| s.externals.tvdb),
            from_episode: anime_list.and_then(|a| a.episode_offset.map(|offset| offset + 1)),
        };
        (!projection.is_empty()).then_some(projection)
    };

    let tmdb = {
        let projection = CatalogSeason {
            season_number: mapping
                .and_then(|m| m.tmdb_season)
                .or_else(|| anime_list.and_then(|a| a.tmdb_season)),
            season_id: anitrakt_season.and_then(|s| s.externals.tmdb),
            from_episode: anime_list.and_then(|a| a.tmdb_offset.map(|offset| offset + 1)),
        };
        (!projection.is_empty()).then_some(projection)
    };

    let imdb = kitsu.map(|k| ImdbProjection {
        season_number: k.from_season,
        from_episode: k.from_episode,
        non_imdb_episodes: k.non_imdb_episodes.clone(),
        title: k.title.clone(),
    });

    let trakt = anitrakt.map(|a| TraktProjection {
        title: a.trakt.title.clone(),
        slug: a.trakt.slug.clone(),
        is_split_cour: a.trakt.is_split_cour,
        season_id: a.trakt.season.as_ref().map(|s| s.id),
        season_number: a.trakt.season.as_ref().map(|s| s.number),
    });

    let fanart = kitsu
        .and_then(|k| k.fanart_logo_id.clone())
        .map(|logo_id| Fanart { logo_id });

    Some(AnimeEntry {
        ids,
        kind: mapping.map_or(AnimeKind::Unknown, |m| m.kind),
        title: details.map(|d| d.title.clone()),
        synonyms: details.map(|d| d.synonyms.clone()),
        anime_season: details.and_then(|d| d.anime_season.clone()),
        tvdb,
        tmdb,
        imdb,
        trakt,
        fanart,
        episode_mappings: anime_list.and_then(|a| a.mappings.clone()),
    })
}

fn first_of(candidates: &[Option<String>]) -> Option<String> {
    candidates.iter().flatten().next().cloned()
}

impl AnimeEntry {
    /// The numeric AniList id, when known.
    #[must_use]
    pub fn anilist_id(&self) -> Option<u64> {
        self.ids.anilist.as_deref()?.parse().ok()
    }

    #[must_use]
    pub fn mal_id(&self) -> Option<u64> {
        self.ids.mal.as_deref()?.parse().ok()
    }

    /// Which id a lookup should use for a catalog, after layering.
    #[must_use]
    pub fn id_for(&self, source: IdSource) -> Option<&str> {
        let id = match source {
            IdSource::Imdb => &self.ids.imdb,
            IdSource::Tvdb => &self.ids.tvdb,
            IdSource::Tmdb => &self.ids.tmdb,
            IdSource::Trakt => &self.ids.trakt,
            IdSource::Mal => &self.ids.mal,
            IdSource::Kitsu => &self.ids.kitsu,
            IdSource::Anilist => &self.ids.anilist,
            IdSource::Anidb => &self.ids.anidb,
            _ => return None,
        };
        id.as_deref()
    }
}

fn season_capture_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)season[\s_-]*(\d+)").expect("Invalid regex pattern defined in code")
    })
}

/// Extracts a season number mentioned in any synonym.
#[must_use]
pub fn season_from_synonyms(synonyms: &[String]) -> Option<u32> {
    synonyms.iter().find_map(|synonym| {
        season_capture_regex()
            .captures(synonym)
            .and_then(|caps| caps[1].parse().ok())
    })
}

/// Whether any synonym names the given season.
#[must_use]
pub fn synonyms_mention_season(synonyms: &[String], season: u32) -> bool {
    let Ok(re) = Regex::new(&format!(r"(?i)season[\s_-]*{season}\b")) else {
        return false;
    };
    synonyms.iter().any(|synonym| re.is_match(synonym))
}

/// Fills the parsed id's season from the entry and rebases season-scoped
/// episode numbers onto the parent series.
///
/// Idempotent: an id whose season is already set is returned unchanged, and
/// the episode rebase only happens in the pass that fills the season.
#[must_use]
pub fn enrich_parsed_id(parsed: &ParsedId, entry: &AnimeEntry) -> ParsedId {
    if parsed.season.is_some() {
        return parsed.clone();
    }

    let season = entry
        .imdb
        .as_ref()
        .and_then(|i| i.season_number)
        .or_else(|| entry.trakt.as_ref().and_then(|t| t.season_number))
        .or_else(|| {
            entry
                .tvdb
                .as_ref()
                .and_then(|t| t.season_number)
                .and_then(|n| u32::try_from(n).ok())
        })
        .or_else(|| {
            entry
                .synonyms
                .as_deref()
                .and_then(season_from_synonyms)
        })
        .or_else(|| {
            entry
                .tmdb
                .as_ref()
                .and_then(|t| t.season_number)
                .and_then(|n| u32::try_from(n).ok())
        });

    let Some(season) = season else {
        return parsed.clone();
    };

    let mut enriched = parsed.clone();
    enriched.season = Some(season);

    if matches!(parsed.source, IdSource::Mal | IdSource::Kitsu)
        && let Some(episode) = parsed.episode
    {
        let from_episode = entry
            .imdb
            .as_ref()
            .and_then(|i| i.from_episode)
            .or_else(|| entry.tvdb.as_ref().and_then(|t| t.from_episode));
        if let Some(from_episode) = from_episode {
            enriched.episode = Some(from_episode + episode - 1);
        }
    }
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdValue, MediaType};

    fn full_records() -> ResolvedRecords {
        ResolvedRecords {
            mapping: Some(Arc::new(MappingEntry {
                imdb_id: Some("tt-map".into()),
                thetvdb_id: Some("tvdb-map".into()),
                themoviedb_id: Some("tmdb-map".into()),
                trakt_id: Some("trakt-map".into()),
                mal_id: Some("101".into()),
                kitsu_id: Some("7936".into()),
                anilist_id: Some("146065".into()),
                kind: AnimeKind::Tv,
                ..MappingEntry::default()
            })),
            details: Some(Arc::new(AnimeDetails {
                title: "Example".into(),
                synonyms: vec!["Example Season 2".into()],
                ..AnimeDetails::default()
            })),
            kitsu: Some(Arc::new(KitsuImdbEntry {
                kitsu_id: "7936".into(),
                imdb_id: Some("tt-kitsu".into()),
                tvdb_id: Some("tvdb-kitsu".into()),
                from_season: Some(2),
                from_episode: Some(13),
                non_imdb_episodes: vec![5],
                fanart_logo_id: Some("logo-1".into()),
                title: Some("Example S2".into()),
            })),
            anitrakt: None,
            anime_list: Some(Arc::new(AnimeListEntry {
                anidb_id: "900".into(),
                tvdb_id: Some("tvdb-list".into()),
                default_tvdb_season: Some(DefaultTvdbSeason::Season(2)),
                episode_offset: Some(12),
                tmdb_id: None,
                tmdb_tv: Some("tmdb-list".into()),
                tmdb_season: Some(2),
                tmdb_offset: Some(12),
                imdb_id: Some("tt-list".into()),
                mappings: None,
            })),
        }
    }

    #[test]
    fn id_layering_follows_precedence() {
        let entry = build_entry(&full_records()).unwrap();
        // imdb: mapping first.
        assert_eq!(entry.ids.imdb.as_deref(), Some("tt-map"));
        // tvdb: anime list first.
        assert_eq!(entry.ids.tvdb.as_deref(), Some("tvdb-list"));
        // tmdb: mapping first.
        assert_eq!(entry.ids.tmdb.as_deref(), Some("tmdb-map"));
        assert_eq!(entry.ids.trakt.as_deref(), Some("trakt-map"));
    }

    #[test]
    fn from_episode_derives_from_offsets() {
        let entry = build_entry(&full_records()).unwrap();
        assert_eq!(entry.tvdb.as_ref().unwrap().from_episode, Some(13));
        assert_eq!(entry.tmdb.as_ref().unwrap().from_episode, Some(13));
    }

    #[test]
    fn missing_offset_leaves_from_episode_unset() {
        let mut records = full_records();
        let mut list = (*records.anime_list.unwrap()).clone();
        list.episode_offset = None;
        records.anime_list = Some(Arc::new(list));
        let entry = build_entry(&records).unwrap();
        assert_eq!(entry.tvdb.as_ref().unwrap().from_episode, None);
    }

    #[test]
    fn kitsu_contributes_the_imdb_block() {
        let entry = build_entry(&full_records()).unwrap();
        let imdb = entry.imdb.as_ref().unwrap();
        assert_eq!(imdb.season_number, Some(2));
        assert_eq!(imdb.from_episode, Some(13));
        assert_eq!(imdb.non_imdb_episodes, vec![5]);
        assert_eq!(entry.fanart.as_ref().unwrap().logo_id, "logo-1");
    }

    #[test]
    fn empty_records_build_nothing() {
        assert!(build_entry(&ResolvedRecords::default()).is_none());
    }

    #[test]
    fn enrich_fills_season_and_rebases_kitsu_episodes() {
        let entry = build_entry(&full_records()).unwrap();
        let parsed = ParsedId {
            source: IdSource::Kitsu,
            value: IdValue::Num(7936),
            season: None,
            episode: Some(5),
        };
        let enriched = enrich_parsed_id(&parsed, &entry);
        assert_eq!(enriched.season, Some(2));
        // from_episode 13 + episode 5 - 1
        assert_eq!(enriched.episode, Some(17));
    }

    #[test]
    fn enrich_is_idempotent() {
        let entry = build_entry(&full_records()).unwrap();
        let parsed = ParsedId::parse("kitsu:7936:5", MediaType::Series).unwrap();
        let once = enrich_parsed_id(&parsed, &entry);
        let twice = enrich_parsed_id(&once, &entry);
        assert_eq!(once, twice);
    }

    #[test]
    fn enrich_does_not_rebase_imdb_requests() {
        let entry = build_entry(&full_records()).unwrap();
        let parsed = ParsedId {
            source: IdSource::Imdb,
            value: IdValue::Text("tt-map".into()),
            season: None,
            episode: Some(5),
        };
        let enriched = enrich_parsed_id(&parsed, &entry);
        assert_eq!(enriched.season, Some(2));
        assert_eq!(enriched.episode, Some(5));
    }

    #[test]
    fn season_synonym_probes() {
        let synonyms = vec!["Shingeki no Kyojin Season 3".to_string()];
        assert_eq!(season_from_synonyms(&synonyms), Some(3));
        assert!(synonyms_mention_season(&synonyms, 3));
        assert!(!synonyms_mention_season(&synonyms, 2));
    }
}
