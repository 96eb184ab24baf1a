//! Lookup resolution: `(source, value, season?, episode?)` → the corpus
//! records that describe it, ready for layering into an [`AnimeEntry`].

use super::corpus::{AnimeKind, AnimeListEntry, KitsuImdbEntry, MappingEntry};
use super::entry::{self, AnimeEntry, ResolvedRecords};
use super::index::{AnimeListIndex, AnitraktIndex, DetailsIndex, KitsuIndex, MappingIndex};
use crate::models::{IdSource, IdValue};
use std::sync::Arc;

/// One complete, immutable view of every corpus index. Lookups run against
/// a snapshot; refreshes publish new ones.
#[derive(Clone, Default)]
pub struct Snapshot {
    pub mappings: Arc<MappingIndex>,
    pub details: Arc<DetailsIndex>,
    pub kitsu: Arc<KitsuIndex>,
    pub anitrakt_movies: Arc<AnitraktIndex>,
    pub anitrakt_shows: Arc<AnitraktIndex>,
    pub anime_list: Arc<AnimeListIndex>,
}

pub fn resolve(
    snapshot: &Snapshot,
    source: IdSource,
    value: &IdValue,
    season: Option<u32>,
    episode: Option<u32>,
) -> Option<AnimeEntry> {
    let key = value.as_key();
    let mut bucket: Vec<Arc<MappingEntry>> = snapshot.mappings.get(source, &key).to_vec();

    // Kitsu ids are season-scoped: the sibling seasons of the same series
    // only meet in the enriched IMDb index, so a kitsu lookup widens its
    // bucket through the entry's IMDb id.
    if source == IdSource::Kitsu
        && let Some(imdb_id) = snapshot
            .kitsu
            .by_kitsu(&key)
            .and_then(|k| k.imdb_id.as_deref())
    {
        for entry in snapshot.mappings.get(IdSource::Imdb, imdb_id) {
            if !bucket.iter().any(|existing| Arc::ptr_eq(existing, entry)) {
                bucket.push(Arc::clone(entry));
            }
        }
    }

    let filtered = filter_by_kind(&bucket, season);

    let selection = select_mapping(snapshot, &filtered, source, &key, season, episode);
    let mapping = selection.mapping;

    let details = mapping
        .as_ref()
        .and_then(|m| snapshot.details.for_mapping(m))
        .cloned()
        .or_else(|| snapshot.details.get(source, &key).cloned());

    let kitsu = selection
        .kitsu
        .or_else(|| {
            mapping
                .as_ref()
                .and_then(|m| m.kitsu_id.as_deref())
                .and_then(|id| snapshot.kitsu.by_kitsu(id))
                .cloned()
        })
        .or_else(|| {
            (source == IdSource::Kitsu)
                .then(|| snapshot.kitsu.by_kitsu(&key).cloned())
                .flatten()
        });

    let anitrakt = {
        let mal_id = mapping
            .as_ref()
            .and_then(|m| m.mal_id.clone())
            .or_else(|| (source == IdSource::Mal).then(|| key.clone()));
        mal_id.and_then(|mal| {
            let movie_first = mapping.as_ref().is_some_and(|m| m.kind == AnimeKind::Movie)
                || (mapping.is_none() && season.is_none());
            let (first, second) = if movie_first {
                (&snapshot.anitrakt_movies, &snapshot.anitrakt_shows)
            } else {
                (&snapshot.anitrakt_shows, &snapshot.anitrakt_movies)
            };
            first.by_mal(&mal).or_else(|| second.by_mal(&mal)).cloned()
        })
    };

    let anime_list = selection
        .anime_list
        .or_else(|| {
            mapping
                .as_ref()
                .and_then(|m| m.anidb_id.as_deref())
                .and_then(|id| snapshot.anime_list.by_anidb(id))
                .cloned()
        })
        .or_else(|| {
            (source == IdSource::Anidb)
                .then(|| snapshot.anime_list.by_anidb(&key).cloned())
                .flatten()
        })
        .or_else(|| {
            (source == IdSource::Tvdb)
                .then(|| snapshot.anime_list.by_tvdb(&key).first().cloned())
                .flatten()
        });

    entry::build_entry(&ResolvedRecords {
        mapping,
        details,
        kitsu,
        anitrakt,
        anime_list,
    })
}

/// Season-type filter: no season prefers movies, season 0 prefers
/// specials, anything else prefers TV. Unknown-typed entries always
/// survive; an empty result falls back to the unfiltered bucket.
fn filter_by_kind(bucket: &[Arc<MappingEntry>], season: Option<u32>) -> Vec<Arc<MappingEntry>> {
    let keep = |kind: AnimeKind| -> bool {
        if kind == AnimeKind::Unknown {
            return true;
        }
        match season {
            None => kind == AnimeKind::Movie,
            Some(0) => matches!(kind, AnimeKind::Special | AnimeKind::Ova | AnimeKind::Ona),
            Some(_) => kind == AnimeKind::Tv,
        }
    };

    let filtered: Vec<_> = bucket
        .iter()
        .filter(|entry| keep(entry.kind))
        .cloned()
        .collect();
    if filtered.is_empty() {
        bucket.to_vec()
    } else {
        filtered
    }
}

#[derive(Default)]
struct Selection {
    mapping: Option<Arc<MappingEntry>>,
    kitsu: Option<Arc<KitsuImdbEntry>>,
    anime_list: Option<Arc<AnimeListEntry>>,
}

struct Candidate {
    from_episode: u32,
    mapping: Option<Arc<MappingEntry>>,
    kitsu: Option<Arc<KitsuImdbEntry>>,
    anime_list: Option<Arc<AnimeListEntry>>,
}

fn select_mapping(
    snapshot: &Snapshot,
    filtered: &[Arc<MappingEntry>],
    source: IdSource,
    key: &str,
    season: Option<u32>,
    episode: Option<u32>,
) -> Selection {
    match filtered.len() {
        0 => Selection::default(),
        1 => Selection {
            mapping: Some(Arc::clone(&filtered[0])),
            ..Selection::default()
        },
        _ => {
            if let (Some(season), Some(episode)) = (season, episode) {
                if let Some(best) =
                    best_candidate(snapshot, filtered, source, key, season, episode)
                {
                    return Selection {
                        mapping: best
                            .mapping
                            .or_else(|| Some(Arc::clone(&filtered[0]))),
                        kitsu: best.kitsu,
                        anime_list: best.anime_list,
                    };
                }

                // No episode-window candidate; fall back to synonym probing
                // against each mapping's details, in bucket order.
                for mapping in filtered {
                    let mentions = snapshot
                        .details
                        .for_mapping(mapping)
                        .is_some_and(|d| entry::synonyms_mention_season(&d.synonyms, season));
                    if mentions {
                        return Selection {
                            mapping: Some(Arc::clone(mapping)),
                            ..Selection::default()
                        };
                    }
                }
            }
            Selection {
                mapping: Some(Arc::clone(&filtered[0])),
                ..Selection::default()
            }
        }
    }
}

/// Builds the candidate set for an ambiguous bucket and picks the winner:
/// the candidate with the highest `from_episode` still at or below the
/// requested episode (the most specific split-cour window).
fn best_candidate(
    snapshot: &Snapshot,
    filtered: &[Arc<MappingEntry>],
    source: IdSource,
    key: &str,
    season: u32,
    episode: u32,
) -> Option<Candidate> {
    fn consider(best: &mut Option<Candidate>, candidate: Candidate) {
        let better = best
            .as_ref()
            .is_none_or(|current| candidate.from_episode > current.from_episode);
        if better {
            *best = Some(candidate);
        }
    }

    let mut best: Option<Candidate> = None;

    // (a) Kitsu entries covering the requested window.
    for mapping in filtered {
        let Some(kitsu) = mapping
            .kitsu_id
            .as_deref()
            .and_then(|id| snapshot.kitsu.by_kitsu(id))
        else {
            continue;
        };
        if kitsu.from_season == Some(season) && episode >= kitsu.from_episode_or_first() {
            consider(
                &mut best,
                Candidate {
                    from_episode: kitsu.from_episode_or_first(),
                    mapping: Some(Arc::clone(mapping)),
                    kitsu: Some(Arc::clone(kitsu)),
                    anime_list: None,
                },
            );
        }
    }

    // (b) Anime-list entries reachable through a TVDB id.
    for (tvdb_id, origin) in tvdb_id_candidates(snapshot, filtered, source, key) {
        for list_entry in snapshot.anime_list.by_tvdb(&tvdb_id) {
            let season_matches = list_entry
                .default_tvdb_season
                .is_some_and(|d| d.matches(season));
            if season_matches && episode >= list_entry.from_episode() {
                let mapping = origin
                    .clone()
                    .or_else(|| mapping_for_anidb(filtered, &list_entry.anidb_id));
                consider(
                    &mut best,
                    Candidate {
                        from_episode: list_entry.from_episode(),
                        mapping,
                        kitsu: None,
                        anime_list: Some(Arc::clone(list_entry)),
                    },
                );
            }
        }
    }

    // TMDB fallback: only when the TVDB paths produced nothing.
    if best.is_none() {
        for mapping in filtered {
            let Some(list_entry) = mapping
                .anidb_id
                .as_deref()
                .and_then(|id| snapshot.anime_list.by_anidb(id))
            else {
                continue;
            };
            let from_episode = list_entry.tmdb_offset.map_or(1, |offset| offset + 1);
            if list_entry.tmdb_season == Some(i64::from(season)) && episode >= from_episode {
                consider(
                    &mut best,
                    Candidate {
                        from_episode,
                        mapping: Some(Arc::clone(mapping)),
                        kitsu: None,
                        anime_list: Some(Arc::clone(list_entry)),
                    },
                );
            }
        }
    }

    best
}

/// TVDB ids the query can be converted to: the query id itself, each
/// mapping's TVDB id, and (for IMDb queries) the IMDb→TVDB pairs the Kitsu
/// corpus carries.
fn tvdb_id_candidates(
    snapshot: &Snapshot,
    filtered: &[Arc<MappingEntry>],
    source: IdSource,
    key: &str,
) -> Vec<(String, Option<Arc<MappingEntry>>)> {
    let mut out: Vec<(String, Option<Arc<MappingEntry>>)> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    if source == IdSource::Tvdb && seen.insert(key.to_string()) {
        out.push((key.to_string(), None));
    }
    for mapping in filtered {
        if let Some(tvdb_id) = mapping.thetvdb_id.as_deref()
            && seen.insert(tvdb_id.to_string())
        {
            out.push((tvdb_id.to_string(), Some(Arc::clone(mapping))));
        }
    }
    if source == IdSource::Imdb {
        for kitsu in snapshot.kitsu.by_imdb(key) {
            if let Some(tvdb_id) = kitsu.tvdb_id.as_deref()
                && seen.insert(tvdb_id.to_string())
            {
                out.push((tvdb_id.to_string(), None));
            }
        }
    }
    out
}

fn mapping_for_anidb(
    filtered: &[Arc<MappingEntry>],
    anidb_id: &str,
) -> Option<Arc<MappingEntry>> {
    filtered
        .iter()
        .find(|m| m.anidb_id.as_deref() == Some(anidb_id))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aidb::corpus::{DefaultTvdbSeason, KitsuImdbEntry};
    use crate::aidb::index::{KitsuIndex, MappingIndex};

    fn mapping(kind: AnimeKind, kitsu: Option<&str>) -> Arc<MappingEntry> {
        Arc::new(MappingEntry {
            kitsu_id: kitsu.map(String::from),
            kind,
            ..MappingEntry::default()
        })
    }

    #[test]
    fn season_type_filter_prefers_movies_without_a_season() {
        let bucket = vec![
            mapping(AnimeKind::Tv, None),
            mapping(AnimeKind::Movie, None),
        ];
        let filtered = filter_by_kind(&bucket, None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].kind, AnimeKind::Movie);
    }

    #[test]
    fn season_zero_prefers_specials() {
        let bucket = vec![
            mapping(AnimeKind::Tv, None),
            mapping(AnimeKind::Ova, None),
            mapping(AnimeKind::Special, None),
        ];
        let filtered = filter_by_kind(&bucket, Some(0));
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|m| m.kind != AnimeKind::Tv));
    }

    #[test]
    fn unknown_entries_always_survive_the_filter() {
        let bucket = vec![
            mapping(AnimeKind::Unknown, None),
            mapping(AnimeKind::Movie, None),
        ];
        let filtered = filter_by_kind(&bucket, Some(3));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].kind, AnimeKind::Unknown);
    }

    #[test]
    fn emptied_filter_falls_back_to_the_whole_bucket() {
        let bucket = vec![mapping(AnimeKind::Movie, None)];
        let filtered = filter_by_kind(&bucket, Some(2));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn ambiguous_bucket_resolves_by_kitsu_episode_window() {
        // Two mappings under the same kitsu id; the second covers season 2.
        let first = mapping(AnimeKind::Tv, Some("7936"));
        let second = mapping(AnimeKind::Tv, Some("11111"));
        let entries = vec![Arc::clone(&first), Arc::clone(&second)];

        let kitsu = KitsuIndex::build(&[
            Arc::new(KitsuImdbEntry {
                kitsu_id: "7936".into(),
                from_season: Some(1),
                ..KitsuImdbEntry::default()
            }),
            Arc::new(KitsuImdbEntry {
                kitsu_id: "11111".into(),
                from_season: Some(2),
                from_episode: Some(1),
                ..KitsuImdbEntry::default()
            }),
        ]);

        let snapshot = Snapshot {
            kitsu: Arc::new(kitsu),
            ..Snapshot::default()
        };

        let selection = select_mapping(
            &snapshot,
            &entries,
            IdSource::Kitsu,
            "7936",
            Some(2),
            Some(5),
        );
        assert!(Arc::ptr_eq(selection.mapping.as_ref().unwrap(), &second));
        assert_eq!(selection.kitsu.as_ref().unwrap().kitsu_id, "11111");
    }

    #[test]
    fn highest_from_episode_wins_among_candidates() {
        let cour1 = mapping(AnimeKind::Tv, Some("100"));
        let cour2 = mapping(AnimeKind::Tv, Some("200"));
        let entries = vec![Arc::clone(&cour1), Arc::clone(&cour2)];

        let kitsu = KitsuIndex::build(&[
            Arc::new(KitsuImdbEntry {
                kitsu_id: "100".into(),
                from_season: Some(2),
                from_episode: Some(1),
                ..KitsuImdbEntry::default()
            }),
            Arc::new(KitsuImdbEntry {
                kitsu_id: "200".into(),
                from_season: Some(2),
                from_episode: Some(13),
                ..KitsuImdbEntry::default()
            }),
        ]);

        let snapshot = Snapshot {
            kitsu: Arc::new(kitsu),
            ..Snapshot::default()
        };

        // Episode 14 falls in the second cour's window; both candidates
        // qualify but the higher from_episode is more specific.
        let selection =
            select_mapping(&snapshot, &entries, IdSource::Kitsu, "100", Some(2), Some(14));
        assert!(Arc::ptr_eq(selection.mapping.as_ref().unwrap(), &cour2));

        // Episode 5 only qualifies for the first cour.
        let selection =
            select_mapping(&snapshot, &entries, IdSource::Kitsu, "100", Some(2), Some(5));
        assert!(Arc::ptr_eq(selection.mapping.as_ref().unwrap(), &cour1));
    }

    #[test]
    fn absolute_default_season_matches_any_requested_season() {
        let m1 = Arc::new(MappingEntry {
            thetvdb_id: Some("81797".into()),
            kind: AnimeKind::Tv,
            ..MappingEntry::default()
        });
        let m2 = Arc::new(MappingEntry {
            thetvdb_id: Some("81797".into()),
            anidb_id: Some("69".into()),
            kind: AnimeKind::Tv,
            ..MappingEntry::default()
        });

        let list = super::super::index::AnimeListIndex::build(&[Arc::new(AnimeListEntry {
            anidb_id: "69".into(),
            tvdb_id: Some("81797".into()),
            default_tvdb_season: Some(DefaultTvdbSeason::Absolute),
            episode_offset: Some(0),
            tmdb_id: None,
            tmdb_tv: None,
            tmdb_season: None,
            tmdb_offset: None,
            imdb_id: None,
            mappings: None,
        })]);

        let snapshot = Snapshot {
            anime_list: Arc::new(list),
            ..Snapshot::default()
        };

        let selection = select_mapping(
            &snapshot,
            &[Arc::clone(&m1), Arc::clone(&m2)],
            IdSource::Tvdb,
            "81797",
            Some(7),
            Some(150),
        );
        // The anime-list entry matched via absolute numbering and pulled in
        // the mapping that shares its anidb id.
        assert!(Arc::ptr_eq(selection.mapping.as_ref().unwrap(), &m2));
        assert!(selection.anime_list.is_some());
    }

    #[test]
    fn unresolvable_ids_build_nothing() {
        let snapshot = Snapshot::default();
        assert!(resolve(
            &snapshot,
            IdSource::Imdb,
            &IdValue::Text("tt0000000".into()),
            None,
            None
        )
        .is_none());
    }

    #[test]
    fn direct_kitsu_hit_resolves_without_a_mapping() {
        let kitsu = KitsuIndex::build(&[Arc::new(KitsuImdbEntry {
            kitsu_id: "7936".into(),
            imdb_id: Some("tt2560140".into()),
            from_season: Some(1),
            ..KitsuImdbEntry::default()
        })]);
        let snapshot = Snapshot {
            kitsu: Arc::new(kitsu),
            ..Snapshot::default()
        };
        let entry = resolve(
            &snapshot,
            IdSource::Kitsu,
            &IdValue::Num(7936),
            None,
            Some(3),
        )
        .unwrap();
        assert_eq!(entry.ids.imdb.as_deref(), Some("tt2560140"));
    }

    #[test]
    fn mapping_index_lookup_flows_through_resolution() {
        let entries = vec![Arc::new(MappingEntry {
            imdb_id: Some("tt0409591".into()),
            mal_id: Some("1735".into()),
            kind: AnimeKind::Tv,
            ..MappingEntry::default()
        })];
        let snapshot = Snapshot {
            mappings: Arc::new(MappingIndex::build(&entries, &KitsuIndex::default())),
            ..Snapshot::default()
        };
        let entry = resolve(
            &snapshot,
            IdSource::Imdb,
            &IdValue::Text("tt0409591".into()),
            Some(1),
            Some(1),
        )
        .unwrap();
        assert_eq!(entry.ids.mal.as_deref(), Some("1735"));
        assert_eq!(entry.kind, AnimeKind::Tv);
    }
}
