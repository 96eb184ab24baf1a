//! In-memory corpus indices.
//!
//! Every index is built from scratch on load and published by pointer swap;
//! nothing here mutates a published map. The cross-reference index is a
//! derived artifact: it folds the Kitsu corpus in (IMDb enrichment) as part
//! of the same build step, so it is rebuilt whenever either corpus loads.

use super::corpus::{
    AnimeDetails, AnimeListEntry, AnitraktEntry, KitsuImdbEntry, MappingEntry,
    offline::OfflineRecord,
};
use crate::models::IdSource;
use std::collections::HashMap;
use std::sync::Arc;

/// Cross-reference index: per source, id value → every mapping entry the
/// corpus has under that id. Bucket ambiguity is the corpus's own and is
/// preserved, never collapsed.
#[derive(Debug, Default)]
pub struct MappingIndex {
    by_source: HashMap<IdSource, HashMap<String, Vec<Arc<MappingEntry>>>>,
}

impl MappingIndex {
    /// Builds the published index from the raw corpus entries, enriching
    /// with the Kitsu corpus: an entry whose kitsu id carries an IMDb id in
    /// the Kitsu corpus gains that IMDb id and is indexed under it. The
    /// IMDb buckets dedupe by kitsu id.
    #[must_use]
    pub fn build(entries: &[Arc<MappingEntry>], kitsu: &KitsuIndex) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let entry = enrich_with_kitsu(entry, kitsu);
            for (source, id) in entry.external_ids() {
                let id = id.to_string();
                let bucket = index
                    .by_source
                    .entry(source)
                    .or_default()
                    .entry(id)
                    .or_default();
                if source == IdSource::Imdb
                    && entry.kitsu_id.is_some()
                    && bucket.iter().any(|existing| existing.kitsu_id == entry.kitsu_id)
                {
                    continue;
                }
                bucket.push(Arc::clone(&entry));
            }
        }
        index
    }

    #[must_use]
    pub fn get(&self, source: IdSource, key: &str) -> &[Arc<MappingEntry>] {
        self.by_source
            .get(&source)
            .and_then(|by_id| by_id.get(key))
            .map_or(&[], Vec::as_slice)
    }
}

fn enrich_with_kitsu(entry: &Arc<MappingEntry>, kitsu: &KitsuIndex) -> Arc<MappingEntry> {
    if entry.imdb_id.is_some() {
        return Arc::clone(entry);
    }
    let Some(imdb_id) = entry
        .kitsu_id
        .as_deref()
        .and_then(|id| kitsu.by_kitsu(id))
        .and_then(|k| k.imdb_id.clone())
    else {
        return Arc::clone(entry);
    };
    let mut enriched = (**entry).clone();
    enriched.imdb_id = Some(imdb_id);
    Arc::new(enriched)
}

/// Offline catalog details, per source id.
#[derive(Debug, Default)]
pub struct DetailsIndex {
    by_source: HashMap<IdSource, HashMap<String, Arc<AnimeDetails>>>,
}

impl DetailsIndex {
    #[must_use]
    pub fn build(records: &[OfflineRecord]) -> Self {
        let mut index = Self::default();
        for record in records {
            for (source, id) in &record.ids {
                index
                    .by_source
                    .entry(*source)
                    .or_default()
                    .entry(id.clone())
                    .or_insert_with(|| Arc::clone(&record.details));
            }
        }
        index
    }

    #[must_use]
    pub fn get(&self, source: IdSource, key: &str) -> Option<&Arc<AnimeDetails>> {
        self.by_source.get(&source)?.get(key)
    }

    /// Scans a mapping entry's ids in canonical source order and returns
    /// the first details hit.
    #[must_use]
    pub fn for_mapping(&self, mapping: &MappingEntry) -> Option<&Arc<AnimeDetails>> {
        mapping
            .external_ids()
            .find_map(|(source, id)| self.get(source, id))
    }
}

#[derive(Debug, Default)]
pub struct KitsuIndex {
    by_kitsu: HashMap<String, Arc<KitsuImdbEntry>>,
    by_imdb: HashMap<String, Vec<Arc<KitsuImdbEntry>>>,
}

impl KitsuIndex {
    #[must_use]
    pub fn build(entries: &[Arc<KitsuImdbEntry>]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index
                .by_kitsu
                .entry(entry.kitsu_id.clone())
                .or_insert_with(|| Arc::clone(entry));
            if let Some(imdb_id) = &entry.imdb_id {
                index
                    .by_imdb
                    .entry(imdb_id.clone())
                    .or_default()
                    .push(Arc::clone(entry));
            }
        }
        index
    }

    #[must_use]
    pub fn by_kitsu(&self, kitsu_id: &str) -> Option<&Arc<KitsuImdbEntry>> {
        self.by_kitsu.get(kitsu_id)
    }

    #[must_use]
    pub fn by_imdb(&self, imdb_id: &str) -> &[Arc<KitsuImdbEntry>] {
        self.by_imdb.get(imdb_id).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Default)]
pub struct AnitraktIndex {
    by_mal: HashMap<String, Arc<AnitraktEntry>>,
}

impl AnitraktIndex {
    #[must_use]
    pub fn build(entries: &[Arc<AnitraktEntry>]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index
                .by_mal
                .entry(entry.mal_id.clone())
                .or_insert_with(|| Arc::clone(entry));
        }
        index
    }

    #[must_use]
    pub fn by_mal(&self, mal_id: &str) -> Option<&Arc<AnitraktEntry>> {
        self.by_mal.get(mal_id)
    }
}

#[derive(Debug, Default)]
pub struct AnimeListIndex {
    by_anidb: HashMap<String, Arc<AnimeListEntry>>,
    by_tvdb: HashMap<String, Vec<Arc<AnimeListEntry>>>,
}

impl AnimeListIndex {
    #[must_use]
    pub fn build(entries: &[Arc<AnimeListEntry>]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index
                .by_anidb
                .entry(entry.anidb_id.clone())
                .or_insert_with(|| Arc::clone(entry));
            if let Some(tvdb_id) = &entry.tvdb_id {
                index
                    .by_tvdb
                    .entry(tvdb_id.clone())
                    .or_default()
                    .push(Arc::clone(entry));
            }
        }
        index
    }

    #[must_use]
    pub fn by_anidb(&self, anidb_id: &str) -> Option<&Arc<AnimeListEntry>> {
        self.by_anidb.get(anidb_id)
    }

    #[must_use]
    pub fn by_tvdb(&self, tvdb_id: &str) -> &[Arc<AnimeListEntry>] {
        self.by_tvdb.get(tvdb_id).map_or(&[], Vec::as_slice)
    }
}
