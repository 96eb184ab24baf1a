//! Anime Identity Database.
//!
//! Keeps six cross-reference corpora fresh on disk and indexed in memory,
//! and answers two questions: "is this id an anime?" and "resolve
//! `(source, value, season?, episode?)` into a canonical [`AnimeEntry`]".
//!
//! Refreshes run per source on independent timers and publish complete
//! index snapshots by pointer swap; lookups never observe a half-built
//! structure. Everything is owned explicitly — tests build instances from
//! in-memory fixtures and never touch disk or HTTP.

pub mod corpus;
pub mod entry;
pub mod index;
pub mod refresh;
pub mod resolve;

pub use corpus::DetailLevel;
pub use entry::{AnimeEntry, enrich_parsed_id};
pub use refresh::{Corpus, SourceSpec};
pub use resolve::Snapshot;

use anyhow::{Context, Result};
use corpus::{
    AnimeListEntry, AnitraktEntry, KitsuImdbEntry, MappingEntry, offline::OfflineRecord,
};
use index::{AnimeListIndex, AnitraktIndex, DetailsIndex, KitsuIndex, MappingIndex};
use crate::models::{IdSource, IdValue, MediaType, ParsedId};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Database configuration, resolved from the application config.
#[derive(Debug, Clone)]
pub struct AnimeDbConfig {
    pub detail: DetailLevel,
    pub data_dir: PathBuf,
    pub sources: Vec<SourceSpec>,
}

impl AnimeDbConfig {
    #[must_use]
    pub fn new(detail: DetailLevel, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            detail,
            data_dir: data_dir.into(),
            sources: Corpus::ALL
                .iter()
                .map(|&corpus| SourceSpec::with_defaults(corpus))
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct AnimeDb {
    inner: Arc<DbInner>,
}

struct DbInner {
    detail: DetailLevel,
    data_dir: PathBuf,
    client: reqwest::Client,
    sources: Vec<SourceSpec>,
    state: DbState,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Published indices. Readers clone the Arc under a short read lock;
/// writers build a complete replacement and swap the pointer.
#[derive(Default)]
struct DbState {
    /// Serializes rebuild-and-publish so two finishing loads cannot
    /// interleave their derived-index rebuilds.
    publish: Mutex<()>,
    mapping_entries: RwLock<Arc<Vec<Arc<MappingEntry>>>>,
    mappings: RwLock<Arc<MappingIndex>>,
    details: RwLock<Arc<DetailsIndex>>,
    kitsu: RwLock<Arc<KitsuIndex>>,
    anitrakt_movies: RwLock<Arc<AnitraktIndex>>,
    anitrakt_shows: RwLock<Arc<AnitraktIndex>>,
    anime_list: RwLock<Arc<AnimeListIndex>>,
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().expect("index lock poisoned").clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().expect("index lock poisoned") = value;
}

impl AnimeDb {
    #[must_use]
    pub fn new(config: AnimeDbConfig) -> Self {
        Self {
            inner: Arc::new(DbInner {
                detail: config.detail,
                data_dir: config.data_dir,
                client: reqwest::Client::new(),
                sources: config.sources,
                state: DbState::default(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn builder() -> AnimeDbBuilder {
        AnimeDbBuilder::default()
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.inner.detail != DetailLevel::None
    }

    /// Downloads and loads every corpus, then starts the per-source refresh
    /// timers. Individual source failures are logged and left for the next
    /// cycle; only an unusable data directory is fatal.
    pub async fn init(&self) -> Result<()> {
        if !self.enabled() {
            info!("Anime database disabled, skipping initialization");
            return Ok(());
        }

        self.ensure_data_dir().await?;

        let initial = self.inner.sources.iter().map(|spec| {
            let db = self.clone();
            let spec = spec.clone();
            async move {
                if let Err(e) = db.refresh_source(&spec).await {
                    error!(
                        source = spec.corpus.name(),
                        error = format!("{e:#}"),
                        "Initial corpus refresh failed, serving stale or empty index"
                    );
                }
            }
        });
        futures::future::join_all(initial).await;

        let mut tasks = self.inner.tasks.lock().expect("task lock poisoned");
        for spec in &self.inner.sources {
            let db = self.clone();
            let spec = spec.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(spec.refresh_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick fires immediately; the initial refresh
                // already covered it.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = db.refresh_source(&spec).await {
                        error!(
                            source = spec.corpus.name(),
                            error = format!("{e:#}"),
                            "Scheduled corpus refresh failed"
                        );
                    }
                }
            }));
        }
        Ok(())
    }

    /// Stops the refresh timers. Lookups keep serving the last snapshots.
    pub fn shutdown(&self) {
        let mut tasks = self.inner.tasks.lock().expect("task lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn ensure_data_dir(&self) -> Result<()> {
        let dir = self.database_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating data directory {}", dir.display()))?;
        let probe = dir.join(".write-probe");
        tokio::fs::write(&probe, b"ok")
            .await
            .with_context(|| format!("data directory {} is not writable", dir.display()))?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(())
    }

    fn database_dir(&self) -> PathBuf {
        self.inner.data_dir.join("anime-database")
    }

    /// One full refresh pass for a source: ETag-gated fetch, load, publish.
    /// A loader failure on a cache hit invalidates the local copy so the
    /// retry (and the next cycle) refetches remotely.
    pub async fn refresh_source(&self, spec: &SourceSpec) -> Result<()> {
        let dir = self.database_dir();
        let start = std::time::Instant::now();
        info!(
            event = "corpus_refresh_started",
            source = spec.corpus.name(),
            "Refreshing corpus"
        );

        refresh::retry_with_backoff(spec.corpus.name(), |_attempt| {
            let db = self.clone();
            let spec = spec.clone();
            let dir = dir.clone();
            async move {
                let payload = refresh::fetch_corpus(&db.inner.client, &dir, &spec).await?;
                let refetched = payload.refetched;
                let load_result = {
                    let db = db.clone();
                    let corpus = spec.corpus;
                    tokio::task::spawn_blocking(move || db.apply_corpus(corpus, &payload.bytes))
                        .await
                        .context("corpus load task panicked")?
                };
                if let Err(e) = load_result {
                    if !refetched {
                        warn!(
                            source = spec.corpus.name(),
                            "Cached corpus failed to load, invalidating for refetch"
                        );
                        refresh::invalidate(&dir, &spec).await;
                    }
                    return Err(e);
                }
                Ok(())
            }
        })
        .await?;

        info!(
            event = "corpus_refresh_finished",
            source = spec.corpus.name(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Corpus refreshed"
        );
        Ok(())
    }

    /// Parses, indexes and publishes one corpus. CPU-heavy; runs on a
    /// blocking thread.
    fn apply_corpus(&self, corpus: Corpus, bytes: &[u8]) -> Result<()> {
        let state = &self.inner.state;
        match corpus {
            Corpus::Mappings => {
                let entries = Arc::new(corpus::mapping::load(bytes)?);
                let _guard = state.publish.lock().expect("publish lock poisoned");
                let kitsu = read(&state.kitsu);
                let index = Arc::new(MappingIndex::build(&entries, &kitsu));
                write(&state.mapping_entries, entries);
                write(&state.mappings, index);
            }
            Corpus::Offline => {
                let json = zstd::decode_all(bytes).context("decompressing offline corpus")?;
                let records = corpus::offline::load(&json, self.inner.detail)?;
                let index = Arc::new(DetailsIndex::build(&records));
                let _guard = state.publish.lock().expect("publish lock poisoned");
                write(&state.details, index);
            }
            Corpus::KitsuImdb => {
                let entries = corpus::kitsu_imdb::load(bytes)?;
                let kitsu = Arc::new(KitsuIndex::build(&entries));
                let _guard = state.publish.lock().expect("publish lock poisoned");
                let mapping_entries = read(&state.mapping_entries);
                let mappings = Arc::new(MappingIndex::build(&mapping_entries, &kitsu));
                write(&state.kitsu, kitsu);
                write(&state.mappings, mappings);
            }
            Corpus::AnitraktMovies => {
                let entries = corpus::anitrakt::load(bytes, "movies")?;
                let index = Arc::new(AnitraktIndex::build(&entries));
                let _guard = state.publish.lock().expect("publish lock poisoned");
                write(&state.anitrakt_movies, index);
            }
            Corpus::AnitraktShows => {
                let entries = corpus::anitrakt::load(bytes, "shows")?;
                let index = Arc::new(AnitraktIndex::build(&entries));
                let _guard = state.publish.lock().expect("publish lock poisoned");
                write(&state.anitrakt_shows, index);
            }
            Corpus::AnimeList => {
                let entries = corpus::anime_list::load(bytes, self.inner.detail)?;
                let index = Arc::new(AnimeListIndex::build(&entries));
                let _guard = state.publish.lock().expect("publish lock poisoned");
                write(&state.anime_list, index);
            }
        }
        Ok(())
    }

    /// A complete, immutable view of the current indices.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let state = &self.inner.state;
        Snapshot {
            mappings: read(&state.mappings),
            details: read(&state.details),
            kitsu: read(&state.kitsu),
            anitrakt_movies: read(&state.anitrakt_movies),
            anitrakt_shows: read(&state.anitrakt_shows),
            anime_list: read(&state.anime_list),
        }
    }

    #[must_use]
    pub fn get_entry_by_id(
        &self,
        source: IdSource,
        value: &IdValue,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Option<AnimeEntry> {
        if !self.enabled() {
            return None;
        }
        resolve::resolve(&self.snapshot(), source, value, season, episode)
    }

    /// True iff the id parses and resolves to a database entry.
    #[must_use]
    pub fn is_anime(&self, raw_id: &str) -> bool {
        let Some(parsed) = ParsedId::parse(raw_id, MediaType::Unknown) else {
            return false;
        };
        self.get_entry_by_id(parsed.source, &parsed.value, parsed.season, parsed.episode)
            .is_some()
    }
}

/// Fixture-driven construction for tests: pre-loaded corpora, no disk, no
/// HTTP, no refresh timers.
#[derive(Default)]
pub struct AnimeDbBuilder {
    detail: Option<DetailLevel>,
    mappings: Vec<Arc<MappingEntry>>,
    offline: Vec<OfflineRecord>,
    kitsu: Vec<Arc<KitsuImdbEntry>>,
    anitrakt_movies: Vec<Arc<AnitraktEntry>>,
    anitrakt_shows: Vec<Arc<AnitraktEntry>>,
    anime_list: Vec<Arc<AnimeListEntry>>,
}

impl AnimeDbBuilder {
    #[must_use]
    pub fn detail(mut self, detail: DetailLevel) -> Self {
        self.detail = Some(detail);
        self
    }

    #[must_use]
    pub fn mappings(mut self, entries: impl IntoIterator<Item = MappingEntry>) -> Self {
        self.mappings.extend(entries.into_iter().map(Arc::new));
        self
    }

    #[must_use]
    pub fn offline_records(mut self, records: impl IntoIterator<Item = OfflineRecord>) -> Self {
        self.offline.extend(records);
        self
    }

    #[must_use]
    pub fn kitsu(mut self, entries: impl IntoIterator<Item = KitsuImdbEntry>) -> Self {
        self.kitsu.extend(entries.into_iter().map(Arc::new));
        self
    }

    #[must_use]
    pub fn anitrakt_movies(mut self, entries: impl IntoIterator<Item = AnitraktEntry>) -> Self {
        self.anitrakt_movies.extend(entries.into_iter().map(Arc::new));
        self
    }

    #[must_use]
    pub fn anitrakt_shows(mut self, entries: impl IntoIterator<Item = AnitraktEntry>) -> Self {
        self.anitrakt_shows.extend(entries.into_iter().map(Arc::new));
        self
    }

    #[must_use]
    pub fn anime_list(mut self, entries: impl IntoIterator<Item = AnimeListEntry>) -> Self {
        self.anime_list.extend(entries.into_iter().map(Arc::new));
        self
    }

    #[must_use]
    pub fn build(self) -> AnimeDb {
        let db = AnimeDb::new(AnimeDbConfig {
            detail: self.detail.unwrap_or(DetailLevel::Full),
            data_dir: PathBuf::new(),
            sources: Vec::new(),
        });

        let kitsu = Arc::new(KitsuIndex::build(&self.kitsu));
        let state = &db.inner.state;
        write(
            &state.mappings,
            Arc::new(MappingIndex::build(&self.mappings, &kitsu)),
        );
        write(&state.mapping_entries, Arc::new(self.mappings));
        write(&state.details, Arc::new(DetailsIndex::build(&self.offline)));
        write(&state.kitsu, kitsu);
        write(
            &state.anitrakt_movies,
            Arc::new(AnitraktIndex::build(&self.anitrakt_movies)),
        );
        write(
            &state.anitrakt_shows,
            Arc::new(AnitraktIndex::build(&self.anitrakt_shows)),
        );
        write(
            &state.anime_list,
            Arc::new(AnimeListIndex::build(&self.anime_list)),
        );
        db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus::AnimeKind;

    fn fixture_db() -> AnimeDb {
        AnimeDb::builder()
            .mappings([MappingEntry {
                imdb_id: Some("tt2560140".into()),
                kitsu_id: Some("7936".into()),
                mal_id: Some("16498".into()),
                anilist_id: Some("16498".into()),
                kind: AnimeKind::Tv,
                ..MappingEntry::default()
            }])
            .kitsu([KitsuImdbEntry {
                kitsu_id: "7936".into(),
                imdb_id: Some("tt2560140".into()),
                from_season: Some(1),
                from_episode: Some(1),
                ..KitsuImdbEntry::default()
            }])
            .build()
    }

    #[test]
    fn is_anime_resolves_known_ids() {
        let db = fixture_db();
        assert!(db.is_anime("kitsu:7936"));
        assert!(db.is_anime("tt2560140:1:5"));
        assert!(!db.is_anime("tt0111161"));
        assert!(!db.is_anime("garbage"));
    }

    #[test]
    fn lookup_layers_an_entry() {
        let db = fixture_db();
        let entry = db
            .get_entry_by_id(IdSource::Kitsu, &IdValue::Num(7936), None, Some(5))
            .unwrap();
        assert_eq!(entry.ids.imdb.as_deref(), Some("tt2560140"));
        assert_eq!(entry.anilist_id(), Some(16498));
    }

    #[test]
    fn disabled_database_resolves_nothing() {
        let db = AnimeDb::new(AnimeDbConfig::new(DetailLevel::None, "/tmp"));
        assert!(!db.enabled());
        assert!(!db.is_anime("kitsu:7936"));
    }
}
