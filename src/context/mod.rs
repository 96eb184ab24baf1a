//! Per-request stream context.
//!
//! Construction is synchronous: parse the id, consult the anime database,
//! enrich the parsed id. Everything remote lives in lazy one-shot slots —
//! the first caller seeds a slot, concurrent callers await the same
//! in-flight fetch, and failures collapse to `None` with a warning rather
//! than failing the request.

mod language;

use crate::aidb::{AnimeDb, AnimeEntry, enrich_parsed_id};
use crate::clients::{
    Metadata, MetadataProvider, MetadataQuery, ReleaseDate, SeaDexInfo, SeaDexProvider,
};
use crate::expr::Value;
use crate::models::{IdSource, MediaType, ParsedId, UserData};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

/// Context fields an expression may reference; used to decide whether the
/// metadata fetch is needed at all.
const METADATA_FIELDS: &[&str] = &[
    "title",
    "titles",
    "year",
    "yearend",
    "genres",
    "runtime",
    "originallanguage",
    "dayssincerelease",
    "absoluteepisode",
];

pub struct StreamContext {
    media_type: MediaType,
    raw_id: String,
    parsed_id: Option<ParsedId>,
    is_anime: bool,
    anime_entry: Option<Arc<AnimeEntry>>,
    user: Arc<UserData>,
    metadata_provider: Arc<dyn MetadataProvider>,
    seadex_provider: Arc<dyn SeaDexProvider>,
    today: NaiveDate,

    metadata: OnceCell<Option<Metadata>>,
    release_dates: OnceCell<Option<Vec<ReleaseDate>>>,
    episode_air_date: OnceCell<Option<NaiveDate>>,
    seadex: OnceCell<Option<SeaDexInfo>>,
}

impl StreamContext {
    /// Builds the context. Synchronous by design: the only lookups here are
    /// against the in-memory anime database.
    #[must_use]
    pub fn new(
        media_type: MediaType,
        raw_id: &str,
        user: Arc<UserData>,
        db: &AnimeDb,
        metadata_provider: Arc<dyn MetadataProvider>,
        seadex_provider: Arc<dyn SeaDexProvider>,
    ) -> Self {
        let mut parsed_id = ParsedId::parse(raw_id, media_type);
        let anime_entry = parsed_id.as_ref().and_then(|id| {
            db.get_entry_by_id(id.source, &id.value, id.season, id.episode)
                .map(Arc::new)
        });
        if let (Some(parsed), Some(entry)) = (&parsed_id, &anime_entry) {
            parsed_id = Some(enrich_parsed_id(parsed, entry));
        }

        Self {
            media_type,
            raw_id: raw_id.to_string(),
            is_anime: anime_entry.is_some(),
            parsed_id,
            anime_entry,
            user,
            metadata_provider,
            seadex_provider,
            today: chrono::Utc::now().date_naive(),
            metadata: OnceCell::new(),
            release_dates: OnceCell::new(),
            episode_air_date: OnceCell::new(),
            seadex: OnceCell::new(),
        }
    }

    /// Pins "today" for deterministic date math in tests.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[must_use]
    pub fn raw_id(&self) -> &str {
        &self.raw_id
    }

    #[must_use]
    pub const fn is_anime(&self) -> bool {
        self.is_anime
    }

    #[must_use]
    pub const fn parsed_id(&self) -> Option<&ParsedId> {
        self.parsed_id.as_ref()
    }

    #[must_use]
    pub fn anime_entry(&self) -> Option<&AnimeEntry> {
        self.anime_entry.as_deref()
    }

    #[must_use]
    pub fn season(&self) -> Option<u32> {
        self.parsed_id.as_ref().and_then(|id| id.season)
    }

    #[must_use]
    pub fn episode(&self) -> Option<u32> {
        self.parsed_id.as_ref().and_then(|id| id.episode)
    }

    #[must_use]
    pub fn user(&self) -> &UserData {
        &self.user
    }

    /// `anime.movie` / `anime.series` / plain media type.
    #[must_use]
    pub fn query_type(&self) -> String {
        if self.is_anime {
            format!("anime.{}", self.media_type.as_str())
        } else {
            self.media_type.as_str().to_string()
        }
    }

    // ------------------------------------------------------------------
    // Fetch gates
    // ------------------------------------------------------------------

    fn needs_metadata(&self) -> bool {
        let user = &self.user;
        user.title_matching.enabled
            || user.year_matching.enabled
            || user.season_episode_matching.enabled
            || user.digital_release_filter.enabled
            || user.all_expressions().any(|expression| {
                let lowered = expression.to_ascii_lowercase();
                METADATA_FIELDS.iter().any(|field| lowered.contains(field))
            })
    }

    fn seadex_eligible(&self) -> bool {
        self.is_anime
            && self.user.seadex_enabled()
            && self.anilist_id().is_some()
    }

    #[must_use]
    pub fn anilist_id(&self) -> Option<u64> {
        self.anime_entry.as_ref().and_then(|e| e.anilist_id())
    }

    #[must_use]
    pub fn mal_id(&self) -> Option<u64> {
        self.anime_entry.as_ref().and_then(|e| e.mal_id())
    }

    /// TMDB id known without a metadata round-trip.
    fn known_tmdb_id(&self) -> Option<u64> {
        self.anime_entry
            .as_ref()
            .and_then(|e| e.ids.tmdb.as_deref())
            .and_then(|id| id.parse().ok())
            .or_else(|| {
                self.parsed_id.as_ref().and_then(|id| {
                    (id.source == IdSource::Tmdb).then(|| id.key().parse().ok()).flatten()
                })
            })
    }

    async fn tmdb_id(&self) -> Option<u64> {
        if let Some(id) = self.known_tmdb_id() {
            return Some(id);
        }
        self.get_metadata().await.and_then(|m| m.tmdb_id)
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    /// Kicks every fetch the request is eligible for. Metadata and SeaDex
    /// run concurrently; the date lookups follow because they may need the
    /// TMDB id the metadata fetch resolves.
    pub async fn start_all_fetches(&self) {
        tokio::join!(self.start_metadata_fetch(), self.start_seadex_fetch());
        tokio::join!(
            self.start_release_dates_fetch(),
            self.start_episode_air_date_fetch()
        );
    }

    pub async fn start_metadata_fetch(&self) {
        if self.needs_metadata() {
            let _ = self.metadata_slot().await;
        }
    }

    pub async fn start_release_dates_fetch(&self) {
        if self.media_type == MediaType::Movie {
            let _ = self.release_dates_slot().await;
        }
    }

    pub async fn start_episode_air_date_fetch(&self) {
        if self.media_type == MediaType::Series {
            let _ = self.episode_air_date_slot().await;
        }
    }

    pub async fn start_seadex_fetch(&self) {
        if self.seadex_eligible() {
            let _ = self.seadex_slot().await;
        }
    }

    async fn metadata_slot(&self) -> &Option<Metadata> {
        self.metadata
            .get_or_init(|| async {
                let query = MetadataQuery {
                    media_type: self.media_type,
                    imdb_id: self.imdb_query_id(),
                    tmdb_id: self.known_tmdb_id(),
                    title_hint: self
                        .anime_entry
                        .as_ref()
                        .and_then(|e| e.title.clone()),
                };
                match self.metadata_provider.get_metadata(&query).await {
                    Ok(metadata) => Some(metadata),
                    Err(e) => {
                        warn!(id = %self.raw_id, error = %e, "Metadata fetch failed");
                        None
                    }
                }
            })
            .await
    }

    fn imdb_query_id(&self) -> Option<String> {
        if let Some(parsed) = &self.parsed_id
            && parsed.source == IdSource::Imdb
        {
            return Some(parsed.key());
        }
        self.anime_entry
            .as_ref()
            .and_then(|e| e.ids.imdb.clone())
    }

    async fn release_dates_slot(&self) -> &Option<Vec<ReleaseDate>> {
        self.release_dates
            .get_or_init(|| async {
                let tmdb_id = self.tmdb_id().await?;
                match self.metadata_provider.get_release_dates(tmdb_id).await {
                    Ok(dates) => Some(dates),
                    Err(e) => {
                        warn!(id = %self.raw_id, error = %e, "Release dates fetch failed");
                        None
                    }
                }
            })
            .await
    }

    async fn episode_air_date_slot(&self) -> &Option<NaiveDate> {
        self.episode_air_date
            .get_or_init(|| async {
                let (season, episode) = (self.season()?, self.episode()?);
                let tmdb_id = self.tmdb_id().await?;
                match self
                    .metadata_provider
                    .get_episode_air_date(tmdb_id, season, episode)
                    .await
                {
                    Ok(date) => date,
                    Err(e) => {
                        warn!(id = %self.raw_id, error = %e, "Episode air date fetch failed");
                        None
                    }
                }
            })
            .await
    }

    async fn seadex_slot(&self) -> &Option<SeaDexInfo> {
        self.seadex
            .get_or_init(|| async {
                let anilist_id = self.anilist_id()?;
                match self.seadex_provider.get_info_hashes(anilist_id).await {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warn!(id = %self.raw_id, error = %e, "SeaDex fetch failed");
                        None
                    }
                }
            })
            .await
    }

    // ------------------------------------------------------------------
    // Getters (start on demand, then memoize)
    // ------------------------------------------------------------------

    pub async fn get_metadata(&self) -> Option<&Metadata> {
        if !self.needs_metadata() && self.metadata.get().is_none() {
            return None;
        }
        self.metadata_slot().await.as_ref()
    }

    pub async fn get_release_dates(&self) -> Option<&[ReleaseDate]> {
        if self.media_type != MediaType::Movie {
            return None;
        }
        self.release_dates_slot().await.as_deref()
    }

    pub async fn get_episode_air_date(&self) -> Option<NaiveDate> {
        if self.media_type != MediaType::Series {
            return None;
        }
        *self.episode_air_date_slot().await
    }

    pub async fn get_seadex(&self) -> Option<&SeaDexInfo> {
        if !self.seadex_eligible() {
            return None;
        }
        self.seadex_slot().await.as_ref()
    }

    // ------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------

    /// Episode number ignoring season boundaries: the sum of earlier
    /// seasons' episode counts plus the requested episode, shifted past
    /// any episodes the parent catalog does not carry.
    pub async fn absolute_episode(&self) -> Option<u32> {
        if !self.is_anime {
            return None;
        }
        let (season, episode) = (self.season()?, self.episode()?);
        let metadata = self.get_metadata().await?;
        if metadata.seasons.is_empty() {
            return None;
        }

        let mut absolute: u32 = metadata
            .seasons
            .iter()
            .filter(|s| s.number >= 1 && s.number < season)
            .map(|s| s.episode_count)
            .sum::<u32>()
            + episode;

        if let Some(imdb) = self.anime_entry.as_ref().and_then(|e| e.imdb.as_ref()) {
            let shift = imdb
                .non_imdb_episodes
                .iter()
                .filter(|&&skipped| skipped < absolute)
                .count();
            absolute += u32::try_from(shift).unwrap_or(0);
        }
        Some(absolute)
    }

    /// Whole days since the title (or the requested episode) reached its
    /// audience: episode air date for series, release date for movies.
    pub async fn days_since_release(&self) -> Option<i64> {
        let date = match self.media_type {
            MediaType::Series => self.get_episode_air_date().await,
            _ => self.get_metadata().await.and_then(|m| m.release_date),
        }?;
        Some((self.today - date).num_days())
    }

    /// The flat read-only map expressions resolve context fields from.
    pub async fn expression_context(&self) -> BTreeMap<String, Value> {
        let mut ctx = BTreeMap::new();
        let mut put = |name: &str, value: Value| {
            if value != Value::Null {
                ctx.insert(name.to_string(), value);
            }
        };

        put("type", Value::Str(self.media_type.as_str().to_string()));
        put("id", Value::Str(self.raw_id.clone()));
        put("isAnime", Value::Bool(self.is_anime));
        put("queryType", Value::Str(self.query_type()));
        put(
            "season",
            self.season().map_or(Value::Null, |s| Value::Num(f64::from(s))),
        );
        put(
            "episode",
            self.episode().map_or(Value::Null, |e| Value::Num(f64::from(e))),
        );

        if let Some(metadata) = self.get_metadata().await {
            put(
                "title",
                metadata.title.clone().map_or(Value::Null, Value::Str),
            );
            put("titles", Value::str_list(&metadata.titles));
            put(
                "year",
                metadata.year.map_or(Value::Null, |y| Value::Num(f64::from(y))),
            );
            put(
                "yearEnd",
                metadata
                    .year_end
                    .map_or(Value::Null, |y| Value::Num(f64::from(y))),
            );
            put("genres", Value::str_list(&metadata.genres));
            put(
                "runtime",
                metadata
                    .runtime
                    .map_or(Value::Null, |r| Value::Num(f64::from(r))),
            );
            put(
                "originalLanguage",
                metadata
                    .original_language
                    .as_deref()
                    .map_or(Value::Null, |code| Value::Str(language::english_name(code))),
            );
        }

        put(
            "daysSinceRelease",
            self.days_since_release()
                .await
                .and_then(|days| i32::try_from(days).ok())
                .map_or(Value::Null, |days| Value::Num(f64::from(days))),
        );
        put(
            "absoluteEpisode",
            self.absolute_episode()
                .await
                .map_or(Value::Null, |e| Value::Num(f64::from(e))),
        );
        put(
            "anilistId",
            self.anilist_id()
                .map_or(Value::Null, |id| Value::Num(id as f64)),
        );
        put(
            "malId",
            self.mal_id().map_or(Value::Null, |id| Value::Num(id as f64)),
        );
        put(
            "hasSeaDex",
            Value::Bool(self.get_seadex().await.is_some_and(|info| !info.is_empty())),
        );

        ctx
    }
}
