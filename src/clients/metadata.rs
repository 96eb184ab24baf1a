//! Metadata catalog client.
//!
//! Fetches titles, years, genres, season lists and release dates from an
//! external catalog (TMDB-shaped API). The pipeline talks to the
//! [`MetadataProvider`] trait; tests substitute fixtures.

use crate::cache::SharedCache;
use crate::constants::{cache, timeouts};
use crate::models::MediaType;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const TMDB_API: &str = "https://api.themoviedb.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseKind {
    Premiere,
    TheatricalLimited,
    Theatrical,
    Digital,
    Physical,
    Tv,
}

impl ReleaseKind {
    fn from_tmdb(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Premiere),
            2 => Some(Self::TheatricalLimited),
            3 => Some(Self::Theatrical),
            4 => Some(Self::Digital),
            5 => Some(Self::Physical),
            6 => Some(Self::Tv),
            _ => None,
        }
    }

    /// Release kinds that put a title in homes rather than theaters.
    #[must_use]
    pub const fn is_home_release(self) -> bool {
        matches!(self, Self::Digital | Self::Physical | Self::Tv)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDate {
    pub kind: ReleaseKind,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub number: u32,
    pub episode_count: u32,
}

/// What the catalog knows about a title.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub tmdb_id: Option<u64>,
    pub title: Option<String>,
    pub titles: Vec<String>,
    pub year: Option<i32>,
    pub year_end: Option<i32>,
    pub genres: Vec<String>,
    /// Runtime in minutes.
    pub runtime: Option<u32>,
    /// ISO-639-1 code as the catalog reports it.
    pub original_language: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub seasons: Vec<SeasonInfo>,
}

/// How a lookup addresses the catalog.
#[derive(Debug, Clone)]
pub struct MetadataQuery {
    pub media_type: MediaType,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<u64>,
    pub title_hint: Option<String>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_metadata(&self, query: &MetadataQuery) -> Result<Metadata>;
    async fn get_release_dates(&self, tmdb_id: u64) -> Result<Vec<ReleaseDate>>;
    async fn get_episode_air_date(
        &self,
        tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<NaiveDate>>;
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FindResult>,
    #[serde(default)]
    tv_results: Vec<FindResult>,
}

#[derive(Debug, Deserialize)]
struct FindResult {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<FindResult>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MovieDetails {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    original_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvDetails {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    last_air_date: Option<String>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    seasons: Vec<TvSeason>,
}

#[derive(Debug, Deserialize)]
struct TvSeason {
    season_number: u32,
    #[serde(default)]
    episode_count: u32,
}

#[derive(Debug, Deserialize)]
struct ReleaseDatesResponse {
    #[serde(default)]
    results: Vec<RegionReleases>,
}

#[derive(Debug, Deserialize)]
struct RegionReleases {
    #[serde(default)]
    release_dates: Vec<RawReleaseDate>,
}

#[derive(Debug, Deserialize)]
struct RawReleaseDate {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeDetails {
    #[serde(default)]
    air_date: Option<String>,
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?;
    // Release date payloads mix plain dates and RFC3339 timestamps.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
    cache: SharedCache,
}

impl TmdbClient {
    #[must_use]
    pub fn new(cache: SharedCache, api_key: impl Into<String>) -> Self {
        Self::with_base_url(cache, api_key, TMDB_API)
    }

    #[must_use]
    pub fn with_base_url(
        cache: SharedCache,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            cache,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let separator = if path_and_query.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}{}api_key={}",
            self.base_url, path_and_query, separator, self.api_key
        );
        self.client
            .get(&url)
            .timeout(timeouts::METADATA)
            .send()
            .await
            .context("metadata request failed")?
            .error_for_status()
            .context("metadata request returned error status")?
            .json()
            .await
            .context("metadata response was not the expected JSON shape")
    }

    async fn resolve_tmdb_id(&self, query: &MetadataQuery) -> Result<u64> {
        if let Some(tmdb_id) = query.tmdb_id {
            return Ok(tmdb_id);
        }
        if let Some(imdb_id) = &query.imdb_id {
            let found: FindResponse = self
                .get_json(&format!("/3/find/{imdb_id}?external_source=imdb_id"))
                .await?;
            let hit = match query.media_type {
                MediaType::Movie => found.movie_results.first(),
                _ => found.tv_results.first().or(found.movie_results.first()),
            };
            if let Some(hit) = hit {
                return Ok(hit.id);
            }
        }
        if let Some(title) = &query.title_hint {
            let path = match query.media_type {
                MediaType::Movie => "/3/search/movie",
                _ => "/3/search/tv",
            };
            let found: SearchResponse = self
                .get_json(&format!("{path}?query={}", urlencoding::encode(title)))
                .await?;
            if let Some(hit) = found.results.first() {
                return Ok(hit.id);
            }
        }
        bail!("no catalog match for the request")
    }

    async fn fetch_movie(&self, tmdb_id: u64) -> Result<Metadata> {
        let details: MovieDetails = self.get_json(&format!("/3/movie/{tmdb_id}")).await?;
        let release_date = parse_date(details.release_date.as_deref());
        let mut titles: Vec<String> = details.title.iter().cloned().collect();
        if let Some(original) = &details.original_title
            && !titles.contains(original)
        {
            titles.push(original.clone());
        }
        Ok(Metadata {
            tmdb_id: Some(details.id),
            title: details.title,
            titles,
            year: release_date.map(|d| chrono::Datelike::year(&d)),
            year_end: None,
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            runtime: details.runtime,
            original_language: details.original_language,
            release_date,
            seasons: Vec::new(),
        })
    }

    async fn fetch_tv(&self, tmdb_id: u64) -> Result<Metadata> {
        let details: TvDetails = self.get_json(&format!("/3/tv/{tmdb_id}")).await?;
        let first_air = parse_date(details.first_air_date.as_deref());
        let last_air = parse_date(details.last_air_date.as_deref());
        let mut titles: Vec<String> = details.name.iter().cloned().collect();
        if let Some(original) = &details.original_name
            && !titles.contains(original)
        {
            titles.push(original.clone());
        }
        Ok(Metadata {
            tmdb_id: Some(details.id),
            title: details.name,
            titles,
            year: first_air.map(|d| chrono::Datelike::year(&d)),
            year_end: last_air.map(|d| chrono::Datelike::year(&d)),
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            runtime: details.episode_run_time.first().copied(),
            original_language: details.original_language,
            release_date: first_air,
            seasons: details
                .seasons
                .into_iter()
                .map(|s| SeasonInfo {
                    number: s.season_number,
                    episode_count: s.episode_count,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn get_metadata(&self, query: &MetadataQuery) -> Result<Metadata> {
        let tmdb_id = self.resolve_tmdb_id(query).await?;
        let key = format!("meta:{}:{tmdb_id}", query.media_type.as_str());
        self.cache
            .get_or_fetch(&key, cache::METADATA_TTL, || async {
                match query.media_type {
                    MediaType::Movie => self.fetch_movie(tmdb_id).await,
                    _ => self.fetch_tv(tmdb_id).await,
                }
            })
            .await
    }

    async fn get_release_dates(&self, tmdb_id: u64) -> Result<Vec<ReleaseDate>> {
        let key = format!("releases:{tmdb_id}");
        self.cache
            .get_or_fetch(&key, cache::RELEASE_DATES_TTL, || async {
                let response: ReleaseDatesResponse = self
                    .get_json(&format!("/3/movie/{tmdb_id}/release_dates"))
                    .await?;
                let mut dates = Vec::new();
                for region in response.results {
                    for raw in region.release_dates {
                        if let (Some(kind), Some(date)) = (
                            ReleaseKind::from_tmdb(raw.kind),
                            parse_date(raw.release_date.as_deref()),
                        ) {
                            dates.push(ReleaseDate { kind, date });
                        }
                    }
                }
                dates.sort_by_key(|r| r.date);
                Ok(dates)
            })
            .await
    }

    async fn get_episode_air_date(
        &self,
        tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<NaiveDate>> {
        let key = format!("airdate:{tmdb_id}:{season}:{episode}");
        self.cache
            .get_or_fetch(&key, cache::METADATA_TTL, || async {
                let details: EpisodeDetails = self
                    .get_json(&format!("/3/tv/{tmdb_id}/season/{season}/episode/{episode}"))
                    .await?;
                Ok(parse_date(details.air_date.as_deref()))
            })
            .await
    }
}
