//! Corpus refresh: ETag-gated downloads with bounded, jittered retries.
//!
//! Each source owns a data file and an etag file under
//! `<data_dir>/anime-database/`. A refresh HEADs the mirror for its ETag,
//! compares byte-exact with the stored tag, downloads on miss or mismatch,
//! and hands the on-disk bytes to the caller's loader.

use crate::constants::{retry, timeouts};
use anyhow::{Context, Result};
use futures::StreamExt;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// The six corpora the database keeps fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corpus {
    Mappings,
    Offline,
    KitsuImdb,
    AnitraktMovies,
    AnitraktShows,
    AnimeList,
}

impl Corpus {
    pub const ALL: &'static [Self] = &[
        Self::Mappings,
        Self::Offline,
        Self::KitsuImdb,
        Self::AnitraktMovies,
        Self::AnitraktShows,
        Self::AnimeList,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mappings => "mappings",
            Self::Offline => "offline",
            Self::KitsuImdb => "kitsu-imdb",
            Self::AnitraktMovies => "anitrakt-movies",
            Self::AnitraktShows => "anitrakt-shows",
            Self::AnimeList => "anime-list",
        }
    }

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Mappings => "anime-lists.json",
            Self::Offline => "anime-offline-database.json.zst",
            Self::KitsuImdb => "kitsu-imdb-mapping.json",
            Self::AnitraktMovies => "anitrakt-movies.json",
            Self::AnitraktShows => "anitrakt-shows.json",
            Self::AnimeList => "anime-list.xml",
        }
    }

    #[must_use]
    pub const fn default_url(self) -> &'static str {
        match self {
            Self::Mappings => {
                "https://raw.githubusercontent.com/Fribb/anime-lists/master/anime-list-full.json"
            }
            Self::Offline => {
                "https://github.com/manami-project/anime-offline-database/releases/latest/download/anime-offline-database-minified.json.zst"
            }
            Self::KitsuImdb => {
                "https://raw.githubusercontent.com/TheBeastLT/stremio-kitsu-anime/master/static/data/imdb_mapping.json"
            }
            Self::AnitraktMovies => "https://anitrakt.huere.net/db/db_index_movies.json",
            Self::AnitraktShows => "https://anitrakt.huere.net/db/db_index_shows.json",
            Self::AnimeList => {
                "https://raw.githubusercontent.com/Anime-Lists/anime-lists/master/anime-list.xml"
            }
        }
    }

    #[must_use]
    pub const fn default_refresh_interval(self) -> Duration {
        match self {
            // The offline corpus cuts a release weekly; the rest move often.
            Self::Offline => Duration::from_secs(7 * 24 * 60 * 60),
            _ => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// One source's remote location and cadence, resolved from configuration.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub corpus: Corpus,
    pub url: String,
    pub refresh_interval: Duration,
}

impl SourceSpec {
    #[must_use]
    pub fn with_defaults(corpus: Corpus) -> Self {
        Self {
            corpus,
            url: corpus.default_url().to_string(),
            refresh_interval: corpus.default_refresh_interval(),
        }
    }

    #[must_use]
    pub fn data_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.corpus.file_name())
    }

    #[must_use]
    pub fn etag_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.etag", self.corpus.file_name()))
    }
}

/// The bytes a refresh produced, and whether they were fetched remotely in
/// this pass (false means the on-disk copy was still current).
pub struct CorpusPayload {
    pub bytes: Vec<u8>,
    pub refetched: bool,
}

/// Ensures the corpus file is current per the ETag protocol and returns
/// its bytes.
pub async fn fetch_corpus(
    client: &reqwest::Client,
    dir: &Path,
    spec: &SourceSpec,
) -> Result<CorpusPayload> {
    let data_path = spec.data_path(dir);
    let etag_path = spec.etag_path(dir);

    let remote_etag = head_etag(client, &spec.url).await?;
    let local_etag = tokio::fs::read_to_string(&etag_path).await.ok();
    let file_exists = tokio::fs::try_exists(&data_path).await.unwrap_or(false);

    let needs_fetch = !file_exists
        || remote_etag.is_none()
        || local_etag.is_none()
        || remote_etag != local_etag;

    if needs_fetch {
        debug!(
            source = spec.corpus.name(),
            url = %spec.url,
            "Corpus is stale or missing, downloading"
        );
        download(client, &spec.url, &data_path).await?;
        match &remote_etag {
            Some(etag) => {
                tokio::fs::write(&etag_path, etag)
                    .await
                    .with_context(|| format!("writing etag for {}", spec.corpus.name()))?;
            }
            None => {
                let _ = tokio::fs::remove_file(&etag_path).await;
            }
        }
    } else {
        debug!(source = spec.corpus.name(), "Corpus is current, skipping download");
    }

    let bytes = tokio::fs::read(&data_path)
        .await
        .with_context(|| format!("reading corpus file for {}", spec.corpus.name()))?;
    Ok(CorpusPayload {
        bytes,
        refetched: needs_fetch,
    })
}

/// Drops the local file and tag so the next cycle refetches from scratch.
pub async fn invalidate(dir: &Path, spec: &SourceSpec) {
    let _ = tokio::fs::remove_file(spec.data_path(dir)).await;
    let _ = tokio::fs::remove_file(spec.etag_path(dir)).await;
}

async fn head_etag(client: &reqwest::Client, url: &str) -> Result<Option<String>> {
    let response = client
        .head(url)
        .timeout(timeouts::CORPUS_HEAD)
        .send()
        .await
        .context("ETag probe failed")?;
    if !response.status().is_success() {
        // Mirrors that refuse HEAD force a download; the GET decides.
        warn!(url = %url, status = %response.status(), "ETag probe refused");
        return Ok(None);
    }
    Ok(response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(String::from))
}

async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = client
        .get(url)
        .timeout(timeouts::CORPUS_GET)
        .send()
        .await
        .context("download request failed")?
        .error_for_status()
        .context("download request returned error status")?;

    let part_path = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&part_path)
        .await
        .with_context(|| format!("creating {}", part_path.display()))?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("download stream failed")?;
        file.write_all(&chunk)
            .await
            .context("writing corpus chunk")?;
    }
    file.flush().await.context("flushing corpus file")?;
    drop(file);

    tokio::fs::rename(&part_path, dest)
        .await
        .with_context(|| format!("publishing {}", dest.display()))
}

/// Runs `op` with bounded retries and jittered exponential backoff; the
/// label names the source in warnings and the final error context.
pub async fn retry_with_backoff<T, Fut>(label: &str, op: impl Fn(u32) -> Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retry::MAX_ATTEMPTS => {
                let backoff = retry::BASE_DELAY * 2u32.pow(attempt - 1);
                let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                warn!(
                    source = label,
                    attempt,
                    error = %e,
                    "Refresh attempt failed, backing off"
                );
                tokio::time::sleep(backoff + jitter).await;
                attempt += 1;
            }
            Err(e) => return Err(e.context(format!("refreshing {label}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result = retry_with_backoff("test-source", move |_| {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("flaky")
                }
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_with_labelled_error() {
        let result: Result<()> =
            retry_with_backoff("test-source", |_| async { anyhow::bail!("always down") }).await;
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("test-source"));
    }

    #[test]
    fn source_paths_land_in_the_data_dir() {
        let spec = SourceSpec::with_defaults(Corpus::AnimeList);
        let dir = Path::new("/var/lib/streamarr/anime-database");
        assert_eq!(
            spec.data_path(dir),
            Path::new("/var/lib/streamarr/anime-database/anime-list.xml")
        );
        assert_eq!(
            spec.etag_path(dir),
            Path::new("/var/lib/streamarr/anime-database/anime-list.xml.etag")
        );
    }
}
