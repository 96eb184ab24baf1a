//! Addon fan-out.
//!
//! Addons are external collaborators behind [`AddonClient`]; the fetcher
//! queries every enabled addon concurrently, bounds each with a timeout,
//! and degrades addon failures into `error`-type streams rather than
//! failing the request. Successful fan-outs are remembered in the shared
//! cache; when not a single addon responds, the last good result for the
//! same request is served instead of nothing.

use crate::cache::SharedCache;
use crate::constants::{cache, timeouts};
use crate::models::{MediaType, ParsedStream, StreamType, UserData};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait AddonClient: Send + Sync {
    /// Stable addon identifier; prefixes stream ids for request-wide
    /// uniqueness.
    fn id(&self) -> &str;

    async fn fetch_streams(
        &self,
        media_type: MediaType,
        id: &str,
        user: &UserData,
    ) -> Result<Vec<ParsedStream>>;
}

/// What the fan-out produced.
pub struct FetchOutcome {
    pub streams: Vec<ParsedStream>,
    /// Addons that returned a response (even an empty one).
    pub responded: usize,
    pub total: usize,
    /// True when the streams were served from the last good cached
    /// fan-out because no addon responded this time.
    pub from_cache: bool,
}

#[derive(Clone, Default)]
pub struct Fetcher {
    addons: Vec<Arc<dyn AddonClient>>,
    cache: SharedCache,
}

impl Fetcher {
    #[must_use]
    pub fn new(addons: Vec<Arc<dyn AddonClient>>, cache: SharedCache) -> Self {
        Self { addons, cache }
    }

    pub async fn fetch(
        &self,
        media_type: MediaType,
        id: &str,
        user: &UserData,
    ) -> FetchOutcome {
        let requests = self.addons.iter().map(|addon| {
            let addon = Arc::clone(addon);
            async move {
                let result = tokio::time::timeout(
                    timeouts::ADDON_FETCH,
                    addon.fetch_streams(media_type, id, user),
                )
                .await;
                (addon, result)
            }
        });

        let mut streams = Vec::new();
        let mut responded = 0;
        for (addon, result) in futures::future::join_all(requests).await {
            match result {
                Ok(Ok(addon_streams)) => {
                    responded += 1;
                    for (index, mut stream) in addon_streams.into_iter().enumerate() {
                        stream.id = if stream.id.is_empty() {
                            format!("{}:{index}", addon.id())
                        } else {
                            format!("{}:{}", addon.id(), stream.id)
                        };
                        streams.push(stream);
                    }
                }
                Ok(Err(e)) => {
                    warn!(addon = addon.id(), error = %e, "Addon fetch failed");
                    streams.push(error_stream(addon.id(), &format!("{e:#}")));
                }
                Err(_) => {
                    warn!(addon = addon.id(), "Addon fetch timed out");
                    streams.push(error_stream(addon.id(), "timed out"));
                }
            }
        }

        let total = self.addons.len();
        let cache_key = fetch_cache_key(media_type, id);

        if responded > 0 {
            // Remember the usable part of this fan-out; replayed error
            // records would be misleading.
            let cacheable: Vec<&ParsedStream> = streams
                .iter()
                .filter(|s| s.stream_type != StreamType::Error)
                .collect();
            self.cache
                .set(&cache_key, &cacheable, cache::FETCH_TTL)
                .await;
            return FetchOutcome {
                streams,
                responded,
                total,
                from_cache: false,
            };
        }

        if let Some(cached) = self.cache.get::<Vec<ParsedStream>>(&cache_key).await
            && !cached.is_empty()
        {
            warn!(
                id = %id,
                streams = cached.len(),
                "No addon responded, serving the last good fan-out"
            );
            // Keep this round's error records visible alongside the
            // cached result.
            let mut merged = cached;
            merged.append(&mut streams);
            return FetchOutcome {
                streams: merged,
                responded,
                total,
                from_cache: true,
            };
        }

        FetchOutcome {
            streams,
            responded,
            total,
            from_cache: false,
        }
    }
}

fn fetch_cache_key(media_type: MediaType, id: &str) -> String {
    format!("fetch:{}:{id}", media_type.as_str())
}

fn error_stream(addon_id: &str, message: &str) -> ParsedStream {
    ParsedStream {
        id: format!("{addon_id}:error"),
        stream_type: StreamType::Error,
        message: Some(format!("[{addon_id}] {message}")),
        ..ParsedStream::default()
    }
}
