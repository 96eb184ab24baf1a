//! Shared application state used across the API and the CLI commands.
//!
//! Wires the anime database, the shared cache, the upstream clients and
//! the pipeline together from configuration, and owns their lifecycles.

use crate::aidb::AnimeDb;
use crate::cache::SharedCache;
use crate::clients::{HttpAddon, MetadataProvider, SeaDexClient, SeaDexProvider, TmdbClient};
use crate::config::Config;
use crate::context::StreamContext;
use crate::models::{MediaType, UserData};
use crate::pipeline::{AddonClient, Fetcher, StreamPipeline};
use std::sync::Arc;

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub cache: SharedCache,

    pub anime_db: AnimeDb,

    pub metadata: Arc<dyn MetadataProvider>,

    pub seadex: Arc<dyn SeaDexProvider>,

    pub pipeline: StreamPipeline,
}

impl SharedState {
    /// Builds everything and runs the anime database's initial load.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let cache = SharedCache::new();

        let anime_db = AnimeDb::new(config.anime_db_config());
        anime_db.init().await?;

        let metadata: Arc<dyn MetadataProvider> =
            Arc::new(TmdbClient::new(cache.clone(), config.metadata.api_key.clone()));
        let seadex: Arc<dyn SeaDexProvider> = Arc::new(SeaDexClient::new(cache.clone()));

        let addons: Vec<Arc<dyn AddonClient>> = config
            .addons
            .iter()
            .map(|addon| {
                Arc::new(HttpAddon::new(addon.id.clone(), addon.url.clone()))
                    as Arc<dyn AddonClient>
            })
            .collect();
        let pipeline = StreamPipeline::new(Fetcher::new(addons, cache.clone()));

        Ok(Self {
            config: Arc::new(config),
            cache,
            anime_db,
            metadata,
            seadex,
            pipeline,
        })
    }

    /// A request-scoped context for one lookup.
    #[must_use]
    pub fn context_for(
        &self,
        media_type: MediaType,
        id: &str,
        user: Arc<UserData>,
    ) -> StreamContext {
        StreamContext::new(
            media_type,
            id,
            user,
            &self.anime_db,
            Arc::clone(&self.metadata),
            Arc::clone(&self.seadex),
        )
    }

    /// Stops background work (the refresh timers).
    pub fn shutdown(&self) {
        self.anime_db.shutdown();
    }
}
