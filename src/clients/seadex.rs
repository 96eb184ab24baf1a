//! SeaDex client: community-curated "best release" lists for anime, keyed
//! by AniList id. Results collapse to hash/group sets the pipeline tags
//! streams with.

use crate::cache::SharedCache;
use crate::constants::{cache, timeouts};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SEADEX_API: &str = "https://releases.moe/api/collections";

/// The sets the pipeline tags against. Hashes are lowercase hex; groups
/// are lowercase release-group names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeaDexInfo {
    pub best_hashes: HashSet<String>,
    pub all_hashes: HashSet<String>,
    pub best_groups: HashSet<String>,
    pub all_groups: HashSet<String>,
}

impl SeaDexInfo {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_hashes.is_empty() && self.all_groups.is_empty()
    }
}

#[async_trait]
pub trait SeaDexProvider: Send + Sync {
    async fn get_info_hashes(&self, anilist_id: u64) -> Result<SeaDexInfo>;
}

#[derive(Debug, Deserialize)]
struct EntryResponse {
    items: Vec<SeaDexEntry>,
}

#[derive(Debug, Deserialize)]
struct SeaDexEntry {
    #[serde(default)]
    trs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TorrentResponse {
    items: Vec<SeaDexTorrent>,
}

#[derive(Debug, Deserialize)]
struct SeaDexTorrent {
    #[serde(rename = "releaseGroup", default)]
    release_group: String,
    #[serde(rename = "infoHash", default)]
    info_hash: Option<String>,
    #[serde(rename = "isBest", default)]
    is_best: bool,
}

fn collect_info(torrents: Vec<SeaDexTorrent>) -> SeaDexInfo {
    let mut info = SeaDexInfo::default();
    for torrent in torrents {
        if let Some(hash) = &torrent.info_hash {
            let hash = hash.to_lowercase();
            if torrent.is_best {
                info.best_hashes.insert(hash.clone());
            }
            info.all_hashes.insert(hash);
        }
        if !torrent.release_group.is_empty() {
            let group = torrent.release_group.to_lowercase();
            if torrent.is_best {
                info.best_groups.insert(group.clone());
            }
            info.all_groups.insert(group);
        }
    }
    info
}

#[derive(Clone)]
pub struct SeaDexClient {
    client: Client,
    base_url: String,
    cache: SharedCache,
}

impl SeaDexClient {
    #[must_use]
    pub fn new(cache: SharedCache) -> Self {
        Self::with_base_url(cache, SEADEX_API)
    }

    #[must_use]
    pub fn with_base_url(cache: SharedCache, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            cache,
        }
    }

    async fn fetch_entry(&self, anilist_id: u64) -> Result<Option<SeaDexEntry>> {
        let url = format!(
            "{}/entries/records?filter=(alID={})",
            self.base_url, anilist_id
        );
        let response: EntryResponse = self
            .client
            .get(&url)
            .timeout(timeouts::SEADEX)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.items.into_iter().next())
    }

    async fn fetch_torrents(&self, tr_ids: &[String]) -> Result<Vec<SeaDexTorrent>> {
        if tr_ids.is_empty() {
            return Ok(vec![]);
        }
        let filter = tr_ids
            .iter()
            .map(|id| format!("id='{id}'"))
            .collect::<Vec<_>>()
            .join("||");
        let url = format!("{}/torrents/records?filter=({})", self.base_url, filter);
        let response: TorrentResponse = self
            .client
            .get(&url)
            .timeout(timeouts::SEADEX)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.items)
    }

    async fn build_info(&self, anilist_id: u64) -> Result<SeaDexInfo> {
        let Some(entry) = self.fetch_entry(anilist_id).await? else {
            return Ok(SeaDexInfo::default());
        };
        let torrents = self.fetch_torrents(&entry.trs).await?;
        Ok(collect_info(torrents))
    }
}

#[async_trait]
impl SeaDexProvider for SeaDexClient {
    async fn get_info_hashes(&self, anilist_id: u64) -> Result<SeaDexInfo> {
        let key = format!("seadex:{anilist_id}");
        self.cache
            .get_or_fetch(&key, cache::SEADEX_TTL, || self.build_info(anilist_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrent_sets_collapse_with_lowercasing() {
        let info = collect_info(vec![
            SeaDexTorrent {
                release_group: "SubsPlease".into(),
                info_hash: Some("AABB".into()),
                is_best: true,
            },
            SeaDexTorrent {
                release_group: "Erai-raws".into(),
                info_hash: Some("ccdd".into()),
                is_best: false,
            },
        ]);

        assert!(info.best_hashes.contains("aabb"));
        assert!(info.all_hashes.contains("aabb"));
        assert!(info.all_hashes.contains("ccdd"));
        assert!(!info.best_hashes.contains("ccdd"));
        assert!(info.best_groups.contains("subsplease"));
        assert!(info.all_groups.contains("erai-raws"));
    }

    #[test]
    fn hashless_torrents_still_contribute_groups() {
        let info = collect_info(vec![SeaDexTorrent {
            release_group: "Commie".into(),
            info_hash: None,
            is_best: true,
        }]);
        assert!(info.all_hashes.is_empty());
        assert!(info.best_groups.contains("commie"));
        assert!(!info.is_empty());
    }
}
