//! Candidate stream records as returned by addons, plus the per-request
//! annotations the pipeline attaches before sorting.

use serde::{Deserialize, Serialize};

/// How a stream is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Debrid,
    P2p,
    Usenet,
    Http,
    Live,
    Youtube,
    External,
    Error,
    Statistic,
}

/// Attributes recognized from the release filename.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedFile {
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub encode: Option<String>,
    pub visual_tags: Vec<String>,
    pub audio_tags: Vec<String>,
    pub audio_channels: Vec<String>,
    pub languages: Vec<String>,
    pub release_group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TorrentInfo {
    pub info_hash: Option<String>,
    pub seeders: Option<u32>,
}

/// The debrid/usenet service a stream is resolved through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub id: String,
    pub short_name: String,
    pub cached: bool,
}

/// SeaDex membership annotation, attached by the early precompute stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeaDexTag {
    pub is_best: bool,
    pub is_seadex: bool,
}

/// Which preferred regex pattern claimed a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexMatch {
    pub name: String,
    pub pattern: String,
    pub index: usize,
}

/// One candidate playback stream.
///
/// Everything up to `message` comes off the wire from an addon; the
/// remaining fields are request-scoped annotations written by the
/// precompute stages and discarded with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedStream {
    pub id: String,
    pub filename: Option<String>,
    pub folder_name: Option<String>,
    pub indexer: Option<String>,
    pub parsed_file: Option<ParsedFile>,
    pub torrent: Option<TorrentInfo>,
    pub size: Option<u64>,
    pub folder_size: Option<u64>,
    /// Age in days, when the addon reports it.
    pub age: Option<u32>,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub service: Option<ServiceInfo>,
    pub library: Option<bool>,
    pub proxied: Option<bool>,
    pub private: Option<bool>,
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seadex: Option<SeaDexTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex_matched: Option<RegexMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_expression_matched: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_expression_score: Option<f64>,
}

impl Default for ParsedStream {
    fn default() -> Self {
        Self {
            id: String::new(),
            filename: None,
            folder_name: None,
            indexer: None,
            parsed_file: None,
            torrent: None,
            size: None,
            folder_size: None,
            age: None,
            stream_type: StreamType::P2p,
            service: None,
            library: None,
            proxied: None,
            private: None,
            message: None,
            seadex: None,
            regex_matched: None,
            keyword_matched: None,
            stream_expression_matched: None,
            stream_expression_score: None,
        }
    }
}

impl ParsedStream {
    /// True when the stream resolves through a service with a cache hit.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.service.as_ref().is_some_and(|s| s.cached)
    }

    /// Lowercased torrent info-hash, if any.
    #[must_use]
    pub fn info_hash(&self) -> Option<String> {
        self.torrent
            .as_ref()
            .and_then(|t| t.info_hash.as_deref())
            .map(str::to_lowercase)
    }

    #[must_use]
    pub fn release_group(&self) -> Option<&str> {
        self.parsed_file.as_ref()?.release_group.as_deref()
    }

    #[must_use]
    pub fn resolution(&self) -> Option<&str> {
        self.parsed_file.as_ref()?.resolution.as_deref()
    }

    #[must_use]
    pub fn quality(&self) -> Option<&str> {
        self.parsed_file.as_ref()?.quality.as_deref()
    }

    #[must_use]
    pub fn service_id(&self) -> Option<&str> {
        self.service.as_ref().map(|s| s.id.as_str())
    }

    /// The haystacks preferred-keyword and regex annotations scan over.
    #[must_use]
    pub fn annotation_haystacks(&self) -> [Option<&str>; 4] {
        [
            self.filename.as_deref(),
            self.folder_name.as_deref(),
            self.release_group(),
            self.indexer.as_deref(),
        ]
    }
}
