//! HTTP stream-provider addon client.
//!
//! Speaks the addon fetch protocol: the request carries the media type,
//! the content id and the user configuration; the response is a list of
//! parsed stream records.

use crate::models::{MediaType, ParsedStream, UserData};
use crate::pipeline::AddonClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<ParsedStream>,
}

#[derive(Clone)]
pub struct HttpAddon {
    id: String,
    base_url: String,
    client: Client,
}

impl HttpAddon {
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            id: id.into(),
            base_url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AddonClient for HttpAddon {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_streams(
        &self,
        media_type: MediaType,
        id: &str,
        user: &UserData,
    ) -> Result<Vec<ParsedStream>> {
        let url = format!(
            "{}/api/v1/streams/{}/{}",
            self.base_url,
            media_type.as_str(),
            urlencoding::encode(id)
        );
        let response: StreamsResponse = self
            .client
            .post(&url)
            .json(user)
            .send()
            .await
            .with_context(|| format!("addon {} is unreachable", self.id))?
            .error_for_status()
            .with_context(|| format!("addon {} refused the request", self.id))?
            .json()
            .await
            .with_context(|| format!("addon {} returned an unexpected shape", self.id))?;
        Ok(response.streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed() {
        let addon = HttpAddon::new("torrentio", "https://example.test///");
        assert_eq!(addon.base_url, "https://example.test");
    }
}
