use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

use super::client::HttpClient;
use super::fetch_bytes;

/// Resolves a location from the entry list into raw bytes.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Bytes>;
}

/// Fetches `http(s)://` locations over HTTP and reads anything else from the
/// local filesystem.
pub struct RemoteSource<C> {
    client: C,
}

impl<C> RemoteSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[async_trait]
impl<C: HttpClient> BundleSource for RemoteSource<C> {
    async fn fetch(&self, location: &str) -> Result<Bytes> {
        if is_http(location) {
            return fetch_bytes(&self.client, location).await;
        }

        let bytes = tokio::fs::read(location)
            .await
            .with_context(|| format!("failed to read {location}"))?;
        Ok(Bytes::from(bytes))
    }
}
