//! Retrieval of entry lists and bundle archives.
//!
//! [`HttpClient`] is the transport seam, [`BundleSource`] resolves a location
//! (URL or local path) into bytes, and [`DiskCache`] keeps downloaded bundles
//! around between runs.

mod cache;
mod client;
mod source;

pub use cache::DiskCache;
pub use client::{BasicClient, HttpClient};
pub use source::{BundleSource, RemoteSource};

use anyhow::Result;
use bytes::Bytes;
use tracing::debug;

/// Performs a GET for `url` and returns the body. Non-2xx statuses are errors.
#[tracing::instrument(skip(client))]
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    let body = resp.bytes().await?;

    debug!(bytes = body.len(), "Response body received");
    Ok(body)
}
