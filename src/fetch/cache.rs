use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use super::source::BundleSource;

/// A [`BundleSource`] wrapper that stores every fetched body in `dir`, named
/// after the last path segment of its location, and serves later requests for
/// the same name from disk.
pub struct DiskCache<S> {
    inner: S,
    dir: PathBuf,
}

impl<S> DiskCache<S> {
    pub fn new(inner: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    /// The wrapped source, for fetches that should bypass the cache.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_path(&self, location: &str) -> Option<PathBuf> {
        let name = location.rsplit('/').next()?;
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(self.dir.join(name))
    }
}

#[async_trait]
impl<S: BundleSource> BundleSource for DiskCache<S> {
    async fn fetch(&self, location: &str) -> Result<Bytes> {
        let Some(path) = self.cache_path(location) else {
            debug!(location, "No cacheable file name, fetching directly");
            return self.inner.fetch(location).await;
        };

        if tokio::fs::try_exists(&path).await? {
            info!(path = %path.display(), "Bundle already downloaded");
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read cached {}", path.display()))?;
            return Ok(Bytes::from(bytes));
        }

        let bytes = self.inner.fetch(location).await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to cache {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Bundle cached");

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BundleSource for CountingSource {
        async fn fetch(&self, location: &str) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from(location.to_string()))
        }
    }

    fn counting() -> CountingSource {
        CountingSource {
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(counting(), dir.path().join("bundles"));

        let url = "https://example.com/keys/1.zip";
        let first = cache.fetch(url).await.unwrap();
        let second = cache.fetch(url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 1);
        assert!(cache.dir().join("1.zip").exists());
    }

    #[tokio::test]
    async fn test_existing_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2.zip"), b"cached").unwrap();
        let cache = DiskCache::new(counting(), dir.path());

        let bytes = cache.fetch("https://example.com/keys/2.zip").await.unwrap();

        assert_eq!(&bytes[..], b"cached");
        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_location_without_file_name_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(counting(), dir.path());

        cache.fetch("https://example.com/list/").await.unwrap();
        cache.fetch("https://example.com/list/").await.unwrap();

        assert_eq!(cache.inner().calls.load(Ordering::SeqCst), 2);
    }
}
