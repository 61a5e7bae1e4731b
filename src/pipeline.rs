//! Entry list → bundles → buckets → report.
//!
//! Entries are processed strictly in list order, one at a time. Bucket
//! grouping depends on that order, and the first failing entry aborts the
//! run before any report is written.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::bundle::{ExportBundle, read_archive};
use crate::fetch::BundleSource;
use crate::output::{ReportOrder, print_bundle, print_pretty, write_report_file};
use crate::stats::{StatisticsBucket, fold};

/// One row of the published entry list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entry {
    pub url: String,
    /// Publication time of the bundle, epoch seconds.
    pub created: i64,
}

impl Entry {
    /// Last path segment of the URL.
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log every decoded bundle and bucket.
    pub verbose: bool,
    pub order: ReportOrder,
}

/// Parses the JSON entry list (`[{"url": ..., "created": ...}]`).
pub fn parse_entry_list(bytes: &[u8]) -> Result<Vec<Entry>> {
    serde_json::from_slice(bytes).context("malformed diagnosis keys list")
}

#[tracing::instrument(skip(source))]
pub async fn load_entries<S>(source: &S, list_url: &str) -> Result<Vec<Entry>>
where
    S: BundleSource + ?Sized,
{
    let bytes = source
        .fetch(list_url)
        .await
        .with_context(|| format!("failed to download diagnosis keys list {list_url}"))?;
    let entries = parse_entry_list(&bytes)?;

    info!(entries = entries.len(), "Diagnosis keys list loaded");
    Ok(entries)
}

/// Fetches and decodes every entry, in order.
///
/// # Errors
///
/// Fails on the first entry that cannot be fetched or decoded; the error
/// names the entry's URL and `created` value.
#[tracing::instrument(skip_all, fields(entries = entries.len()))]
pub async fn collect_bundles<S>(
    source: &S,
    entries: &[Entry],
    verbose: bool,
) -> Result<Vec<(i64, ExportBundle)>>
where
    S: BundleSource + ?Sized,
{
    let mut bundles = Vec::with_capacity(entries.len());

    for entry in entries {
        let bytes = source.fetch(&entry.url).await.with_context(|| {
            format!(
                "failed to fetch bundle {} (created={})",
                entry.url, entry.created
            )
        })?;
        debug!(url = %entry.url, bytes = bytes.len(), "Bundle fetched");

        let bundle = read_archive(&bytes).with_context(|| {
            format!(
                "malformed bundle {} (created={})",
                entry.url, entry.created
            )
        })?;

        if verbose {
            print_bundle(entry.file_name(), &bundle);
        }

        bundles.push((entry.created, bundle));
    }

    Ok(bundles)
}

/// Runs the whole pipeline up to, but not including, the report.
pub async fn run<S>(
    source: &S,
    entries: &[Entry],
    options: RunOptions,
) -> Result<Vec<StatisticsBucket>>
where
    S: BundleSource + ?Sized,
{
    let bundles = collect_bundles(source, entries, options.verbose).await?;
    let buckets = fold(&bundles);

    if options.verbose {
        for bucket in &buckets {
            print_pretty(bucket);
        }
    }

    info!(
        entries = entries.len(),
        buckets = buckets.len(),
        "Statistics computed"
    );
    Ok(buckets)
}

/// Runs the pipeline and writes the report to `output_path`.
pub async fn run_to_path<S>(
    source: &S,
    entries: &[Entry],
    output_path: &Path,
    options: RunOptions,
) -> Result<Vec<StatisticsBucket>>
where
    S: BundleSource + ?Sized,
{
    let buckets = run(source, entries, options).await?;
    write_report_file(output_path, &buckets, options.order)?;
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_list() {
        let json = br#"[
            {"url": "https://example.com/1.zip", "created": 1598000000},
            {"url": "https://example.com/2.zip", "created": 1598000600, "extra": true}
        ]"#;

        let entries = parse_entry_list(json).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].created, 1598000600);
        assert_eq!(entries[0].file_name(), "1.zip");
    }

    #[test]
    fn test_parse_entry_list_rejects_missing_created() {
        let json = br#"[{"url": "https://example.com/1.zip"}]"#;
        assert!(parse_entry_list(json).is_err());
    }

    #[test]
    fn test_entry_file_name_without_slash() {
        let entry = Entry {
            url: "local.zip".to_string(),
            created: 0,
        };
        assert_eq!(entry.file_name(), "local.zip");
    }
}
