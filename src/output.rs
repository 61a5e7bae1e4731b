//! Report formatting and persistence for bucket statistics.
//!
//! Writes the CSV report and logs human-readable dumps of decoded bundles.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset};
use csv::{Terminator, WriterBuilder};
use tracing::{debug, info};

use crate::bundle::{ExportBundle, KeyRecord};
use crate::stats::StatisticsBucket;

/// Length of one rolling interval in seconds.
pub const EN_INTERVAL_WINDOW_SECS: i64 = 10 * 60;

/// Offset of the publishing region (JST).
pub const REPORT_UTC_OFFSET_SECS: i32 = 9 * 60 * 60;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";

/// Column names of the report. Data rows carry one extra trailing field, the
/// bucket comment, which has no header column.
pub const HEADER: [&str; 54] = [
    "created",
    "rolling_start_interval_number",
    "rolling_start_interval_number_date",
    "key_count",
    "valid_key_count",
    "invalid_key_data_count",
    "invalid_transmission_risk_level_key_count",
    "invalid_report_type_key_count",
    "invalid_days_since_onset_of_symptoms_key_count",
    "has_not_report_type_count",
    "has_not_days_since_onset_of_symptoms_count",
    "transmission_risk_level_unused_count",
    "transmission_risk_level_low_count",
    "transmission_risk_level_standard_count",
    "transmission_risk_level_high_count",
    "transmission_risk_level_confirmed_clinical_diagnosis_count",
    "transmission_risk_level_self_report_count",
    "transmission_risk_level_negative_case_count",
    "transmission_risk_level_recursive_case_count",
    "report_type_unknown_count",
    "report_type_confirmed_test_count",
    "report_type_confirmed_clinical_diagnosis_count",
    "report_type_self_reported_count",
    "report_type_recursive_count",
    "report_type_revoked_count",
    "days_since_onset_of_symptoms_-14_count",
    "days_since_onset_of_symptoms_-13_count",
    "days_since_onset_of_symptoms_-12_count",
    "days_since_onset_of_symptoms_-11_count",
    "days_since_onset_of_symptoms_-10_count",
    "days_since_onset_of_symptoms_-9_count",
    "days_since_onset_of_symptoms_-8_count",
    "days_since_onset_of_symptoms_-7_count",
    "days_since_onset_of_symptoms_-6_count",
    "days_since_onset_of_symptoms_-5_count",
    "days_since_onset_of_symptoms_-4_count",
    "days_since_onset_of_symptoms_-3_count",
    "days_since_onset_of_symptoms_-2_count",
    "days_since_onset_of_symptoms_-1_count",
    "days_since_onset_of_symptoms_0_count",
    "days_since_onset_of_symptoms_+1_count",
    "days_since_onset_of_symptoms_+2_count",
    "days_since_onset_of_symptoms_+3_count",
    "days_since_onset_of_symptoms_+4_count",
    "days_since_onset_of_symptoms_+5_count",
    "days_since_onset_of_symptoms_+6_count",
    "days_since_onset_of_symptoms_+7_count",
    "days_since_onset_of_symptoms_+8_count",
    "days_since_onset_of_symptoms_+9_count",
    "days_since_onset_of_symptoms_+10_count",
    "days_since_onset_of_symptoms_+11_count",
    "days_since_onset_of_symptoms_+12_count",
    "days_since_onset_of_symptoms_+13_count",
    "days_since_onset_of_symptoms_+14_count",
];

/// Row order of the written report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportOrder {
    /// As produced by the aggregator.
    #[default]
    Traversal,
    /// Sorted with [`StatisticsBucket::compare`].
    Descending,
}

/// Start of a rolling interval as a wall-clock time in the report offset.
pub fn interval_to_date(rolling_start_interval_number: i32) -> Result<DateTime<FixedOffset>> {
    let epoch = i64::from(rolling_start_interval_number) * EN_INTERVAL_WINDOW_SECS;
    let offset = FixedOffset::east_opt(REPORT_UTC_OFFSET_SECS)
        .ok_or_else(|| anyhow!("invalid report offset {REPORT_UTC_OFFSET_SECS}"))?;

    DateTime::from_timestamp(epoch, 0)
        .map(|date| date.with_timezone(&offset))
        .ok_or_else(|| anyhow!("interval {rolling_start_interval_number} is out of range"))
}

pub fn format_interval_date(rolling_start_interval_number: i32) -> Result<String> {
    Ok(interval_to_date(rolling_start_interval_number)?
        .format(DATE_FORMAT)
        .to_string())
}

/// Fields of one data row, comment last.
pub fn to_record(bucket: &StatisticsBucket) -> Result<Vec<String>> {
    let mut row = vec![
        bucket.created.to_string(),
        bucket.rolling_start_interval_number.to_string(),
        format_interval_date(bucket.rolling_start_interval_number)?,
    ];

    row.extend(
        [
            bucket.key_count,
            bucket.valid_key_count,
            bucket.invalid_key_data_count,
            bucket.invalid_transmission_risk_level_count,
            bucket.invalid_report_type_count,
            bucket.invalid_days_since_onset_count,
            bucket.has_not_report_type_count,
            bucket.has_not_days_since_onset_count,
        ]
        .iter()
        .chain(&bucket.transmission_risk_level_distribution)
        .chain(&bucket.report_type_distribution)
        .chain(&bucket.days_since_onset_distribution)
        .map(u64::to_string),
    );

    row.push(bucket.comment.clone());
    Ok(row)
}

/// Writes the header and one row per bucket to `sink`.
pub fn write_report<W: Write>(
    buckets: &[StatisticsBucket],
    sink: W,
    order: ReportOrder,
) -> Result<()> {
    let mut rows: Vec<&StatisticsBucket> = buckets.iter().collect();
    if order == ReportOrder::Descending {
        rows.sort_by(|l, r| StatisticsBucket::compare(l, r));
    }

    // rows are one field wider than the header
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .terminator(Terminator::CRLF)
        .from_writer(sink);

    writer.write_record(HEADER)?;
    for bucket in rows {
        writer.write_record(to_record(bucket)?)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes the report to `path`, replacing any existing file.
pub fn write_report_file(
    path: &Path,
    buckets: &[StatisticsBucket],
    order: ReportOrder,
) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;
    write_report(buckets, file, order)?;

    info!(path = %path.display(), rows = buckets.len(), "Report written");
    Ok(())
}

/// Logs bucket statistics using Rust's debug pretty-print format.
pub fn print_pretty(bucket: &StatisticsBucket) {
    debug!("{:#?}", bucket);
}

pub fn transmission_risk_level_label(level: i32) -> &'static str {
    match level {
        0 => "Unused/Custom",
        1 => "Confirmed test: Low transmission risk level",
        2 => "Confirmed test: Standard transmission risk level",
        3 => "Confirmed test: High transmission risk level",
        4 => "Confirmed clinical diagnosis",
        5 => "Self report",
        6 => "Negative case",
        7 => "Recursive case",
        _ => "Out of range",
    }
}

pub fn report_type_label(report_type: Option<i32>) -> &'static str {
    match report_type {
        None => "N/A",
        Some(0) => "unknown",
        Some(1) => "confirmedTest",
        Some(2) => "confirmedClinicalDiagnosis",
        Some(3) => "selfReported",
        Some(4) => "recursive",
        Some(5) => "revoked",
        Some(_) => "Out of range",
    }
}

fn print_key(key: &KeyRecord, index: usize, revised: bool) {
    let days = key
        .days_since_onset_of_symptoms
        .map_or_else(|| "N/A".to_string(), |d| d.to_string());
    let rolling_minutes = i64::from(key.rolling_period) * EN_INTERVAL_WINDOW_SECS / 60;

    info!(
        index,
        revised,
        key_data = %BASE64.encode(&key.key_data),
        transmission_risk_level = transmission_risk_level_label(key.transmission_risk_level),
        rolling_start_interval_number = key.rolling_start_interval_number,
        rolling_period = key.rolling_period,
        rolling_minutes,
        report_type = report_type_label(key.report_type),
        days_since_onset_of_symptoms = %days,
        "Key"
    );
}

/// Logs a decoded bundle's metadata followed by every key and revised key.
pub fn print_bundle(label: &str, bundle: &ExportBundle) {
    info!(
        bundle = label,
        start_timestamp = bundle.start_timestamp,
        end_timestamp = bundle.end_timestamp,
        region = %bundle.region,
        batch_num = bundle.batch_num,
        batch_size = bundle.batch_size,
        keys = bundle.keys.len(),
        revised_keys = bundle.revised_keys.len(),
        "Bundle"
    );

    for (index, key) in bundle.keys.iter().enumerate() {
        print_key(key, index, false);
    }
    for (index, key) in bundle.revised_keys.iter().enumerate() {
        print_key(key, index, true);
    }
}
