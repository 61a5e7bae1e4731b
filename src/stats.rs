use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::bundle::{ExportBundle, KeyRecord};
use crate::validate::{
    DAYS_SINCE_ONSET_RANGE, REPORT_TYPE_RANGE, TRANSMISSION_RISK_LEVEL_RANGE, validate,
};

pub const TRANSMISSION_RISK_LEVELS: usize = 8;
pub const REPORT_TYPES: usize = 6;
pub const DAYS_SINCE_ONSET_DAYS: usize = 29;

/// Validity and value distribution for one contiguous run of keys sharing
/// `(created, rolling_start_interval_number)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsBucket {
    pub created: i64,
    pub rolling_start_interval_number: i32,
    pub key_count: u64,
    pub valid_key_count: u64,

    // failed checks
    pub invalid_key_data_count: u64,
    pub invalid_transmission_risk_level_count: u64,
    pub invalid_report_type_count: u64,
    pub invalid_days_since_onset_count: u64,

    // absent optional fields
    pub has_not_report_type_count: u64,
    pub has_not_days_since_onset_count: u64,

    /// Indexed by level, 0..=7.
    pub transmission_risk_level_distribution: [u64; TRANSMISSION_RISK_LEVELS],
    /// Indexed by report type, 0..=5.
    pub report_type_distribution: [u64; REPORT_TYPES],
    /// Indexed by `days + 14`, covering -14..=14.
    pub days_since_onset_distribution: [u64; DAYS_SINCE_ONSET_DAYS],

    /// Messages of the most recent key in the bucket that failed a check.
    pub comment: String,
}

/// Maps `value` to its slot in a distribution starting at `low`.
fn slot(value: i32, (low, high): (i32, i32)) -> Option<usize> {
    (low..=high)
        .contains(&value)
        .then(|| (value - low) as usize)
}

impl StatisticsBucket {
    pub fn new(created: i64, rolling_start_interval_number: i32) -> Self {
        StatisticsBucket {
            created,
            rolling_start_interval_number,
            key_count: 0,
            valid_key_count: 0,
            invalid_key_data_count: 0,
            invalid_transmission_risk_level_count: 0,
            invalid_report_type_count: 0,
            invalid_days_since_onset_count: 0,
            has_not_report_type_count: 0,
            has_not_days_since_onset_count: 0,
            transmission_risk_level_distribution: [0; TRANSMISSION_RISK_LEVELS],
            report_type_distribution: [0; REPORT_TYPES],
            days_since_onset_distribution: [0; DAYS_SINCE_ONSET_DAYS],
            comment: String::new(),
        }
    }

    /// Builds a bucket from keys that all share `rolling_start_interval_number`.
    pub fn from_keys<'a>(
        created: i64,
        rolling_start_interval_number: i32,
        keys: impl IntoIterator<Item = &'a KeyRecord>,
    ) -> Self {
        let mut s = StatisticsBucket::new(created, rolling_start_interval_number);
        for key in keys {
            s.record(key);
        }
        s
    }

    /// Folds one key into the counters.
    pub fn record(&mut self, key: &KeyRecord) {
        self.key_count += 1;

        let result = validate(key);

        if !result.transmission_risk_level_ok {
            self.invalid_transmission_risk_level_count += 1;
        }
        if !result.report_type_ok {
            self.invalid_report_type_count += 1;
        }
        if !result.days_since_onset_ok {
            self.invalid_days_since_onset_count += 1;
        }
        if !result.key_data_ok {
            self.invalid_key_data_count += 1;
        }

        if result.is_valid() {
            self.valid_key_count += 1;
        } else {
            self.comment = result.messages.join("|");
        }

        match slot(key.transmission_risk_level, TRANSMISSION_RISK_LEVEL_RANGE) {
            Some(i) => self.transmission_risk_level_distribution[i] += 1,
            None => warn!(
                created = self.created,
                value = key.transmission_risk_level,
                "transmission_risk_level outside distribution, not counted"
            ),
        }

        match key.report_type {
            Some(report_type) => match slot(report_type, REPORT_TYPE_RANGE) {
                Some(i) => self.report_type_distribution[i] += 1,
                None => warn!(
                    created = self.created,
                    value = report_type,
                    "report_type outside distribution, not counted"
                ),
            },
            None => self.has_not_report_type_count += 1,
        }

        match key.days_since_onset_of_symptoms {
            Some(days) => match slot(days, DAYS_SINCE_ONSET_RANGE) {
                Some(i) => self.days_since_onset_distribution[i] += 1,
                None => warn!(
                    created = self.created,
                    value = days,
                    "days_since_onset_of_symptoms outside distribution, not counted"
                ),
            },
            None => self.has_not_days_since_onset_count += 1,
        }
    }

    /// Count for a single transmission risk level; 0 outside 0..=7.
    pub fn transmission_risk_level_count(&self, level: i32) -> u64 {
        slot(level, TRANSMISSION_RISK_LEVEL_RANGE)
            .map_or(0, |i| self.transmission_risk_level_distribution[i])
    }

    pub fn report_type_count(&self, report_type: i32) -> u64 {
        slot(report_type, REPORT_TYPE_RANGE).map_or(0, |i| self.report_type_distribution[i])
    }

    pub fn days_since_onset_count(&self, days: i32) -> u64 {
        slot(days, DAYS_SINCE_ONSET_RANGE).map_or(0, |i| self.days_since_onset_distribution[i])
    }

    /// Newest first: `created` descending, then interval descending.
    pub fn compare(l: &Self, r: &Self) -> Ordering {
        r.created
            .cmp(&l.created)
            .then(r.rolling_start_interval_number.cmp(&l.rolling_start_interval_number))
    }
}

/// Aggregates `(created, bundle)` entries into buckets.
///
/// Grouping is by contiguous runs, not a global group-by: entries are split
/// into runs of equal `created`, the keys of each run are concatenated in
/// entry order and split again into runs of equal interval number. A key
/// reappearing after a different value starts a new bucket. Revised keys are
/// not counted.
pub fn fold(entries: &[(i64, ExportBundle)]) -> Vec<StatisticsBucket> {
    let mut buckets = Vec::new();

    for run in entries.chunk_by(|(a, _), (b, _)| a == b) {
        let created = run[0].0;
        let keys: Vec<&KeyRecord> = run.iter().flat_map(|(_, bundle)| &bundle.keys).collect();

        for interval_run in keys.chunk_by(|a, b| {
            a.rolling_start_interval_number == b.rolling_start_interval_number
        }) {
            let interval = interval_run[0].rolling_start_interval_number;
            buckets.push(StatisticsBucket::from_keys(
                created,
                interval,
                interval_run.iter().copied(),
            ));
        }
    }

    debug!(
        entries = entries.len(),
        buckets = buckets.len(),
        "Statistics folded"
    );
    buckets
}
