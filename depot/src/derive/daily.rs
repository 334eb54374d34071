//! Per-day aggregation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::region::day_of;
use crate::schema::Record;

/// Days in the trailing moving average.
pub const MOVING_AVERAGE_DAYS: usize = 3;

/// One day of an aggregated table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub day: NaiveDate,
    /// Sum (or count) for the day.
    pub value: f64,
    /// Trailing mean of `value` over up to [`MOVING_AVERAGE_DAYS`] days.
    pub moving_average: f64,
}

/// Group by UTC day and fold each record into the day's value.
///
/// Records without `time_ms` are skipped. Only days with at least one
/// contributing record appear; rows are ascending by day.
fn aggregate<'a, I, F>(records: I, value: F) -> Vec<DailyRow>
where
    I: IntoIterator<Item = &'a Record>,
    F: Fn(&Record) -> Option<f64>,
{
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in records {
        let Some(day) = record.time_ms.and_then(day_of) else {
            continue;
        };
        let Some(v) = value(record) else {
            continue;
        };
        *days.entry(day).or_insert(0.0) += v;
    }

    let values: Vec<(NaiveDate, f64)> = days.into_iter().collect();
    values
        .iter()
        .enumerate()
        .map(|(i, &(day, value))| {
            let from = (i + 1).saturating_sub(MOVING_AVERAGE_DAYS);
            let trailing = &values[from..=i];
            let mean = trailing.iter().map(|(_, v)| v).sum::<f64>() / trailing.len() as f64;
            DailyRow {
                day,
                value,
                moving_average: mean,
            }
        })
        .collect()
}

/// Daily sum of `amount`. A missing amount counts as zero for its day.
pub fn daily_amount(records: &[Record]) -> Vec<DailyRow> {
    aggregate(records, |r| Some(r.amount.unwrap_or(0.0)))
}

/// Daily number of records (alert-style tables).
pub fn daily_count(records: &[Record]) -> Vec<DailyRow> {
    aggregate(records, |_| Some(1.0))
}

/// Daily sum of `probable_variation_max`, over records that have one.
pub fn daily_probable_variation(records: &[Record]) -> Vec<DailyRow> {
    aggregate(records, |r| r.probable_variation_max)
}

/// Sum of the daily values of a table.
pub fn total(rows: &[DailyRow]) -> f64 {
    rows.iter().map(|r| r.value).sum()
}
