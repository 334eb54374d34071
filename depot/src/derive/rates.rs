//! Rate and ratio tables.
//!
//! All rates are percentages rounded to two decimals. A zero denominator
//! gives a rate of 0.

use serde::Serialize;

use super::daily::{total, DailyRow};
use crate::schema::Record;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as a percentage; 0 when `whole` is 0.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// Human review outcome for one alert type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewRates {
    /// Alerts a reviewer marked as ignored.
    pub ignored: usize,
    pub total: usize,
    pub true_positive_pct: f64,
    pub false_positive_pct: f64,
}

impl ReviewRates {
    pub fn from_records(records: &[Record], is_ignored: impl Fn(&Record) -> bool) -> Self {
        let total = records.len();
        let ignored = records.iter().filter(|r| is_ignored(*r)).count();
        Self {
            ignored,
            total,
            true_positive_pct: percent(total - ignored, total),
            false_positive_pct: percent(ignored, total),
        }
    }
}

/// Review rates for refills and thefts of one vehicle population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertRates {
    pub refill: ReviewRates,
    pub theft: ReviewRates,
}

impl AlertRates {
    pub fn new(fills: &[Record], thefts: &[Record]) -> Self {
        Self {
            refill: ReviewRates::from_records(fills, Record::is_ignored_fill),
            theft: ReviewRates::from_records(thefts, Record::is_ignored_theft),
        }
    }
}

/// Share of gas refills that reported a mass reading, per gas type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GasRatios {
    pub lng_pct: f64,
    pub cng_pct: f64,
}

impl GasRatios {
    pub fn new(fills: &[Record]) -> Self {
        Self {
            lng_pct: kgs_reporting_pct(fills, "lng"),
            cng_pct: kgs_reporting_pct(fills, "cng"),
        }
    }
}

fn kgs_reporting_pct(fills: &[Record], fuel_type: &str) -> f64 {
    let of_type: Vec<&Record> = fills
        .iter()
        .filter(|r| {
            r.fuel_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(fuel_type))
        })
        .collect();
    let with_amount = of_type.iter().filter(|r| r.amount.is_some()).count();
    let with_kgs = of_type.iter().filter(|r| r.amount_kgs.is_some()).count();
    percent(with_kgs, with_amount)
}

/// Headline numbers for one vehicle population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FuelSummary {
    pub total_theft: f64,
    pub total_refill: f64,
    /// Latest moving average, truncated to whole units.
    pub theft_moving_average: i64,
    pub refill_moving_average: i64,
}

impl FuelSummary {
    pub fn new(fill_daily: &[DailyRow], theft_daily: &[DailyRow]) -> Self {
        let last_average = |rows: &[DailyRow]| rows.last().map_or(0, |r| r.moving_average as i64);
        Self {
            total_theft: round2(total(theft_daily)),
            total_refill: round2(total(fill_daily)),
            theft_moving_average: last_average(theft_daily),
            refill_moving_average: last_average(fill_daily),
        }
    }
}
