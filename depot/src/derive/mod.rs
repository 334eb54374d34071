//! Derived views over a region's raw tables.
//!
//! Everything here is a pure function of the [`RawBundle`]: the same input
//! always serializes to the same bytes. Every named view exists in every
//! [`DerivedBundle`], empty when its inputs are.

mod daily;
mod rates;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::schema::{RawBundle, Record, TableName};
use crate::Region;

pub use daily::{daily_amount, daily_count, daily_probable_variation, total, DailyRow, MOVING_AVERAGE_DAYS};
pub use rates::{percent, round2, AlertRates, FuelSummary, GasRatios, ReviewRates};

/// Tags recognized for the classification subset when none are configured.
pub const DEFAULT_CLASSIFICATION_TAGS: &[&str] = &["USFS"];

/// Category used for data-loss records without one.
pub const UNKNOWN_LOSS_TYPE: &str = "Unknown";

/// Names of the daily aggregate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DerivedName {
    TheftDaily,
    FillDaily,
    LowFuelDaily,
    TheftCevDaily,
    FillCevDaily,
    TheftPvDaily,
    FillPvDaily,
    TheftUsfsDaily,
    FillUsfsDaily,
}

impl DerivedName {
    pub const ALL: [DerivedName; 9] = [
        DerivedName::TheftDaily,
        DerivedName::FillDaily,
        DerivedName::LowFuelDaily,
        DerivedName::TheftCevDaily,
        DerivedName::FillCevDaily,
        DerivedName::TheftPvDaily,
        DerivedName::FillPvDaily,
        DerivedName::TheftUsfsDaily,
        DerivedName::FillUsfsDaily,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedName::TheftDaily => "theft_daily",
            DerivedName::FillDaily => "fill_daily",
            DerivedName::LowFuelDaily => "low_fuel_daily",
            DerivedName::TheftCevDaily => "theft_cev_daily",
            DerivedName::FillCevDaily => "fill_cev_daily",
            DerivedName::TheftPvDaily => "theft_pv_daily",
            DerivedName::FillPvDaily => "fill_pv_daily",
            DerivedName::TheftUsfsDaily => "theft_usfs_daily",
            DerivedName::FillUsfsDaily => "fill_usfs_daily",
        }
    }
}

impl fmt::Display for DerivedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The nine daily tables, indexed by [`DerivedName`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTables([Vec<DailyRow>; 9]);

impl Index<DerivedName> for DailyTables {
    type Output = Vec<DailyRow>;

    fn index(&self, name: DerivedName) -> &Self::Output {
        &self.0[name as usize]
    }
}

impl Serialize for DailyTables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for name in DerivedName::ALL {
            map.serialize_entry(name.as_str(), &self[name])?;
        }
        map.end()
    }
}

/// Strict partition of a table by the off-highway discriminator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HighwaySplit {
    pub on_highway: Vec<Record>,
    pub off_highway: Vec<Record>,
}

impl HighwaySplit {
    pub fn new(records: &[Record]) -> Self {
        let (off_highway, on_highway) = records.iter().cloned().partition(Record::is_off_highway);
        Self {
            on_highway,
            off_highway,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LossTypeCount {
    pub loss_type: String,
    pub count: usize,
}

/// Data-loss counts per category, ordered by category.
pub fn loss_summary(records: &[Record]) -> Vec<LossTypeCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        let loss_type = record.loss_type.as_deref().unwrap_or(UNKNOWN_LOSS_TYPE);
        *counts.entry(loss_type).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(loss_type, count)| LossTypeCount {
            loss_type: loss_type.to_string(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionLossCount {
    pub region: Region,
    pub loss_type: String,
    pub count: usize,
}

/// Concatenate per-region loss summaries into one table tagged by region.
pub fn combine_loss_summaries<'a, I>(summaries: I) -> Vec<RegionLossCount>
where
    I: IntoIterator<Item = (Region, &'a [LossTypeCount])>,
{
    summaries
        .into_iter()
        .flat_map(|(region, rows)| {
            rows.iter().map(move |row| RegionLossCount {
                region,
                loss_type: row.loss_type.clone(),
                count: row.count,
            })
        })
        .collect()
}

/// Review rates per vehicle population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateTable {
    pub on_highway: AlertRates,
    pub off_highway: AlertRates,
}

/// Headline numbers per vehicle population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryTable {
    pub on_highway: FuelSummary,
    pub off_highway: FuelSummary,
}

/// Raw tables plus every derived view for one region.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedBundle {
    pub raw: RawBundle,
    pub daily: DailyTables,
    /// Theft records carrying a recognized classification tag.
    pub theft_usfs: Vec<Record>,
    /// Refill records carrying a recognized classification tag.
    pub fill_usfs: Vec<Record>,
    pub theft_split: HighwaySplit,
    pub fill_split: HighwaySplit,
    pub data_loss_summary: Vec<LossTypeCount>,
    pub rates: RateTable,
    pub gas_ratios: GasRatios,
    pub summary: SummaryTable,
}

impl DerivedBundle {
    pub fn table(&self, name: TableName) -> &[Record] {
        self.raw.table(name)
    }

    pub fn daily(&self, name: DerivedName) -> &[DailyRow] {
        &self.daily[name]
    }
}

/// Builds derived bundles with a given set of classification tags.
#[derive(Debug, Clone)]
pub struct Assembler {
    tags: Vec<String>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFICATION_TAGS.iter().map(|t| t.to_string()))
    }
}

impl Assembler {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any of the record's tags is a recognized one (case-sensitive).
    pub fn is_classified(&self, record: &Record) -> bool {
        record.tags.iter().any(|tag| self.tags.contains(tag))
    }

    fn classified(&self, records: &[Record]) -> Vec<Record> {
        records
            .iter()
            .filter(|r| self.is_classified(r))
            .cloned()
            .collect()
    }

    pub fn assemble(&self, raw: RawBundle) -> DerivedBundle {
        let theft = raw.table(TableName::Theft);
        let fill = raw.table(TableName::Fill);
        let theft_cev = raw.table(TableName::TheftCev);
        let fill_cev = raw.table(TableName::FillCev);

        let theft_usfs = self.classified(theft);
        let fill_usfs = self.classified(fill);

        let daily = DailyTables([
            daily_amount(theft),
            daily_amount(fill),
            daily_count(raw.table(TableName::LowFuel)),
            daily_amount(theft_cev),
            daily_amount(fill_cev),
            daily_probable_variation(theft),
            daily_probable_variation(fill),
            daily_amount(&theft_usfs),
            daily_amount(&fill_usfs),
        ]);

        let rates = RateTable {
            on_highway: AlertRates::new(fill, theft),
            off_highway: AlertRates::new(fill_cev, theft_cev),
        };
        let summary = SummaryTable {
            on_highway: FuelSummary::new(&daily[DerivedName::FillDaily], &daily[DerivedName::TheftDaily]),
            off_highway: FuelSummary::new(
                &daily[DerivedName::FillCevDaily],
                &daily[DerivedName::TheftCevDaily],
            ),
        };

        DerivedBundle {
            theft_split: HighwaySplit::new(theft),
            fill_split: HighwaySplit::new(fill),
            data_loss_summary: loss_summary(raw.table(TableName::DataLoss)),
            gas_ratios: GasRatios::new(fill),
            theft_usfs,
            fill_usfs,
            daily,
            rates,
            summary,
            raw,
        }
    }
}

/// Assemble with the default classification tags.
pub fn assemble(raw: RawBundle) -> DerivedBundle {
    Assembler::default().assemble(raw)
}
