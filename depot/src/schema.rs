//! Record and table definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Error, Window};

/// One telemetry event (theft, refill, low-fuel alert, data loss).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Event time in epoch millis. Used for ordering and window filtering.
    #[serde(default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<i64>,

    /// Event time as delivered by the source (ISO string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,

    /// Fuel amount in the region's unit.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    /// Mass reading for gas (LNG/CNG) refills, when the sensor reports one.
    #[serde(
        rename = "Amount_kgs",
        alias = "amount_kgs",
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount_kgs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,

    /// Free-form variation text, e.g. "10-15 L".
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub probable_variation: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub probable_variation_max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_fuel_theft_ignore: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_fuel_filling_ignore: Option<bool>,

    /// Classification tags (e.g. "USFS").
    #[serde(default, alias = "usfs", deserialize_with = "lenient_tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Off-highway equipment discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_highway: Option<bool>,

    /// Data-loss category.
    #[serde(
        default,
        alias = "data_loss_type",
        alias = "Data loss type",
        skip_serializing_if = "Option::is_none"
    )]
    pub loss_type: Option<String>,

    /// Fields the depot does not interpret, kept so stored tables round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Largest number appearing in a free-form variation string.
///
/// "10-15 L" -> 15, "±7.5" -> 7.5, "n/a" -> None.
pub fn parse_probable_variation_max(text: &str) -> Option<f64> {
    NUMBER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .fold(None, |max: Option<f64>, n| Some(max.map_or(n, |m| m.max(n))))
}

impl Record {
    /// Create a record at `time_ms` with an amount. Mostly for tests and fixtures.
    pub fn at(time_ms: i64, amount: f64) -> Self {
        Self {
            time_ms: Some(time_ms),
            amount: Some(amount),
            ..Default::default()
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Fill in derived fields the source may have left out.
    ///
    /// - `time_ms` from `time` (numeric millis or RFC 3339)
    /// - `probable_variation_max` from `probable_variation`
    pub fn normalize(mut self) -> Self {
        if self.time_ms.is_none() {
            self.time_ms = self.time.as_deref().and_then(parse_time_ms);
        }
        if self.probable_variation_max.is_none() {
            self.probable_variation_max = self
                .probable_variation
                .as_deref()
                .and_then(parse_probable_variation_max);
        }
        self
    }

    pub fn is_ignored_theft(&self) -> bool {
        self.alert_fuel_theft_ignore == Some(true)
    }

    pub fn is_ignored_fill(&self) -> bool {
        self.alert_fuel_filling_ignore == Some(true)
    }

    pub fn is_off_highway(&self) -> bool {
        self.off_highway == Some(true)
    }
}

fn parse_time_ms(time: &str) -> Option<i64> {
    let time = time.trim();
    if let Ok(ms) = time.parse::<i64>() {
        return Some(ms);
    }
    DateTime::parse_from_rfc3339(time)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Tags arrive either as a list or as a single comma-separated string.
fn lenient_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}

/// Parse a JSON-lines table. Blank lines are skipped.
pub fn parse_jsonl(content: &str) -> serde_json::Result<Vec<Record>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<Record>(line).map(Record::normalize))
        .collect()
}

/// Serialize records as JSON lines (one record per line, trailing newline).
pub fn to_jsonl(records: &[Record]) -> serde_json::Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// The fixed set of raw tables every region bundle carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableName {
    Theft,
    Fill,
    LowFuel,
    DataLoss,
    TheftCev,
    FillCev,
}

impl TableName {
    pub const ALL: [TableName; 6] = [
        TableName::Theft,
        TableName::Fill,
        TableName::LowFuel,
        TableName::DataLoss,
        TableName::TheftCev,
        TableName::FillCev,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Theft => "theft",
            TableName::Fill => "fill",
            TableName::LowFuel => "low_fuel",
            TableName::DataLoss => "data_loss",
            TableName::TheftCev => "theft_cev",
            TableName::FillCev => "fill_cev",
        }
    }

    /// Object name in a region namespace.
    pub fn file_name(&self) -> String {
        format!("{}.jsonl", self.as_str())
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Unknown table '{}'", s)))
    }
}

/// Raw tables for one region. Every table in [`TableName::ALL`] is present;
/// missing data is an empty table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBundle {
    tables: [Vec<Record>; 6],
}

impl RawBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: TableName) -> &[Record] {
        &self.tables[name.index()]
    }

    pub fn set(&mut self, name: TableName, records: Vec<Record>) {
        self.tables[name.index()] = records;
    }

    pub fn with_table(mut self, name: TableName, records: Vec<Record>) -> Self {
        self.set(name, records);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableName, &[Record])> {
        TableName::ALL
            .into_iter()
            .map(move |name| (name, self.table(name)))
    }

    pub fn total_records(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }

    /// Keep only records inside `window`.
    ///
    /// A table where no record carries `time_ms` (including an empty one)
    /// passes through untouched. Otherwise records without `time_ms` are
    /// dropped along with those outside the bound.
    pub fn filter_window(self, window: Window) -> Self {
        let tables = self.tables.map(|records| {
            if records.iter().all(|r| r.time_ms.is_none()) {
                return records;
            }
            records
                .into_iter()
                .filter(|r| r.time_ms.is_some_and(|t| window.contains(t)))
                .collect()
        });
        Self { tables }
    }

    /// Latest `time_ms` across all tables.
    pub fn latest_time_ms(&self) -> Option<i64> {
        self.tables
            .iter()
            .flatten()
            .filter_map(|r| r.time_ms)
            .max()
    }
}

impl Index<TableName> for RawBundle {
    type Output = Vec<Record>;

    fn index(&self, name: TableName) -> &Self::Output {
        &self.tables[name.index()]
    }
}

impl IndexMut<TableName> for RawBundle {
    fn index_mut(&mut self, name: TableName) -> &mut Self::Output {
        &mut self.tables[name.index()]
    }
}

impl Serialize for RawBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for (name, records) in self.iter() {
            map.serialize_entry(name.as_str(), records)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probable_variation_max() {
        assert_eq!(parse_probable_variation_max("10-15 L"), Some(15.0));
        assert_eq!(parse_probable_variation_max("±7.5"), Some(7.5));
        assert_eq!(parse_probable_variation_max("n/a"), None);
    }

    #[test]
    fn test_parse_jsonl_lenient_fields() {
        let content = concat!(
            r#"{"time_ms": 1700000000000, "vehicle_id": 42, "amount": "12.5", "probable_variation": "5-8"}"#,
            "\n\n",
            r#"{"time": "2024-01-01T00:00:00Z", "vehicle_id": "TRK-7", "usfs": "USFS, Region 5", "custom": 1}"#,
            "\n",
        );
        let records = parse_jsonl(content).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].vehicle_id.as_deref(), Some("42"));
        assert_eq!(records[0].amount, Some(12.5));
        assert_eq!(records[0].probable_variation_max, Some(8.0));

        assert_eq!(records[1].time_ms, Some(1_704_067_200_000));
        assert_eq!(records[1].tags, vec!["USFS", "Region 5"]);
        assert_eq!(records[1].extra.get("custom"), Some(&Value::from(1)));
    }

    #[test]
    fn test_jsonl_keeps_unknown_fields() {
        let line = r#"{"time_ms":5,"amount":1.0,"driver":"ana"}"#;
        let records = parse_jsonl(line).unwrap();
        let out = to_jsonl(&records).unwrap();
        assert!(out.contains(r#""driver":"ana""#));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_parse_jsonl_rejects_garbage() {
        assert!(parse_jsonl("{not json").is_err());
    }

    #[test]
    fn test_bundle_always_has_every_table() {
        let bundle = RawBundle::new();
        let names: Vec<_> = bundle.iter().map(|(name, records)| {
            assert!(records.is_empty());
            name
        }).collect();
        assert_eq!(names, TableName::ALL.to_vec());

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_filter_window_bounds() {
        let bundle = RawBundle::new().with_table(
            TableName::Theft,
            vec![Record::at(99, 1.0), Record::at(100, 1.0), Record::at(200, 1.0), Record::at(201, 1.0)],
        );
        let filtered = bundle.filter_window(Window::new(100, 200));
        let times: Vec<_> = filtered[TableName::Theft].iter().map(|r| r.time_ms).collect();
        assert_eq!(times, vec![Some(100), Some(200)]);
    }

    #[test]
    fn test_filter_window_passes_untimed_tables() {
        let untimed = Record {
            amount: Some(3.0),
            ..Default::default()
        };
        let bundle = RawBundle::new().with_table(TableName::DataLoss, vec![untimed.clone()]);
        let filtered = bundle.filter_window(Window::new(0, 10));
        assert_eq!(filtered[TableName::DataLoss], vec![untimed]);
    }

    #[test]
    fn test_table_name_parse() {
        assert_eq!("fill_cev".parse::<TableName>().unwrap(), TableName::FillCev);
        assert_eq!(TableName::LowFuel.file_name(), "low_fuel.jsonl");
        assert!("fuel".parse::<TableName>().is_err());
    }
}
