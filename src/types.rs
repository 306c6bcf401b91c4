//! Core types for the TrichMind engine
//!
//! This module defines the data that flows between the store, the streak
//! calculator, the reconciliation policy and the prediction pipeline:
//! calendar days, check-in records and logs, streak snapshots, remote
//! summaries and canonical prediction records.

use crate::error::EngineError;
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A day in the user's local timezone, independent of time-of-day.
///
/// Not an instant: "today" comes from the local wall clock so a
/// check-in made at 23:30 never lands on the following UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Today according to the local wall clock
    pub fn today_local() -> Self {
        Self(Local::now().date_naive())
    }

    /// Parse a `YYYY-MM-DD` string, rejecting anything looser.
    ///
    /// chrono alone accepts `2024-1-5`; persisted keys must be exact.
    pub fn parse_strict(s: &str) -> Result<Self, EngineError> {
        if !is_calendar_day_pattern(s) {
            return Err(EngineError::DateParse(format!(
                "expected YYYY-MM-DD, got {:?}",
                s
            )));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|e| EngineError::DateParse(format!("{}: {}", s, e)))
    }

    /// The previous calendar day, or None at the start of chrono's range
    pub fn pred(&self) -> Option<Self> {
        self.0.pred_opt().map(Self)
    }

    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// Whether `other` is exactly the day after `self`
    pub fn is_followed_by(&self, other: &CalendarDate) -> bool {
        self.succ().as_ref() == Some(other)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for CalendarDate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_strict(s)
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_strict(&raw).map_err(serde::de::Error::custom)
    }
}

fn is_calendar_day_pattern(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// A single daily check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRecord {
    pub date: CalendarDate,
    pub relapsed: bool,
}

impl CheckInRecord {
    pub fn new(date: CalendarDate, relapsed: bool) -> Self {
        Self { date, relapsed }
    }

    pub fn clean(date: CalendarDate) -> Self {
        Self::new(date, false)
    }

    pub fn relapse(date: CalendarDate) -> Self {
        Self::new(date, true)
    }
}

/// Per-day check-in log.
///
/// At most one record per date; iteration is always ascending by date. The
/// log only grows or overwrites, there is no removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<CheckInRecord>", from = "Vec<CheckInRecord>")]
pub struct CheckInLog {
    records: BTreeMap<CalendarDate, CheckInRecord>,
}

impl CheckInLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from records in any order; a later record for the same
    /// date overwrites an earlier one.
    pub fn from_records<I: IntoIterator<Item = CheckInRecord>>(records: I) -> Self {
        let mut log = Self::new();
        for record in records {
            log.records.insert(record.date, record);
        }
        log
    }

    /// Return a new log with `record` written for its date
    pub fn upsert(&self, record: CheckInRecord) -> CheckInLog {
        let mut next = self.clone();
        next.records.insert(record.date, record);
        next
    }

    pub fn get(&self, date: &CalendarDate) -> Option<&CheckInRecord> {
        self.records.get(date)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending date order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CheckInRecord> + ExactSizeIterator {
        self.records.values()
    }

    pub fn first(&self) -> Option<&CheckInRecord> {
        self.records.values().next()
    }

    pub fn last(&self) -> Option<&CheckInRecord> {
        self.records.values().next_back()
    }

    pub fn to_vec(&self) -> Vec<CheckInRecord> {
        self.records.values().copied().collect()
    }
}

impl From<Vec<CheckInRecord>> for CheckInLog {
    fn from(records: Vec<CheckInRecord>) -> Self {
        Self::from_records(records)
    }
}

impl From<CheckInLog> for Vec<CheckInRecord> {
    fn from(log: CheckInLog) -> Self {
        log.to_vec()
    }
}

/// Where the statistics in a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    Local,
    Server,
}

impl StatsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsSource::Local => "local",
            StatsSource::Server => "server",
        }
    }
}

/// Rendered streak statistics. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakSnapshot {
    pub current: u32,
    pub best: u32,
    pub before_relapse: u32,
    pub relapse_days: u32,
    /// Current streak as it stood yesterday, for trend display. Local only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yesterday: Option<u32>,
    pub source: StatsSource,
}

impl StreakSnapshot {
    /// Zeroed server-side snapshot for when no summary could be fetched
    pub fn server_unavailable() -> Self {
        Self {
            current: 0,
            best: 0,
            before_relapse: 0,
            relapse_days: 0,
            yesterday: None,
            source: StatsSource::Server,
        }
    }

    /// Signed change of the current streak since yesterday
    pub fn delta(&self) -> Option<i64> {
        self.yesterday
            .map(|y| i64::from(self.current) - i64::from(y))
    }
}

/// One entry of the summary's trailing fourteen-day window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryDay {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub relapsed: Option<bool>,
}

/// Read-only statistics summary served by the remote service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSummary {
    #[serde(default, deserialize_with = "deserialize_count")]
    pub current_streak: u32,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub previous_streak: u32,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub longest_streak: u32,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub relapse_count: u32,
    #[serde(default, deserialize_with = "deserialize_days")]
    pub last14: Vec<SummaryDay>,
}

/// Counter that may arrive as null, a float or a numeric string; junk reads as 0
fn deserialize_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(n.filter(|f| f.is_finite() && *f > 0.0)
        .map(|f| f.min(f64::from(u32::MAX)) as u32)
        .unwrap_or(0))
}

/// Day window that skips entries which are not day objects
fn deserialize_days<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SummaryDay>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(|item| item.is_object())
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Risk bucket of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

impl RiskBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBucket::Low => "low",
            RiskBucket::Medium => "medium",
            RiskBucket::High => "high",
        }
    }

    /// Numeric code used by the model service (low 0, medium 1, high 2)
    pub fn code(&self) -> u8 {
        match self {
            RiskBucket::Low => 0,
            RiskBucket::Medium => 1,
            RiskBucket::High => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(RiskBucket::Low),
            1 => Some(RiskBucket::Medium),
            2 => Some(RiskBucket::High),
            _ => None,
        }
    }

    /// Case-insensitive parse of a bucket label
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(RiskBucket::Low),
            "medium" => Some(RiskBucket::Medium),
            "high" => Some(RiskBucket::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical prediction record consumed by all downstream code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Probability of high risk, 0-1
    pub risk_score: f64,
    /// Model confidence, 0-1
    pub confidence: f64,
    pub risk_bucket: RiskBucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_code: Option<u8>,
}

/// Outcome reported by the alert dispatch service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDispatchResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of a check-in sync request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInPayload {
    pub relapsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<CalendarDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
