//! Core types for the replay engine
//!
//! This module defines the raw records consumed from a timing source (shaped
//! after the OpenF1 JSON documents), the error taxonomy, and the time helpers
//! shared by every other module. Simulated time is always integer
//! milliseconds since the Unix epoch.

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Simulated timestamp in milliseconds since the Unix epoch
pub type SimTime = i64;

/// Result type for replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Errors that can occur while loading or replaying a session
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("No drivers returned for session {0}")]
    NoDrivers(u32),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Lap {lap_number} dropped: {reason}")]
    DataGap { lap_number: u32, reason: String },

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ReplayError {
    /// True for errors that abort a session load
    pub fn is_bootstrap(&self) -> bool {
        matches!(
            self,
            ReplayError::SessionNotFound
                | ReplayError::NoDrivers(_)
                | ReplayError::InvalidTimestamp(_)
        )
    }
}

/// Parse an RFC 3339 timestamp into simulated milliseconds
pub fn parse_timestamp(value: &str) -> Result<SimTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| ReplayError::InvalidTimestamp(format!("{:?}: {}", value, e)))
}

/// Convert a duration in seconds to whole milliseconds
pub fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Format a simulated timestamp as a UTC wall-clock time (HH:MM:SS)
pub fn format_clock(time: SimTime) -> String {
    match DateTime::from_timestamp_millis(time) {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => "—".to_string(),
    }
}

/// Query used to locate a session at the timing source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    pub country: String,
    pub session_name: String,
    pub year: i32,
}

/// Session metadata as returned by the timing source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_key: u32,
    #[serde(default)]
    pub meeting_key: Option<u32>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub circuit_short_name: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub date_start: String,
    pub date_end: String,
}

/// Driver entry list record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub driver_number: u32,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name_acronym: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    /// Hex colour without the leading `#`
    #[serde(default)]
    pub team_colour: Option<String>,
}

/// Classification record with per-phase best durations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub driver_number: u32,
    #[serde(default)]
    pub number_of_laps: Option<u32>,
    /// Best time per qualifying phase, indexed by phase number - 1
    #[serde(default, deserialize_with = "deserialize_phase_durations")]
    pub duration: Vec<Option<f64>>,
    #[serde(default)]
    pub position: Option<u32>,
}

/// Race control record; only those carrying a qualifying phase matter here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub date: String,
    #[serde(default)]
    pub qualifying_phase: Option<u8>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One lap as returned by the timing source, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLap {
    pub lap_number: u32,
    #[serde(default)]
    pub driver_number: Option<u32>,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub is_pit_out_lap: Option<bool>,
    #[serde(default)]
    pub duration_sector_1: Option<f64>,
    #[serde(default)]
    pub duration_sector_2: Option<f64>,
    #[serde(default)]
    pub duration_sector_3: Option<f64>,
    #[serde(default)]
    pub lap_duration: Option<f64>,
    /// Minisector codes; a `null` entry is a minisector with no status
    #[serde(default)]
    pub segments_sector_1: Option<Vec<Option<u16>>>,
    #[serde(default)]
    pub segments_sector_2: Option<Vec<Option<u16>>>,
    #[serde(default)]
    pub segments_sector_3: Option<Vec<Option<u16>>>,
}

/// Parse a JSON array of records, skipping elements that do not fit `T`
///
/// Only a document that is not a JSON array at all is an error.
pub fn parse_records<T: DeserializeOwned>(json: &str) -> Result<Vec<T>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("Skipping malformed record: {}", e);
                None
            }
        })
        .collect();
    if records.len() < total {
        log::debug!("Kept {} of {} records", records.len(), total);
    }
    Ok(records)
}

/// Results documents carry either an array (qualifying) or a single number
fn deserialize_phase_durations<'de, D>(deserializer: D) -> std::result::Result<Vec<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Durations {
        Many(Vec<Option<f64>>),
        One(Option<f64>),
    }

    Ok(match Durations::deserialize(deserializer)? {
        Durations::Many(values) => values,
        Durations::One(Some(value)) => vec![Some(value)],
        Durations::One(None) => Vec::new(),
    })
}

/// Display category of a minisector status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MinisectorCategory {
    Yellow,
    Green,
    Purple,
    PitLane,
    Empty,
    Unknown,
}

impl MinisectorCategory {
    /// Map a raw minisector code to its display category
    pub fn from_code(code: u16) -> Self {
        match code {
            2048 => MinisectorCategory::Yellow,
            2049 => MinisectorCategory::Green,
            2051 => MinisectorCategory::Purple,
            2064 => MinisectorCategory::PitLane,
            0 => MinisectorCategory::Empty,
            _ => MinisectorCategory::Unknown,
        }
    }

    /// Category of a minisector entry that may carry no code
    pub fn from_segment(code: Option<u16>) -> Self {
        code.map_or(MinisectorCategory::Unknown, Self::from_code)
    }
}

impl fmt::Display for MinisectorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinisectorCategory::Yellow => write!(f, "yellow"),
            MinisectorCategory::Green => write!(f, "green"),
            MinisectorCategory::Purple => write!(f, "purple"),
            MinisectorCategory::PitLane => write!(f, "pit-lane"),
            MinisectorCategory::Empty => write!(f, "empty"),
            MinisectorCategory::Unknown => write!(f, "unknown"),
        }
    }
}
