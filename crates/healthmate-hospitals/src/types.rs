use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Device coordinates in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A hospital near the position it was fetched for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub distance_meters: f64,
}

/// Where the hospitals in a refresh result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Freshly queried from the map service
    Fetched,
    /// Served from the local cache
    Cached,
    /// Nothing fetched and nothing cached
    Empty,
}

/// Result of a single refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub hospitals: Vec<HospitalRecord>,
    pub last_updated: Option<DateTime<Utc>>,
    pub source: DataSource,
    /// Human-readable note to display, e.g. when a fetch fell back to cache
    pub advisory: Option<String>,
}

impl RefreshOutcome {
    pub fn empty(advisory: Option<String>) -> Self {
        Self {
            hospitals: Vec::new(),
            last_updated: None,
            source: DataSource::Empty,
            advisory,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.source != DataSource::Fetched
    }
}

/// Everything a consumer needs to render the nearby-hospitals view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalsSnapshot {
    pub hospitals: Vec<HospitalRecord>,
    /// RFC 3339 timestamp of the data currently shown
    pub last_updated: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_offline: bool,
}

pub(crate) fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Position acquisition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location service unavailable")]
    ServiceUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Other(String),
}

/// Failures inside the hospital subsystem.
///
/// None of these reach the consumer as hard errors; the manager turns each
/// into a fallback plus, at most, an advisory string.
#[derive(Debug, thiserror::Error)]
pub enum HospitalError {
    #[error("Position unavailable: {0}")]
    PositionUnavailable(#[from] LocationError),
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(#[from] reqwest::Error),
    #[error("Map service returned status {0}")]
    Status(u16),
    #[error("Cached data is corrupt: {0}")]
    CacheCorrupt(String),
    #[error("Cached data expired")]
    CacheExpired,
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Cache write failed: {0}")]
    CacheWrite(String),
}
