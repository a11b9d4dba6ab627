//! Domain data model: commutes, trip history, route options and traffic.

use std::fmt::{self, Display};
use std::str::FromStr;

use jiff::Timestamp;
use jiff::civil::{Time, Weekday};
use serde::{Deserialize, Serialize};

use crate::polyline::Polyline;

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Live traffic classification for a route.
///
/// `Free` through `Severe` are ordered; `Unknown` sits outside that order
/// and encodes as the middle of the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    Free,
    Light,
    Moderate,
    Heavy,
    Severe,
    #[default]
    Unknown,
}

impl TrafficLevel {
    pub const ALL: [TrafficLevel; 6] = [
        TrafficLevel::Free,
        TrafficLevel::Light,
        TrafficLevel::Moderate,
        TrafficLevel::Heavy,
        TrafficLevel::Severe,
        TrafficLevel::Unknown,
    ];

    /// Position on the congestion scale, `None` for `Unknown`.
    pub fn rank(self) -> Option<u8> {
        match self {
            TrafficLevel::Free => Some(0),
            TrafficLevel::Light => Some(1),
            TrafficLevel::Moderate => Some(2),
            TrafficLevel::Heavy => Some(3),
            TrafficLevel::Severe => Some(4),
            TrafficLevel::Unknown => None,
        }
    }

    /// Numeric encoding used for both training and inference features.
    pub fn ordinal(self) -> f64 {
        match self.rank() {
            Some(rank) => rank as f64,
            None => UNKNOWN_TRAFFIC_ORDINAL,
        }
    }

    pub fn is_known(self) -> bool {
        self.rank().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrafficLevel::Free => "free",
            TrafficLevel::Light => "light",
            TrafficLevel::Moderate => "moderate",
            TrafficLevel::Heavy => "heavy",
            TrafficLevel::Severe => "severe",
            TrafficLevel::Unknown => "unknown",
        }
    }
}

/// Mid-scale sentinel for an unclassified traffic level.
pub const UNKNOWN_TRAFFIC_ORDINAL: f64 = 2.0;

impl Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TrafficLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown traffic level {:?}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Minor,
    Moderate,
    Major,
    Severe,
    Critical,
}

impl IncidentSeverity {
    pub fn is_severe(self) -> bool {
        matches!(
            self,
            IncidentSeverity::Major | IncidentSeverity::Severe | IncidentSeverity::Critical
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<IncidentSeverity>,
}

/// Traffic conditions on one route at one moment, already merged across
/// providers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub level: TrafficLevel,
    /// Observed speed over free-flow speed; 1.0 is free flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_ratio: Option<f64>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub sample_count: usize,
}

impl TrafficSnapshot {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn at_level(level: TrafficLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn has_severe_incident(&self) -> bool {
        self.incidents
            .iter()
            .any(|incident| incident.severity.is_some_and(IncidentSeverity::is_severe))
    }
}

/// Day of week, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub const WORKDAYS: [DayOfWeek; 5] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
    ];

    pub fn from_weekday(weekday: Weekday) -> Self {
        Self::ALL[weekday.to_monday_zero_offset() as usize]
    }

    /// Zero-based offset from Monday.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, DayOfWeek::Saturday | DayOfWeek::Sunday)
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }
}

impl Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input for registering a commute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommute {
    pub name: String,
    pub origin: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_address: Option<String>,
    pub destination: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_departure: Option<Time>,
    #[serde(default = "default_commute_days")]
    pub days_of_week: Vec<DayOfWeek>,
}

fn default_commute_days() -> Vec<DayOfWeek> {
    DayOfWeek::WORKDAYS.to_vec()
}

impl NewCommute {
    pub fn new(name: impl Into<String>, origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            name: name.into(),
            origin,
            origin_address: None,
            destination,
            destination_address: None,
            typical_departure: None,
            days_of_week: default_commute_days(),
        }
    }
}

/// Duration rollups derived from a commute's completed trips.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommuteRollup {
    pub avg_duration_minutes: Option<f64>,
    pub best_duration_minutes: Option<f64>,
    pub worst_duration_minutes: Option<f64>,
}

impl CommuteRollup {
    pub fn from_history(history: &[HistoryEntry]) -> Self {
        let durations: Vec<f64> = history
            .iter()
            .filter(|entry| entry.is_completed())
            .filter_map(|entry| entry.duration_minutes)
            .collect();
        if durations.is_empty() {
            return Self::default();
        }

        let sum: f64 = durations.iter().sum();
        Self {
            avg_duration_minutes: Some(sum / durations.len() as f64),
            best_duration_minutes: durations.iter().copied().reduce(f64::min),
            worst_duration_minutes: durations.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commute {
    pub id: String,
    #[serde(flatten)]
    pub details: NewCommute,
    pub created_at: Timestamp,
    #[serde(default)]
    pub rollup: CommuteRollup,
}

/// Base duration and distance of the route a finished trip took.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteBasis {
    pub base_duration_minutes: f64,
    pub distance_km: f64,
}

/// One tracked trip of a commute.
///
/// Created open when tracking starts and closed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub commute_id: String,
    pub started_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_taken: Option<String>,
    #[serde(default)]
    pub switched_routes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_at_start: Option<TrafficSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_basis: Option<RouteBasis>,
}

impl HistoryEntry {
    /// Ended with a usable duration.
    pub fn is_completed(&self) -> bool {
        self.duration_minutes.is_some_and(f64::is_finite)
    }
}

/// A candidate path for the current request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub geometry: Polyline,
    /// Traffic-free duration.
    pub base_duration_minutes: f64,
    pub distance_km: f64,
    #[serde(default)]
    pub traffic_level: TrafficLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_vs_current: Option<f64>,
}

impl RouteOption {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_duration_minutes: f64,
        distance_km: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            geometry: Polyline::default(),
            base_duration_minutes,
            distance_km,
            traffic_level: TrafficLevel::Unknown,
            predicted_duration_minutes: None,
            confidence: None,
            savings_vs_current: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Polyline) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_traffic_level(mut self, level: TrafficLevel) -> Self {
        self.traffic_level = level;
        self
    }

    pub fn with_prediction(mut self, predicted_duration_minutes: f64, confidence: f64) -> Self {
        self.predicted_duration_minutes = Some(predicted_duration_minutes);
        self.confidence = Some(confidence);
        self
    }

    pub fn basis(&self) -> RouteBasis {
        RouteBasis {
            base_duration_minutes: self.base_duration_minutes,
            distance_km: self.distance_km,
        }
    }
}
