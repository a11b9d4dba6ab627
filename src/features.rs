//! Feature extraction for duration prediction.
//!
//! Turns a route, a local departure time and the live traffic snapshot into
//! a fixed-order numeric vector. The order is part of the trained model's
//! contract: a model fitted on one layout cannot score another.

use std::f64::consts::TAU;

use jiff::civil::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;
use crate::types::{DayOfWeek, RouteOption, TrafficLevel, TrafficSnapshot};
use crate::weather::WeatherImpact;

pub const FEATURE_COUNT: usize = 17;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "hour_sin",
    "hour_cos",
    "dow_sin",
    "dow_cos",
    "month_sin",
    "month_cos",
    "is_weekend",
    "is_morning_rush",
    "is_evening_rush",
    "base_duration_minutes",
    "distance_km",
    "traffic_level",
    "traffic_unknown",
    "speed_ratio",
    "incident_ratio",
    "has_severe_incident",
    "weather_impact",
];

/// Positions of individual features in a [`FeatureVector`].
pub mod index {
    pub const HOUR_SIN: usize = 0;
    pub const HOUR_COS: usize = 1;
    pub const DOW_SIN: usize = 2;
    pub const DOW_COS: usize = 3;
    pub const MONTH_SIN: usize = 4;
    pub const MONTH_COS: usize = 5;
    pub const IS_WEEKEND: usize = 6;
    pub const MORNING_RUSH: usize = 7;
    pub const EVENING_RUSH: usize = 8;
    pub const BASE_DURATION: usize = 9;
    pub const DISTANCE: usize = 10;
    pub const TRAFFIC_LEVEL: usize = 11;
    pub const TRAFFIC_UNKNOWN: usize = 12;
    pub const SPEED_RATIO: usize = 13;
    pub const INCIDENT_RATIO: usize = 14;
    pub const SEVERE_INCIDENT: usize = 15;
    pub const WEATHER_IMPACT: usize = 16;
}

/// Incident counts above this saturate the incident feature.
const MAX_COUNTED_INCIDENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn get(&self, index: usize) -> f64 {
        self.0[index]
    }

    pub fn is_rush_hour(&self) -> bool {
        self.0[index::MORNING_RUSH] > 0.5 || self.0[index::EVENING_RUSH] > 0.5
    }

    /// Recovers the traffic level from its ordinal encoding.
    pub fn traffic_level(&self) -> TrafficLevel {
        if self.0[index::TRAFFIC_UNKNOWN] > 0.5 {
            return TrafficLevel::Unknown;
        }
        let rank = self.0[index::TRAFFIC_LEVEL].round();
        TrafficLevel::ALL
            .into_iter()
            .find(|level| level.rank().is_some_and(|r| r as f64 == rank))
            .unwrap_or(TrafficLevel::Unknown)
    }

    pub fn weather_impact(&self) -> WeatherImpact {
        WeatherImpact::from_ordinal(self.0[index::WEATHER_IMPACT])
    }
}

/// A wall-clock hour range, start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    pub start_hour: i8,
    pub end_hour: i8,
}

impl HourWindow {
    pub const fn new(start_hour: i8, end_hour: i8) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn contains(&self, hour: i8) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Weekday morning rush window.
    pub morning_rush: HourWindow,
    /// Weekday evening rush window.
    pub evening_rush: HourWindow,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            morning_rush: HourWindow::new(7, 10),
            evening_rush: HourWindow::new(16, 19),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Builds the feature vector for departing on `route` at the local
    /// wall-clock time `departure`.
    ///
    /// Fails if the route's base duration or distance is negative or not a
    /// number. Missing weather encodes as no impact.
    pub fn extract(
        &self,
        route: &RouteOption,
        departure: DateTime,
        traffic: &TrafficSnapshot,
        weather: Option<WeatherImpact>,
    ) -> Result<FeatureVector, AdvisorError> {
        validate_route(route)?;

        let mut values = [0.0; FEATURE_COUNT];

        let hour = departure.hour() as f64 + departure.minute() as f64 / 60.0;
        let (hour_sin, hour_cos) = cyclical(hour, 24.0);
        values[index::HOUR_SIN] = hour_sin;
        values[index::HOUR_COS] = hour_cos;

        let day = DayOfWeek::from_weekday(departure.weekday());
        let (dow_sin, dow_cos) = cyclical(day.index() as f64, 7.0);
        values[index::DOW_SIN] = dow_sin;
        values[index::DOW_COS] = dow_cos;

        let (month_sin, month_cos) = cyclical(departure.month() as f64, 12.0);
        values[index::MONTH_SIN] = month_sin;
        values[index::MONTH_COS] = month_cos;

        values[index::IS_WEEKEND] = flag(day.is_weekend());
        let weekday = !day.is_weekend();
        values[index::MORNING_RUSH] =
            flag(weekday && self.config.morning_rush.contains(departure.hour()));
        values[index::EVENING_RUSH] =
            flag(weekday && self.config.evening_rush.contains(departure.hour()));

        values[index::BASE_DURATION] = route.base_duration_minutes;
        values[index::DISTANCE] = route.distance_km;

        values[index::TRAFFIC_LEVEL] = traffic.level.ordinal();
        values[index::TRAFFIC_UNKNOWN] = flag(!traffic.level.is_known());
        values[index::SPEED_RATIO] = traffic
            .speed_ratio
            .filter(|ratio| ratio.is_finite() && *ratio >= 0.0)
            .unwrap_or(1.0);
        values[index::INCIDENT_RATIO] =
            traffic.incidents.len().min(MAX_COUNTED_INCIDENTS) as f64 / MAX_COUNTED_INCIDENTS as f64;
        values[index::SEVERE_INCIDENT] = flag(traffic.has_severe_incident());

        values[index::WEATHER_IMPACT] = weather.unwrap_or_default().ordinal();

        Ok(FeatureVector(values))
    }
}

fn validate_route(route: &RouteOption) -> Result<(), AdvisorError> {
    if !route.base_duration_minutes.is_finite() || route.base_duration_minutes < 0.0 {
        return Err(AdvisorError::invalid(format!(
            "route {} has invalid base duration {}",
            route.id, route.base_duration_minutes
        )));
    }
    if !route.distance_km.is_finite() || route.distance_km < 0.0 {
        return Err(AdvisorError::invalid(format!(
            "route {} has invalid distance {}",
            route.id, route.distance_km
        )));
    }
    Ok(())
}

/// Sine/cosine pair placing `value` on a circle of circumference `period`.
fn cyclical(value: f64, period: f64) -> (f64, f64) {
    let angle = TAU * value / period;
    (angle.sin(), angle.cos())
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Incident, IncidentSeverity};
    use jiff::civil::date;

    fn route() -> RouteOption {
        RouteOption::new("r1", "Primary Route", 30.0, 20.0)
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = FeatureExtractor::default();
        let departure = date(2024, 3, 4).at(8, 15, 0, 0);
        let traffic = TrafficSnapshot::at_level(TrafficLevel::Moderate);

        let first = extractor
            .extract(&route(), departure, &traffic, Some(WeatherImpact::Low))
            .unwrap();
        let second = extractor
            .extract(&route(), departure, &traffic, Some(WeatherImpact::Low))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hour_encoding_wraps_at_midnight() {
        let (sin_0, cos_0) = cyclical(0.0, 24.0);
        let (sin_24, cos_24) = cyclical(24.0, 24.0);
        assert!((sin_0 - sin_24).abs() < 1e-9);
        assert!((cos_0 - cos_24).abs() < 1e-9);

        let extractor = FeatureExtractor::default();
        let traffic = TrafficSnapshot::unknown();
        let late = extractor
            .extract(&route(), date(2024, 3, 4).at(23, 59, 0, 0), &traffic, None)
            .unwrap();
        let early = extractor
            .extract(&route(), date(2024, 3, 5).at(0, 0, 0, 0), &traffic, None)
            .unwrap();
        assert!((late.get(index::HOUR_SIN) - early.get(index::HOUR_SIN)).abs() < 0.01);
        assert!((late.get(index::HOUR_COS) - early.get(index::HOUR_COS)).abs() < 0.01);
    }

    #[test]
    fn test_rush_hour_flags_weekdays_only() {
        let extractor = FeatureExtractor::default();
        let traffic = TrafficSnapshot::unknown();

        // 2024-03-04 is a Monday, 2024-03-09 a Saturday.
        let monday_morning = extractor
            .extract(&route(), date(2024, 3, 4).at(8, 0, 0, 0), &traffic, None)
            .unwrap();
        assert_eq!(monday_morning.get(index::MORNING_RUSH), 1.0);
        assert_eq!(monday_morning.get(index::EVENING_RUSH), 0.0);
        assert!(monday_morning.is_rush_hour());

        let monday_evening = extractor
            .extract(&route(), date(2024, 3, 4).at(17, 30, 0, 0), &traffic, None)
            .unwrap();
        assert_eq!(monday_evening.get(index::EVENING_RUSH), 1.0);

        let monday_late = extractor
            .extract(&route(), date(2024, 3, 4).at(19, 0, 0, 0), &traffic, None)
            .unwrap();
        assert!(!monday_late.is_rush_hour());

        let saturday_morning = extractor
            .extract(&route(), date(2024, 3, 9).at(8, 0, 0, 0), &traffic, None)
            .unwrap();
        assert!(!saturday_morning.is_rush_hour());
        assert_eq!(saturday_morning.get(index::IS_WEEKEND), 1.0);
    }

    #[test]
    fn test_traffic_encoding_round_trips_level() {
        let extractor = FeatureExtractor::default();
        let departure = date(2024, 3, 4).at(12, 0, 0, 0);
        for level in TrafficLevel::ALL {
            let features = extractor
                .extract(&route(), departure, &TrafficSnapshot::at_level(level), None)
                .unwrap();
            assert_eq!(features.traffic_level(), level);
        }
    }

    #[test]
    fn test_unknown_traffic_sets_flag() {
        let extractor = FeatureExtractor::default();
        let features = extractor
            .extract(&route(), date(2024, 3, 4).at(12, 0, 0, 0), &TrafficSnapshot::unknown(), None)
            .unwrap();
        assert_eq!(features.get(index::TRAFFIC_LEVEL), 2.0);
        assert_eq!(features.get(index::TRAFFIC_UNKNOWN), 1.0);
        assert_eq!(features.get(index::SPEED_RATIO), 1.0);
    }

    #[test]
    fn test_incidents_saturate() {
        let extractor = FeatureExtractor::default();
        let mut traffic = TrafficSnapshot::at_level(TrafficLevel::Heavy);
        traffic.incidents = vec![Incident::default(); 8];
        traffic.incidents[3].severity = Some(IncidentSeverity::Major);

        let features = extractor
            .extract(&route(), date(2024, 3, 4).at(12, 0, 0, 0), &traffic, None)
            .unwrap();
        assert_eq!(features.get(index::INCIDENT_RATIO), 1.0);
        assert_eq!(features.get(index::SEVERE_INCIDENT), 1.0);
    }

    #[test]
    fn test_missing_weather_is_no_impact() {
        let extractor = FeatureExtractor::default();
        let features = extractor
            .extract(&route(), date(2024, 3, 4).at(12, 0, 0, 0), &TrafficSnapshot::unknown(), None)
            .unwrap();
        assert_eq!(features.get(index::WEATHER_IMPACT), 0.0);
        assert_eq!(features.weather_impact(), WeatherImpact::None);
    }

    #[test]
    fn test_rejects_negative_route_fields() {
        let extractor = FeatureExtractor::default();
        let departure = date(2024, 3, 4).at(12, 0, 0, 0);
        let traffic = TrafficSnapshot::unknown();

        let negative_duration = RouteOption::new("r", "R", -1.0, 10.0);
        assert!(matches!(
            extractor.extract(&negative_duration, departure, &traffic, None),
            Err(AdvisorError::InvalidInput(_))
        ));

        let nan_distance = RouteOption::new("r", "R", 10.0, f64::NAN);
        assert!(matches!(
            extractor.extract(&nan_distance, departure, &traffic, None),
            Err(AdvisorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_feature_names_match_indices() {
        assert_eq!(FEATURE_NAMES[index::HOUR_SIN], "hour_sin");
        assert_eq!(FEATURE_NAMES[index::TRAFFIC_LEVEL], "traffic_level");
        assert_eq!(FEATURE_NAMES[index::WEATHER_IMPACT], "weather_impact");
    }
}
