//! Live traffic classification and multi-provider aggregation.

use serde::{Deserialize, Serialize};

use crate::error::TrafficError;
use crate::traits::{FlowProvider, TrafficSource};
use crate::types::{Incident, RouteOption, TrafficLevel, TrafficSnapshot};

/// Sample points checked per route.
const DEFAULT_MAX_SAMPLE_POINTS: usize = 10;

/// What one provider observed along a route.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowReading {
    /// Current speed over free-flow speed, one per sampled segment.
    pub speed_ratios: Vec<f64>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// Classifies a mean speed ratio (1.0 = free flow).
pub fn level_from_speed_ratio(ratio: f64) -> TrafficLevel {
    if !ratio.is_finite() {
        TrafficLevel::Unknown
    } else if ratio >= 0.9 {
        TrafficLevel::Free
    } else if ratio >= 0.7 {
        TrafficLevel::Light
    } else if ratio >= 0.5 {
        TrafficLevel::Moderate
    } else if ratio >= 0.3 {
        TrafficLevel::Heavy
    } else {
        TrafficLevel::Severe
    }
}

/// Merges readings from several providers into one snapshot.
///
/// Speed ratios are averaged across every provider; incidents are
/// concatenated. No usable speed sample yields an unknown level.
pub fn aggregate(readings: &[FlowReading]) -> TrafficSnapshot {
    let ratios: Vec<f64> = readings
        .iter()
        .flat_map(|reading| reading.speed_ratios.iter().copied())
        .filter(|ratio| ratio.is_finite() && *ratio >= 0.0)
        .collect();
    let incidents: Vec<Incident> = readings
        .iter()
        .flat_map(|reading| reading.incidents.iter().cloned())
        .collect();

    if ratios.is_empty() {
        return TrafficSnapshot {
            incidents,
            ..TrafficSnapshot::unknown()
        };
    }

    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    TrafficSnapshot {
        level: level_from_speed_ratio(mean),
        speed_ratio: Some(mean),
        incidents,
        sample_count: ratios.len(),
    }
}

/// A [`TrafficSource`] that samples evenly spaced points of each route
/// against every configured provider and aggregates what comes back.
///
/// A failing provider is skipped; the route still gets a snapshot from the
/// others, or an unknown one if none answered.
pub struct SampledTrafficSource<P: FlowProvider> {
    providers: Vec<P>,
    max_sample_points: usize,
}

impl<P: FlowProvider> SampledTrafficSource<P> {
    pub fn new(providers: Vec<P>) -> Self {
        Self {
            providers,
            max_sample_points: DEFAULT_MAX_SAMPLE_POINTS,
        }
    }

    pub fn with_max_sample_points(mut self, max_sample_points: usize) -> Self {
        self.max_sample_points = max_sample_points;
        self
    }
}

impl<P: FlowProvider> TrafficSource for SampledTrafficSource<P> {
    fn snapshot_for(&self, route: &RouteOption) -> Result<TrafficSnapshot, TrafficError> {
        if route.geometry.is_empty() {
            return Err(TrafficError::NoGeometry);
        }

        let points = route.geometry.sample(self.max_sample_points);
        let readings: Vec<FlowReading> = self
            .providers
            .iter()
            .filter_map(|provider| match provider.reading_at(&points) {
                Ok(reading) => Some(reading),
                Err(err) => {
                    tracing::warn!(
                        provider = provider.name(),
                        route = %route.id,
                        "traffic provider failed: {}",
                        err
                    );
                    None
                }
            })
            .collect();

        let snapshot = aggregate(&readings);
        tracing::debug!(
            route = %route.id,
            level = %snapshot.level,
            samples = snapshot.sample_count,
            "aggregated traffic"
        );
        Ok(snapshot)
    }
}
