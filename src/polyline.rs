//! Route geometry as a decoded coordinate sequence.
//!
//! Providers decode their wire formats at the boundary; the core only ever
//! sees coordinates.

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_km;
use crate::types::Coordinate;

/// Ordered points of a route, origin first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Builds a polyline from `(lat, lng)` pairs.
    pub fn from_lat_lng(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(lat, lng)| Coordinate::new(lat, lng))
                .collect(),
        }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Great-circle length along the points.
    pub fn length_km(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_km(pair[0], pair[1]))
            .sum()
    }

    /// Up to `max_points` evenly spaced points, for probing traffic along
    /// the route.
    pub fn sample(&self, max_points: usize) -> Vec<Coordinate> {
        if max_points == 0 {
            return Vec::new();
        }
        if self.points.len() <= max_points {
            return self.points.clone();
        }

        let step = self.points.len() / max_points;
        self.points
            .iter()
            .step_by(step)
            .take(max_points)
            .copied()
            .collect()
    }
}
