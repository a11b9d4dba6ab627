//! Straight-line route provider (fallback when no road router is reachable).
//!
//! Uses great-circle distance with a detour factor to estimate a single
//! direct route. Less accurate than a road router, but always available.

use crate::error::RoutingError;
use crate::polyline::Polyline;
use crate::traits::RouteProvider;
use crate::types::{Coordinate, RouteOption};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Road distance is rarely the crow-flies distance.
const DEFAULT_DETOUR_FACTOR: f64 = 1.3;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Estimates one direct route from straight-line distance and an assumed
/// speed.
#[derive(Debug, Clone)]
pub struct StraightLineRouter {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
    /// Multiplier from crow-flies to road distance.
    pub detour_factor: f64,
}

impl Default for StraightLineRouter {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            detour_factor: DEFAULT_DETOUR_FACTOR,
        }
    }
}

impl StraightLineRouter {
    pub fn new(speed_kmh: f64) -> Self {
        Self {
            speed_kmh,
            ..Self::default()
        }
    }

    fn km_to_minutes(&self, km: f64) -> f64 {
        km / self.speed_kmh * 60.0
    }
}

impl RouteProvider for StraightLineRouter {
    fn routes_between(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<RouteOption>, RoutingError> {
        let distance_km = haversine_km(origin, destination) * self.detour_factor;
        let route = RouteOption::new(
            "direct_0",
            "Direct Route",
            self.km_to_minutes(distance_km),
            distance_km,
        )
        .with_geometry(Polyline::new(vec![origin, destination]));

        Ok(vec![route])
    }
}
