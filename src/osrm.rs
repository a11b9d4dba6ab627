//! OSRM HTTP adapter for candidate routes.
//!
//! OSRM has no live traffic, so every route comes back with an unknown
//! traffic level and its free-flow duration as the base duration.

use serde::Deserialize;

use crate::error::RoutingError;
use crate::polyline::Polyline;
use crate::traits::RouteProvider;
use crate::types::{Coordinate, RouteOption};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
    pub max_alternatives: u8,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 10,
            max_alternatives: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            origin.lng,
            origin.lat,
            destination.lng,
            destination.lat
        )
    }
}

impl RouteProvider for OsrmClient {
    fn routes_between(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<RouteOption>, RoutingError> {
        let alternatives = self.config.max_alternatives.to_string();
        let body = self
            .client
            .get(self.route_url(origin, destination))
            .query(&[
                ("overview", "full"),
                ("geometries", "geojson"),
                ("alternatives", alternatives.as_str()),
            ])
            .send()
            .and_then(|resp| resp.error_for_status())?
            .json::<OsrmRouteResponse>()?;

        if body.code != "Ok" {
            return Err(RoutingError::Provider(body.code));
        }

        let routes = into_route_options(body.routes);
        tracing::debug!("osrm returned {} routes", routes.len());
        if routes.is_empty() {
            return Err(RoutingError::NoRoutes);
        }
        Ok(routes)
    }
}

fn into_route_options(routes: Vec<OsrmRoute>) -> Vec<RouteOption> {
    routes
        .into_iter()
        .enumerate()
        .map(|(index, route)| {
            // GeoJSON positions are [lng, lat].
            let geometry = Polyline::from_lat_lng(
                route
                    .geometry
                    .coordinates
                    .into_iter()
                    .map(|[lng, lat]| (lat, lng)),
            );
            RouteOption::new(
                format!("osrm_{}", index),
                route_name(index),
                route.duration / 60.0,
                route.distance / 1000.0,
            )
            .with_geometry(geometry)
        })
        .collect()
}

/// Human-readable name for the n-th route a provider returned.
pub fn route_name(index: usize) -> String {
    const NAMES: [&str; 4] = ["Primary Route", "Via Highway", "Local Streets", "Scenic Route"];
    NAMES
        .get(index)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Route {}", index + 1))
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}
