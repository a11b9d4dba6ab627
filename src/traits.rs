//! Contracts with the collaborators the core does not implement itself.
//!
//! These are intentionally minimal. Routing, live traffic, weather and
//! storage backends implement them; the core only calls through them.

use crate::error::{RoutingError, StoreError, TrafficError, WeatherError};
use crate::traffic::FlowReading;
use crate::types::{Commute, Coordinate, HistoryEntry, RouteOption, TrafficSnapshot};
use crate::weather::WeatherImpact;

/// Supplies candidate routes (geometry, base duration, distance) for an
/// origin/destination pair.
pub trait RouteProvider {
    fn routes_between(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<RouteOption>, RoutingError>;
}

/// Supplies one merged traffic snapshot per route.
///
/// Cross-referencing several providers is the implementor's job; see
/// [`crate::traffic::aggregate`].
pub trait TrafficSource {
    fn snapshot_for(&self, route: &RouteOption) -> Result<TrafficSnapshot, TrafficError>;
}

/// A single live-flow provider, queried at sample points along a route.
///
/// [`crate::traffic::SampledTrafficSource`] merges several of these into one
/// [`TrafficSource`].
pub trait FlowProvider {
    fn name(&self) -> &str;

    fn reading_at(&self, points: &[Coordinate]) -> Result<FlowReading, TrafficError>;
}

/// Optional driving-impact signal.
pub trait WeatherSource {
    fn impact_at(&self, location: Coordinate) -> Result<WeatherImpact, WeatherError>;
}

/// Key-based persistence for commutes and their trip history.
///
/// Implementations must be safe to share between threads; each call is
/// expected to be atomic on its own.
pub trait CommuteStore: Send + Sync {
    fn load_commute(&self, id: &str) -> Result<Option<Commute>, StoreError>;

    /// Inserts or replaces the commute with the same id.
    fn save_commute(&self, commute: &Commute) -> Result<(), StoreError>;

    fn list_commutes(&self) -> Result<Vec<Commute>, StoreError>;

    /// Returns `false` if no commute had this id.
    fn delete_commute(&self, id: &str) -> Result<bool, StoreError>;

    fn load_entry(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError>;

    /// Inserts or replaces the entry with the same id.
    fn save_entry(&self, entry: &HistoryEntry) -> Result<(), StoreError>;

    /// All entries of one commute, in no particular order.
    fn list_entries(&self, commute_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Deletes every entry of one commute, returning how many were removed.
    fn delete_entries(&self, commute_id: &str) -> Result<usize, StoreError>;
}

impl<P: RouteProvider + ?Sized> RouteProvider for Box<P> {
    fn routes_between(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<RouteOption>, RoutingError> {
        (**self).routes_between(origin, destination)
    }
}

/// Routing fallback chain: the first provider that yields routes wins.
impl<P: RouteProvider> RouteProvider for [P] {
    fn routes_between(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<RouteOption>, RoutingError> {
        let mut last_error = RoutingError::NoRoutes;
        for provider in self {
            match provider.routes_between(origin, destination) {
                Ok(routes) if !routes.is_empty() => return Ok(routes),
                Ok(_) => last_error = RoutingError::NoRoutes,
                Err(err) => {
                    tracing::debug!("route provider failed, trying next: {}", err);
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}
