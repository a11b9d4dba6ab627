//! Test fixtures for commute-advisor.
//!
//! Provides realistic test data including:
//! - Real Las Vegas / Henderson commute endpoints
//! - Builders for commutes, candidate routes and recorded trips

#![allow(dead_code)]

pub mod commute_places;

use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};

use commute_advisor::advisor::RouteCandidate;
use commute_advisor::config::AdvisorConfig;
use commute_advisor::predictor::ModelHandle;
use commute_advisor::traits::CommuteStore;
use commute_advisor::tracker::{CommuteTracker, TripOutcome};
use commute_advisor::types::{
    Commute, HistoryEntry, NewCommute, RouteOption, TrafficLevel, TrafficSnapshot,
};

pub use commute_places::*;

/// Home to the Strip.
pub fn strip_commute() -> NewCommute {
    let mut commute = NewCommute::new("Strip shift", HOMES[0].coordinate(), WORKPLACES[0].coordinate());
    commute.origin_address = Some(HOMES[0].name.to_string());
    commute.destination_address = Some(WORKPLACES[0].name.to_string());
    commute
}

pub fn tracker_with<S: CommuteStore>(store: S) -> CommuteTracker<S> {
    CommuteTracker::new(store, Arc::new(ModelHandle::new()), &AdvisorConfig::default())
}

/// A 30 minute, 20 km route under the given traffic.
pub fn candidate(id: &str, name: &str, level: TrafficLevel) -> RouteCandidate {
    RouteCandidate::new(
        RouteOption::new(id, name, 30.0, 20.0),
        TrafficSnapshot::at_level(level),
    )
}

pub fn timestamp(s: &str) -> Timestamp {
    s.parse().expect("valid RFC 3339 timestamp")
}

/// Starts and immediately completes a trip of `minutes` on a 30 minute
/// base route.
pub fn record_trip<S: CommuteStore>(
    tracker: &CommuteTracker<S>,
    commute: &Commute,
    started_at: Timestamp,
    minutes: i64,
    level: TrafficLevel,
) -> HistoryEntry {
    let trip = tracker
        .start_trip(&commute.id, started_at, Some(TrafficSnapshot::at_level(level)))
        .expect("start trip");
    let ended_at = started_at
        .checked_add(SignedDuration::from_mins(minutes))
        .expect("end in range");
    tracker
        .end_trip(
            &commute.id,
            &trip.id,
            ended_at,
            TripOutcome::on_route(&RouteOption::new("osrm_0", "Primary Route", 30.0, 20.0), false),
        )
        .expect("end trip")
}
