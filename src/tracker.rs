//! Commute registration and trip tracking on top of a [`CommuteStore`].
//!
//! Every completed trip becomes a training sample. The tracker counts them
//! and retrains the shared model once enough new trips have arrived.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::features::FeatureExtractor;
use crate::patterns::{PatternAnalyzer, Patterns};
use crate::predictor::{DurationPredictor, ModelHandle, TrainedModel, TrainingSample};
use crate::traits::CommuteStore;
use crate::types::{
    Commute, CommuteRollup, HistoryEntry, NewCommute, RouteBasis, RouteOption, TrafficSnapshot,
};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Completed trips between automatic retrains.
    pub retrain_batch: usize,
    /// Newest trips considered by pattern analysis.
    pub pattern_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retrain_batch: 5,
            pattern_window: 90,
        }
    }
}

/// What the driver reports when a trip ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripOutcome {
    pub route_taken: Option<String>,
    pub switched_routes: bool,
    /// Base duration and distance of the route driven. Trips without it
    /// still count for patterns but cannot train the model.
    pub route_basis: Option<RouteBasis>,
}

impl TripOutcome {
    /// The trip was driven on `route`, so it can train the model.
    pub fn on_route(route: &RouteOption, switched_routes: bool) -> Self {
        Self {
            route_taken: Some(route.id.clone()),
            switched_routes,
            route_basis: Some(route.basis()),
        }
    }
}

pub struct CommuteTracker<S: CommuteStore> {
    store: S,
    model: Arc<ModelHandle>,
    extractor: FeatureExtractor,
    predictor: DurationPredictor,
    analyzer: PatternAnalyzer,
    time_zone: TimeZone,
    config: TrackerConfig,
    completed_since_retrain: AtomicUsize,
    /// Held across load, check and save when a trip ends.
    trip_end: Mutex<()>,
}

impl<S: CommuteStore> CommuteTracker<S> {
    pub fn new(store: S, model: Arc<ModelHandle>, config: &AdvisorConfig) -> Self {
        Self {
            store,
            model,
            extractor: FeatureExtractor::new(config.features.clone()),
            predictor: DurationPredictor::new(config.predictor.clone()),
            analyzer: PatternAnalyzer::new(config.patterns.clone()),
            time_zone: config.patterns.time_zone.clone(),
            config: config.tracker.clone(),
            completed_since_retrain: AtomicUsize::new(0),
            trip_end: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn create_commute(&self, details: NewCommute) -> Result<Commute, AdvisorError> {
        validate_commute(&details)?;

        let commute = Commute {
            id: Uuid::new_v4().to_string(),
            details,
            created_at: Timestamp::now(),
            rollup: CommuteRollup::default(),
        };
        self.store.save_commute(&commute)?;
        tracing::info!(id = %commute.id, name = %commute.details.name, "created commute");
        Ok(commute)
    }

    pub fn list_commutes(&self) -> Result<Vec<Commute>, AdvisorError> {
        Ok(self.store.list_commutes()?)
    }

    pub fn commute(&self, id: &str) -> Result<Commute, AdvisorError> {
        self.store
            .load_commute(id)?
            .ok_or_else(|| AdvisorError::commute_not_found(id))
    }

    /// Deletes a commute together with its whole trip history.
    pub fn delete_commute(&self, id: &str) -> Result<(), AdvisorError> {
        self.commute(id)?;
        let trips = self.store.delete_entries(id)?;
        self.store.delete_commute(id)?;
        tracing::info!(id, trips, "deleted commute");
        Ok(())
    }

    /// Opens a trip. `traffic` is what the current route looked like at
    /// departure, if known.
    pub fn start_trip(
        &self,
        commute_id: &str,
        started_at: Timestamp,
        traffic: Option<TrafficSnapshot>,
    ) -> Result<HistoryEntry, AdvisorError> {
        self.commute(commute_id)?;

        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            commute_id: commute_id.to_string(),
            started_at,
            ended_at: None,
            duration_minutes: None,
            route_taken: None,
            switched_routes: false,
            traffic_at_start: traffic,
            route_basis: None,
        };
        self.store.save_entry(&entry)?;
        tracing::debug!(commute = commute_id, trip = %entry.id, "started trip");
        Ok(entry)
    }

    /// Closes a trip exactly once and refreshes the commute's rollups.
    pub fn end_trip(
        &self,
        commute_id: &str,
        entry_id: &str,
        ended_at: Timestamp,
        outcome: TripOutcome,
    ) -> Result<HistoryEntry, AdvisorError> {
        let _guard = self.trip_end.lock();
        let mut commute = self.commute(commute_id)?;
        let mut entry = self
            .store
            .load_entry(entry_id)?
            .filter(|entry| entry.commute_id == commute_id)
            .ok_or_else(|| AdvisorError::trip_not_found(entry_id))?;

        if entry.ended_at.is_some() {
            return Err(AdvisorError::AlreadyEnded(entry_id.to_string()));
        }
        if ended_at < entry.started_at {
            return Err(AdvisorError::invalid(format!(
                "trip {} cannot end before it started",
                entry_id
            )));
        }

        let minutes = ended_at.duration_since(entry.started_at).as_secs_f64() / 60.0;
        entry.ended_at = Some(ended_at);
        entry.duration_minutes = Some((minutes * 10.0).round() / 10.0);
        entry.route_taken = outcome.route_taken;
        entry.switched_routes = outcome.switched_routes;
        if outcome.route_basis.is_some() {
            entry.route_basis = outcome.route_basis;
        }
        self.store.save_entry(&entry)?;

        commute.rollup = CommuteRollup::from_history(&self.store.list_entries(commute_id)?);
        self.store.save_commute(&commute)?;

        let pending = self.completed_since_retrain.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            commute = commute_id,
            trip = entry_id,
            minutes = entry.duration_minutes,
            pending_for_retrain = pending,
            "ended trip"
        );
        Ok(entry)
    }

    /// Trips of one commute, newest first.
    pub fn history(&self, commute_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, AdvisorError> {
        self.commute(commute_id)?;
        let mut entries = self.store.list_entries(commute_id)?;
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn patterns(&self, commute_id: &str) -> Result<Patterns, AdvisorError> {
        let recent = self.history(commute_id, self.config.pattern_window)?;
        Ok(self.analyzer.analyze(&recent))
    }

    /// Turns completed trips with a known route basis into model samples.
    pub fn training_samples(&self, commute_id: &str) -> Result<Vec<TrainingSample>, AdvisorError> {
        self.commute(commute_id)?;
        let entries = self.store.list_entries(commute_id)?;
        Ok(entries.iter().filter_map(|entry| self.sample_from(entry)).collect())
    }

    fn sample_from(&self, entry: &HistoryEntry) -> Option<TrainingSample> {
        let realized = entry.duration_minutes?;
        let basis = entry.route_basis?;
        let route = RouteOption::new(
            entry.route_taken.clone().unwrap_or_else(|| entry.id.clone()),
            "",
            basis.base_duration_minutes,
            basis.distance_km,
        );
        let traffic = entry.traffic_at_start.clone().unwrap_or_default();

        let features = match self
            .extractor
            .extract(&route, self.local_time(entry.started_at), &traffic, None)
        {
            Ok(features) => features,
            Err(err) => {
                tracing::debug!(trip = %entry.id, "skipping trip for training: {}", err);
                return None;
            }
        };
        TrainingSample::from_trip(
            features,
            realized,
            basis.base_duration_minutes,
            entry.ended_at.unwrap_or(entry.started_at),
        )
    }

    fn local_time(&self, at: Timestamp) -> DateTime {
        at.to_zoned(self.time_zone.clone()).datetime()
    }

    /// Retrains from every commute's history right away.
    pub fn retrain(&self) -> Result<Arc<TrainedModel>, AdvisorError> {
        self.completed_since_retrain.store(0, Ordering::Relaxed);

        let mut samples = Vec::new();
        for commute in self.store.list_commutes()? {
            samples.extend(self.training_samples(&commute.id)?);
        }
        let model = self.model.retrain(&self.predictor, &samples)?;
        tracing::info!(
            samples = model.sample_count,
            confidence = model.confidence,
            "installed retrained model"
        );
        Ok(model)
    }

    /// Retrains once `retrain_batch` trips have completed since the last
    /// attempt. A rejected training run keeps the previous model and
    /// reports `None`, the same as not being due.
    pub fn retrain_if_due(&self) -> Result<Option<Arc<TrainedModel>>, AdvisorError> {
        if self.completed_since_retrain.load(Ordering::Relaxed) < self.config.retrain_batch.max(1) {
            return Ok(None);
        }
        match self.retrain() {
            Ok(model) => Ok(Some(model)),
            Err(AdvisorError::Training(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn validate_commute(details: &NewCommute) -> Result<(), AdvisorError> {
    if details.name.trim().is_empty() {
        return Err(AdvisorError::invalid("commute name must not be empty"));
    }
    for (label, point) in [("origin", details.origin), ("destination", details.destination)] {
        let valid = (-90.0..=90.0).contains(&point.lat) && (-180.0..=180.0).contains(&point.lng);
        if !valid {
            return Err(AdvisorError::invalid(format!(
                "{} ({}, {}) is not a valid coordinate",
                label, point.lat, point.lng
            )));
        }
    }
    if details.days_of_week.is_empty() {
        return Err(AdvisorError::invalid("commute must run on at least one day"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::types::{Coordinate, TrafficLevel};
    use jiff::SignedDuration;
    use std::sync::Barrier;

    fn tracker() -> CommuteTracker<MemoryStore> {
        CommuteTracker::new(
            MemoryStore::new(),
            Arc::new(ModelHandle::new()),
            &AdvisorConfig::default(),
        )
    }

    fn office() -> NewCommute {
        NewCommute::new(
            "Office",
            Coordinate::new(36.1147, -115.1728),
            Coordinate::new(36.1699, -115.1398),
        )
    }

    fn at(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_trip_lifecycle_updates_rollup() {
        let tracker = tracker();
        let commute = tracker.create_commute(office()).unwrap();

        for (start, minutes) in [("2024-03-04T15:00:00Z", 30), ("2024-03-05T15:00:00Z", 40)] {
            let start = at(start);
            let trip = tracker.start_trip(&commute.id, start, None).unwrap();
            let end = start.checked_add(SignedDuration::from_mins(minutes)).unwrap();
            let ended = tracker
                .end_trip(&commute.id, &trip.id, end, TripOutcome::default())
                .unwrap();
            assert_eq!(ended.duration_minutes, Some(minutes as f64));
        }

        let rollup = tracker.commute(&commute.id).unwrap().rollup;
        assert_eq!(rollup.avg_duration_minutes, Some(35.0));
        assert_eq!(rollup.best_duration_minutes, Some(30.0));
        assert_eq!(rollup.worst_duration_minutes, Some(40.0));

        let history = tracker.history(&commute.id, 10).unwrap();
        assert_eq!(history[0].started_at, at("2024-03-05T15:00:00Z"));
    }

    #[test]
    fn test_double_end_is_rejected() {
        let tracker = tracker();
        let commute = tracker.create_commute(office()).unwrap();
        let trip = tracker.start_trip(&commute.id, at("2024-03-04T15:00:00Z"), None).unwrap();

        let end = at("2024-03-04T15:30:00Z");
        tracker.end_trip(&commute.id, &trip.id, end, TripOutcome::default()).unwrap();
        let again = tracker.end_trip(&commute.id, &trip.id, end, TripOutcome::default());
        assert!(matches!(again, Err(AdvisorError::AlreadyEnded(_))));
    }

    /// Widens the gap between reading a trip and writing it back.
    struct SlowStore(MemoryStore);

    impl CommuteStore for SlowStore {
        fn load_commute(&self, id: &str) -> Result<Option<Commute>, StoreError> {
            self.0.load_commute(id)
        }
        fn save_commute(&self, commute: &Commute) -> Result<(), StoreError> {
            self.0.save_commute(commute)
        }
        fn list_commutes(&self) -> Result<Vec<Commute>, StoreError> {
            self.0.list_commutes()
        }
        fn delete_commute(&self, id: &str) -> Result<bool, StoreError> {
            self.0.delete_commute(id)
        }
        fn load_entry(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError> {
            let entry = self.0.load_entry(id);
            std::thread::sleep(std::time::Duration::from_millis(50));
            entry
        }
        fn save_entry(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
            self.0.save_entry(entry)
        }
        fn list_entries(&self, commute_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
            self.0.list_entries(commute_id)
        }
        fn delete_entries(&self, commute_id: &str) -> Result<usize, StoreError> {
            self.0.delete_entries(commute_id)
        }
    }

    #[test]
    fn test_concurrent_ends_close_trip_once() {
        let tracker = CommuteTracker::new(
            SlowStore(MemoryStore::new()),
            Arc::new(ModelHandle::new()),
            &AdvisorConfig::default(),
        );
        let commute = tracker.create_commute(office()).unwrap();
        let trip = tracker.start_trip(&commute.id, at("2024-03-04T15:00:00Z"), None).unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["2024-03-04T15:30:00Z", "2024-03-04T15:50:00Z"]
                .into_iter()
                .map(|end| {
                    let (tracker, barrier, commute, trip) = (&tracker, &barrier, &commute, &trip);
                    scope.spawn(move || {
                        barrier.wait();
                        tracker.end_trip(&commute.id, &trip.id, at(end), TripOutcome::default())
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let ended: Vec<&HistoryEntry> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(ended.len(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AdvisorError::AlreadyEnded(_))))
                .count(),
            1
        );

        let stored = tracker.store().load_entry(&trip.id).unwrap().unwrap();
        assert_eq!(stored.duration_minutes, ended[0].duration_minutes);
        assert_eq!(
            tracker.commute(&commute.id).unwrap().rollup.avg_duration_minutes,
            ended[0].duration_minutes
        );
    }

    #[test]
    fn test_end_before_start_and_wrong_commute() {
        let tracker = tracker();
        let first = tracker.create_commute(office()).unwrap();
        let second = tracker.create_commute(office()).unwrap();
        let trip = tracker.start_trip(&first.id, at("2024-03-04T15:00:00Z"), None).unwrap();

        let early = tracker.end_trip(&first.id, &trip.id, at("2024-03-04T14:00:00Z"), TripOutcome::default());
        assert!(matches!(early, Err(AdvisorError::InvalidInput(_))));

        let wrong = tracker.end_trip(&second.id, &trip.id, at("2024-03-04T15:20:00Z"), TripOutcome::default());
        assert!(matches!(wrong, Err(AdvisorError::NotFound { kind: "trip", .. })));
    }

    #[test]
    fn test_delete_commute_cascades_history() {
        let tracker = tracker();
        let commute = tracker.create_commute(office()).unwrap();
        tracker.start_trip(&commute.id, at("2024-03-04T15:00:00Z"), None).unwrap();

        tracker.delete_commute(&commute.id).unwrap();
        assert!(tracker.store().list_entries(&commute.id).unwrap().is_empty());
        assert!(matches!(
            tracker.commute(&commute.id),
            Err(AdvisorError::NotFound { kind: "commute", .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_commute() {
        let tracker = tracker();
        let mut details = office();
        details.origin = Coordinate::new(95.0, 0.0);
        assert!(matches!(tracker.create_commute(details), Err(AdvisorError::InvalidInput(_))));

        let mut details = office();
        details.name = "  ".to_string();
        assert!(matches!(tracker.create_commute(details), Err(AdvisorError::InvalidInput(_))));
    }

    #[test]
    fn test_training_samples_need_route_basis() {
        let tracker = tracker();
        let commute = tracker.create_commute(office()).unwrap();
        let start = at("2024-03-06T15:00:00Z");

        let with_basis = tracker
            .start_trip(&commute.id, start, Some(TrafficSnapshot::at_level(TrafficLevel::Heavy)))
            .unwrap();
        tracker
            .end_trip(
                &commute.id,
                &with_basis.id,
                at("2024-03-06T15:45:00Z"),
                TripOutcome::on_route(&RouteOption::new("osrm_0", "Primary Route", 30.0, 20.0), false),
            )
            .unwrap();

        let without_basis = tracker.start_trip(&commute.id, start, None).unwrap();
        tracker
            .end_trip(&commute.id, &without_basis.id, at("2024-03-06T15:40:00Z"), TripOutcome::default())
            .unwrap();

        let stored = tracker.store().load_entry(&with_basis.id).unwrap().unwrap();
        assert_eq!(stored.route_taken.as_deref(), Some("osrm_0"));
        assert_eq!(stored.route_basis.map(|basis| basis.distance_km), Some(20.0));

        let samples = tracker.training_samples(&commute.id).unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].multiplier - 1.5).abs() < 1e-9);
        assert_eq!(samples[0].features.traffic_level(), TrafficLevel::Heavy);
    }

    #[test]
    fn test_retrain_waits_for_batch() {
        let tracker = tracker();
        let commute = tracker.create_commute(office()).unwrap();
        let start = at("2024-03-04T15:00:00Z");
        let trip = tracker.start_trip(&commute.id, start, None).unwrap();
        tracker
            .end_trip(&commute.id, &trip.id, at("2024-03-04T15:30:00Z"), TripOutcome::default())
            .unwrap();

        assert!(tracker.retrain_if_due().unwrap().is_none());
        assert!(!tracker.model().is_trained());
    }
}
