mod fixtures;

use std::sync::Arc;

use jiff::SignedDuration;

use commute_advisor::config::AdvisorConfig;
use commute_advisor::error::AdvisorError;
use commute_advisor::predictor::ModelHandle;
use commute_advisor::store::JsonFileStore;
use commute_advisor::tracker::CommuteTracker;
use commute_advisor::types::{DayOfWeek, TrafficLevel};

use fixtures::{record_trip, strip_commute, timestamp, tracker_with};

#[test]
fn test_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let commute_id = {
        let tracker = tracker_with(JsonFileStore::open(dir.path()).unwrap());
        let commute = tracker.create_commute(strip_commute()).unwrap();
        record_trip(&tracker, &commute, timestamp("2024-03-04T15:00:00Z"), 42, TrafficLevel::Heavy);
        record_trip(&tracker, &commute, timestamp("2024-03-05T15:00:00Z"), 31, TrafficLevel::Free);
        commute.id
    };

    let tracker = tracker_with(JsonFileStore::open(dir.path()).unwrap());
    let commute = tracker.commute(&commute_id).unwrap();
    assert_eq!(commute.details.name, "Strip shift");
    assert_eq!(commute.rollup.best_duration_minutes, Some(31.0));
    assert_eq!(commute.rollup.worst_duration_minutes, Some(42.0));

    let history = tracker.history(&commute_id, 1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].duration_minutes, Some(31.0));
    assert_eq!(tracker.training_samples(&commute_id).unwrap().len(), 2);
}

#[test]
fn test_monday_stats_without_tuesday_claim() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = tracker_with(JsonFileStore::open(dir.path()).unwrap());
    let commute = tracker.create_commute(strip_commute()).unwrap();

    // 2024-03-04 and 2024-03-11 are Mondays, 2024-03-05 a Tuesday.
    record_trip(&tracker, &commute, timestamp("2024-03-04T15:00:00Z"), 40, TrafficLevel::Moderate);
    record_trip(&tracker, &commute, timestamp("2024-03-11T15:00:00Z"), 44, TrafficLevel::Heavy);
    record_trip(&tracker, &commute, timestamp("2024-03-05T15:00:00Z"), 30, TrafficLevel::Free);

    let patterns = tracker.patterns(&commute.id).unwrap();
    assert_eq!(patterns.trips_recorded, 3);

    let monday = patterns
        .by_day
        .iter()
        .find(|day| day.day == DayOfWeek::Monday)
        .unwrap();
    assert_eq!(monday.stats.avg_minutes, 42.0);
    assert_eq!(monday.stats.trips, 2);

    assert_eq!(patterns.insights.best_day, Some(DayOfWeek::Monday));
    assert_eq!(patterns.insights.worst_day, Some(DayOfWeek::Monday));
    assert!(patterns.recommendations.iter().all(|r| !r.contains("Tuesday")));

    let overall = patterns.overall.unwrap();
    assert!(overall.best_minutes <= overall.avg_minutes && overall.avg_minutes <= overall.worst_minutes);
}

#[test]
fn test_new_commute_has_empty_patterns() {
    let tracker = tracker_with(commute_advisor::store::MemoryStore::new());
    let commute = tracker.create_commute(strip_commute()).unwrap();

    let patterns = tracker.patterns(&commute.id).unwrap();
    assert_eq!(patterns.trips_recorded, 0);
    assert!(patterns.overall.is_none());
    assert!(patterns.recommendations.is_empty());
}

#[test]
fn test_unknown_commute_is_not_found() {
    let tracker = tracker_with(commute_advisor::store::MemoryStore::new());
    assert!(matches!(
        tracker.patterns("missing"),
        Err(AdvisorError::NotFound { kind: "commute", .. })
    ));
    assert!(matches!(
        tracker.start_trip("missing", timestamp("2024-03-04T15:00:00Z"), None),
        Err(AdvisorError::NotFound { .. })
    ));
}

#[test]
fn test_trained_model_persists_with_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = AdvisorConfig {
        data_dir: dir.path().to_path_buf(),
        ..AdvisorConfig::default()
    };
    let tracker = CommuteTracker::new(
        JsonFileStore::open(&config.data_dir).unwrap(),
        Arc::new(ModelHandle::new()),
        &config,
    );
    let commute = tracker.create_commute(strip_commute()).unwrap();

    let first = timestamp("2024-03-04T07:30:00Z");
    for day in 0..12 {
        let started_at = first.checked_add(SignedDuration::from_hours(24 * day)).unwrap();
        let (minutes, level) = match day % 3 {
            0 => (48, TrafficLevel::Heavy),
            1 => (38, TrafficLevel::Moderate),
            _ => (31, TrafficLevel::Free),
        };
        record_trip(&tracker, &commute, started_at, minutes, level);
    }

    let trained = tracker.retrain().unwrap();
    assert!(tracker.model().save(&config.model_path()).unwrap());

    let reloaded = ModelHandle::load(&config.model_path()).unwrap();
    let snapshot = reloaded.snapshot().unwrap();
    assert_eq!(snapshot.sample_count, trained.sample_count);
    assert!((snapshot.confidence - trained.confidence).abs() < 1e-12);
}
