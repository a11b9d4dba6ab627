//! Commute history pattern analysis.
//!
//! Groups completed trips by weekday and departure hour, picks the best and
//! worst groups that have enough trips to mean anything, and phrases the
//! gaps as advice. Pure and deterministic.

use std::collections::BTreeMap;

use jiff::tz::TimeZone;
use serde::Serialize;

use crate::types::{DayOfWeek, HistoryEntry};

const KEEP_TRACKING: &str = "Keep tracking - more data will reveal patterns";

#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Groups with fewer trips never become best/worst insights.
    pub min_group_samples: usize,
    /// Gaps at or below this many minutes are not worth a recommendation.
    pub meaningful_delta_minutes: f64,
    /// Zone used to read weekday and hour off trip start times.
    pub time_zone: TimeZone,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_group_samples: 2,
            meaningful_delta_minutes: 5.0,
            time_zone: TimeZone::UTC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverallStats {
    pub avg_minutes: f64,
    pub best_minutes: f64,
    pub worst_minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupStats {
    pub avg_minutes: f64,
    pub min_minutes: f64,
    pub max_minutes: f64,
    pub trips: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub day: DayOfWeek,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourStats {
    /// Departure hour, 0-23.
    pub hour: i8,
    /// `HH:00`.
    pub label: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Insights {
    pub best_day: Option<DayOfWeek>,
    pub worst_day: Option<DayOfWeek>,
    pub best_departure: Option<String>,
    pub worst_departure: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Patterns {
    pub trips_recorded: usize,
    pub overall: Option<OverallStats>,
    pub by_day: Vec<DayStats>,
    pub by_hour: Vec<HourStats>,
    pub insights: Insights,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PatternAnalyzer {
    config: PatternConfig,
}

impl PatternAnalyzer {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, history: &[HistoryEntry]) -> Patterns {
        let mut all = Vec::new();
        let mut by_day: BTreeMap<DayOfWeek, Vec<f64>> = BTreeMap::new();
        let mut by_hour: BTreeMap<i8, Vec<f64>> = BTreeMap::new();

        for entry in history.iter().filter(|entry| entry.is_completed()) {
            let Some(duration) = entry.duration_minutes else {
                continue;
            };
            let local = entry
                .started_at
                .to_zoned(self.config.time_zone.clone())
                .datetime();

            all.push(duration);
            by_day
                .entry(DayOfWeek::from_weekday(local.weekday()))
                .or_default()
                .push(duration);
            by_hour.entry(local.hour()).or_default().push(duration);
        }

        let Some(overall) = group_stats(&all) else {
            return Patterns::default();
        };

        let by_day: Vec<DayStats> = by_day
            .into_iter()
            .filter_map(|(day, durations)| group_stats(&durations).map(|stats| DayStats { day, stats }))
            .collect();
        let by_hour: Vec<HourStats> = by_hour
            .into_iter()
            .filter_map(|(hour, durations)| {
                group_stats(&durations).map(|stats| HourStats {
                    hour,
                    label: format!("{:02}:00", hour),
                    stats,
                })
            })
            .collect();

        let min_samples = self.config.min_group_samples;
        let (best_day, worst_day) = extremes(by_day.iter().map(|d| (d, &d.stats)), min_samples);
        let (best_hour, worst_hour) = extremes(by_hour.iter().map(|h| (h, &h.stats)), min_samples);

        let overall = OverallStats {
            avg_minutes: overall.avg_minutes,
            best_minutes: overall.min_minutes,
            worst_minutes: overall.max_minutes,
        };
        let recommendations = self.recommendations(&overall, best_day, worst_day, best_hour, worst_hour);

        Patterns {
            trips_recorded: all.len(),
            overall: Some(overall),
            insights: Insights {
                best_day: best_day.map(|d| d.day),
                worst_day: worst_day.map(|d| d.day),
                best_departure: best_hour.map(|h| h.label.clone()),
                worst_departure: worst_hour.map(|h| h.label.clone()),
            },
            recommendations,
            by_day,
            by_hour,
        }
    }

    fn recommendations(
        &self,
        overall: &OverallStats,
        best_day: Option<&DayStats>,
        worst_day: Option<&DayStats>,
        best_hour: Option<&HourStats>,
        worst_hour: Option<&HourStats>,
    ) -> Vec<String> {
        let delta = self.config.meaningful_delta_minutes;
        let mut recommendations = Vec::new();

        if let (Some(best), Some(worst)) = (best_day, worst_day) {
            let gap = worst.stats.avg_minutes - best.stats.avg_minutes;
            if best.day != worst.day && gap > delta {
                recommendations.push(format!(
                    "Consider remote work on {}s - they run ~{:.0} minutes longer than {}s",
                    worst.day, gap, best.day
                ));
            }
        }

        if let (Some(best), Some(worst)) = (best_hour, worst_hour) {
            let gap = worst.stats.avg_minutes - best.stats.avg_minutes;
            if best.hour != worst.hour && gap > delta {
                recommendations.push(format!(
                    "Leaving at {} saves ~{:.0} minutes compared to {}",
                    best.label, gap, worst.label
                ));
            }
        }

        if let Some(best) = best_day {
            let gain = overall.avg_minutes - best.stats.avg_minutes;
            if gain > delta {
                recommendations.push(format!(
                    "Travel on {}s when you can - ~{:.0} minutes faster than your average",
                    best.day, gain
                ));
            }
        }

        if recommendations.is_empty() {
            recommendations.push(KEEP_TRACKING.to_string());
        }
        recommendations
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn group_stats(durations: &[f64]) -> Option<GroupStats> {
    if durations.is_empty() {
        return None;
    }
    let sum: f64 = durations.iter().sum();
    Some(GroupStats {
        avg_minutes: round_tenth(sum / durations.len() as f64),
        min_minutes: round_tenth(durations.iter().copied().fold(f64::INFINITY, f64::min)),
        max_minutes: round_tenth(durations.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        trips: durations.len(),
    })
}

/// Lowest and highest mean among groups with at least `min_samples` trips.
/// The earlier group wins ties.
fn extremes<'a, T>(
    groups: impl Iterator<Item = (&'a T, &'a GroupStats)>,
    min_samples: usize,
) -> (Option<&'a T>, Option<&'a T>) {
    let mut best: Option<(&T, f64)> = None;
    let mut worst: Option<(&T, f64)> = None;

    for (group, stats) in groups.filter(|(_, stats)| stats.trips >= min_samples) {
        if best.is_none_or(|(_, avg)| stats.avg_minutes < avg) {
            best = Some((group, stats.avg_minutes));
        }
        if worst.is_none_or(|(_, avg)| stats.avg_minutes > avg) {
            worst = Some((group, stats.avg_minutes));
        }
    }

    (best.map(|(group, _)| group), worst.map(|(group, _)| group))
}
