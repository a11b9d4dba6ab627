//! Route switch recommendation.

use serde::Serialize;

use crate::error::AdvisorError;
use crate::types::RouteOption;

#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Minimum predicted savings worth a switch.
    pub threshold_minutes: f64,
    /// Predictions below this confidence never trigger a switch.
    pub min_confidence: f64,
    /// Savings closer than this count as equal.
    pub tie_epsilon_minutes: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            threshold_minutes: 2.0,
            min_confidence: 0.4,
            tie_epsilon_minutes: 0.05,
        }
    }
}

/// Outcome of one evaluation. Both fields are `None` when staying on the
/// current route is the advice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendation {
    pub route_id: Option<String>,
    pub reason: Option<String>,
}

impl Recommendation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_switch(&self) -> bool {
        self.route_id.is_some()
    }
}

const HEAVY_RANK: u8 = 3;

struct Scored<'a> {
    route: &'a RouteOption,
    savings: f64,
    confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    /// Decides whether to leave `current` for one of `alternatives`.
    ///
    /// Every route must already carry a predicted duration and confidence.
    /// The alternative with the largest savings is the only candidate; it is
    /// recommended when it saves at least `threshold_minutes` and its
    /// confidence clears the gate.
    pub fn recommend(
        &self,
        current: &RouteOption,
        alternatives: &[RouteOption],
        threshold_minutes: f64,
    ) -> Result<Recommendation, AdvisorError> {
        let (current_duration, _) = prediction_of(current)?;

        let scored = alternatives
            .iter()
            .map(|route| {
                let (duration, confidence) = prediction_of(route)?;
                Ok(Scored {
                    route,
                    savings: savings_minutes(current_duration, duration),
                    confidence,
                })
            })
            .collect::<Result<Vec<_>, AdvisorError>>()?;

        let Some(candidate) = self.select(&scored) else {
            return Ok(Recommendation::none());
        };

        if candidate.savings < threshold_minutes {
            tracing::debug!(
                route = %candidate.route.id,
                savings = candidate.savings,
                threshold = threshold_minutes,
                "best alternative below threshold"
            );
            return Ok(Recommendation::none());
        }
        if candidate.confidence < self.config.min_confidence {
            tracing::debug!(
                route = %candidate.route.id,
                confidence = candidate.confidence,
                gate = self.config.min_confidence,
                "best alternative below confidence gate"
            );
            return Ok(Recommendation::none());
        }

        Ok(Recommendation {
            route_id: Some(candidate.route.id.clone()),
            reason: Some(reason(current, candidate)),
        })
    }

    /// Largest savings wins. Routes within epsilon of the largest are
    /// ranked by higher confidence, then shorter distance, then position.
    fn select<'a, 'b>(&self, scored: &'b [Scored<'a>]) -> Option<&'b Scored<'a>> {
        let best_savings = scored
            .iter()
            .map(|s| s.savings)
            .reduce(f64::max)?;
        let floor = best_savings - self.config.tie_epsilon_minutes;

        scored
            .iter()
            .filter(|s| s.savings >= floor)
            .reduce(|best, s| {
                let better = s.confidence > best.confidence
                    || (s.confidence == best.confidence
                        && s.route.distance_km < best.route.distance_km);
                if better { s } else { best }
            })
    }
}

/// Minutes saved by `alternative` over `current`, at the tenth-of-a-minute
/// resolution predictions are reported in.
pub fn savings_minutes(current: f64, alternative: f64) -> f64 {
    ((current - alternative) * 10.0).round() / 10.0
}

fn prediction_of(route: &RouteOption) -> Result<(f64, f64), AdvisorError> {
    match (route.predicted_duration_minutes, route.confidence) {
        (Some(duration), Some(confidence)) if duration.is_finite() && confidence.is_finite() => {
            Ok((duration, confidence))
        }
        _ => Err(AdvisorError::invalid(format!(
            "route {} has no usable prediction",
            route.id
        ))),
    }
}

fn reason(current: &RouteOption, candidate: &Scored) -> String {
    let name = &candidate.route.name;
    let mut reason = format!("Switch to {} to save ~{:.1} minutes.", name, candidate.savings);

    match (current.traffic_level.rank(), candidate.route.traffic_level.rank()) {
        (Some(cur), Some(alt)) if cur > alt => {
            reason.push_str(&format!(
                " Traffic on current route is {}; {} is {}.",
                current.traffic_level, name, candidate.route.traffic_level
            ));
        }
        (Some(cur), _) if cur >= HEAVY_RANK => {
            reason.push_str(&format!(" Traffic on current route is {}.", current.traffic_level));
        }
        _ if candidate.route.base_duration_minutes < current.base_duration_minutes => {
            reason.push_str(&format!(" {} is faster even without traffic.", name));
        }
        _ => {}
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrafficLevel;

    fn route(id: &str, predicted: f64, confidence: f64) -> RouteOption {
        RouteOption::new(id, format!("Route {}", id), 30.0, 20.0).with_prediction(predicted, confidence)
    }

    #[test]
    fn test_heavy_to_free_switch() {
        let engine = RecommendationEngine::default();
        let current = route("current", 45.0, 0.4).with_traffic_level(TrafficLevel::Heavy);
        let mut alternative = route("alt", 30.0, 0.4).with_traffic_level(TrafficLevel::Free);
        alternative.name = "Via Highway".to_string();

        let recommendation = engine.recommend(&current, &[alternative], 2.0).unwrap();
        assert_eq!(recommendation.route_id.as_deref(), Some("alt"));
        assert_eq!(
            recommendation.reason.as_deref(),
            Some("Switch to Via Highway to save ~15.0 minutes. Traffic on current route is heavy; Via Highway is free.")
        );
    }

    #[test]
    fn test_below_threshold_is_no_recommendation() {
        let engine = RecommendationEngine::default();
        let current = route("current", 31.5, 0.9);
        let alternatives = [route("a", 30.0, 0.9), route("b", 33.0, 0.9)];

        let recommendation = engine.recommend(&current, &alternatives, 2.0).unwrap();
        assert_eq!(recommendation, Recommendation::none());
        assert!(!recommendation.is_switch());
    }

    #[test]
    fn test_savings_exactly_at_threshold_switches() {
        let engine = RecommendationEngine::default();
        let recommendation = engine
            .recommend(&route("current", 32.0, 0.9), &[route("a", 30.0, 0.9)], 2.0)
            .unwrap();
        assert!(recommendation.is_switch());
    }

    #[test]
    fn test_rounded_savings_at_threshold_switches() {
        let engine = RecommendationEngine::default();
        let recommendation = engine
            .recommend(&route("current", 32.3, 0.9), &[route("a", 30.3, 0.9)], 2.0)
            .unwrap();
        assert_eq!(recommendation.route_id.as_deref(), Some("a"));
        assert_eq!(
            recommendation.reason.as_deref(),
            Some("Switch to Route a to save ~2.0 minutes.")
        );
        assert_eq!(savings_minutes(32.3, 30.3), 2.0);
    }

    #[test]
    fn test_low_confidence_blocks_large_savings() {
        let engine = RecommendationEngine::default();
        let current = route("current", 60.0, 0.9);
        let alternatives = [route("risky", 20.0, 0.3), route("safe", 50.0, 0.9)];

        let recommendation = engine.recommend(&current, &alternatives, 2.0).unwrap();
        assert_eq!(recommendation, Recommendation::none());
    }

    #[test]
    fn test_tie_prefers_confidence_then_distance() {
        let engine = RecommendationEngine::default();
        let current = route("current", 50.0, 0.9);

        let alternatives = [route("a", 40.0, 0.6), route("b", 40.02, 0.8)];
        let recommendation = engine.recommend(&current, &alternatives, 2.0).unwrap();
        assert_eq!(recommendation.route_id.as_deref(), Some("b"));

        let mut far = route("far", 40.0, 0.8);
        far.distance_km = 25.0;
        let mut near = route("near", 40.0, 0.8);
        near.distance_km = 18.0;
        let recommendation = engine.recommend(&current, &[far, near], 2.0).unwrap();
        assert_eq!(recommendation.route_id.as_deref(), Some("near"));
    }

    #[test]
    fn test_near_ties_ignore_input_order() {
        let engine = RecommendationEngine::default();
        let current = route("current", 50.0, 0.9);
        // 39.92 and 39.88 both round to 10.1 saved; 40.04 rounds to 10.0.
        let low = route("low", 40.04, 0.95);
        let top = route("top", 39.92, 0.6);
        let mid = route("mid", 39.88, 0.8);
        let mut far = route("far", 39.9, 0.8);
        far.distance_km = 26.0;
        let routes = vec![low, top, mid, far];

        for shift in 0..routes.len() {
            let mut alternatives = routes.clone();
            alternatives.rotate_left(shift);
            let forward = engine.recommend(&current, &alternatives, 2.0).unwrap();
            alternatives.reverse();
            let backward = engine.recommend(&current, &alternatives, 2.0).unwrap();

            assert_eq!(forward.route_id.as_deref(), Some("mid"));
            assert_eq!(backward, forward);
        }
    }

    #[test]
    fn test_no_alternatives() {
        let engine = RecommendationEngine::default();
        let recommendation = engine.recommend(&route("current", 30.0, 0.9), &[], 2.0).unwrap();
        assert_eq!(recommendation, Recommendation::none());
    }

    #[test]
    fn test_missing_prediction_is_invalid_input() {
        let engine = RecommendationEngine::default();
        let unpredicted = RouteOption::new("a", "A", 30.0, 20.0);
        let result = engine.recommend(&route("current", 40.0, 0.9), &[unpredicted], 2.0);
        assert!(matches!(result, Err(AdvisorError::InvalidInput(_))));
    }

    #[test]
    fn test_never_recommends_below_threshold_or_gate() {
        let engine = RecommendationEngine::default();
        let current = route("current", 40.0, 0.9);
        for step in 0..40 {
            let predicted = 30.0 + step as f64 * 0.5;
            for confidence in [0.1, 0.39, 0.4, 0.7] {
                for threshold in [0.0, 2.0, 5.0] {
                    let alternative = route("alt", predicted, confidence);
                    let recommendation = engine
                        .recommend(&current, std::slice::from_ref(&alternative), threshold)
                        .unwrap();
                    if recommendation.is_switch() {
                        assert!(40.0 - predicted >= threshold);
                        assert!(confidence >= engine.config().min_confidence);
                    }
                }
            }
        }
    }

    #[test]
    fn test_reason_mentions_inherently_faster_route() {
        let engine = RecommendationEngine::default();
        let current = route("current", 40.0, 0.9).with_traffic_level(TrafficLevel::Light);
        let mut alternative = route("alt", 30.0, 0.9).with_traffic_level(TrafficLevel::Light);
        alternative.base_duration_minutes = 25.0;
        alternative.name = "Local Streets".to_string();

        let reason = engine
            .recommend(&current, &[alternative], 2.0)
            .unwrap()
            .reason
            .unwrap();
        assert_eq!(
            reason,
            "Switch to Local Streets to save ~10.0 minutes. Local Streets is faster even without traffic."
        );
    }
}
