//! Request-scoped comparison pipeline: features, prediction and the switch
//! decision for one set of candidate routes.

use std::collections::HashSet;
use std::sync::Arc;

use jiff::civil::DateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::features::FeatureExtractor;
use crate::predictor::{DurationPredictor, ModelHandle, PredictionSource, TrainedModel};
use crate::recommend::{Recommendation, RecommendationEngine, savings_minutes};
use crate::traits::{RouteProvider, TrafficSource, WeatherSource};
use crate::types::{Coordinate, RouteOption, TrafficSnapshot};
use crate::weather::{WeatherImpact, route_impact};

/// A route together with the traffic observed on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub route: RouteOption,
    #[serde(default)]
    pub traffic: TrafficSnapshot,
}

impl RouteCandidate {
    pub fn new(route: RouteOption, traffic: TrafficSnapshot) -> Self {
        Self { route, traffic }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub candidates: Vec<RouteCandidate>,
    pub current_route_id: String,
    /// Local wall-clock departure time.
    pub departure: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherImpact>,
    /// Overrides the configured switch threshold for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_minutes: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteComparison {
    pub current: RouteOption,
    pub alternatives: Vec<RouteOption>,
    pub recommendation: Recommendation,
    pub prediction_source: PredictionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherImpact>,
}

/// Candidates pulled from the live collaborators.
#[derive(Debug, Clone)]
pub struct GatheredRoutes {
    pub candidates: Vec<RouteCandidate>,
    pub weather: Option<WeatherImpact>,
}

pub struct Advisor {
    extractor: FeatureExtractor,
    predictor: DurationPredictor,
    engine: RecommendationEngine,
    model: Arc<ModelHandle>,
}

impl Advisor {
    pub fn new(
        extractor: FeatureExtractor,
        predictor: DurationPredictor,
        engine: RecommendationEngine,
        model: Arc<ModelHandle>,
    ) -> Self {
        Self {
            extractor,
            predictor,
            engine,
            model,
        }
    }

    pub fn from_config(config: &AdvisorConfig, model: Arc<ModelHandle>) -> Self {
        Self::new(
            FeatureExtractor::new(config.features.clone()),
            DurationPredictor::new(config.predictor.clone()),
            RecommendationEngine::new(config.recommendation.clone()),
            model,
        )
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn predictor(&self) -> &DurationPredictor {
        &self.predictor
    }

    /// Predicts every candidate and decides whether to switch away from
    /// the current route.
    ///
    /// All routes of one request are predicted against the same model
    /// snapshot, even if a retrain lands in the middle.
    pub fn compare(&self, request: &ComparisonRequest) -> Result<RouteComparison, AdvisorError> {
        if request.candidates.is_empty() {
            return Err(AdvisorError::invalid("no candidate routes"));
        }
        let threshold = match request.threshold_minutes {
            Some(threshold) if !(threshold >= 0.0) => {
                return Err(AdvisorError::invalid(format!(
                    "threshold must be a non-negative number of minutes, got {}",
                    threshold
                )));
            }
            Some(threshold) => threshold,
            None => self.engine.config().threshold_minutes,
        };

        let mut seen = HashSet::new();
        for candidate in &request.candidates {
            if !seen.insert(candidate.route.id.as_str()) {
                return Err(AdvisorError::invalid(format!(
                    "duplicate route id {}",
                    candidate.route.id
                )));
            }
        }
        let current_index = request
            .candidates
            .iter()
            .position(|candidate| candidate.route.id == request.current_route_id)
            .ok_or_else(|| {
                AdvisorError::invalid(format!(
                    "current route {} is not among the candidates",
                    request.current_route_id
                ))
            })?;

        let model = self.model.snapshot();
        let prediction_source = if model.is_some() {
            PredictionSource::Trained
        } else {
            PredictionSource::Heuristic
        };

        let mut routes: Vec<RouteOption> = request
            .candidates
            .par_iter()
            .map(|candidate| self.predict_route(model.as_deref(), candidate, request))
            .collect::<Result<_, _>>()?;

        let mut current = routes.remove(current_index);
        current.savings_vs_current = Some(0.0);
        let current_minutes = current.predicted_duration_minutes.unwrap_or_default();
        for alternative in &mut routes {
            let predicted = alternative.predicted_duration_minutes.unwrap_or_default();
            alternative.savings_vs_current = Some(savings_minutes(current_minutes, predicted));
        }

        let recommendation = self.engine.recommend(&current, &routes, threshold)?;
        tracing::info!(
            current = %current.id,
            alternatives = routes.len(),
            source = ?prediction_source,
            switch_to = recommendation.route_id.as_deref().unwrap_or("-"),
            "compared routes"
        );

        Ok(RouteComparison {
            current,
            alternatives: routes,
            recommendation,
            prediction_source,
            weather: request.weather,
        })
    }

    fn predict_route(
        &self,
        model: Option<&TrainedModel>,
        candidate: &RouteCandidate,
        request: &ComparisonRequest,
    ) -> Result<RouteOption, AdvisorError> {
        let features = self.extractor.extract(
            &candidate.route,
            request.departure,
            &candidate.traffic,
            request.weather,
        )?;
        let prediction = self.predictor.predict(model, &features);
        tracing::debug!(
            route = %candidate.route.id,
            multiplier = prediction.multiplier,
            confidence = prediction.confidence,
            "predicted route"
        );

        let mut route = candidate.route.clone();
        route.traffic_level = candidate.traffic.level;
        route.predicted_duration_minutes = Some(prediction.duration_for(route.base_duration_minutes));
        route.confidence = Some(prediction.confidence);
        Ok(route)
    }

    /// Pulls candidate routes with their traffic and the weather impact for
    /// an origin/destination pair.
    ///
    /// A traffic failure only degrades that route to an unknown level. A
    /// weather failure at one end leaves the other end's reading; failures
    /// at both ends mean no weather at all.
    pub fn gather<R, T>(
        routes: &R,
        traffic: &T,
        weather: Option<&dyn WeatherSource>,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<GatheredRoutes, AdvisorError>
    where
        R: RouteProvider + ?Sized,
        T: TrafficSource + ?Sized,
    {
        let options = routes.routes_between(origin, destination)?;

        let candidates = options
            .into_iter()
            .map(|route| {
                let snapshot = traffic.snapshot_for(&route).unwrap_or_else(|err| {
                    tracing::warn!(route = %route.id, "traffic unavailable, assuming unknown: {}", err);
                    TrafficSnapshot::unknown()
                });
                RouteCandidate::new(route, snapshot)
            })
            .collect();

        let weather = weather.and_then(|source| {
            let at = |location: Coordinate| {
                source
                    .impact_at(location)
                    .inspect_err(|err| tracing::warn!("weather unavailable: {}", err))
                    .ok()
            };
            match (at(origin), at(destination)) {
                (Some(start), Some(end)) => Some(route_impact(start, end)),
                (start, end) => start.or(end),
            }
        });

        Ok(GatheredRoutes {
            candidates,
            weather,
        })
    }
}
