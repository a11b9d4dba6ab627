//! Duration multiplier prediction.
//!
//! A trained model is a ridge regression over standardized features,
//! predicting realized duration / base duration. Without one, a traffic-level
//! heuristic answers with a fixed, lower confidence. Either way the
//! multiplier is clamped before it touches a duration.

use std::path::Path;
use std::sync::Arc;

use jiff::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, TrainingError};
use crate::features::{FEATURE_COUNT, FEATURE_NAMES, FeatureVector};
use crate::store::{read_json, write_json_atomic};
use crate::types::TrafficLevel;
use crate::weather::WeatherImpact;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Variance below this counts as constant.
const MIN_VARIANCE: f64 = 1e-12;

/// Multipliers used when no trained model is available.
#[derive(Debug, Clone)]
pub struct HeuristicConfig {
    pub free: f64,
    pub light: f64,
    pub moderate: f64,
    pub heavy: f64,
    pub severe: f64,
    pub unknown: f64,
    /// Added during weekday rush hours.
    pub rush_hour_bump: f64,
    /// Added per weather impact, indexed none..severe.
    pub weather_bumps: [f64; 5],
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            free: 1.0,
            light: 1.1,
            moderate: 1.25,
            heavy: 1.5,
            severe: 1.9,
            unknown: 1.2,
            rush_hour_bump: 0.1,
            weather_bumps: [0.0, 0.05, 0.1, 0.2, 0.35],
        }
    }
}

impl HeuristicConfig {
    pub fn level_multiplier(&self, level: TrafficLevel) -> f64 {
        match level {
            TrafficLevel::Free => self.free,
            TrafficLevel::Light => self.light,
            TrafficLevel::Moderate => self.moderate,
            TrafficLevel::Heavy => self.heavy,
            TrafficLevel::Severe => self.severe,
            TrafficLevel::Unknown => self.unknown,
        }
    }

    fn weather_bump(&self, impact: WeatherImpact) -> f64 {
        self.weather_bumps[impact as usize]
    }
}

#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Fewer completed trips than this and no model is trained.
    pub min_training_samples: usize,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub heuristic_confidence: f64,
    /// Confidence of a trained model backed by almost no recent data.
    pub trained_confidence_floor: f64,
    /// Asymptote of trained confidence; must stay below 1.0.
    pub trained_confidence_ceiling: f64,
    /// Effective sample count at which ~63% of the floor-to-ceiling gap is
    /// closed.
    pub confidence_saturation_samples: f64,
    /// Age at which a sample counts half toward confidence.
    pub recency_half_life_days: f64,
    /// L2 penalty on standardized weights.
    pub ridge_lambda: f64,
    pub heuristic: HeuristicConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_training_samples: 10,
            min_multiplier: 0.5,
            max_multiplier: 5.0,
            heuristic_confidence: 0.4,
            trained_confidence_floor: 0.5,
            trained_confidence_ceiling: 0.95,
            confidence_saturation_samples: 40.0,
            recency_half_life_days: 30.0,
            ridge_lambda: 1.0,
            heuristic: HeuristicConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Heuristic,
    Trained,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Clamped duration multiplier.
    pub multiplier: f64,
    pub confidence: f64,
    pub source: PredictionSource,
}

impl Prediction {
    /// Predicted minutes for a route with this base duration, to 0.1 min.
    pub fn duration_for(&self, base_duration_minutes: f64) -> f64 {
        (base_duration_minutes * self.multiplier * 10.0).round() / 10.0
    }
}

/// One completed trip, as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    /// Realized duration over base duration.
    pub multiplier: f64,
    pub observed_at: Timestamp,
}

impl TrainingSample {
    /// `None` when the base duration cannot anchor a multiplier.
    pub fn from_trip(
        features: FeatureVector,
        realized_minutes: f64,
        base_minutes: f64,
        observed_at: Timestamp,
    ) -> Option<Self> {
        if !(base_minutes > 0.0) || !realized_minutes.is_finite() {
            return None;
        }
        Some(Self {
            features,
            multiplier: realized_minutes / base_minutes,
            observed_at,
        })
    }
}

/// A fitted ridge regression. Immutable once built; replaced, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    means: [f64; FEATURE_COUNT],
    scales: [f64; FEATURE_COUNT],
    weights: [f64; FEATURE_COUNT],
    intercept: f64,
    pub sample_count: usize,
    /// Sample count after recency decay.
    pub effective_samples: f64,
    pub confidence: f64,
    pub trained_at: Timestamp,
}

impl TrainedModel {
    /// Unclamped model output.
    pub fn raw_multiplier(&self, features: &FeatureVector) -> f64 {
        let values = features.values();
        self.intercept
            + (0..FEATURE_COUNT)
                .map(|i| self.weights[i] * (values[i] - self.means[i]) / self.scales[i])
                .sum::<f64>()
    }

    /// Share of each feature in the absolute standardized weights.
    pub fn feature_importance(&self) -> Vec<(&'static str, f64)> {
        let total: f64 = self.weights.iter().map(|w| w.abs()).sum();
        FEATURE_NAMES
            .iter()
            .zip(self.weights.iter())
            .map(|(name, weight)| {
                let share = if total > 0.0 { weight.abs() / total } else { 0.0 };
                (*name, share)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DurationPredictor {
    config: PredictorConfig,
}

impl DurationPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Predicts with `model` when given, otherwise with the heuristic.
    pub fn predict(&self, model: Option<&TrainedModel>, features: &FeatureVector) -> Prediction {
        if let Some(model) = model {
            let raw = model.raw_multiplier(features);
            if raw.is_finite() {
                return Prediction {
                    multiplier: self.clamp(raw),
                    confidence: model.confidence,
                    source: PredictionSource::Trained,
                };
            }
            tracing::warn!("trained model produced a non-finite multiplier, using heuristic");
        }

        Prediction {
            multiplier: self.clamp(self.heuristic_multiplier(features)),
            confidence: self.config.heuristic_confidence,
            source: PredictionSource::Heuristic,
        }
    }

    pub fn heuristic_multiplier(&self, features: &FeatureVector) -> f64 {
        let heuristic = &self.config.heuristic;
        let mut multiplier = heuristic.level_multiplier(features.traffic_level());
        if features.is_rush_hour() {
            multiplier += heuristic.rush_hour_bump;
        }
        multiplier + heuristic.weather_bump(features.weather_impact())
    }

    fn clamp(&self, multiplier: f64) -> f64 {
        multiplier.clamp(self.config.min_multiplier, self.config.max_multiplier)
    }

    /// Fits a new model. The caller decides what to do with a failure; the
    /// predictor itself holds no model.
    pub fn train(&self, samples: &[TrainingSample]) -> Result<TrainedModel, TrainingError> {
        let required = self.config.min_training_samples.max(1);
        if samples.len() < required {
            return Err(TrainingError::InsufficientSamples {
                required,
                actual: samples.len(),
            });
        }

        for (i, sample) in samples.iter().enumerate() {
            let finite = sample.multiplier.is_finite()
                && sample.features.values().iter().all(|value| value.is_finite());
            if !finite {
                return Err(TrainingError::NonFiniteSample(i));
            }
        }

        let n = samples.len() as f64;
        let target_mean = samples.iter().map(|s| s.multiplier).sum::<f64>() / n;
        let target_variance = samples
            .iter()
            .map(|s| (s.multiplier - target_mean).powi(2))
            .sum::<f64>()
            / n;
        if target_variance < MIN_VARIANCE {
            return Err(TrainingError::NoTargetVariance);
        }

        let (means, scales) = standardization(samples);
        let standardized: Vec<[f64; FEATURE_COUNT]> = samples
            .iter()
            .map(|sample| {
                let values = sample.features.values();
                std::array::from_fn(|i| (values[i] - means[i]) / scales[i])
            })
            .collect();

        // Normal equations (ZᵀZ + λI) w = Zᵀ(y − ȳ).
        let mut gram = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
        let mut rhs = [0.0; FEATURE_COUNT];
        for (z, sample) in standardized.iter().zip(samples) {
            let centered = sample.multiplier - target_mean;
            for i in 0..FEATURE_COUNT {
                rhs[i] += z[i] * centered;
                for j in 0..FEATURE_COUNT {
                    gram[i][j] += z[i] * z[j];
                }
            }
        }
        for (i, row) in gram.iter_mut().enumerate() {
            row[i] += self.config.ridge_lambda;
        }

        let weights = cholesky_solve(gram, rhs).ok_or(TrainingError::Singular)?;

        let trained_at = samples
            .iter()
            .map(|s| s.observed_at)
            .max()
            .unwrap_or(Timestamp::UNIX_EPOCH);
        let effective_samples = self.effective_samples(samples, trained_at);

        let model = TrainedModel {
            means,
            scales,
            weights,
            intercept: target_mean,
            sample_count: samples.len(),
            effective_samples,
            confidence: self.trained_confidence(effective_samples),
            trained_at,
        };
        tracing::info!(
            samples = model.sample_count,
            effective_samples = model.effective_samples,
            confidence = model.confidence,
            "trained duration model"
        );
        Ok(model)
    }

    fn effective_samples(&self, samples: &[TrainingSample], newest: Timestamp) -> f64 {
        let half_life = self.config.recency_half_life_days;
        samples
            .iter()
            .map(|sample| {
                let age_days = newest.duration_since(sample.observed_at).as_secs_f64() / SECONDS_PER_DAY;
                0.5_f64.powf(age_days.max(0.0) / half_life)
            })
            .sum()
    }

    /// Rises from the floor toward the ceiling as recent data accumulates.
    pub fn trained_confidence(&self, effective_samples: f64) -> f64 {
        let floor = self.config.trained_confidence_floor;
        let ceiling = self.config.trained_confidence_ceiling;
        let saturation = self.config.confidence_saturation_samples.max(f64::EPSILON);
        ceiling - (ceiling - floor) * (-effective_samples.max(0.0) / saturation).exp()
    }
}

fn standardization(samples: &[TrainingSample]) -> ([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]) {
    let n = samples.len() as f64;
    let mut means = [0.0; FEATURE_COUNT];
    for sample in samples {
        for (mean, value) in means.iter_mut().zip(sample.features.values()) {
            *mean += value / n;
        }
    }

    let mut scales = [0.0; FEATURE_COUNT];
    for sample in samples {
        for (i, value) in sample.features.values().iter().enumerate() {
            scales[i] += (value - means[i]).powi(2) / n;
        }
    }
    for scale in scales.iter_mut() {
        // Constant columns standardize to zero rather than dividing by zero.
        *scale = if *scale < MIN_VARIANCE { 1.0 } else { scale.sqrt() };
    }

    (means, scales)
}

/// Solves `a x = b` for symmetric positive definite `a`.
fn cholesky_solve(
    a: [[f64; FEATURE_COUNT]; FEATURE_COUNT],
    b: [f64; FEATURE_COUNT],
) -> Option<[f64; FEATURE_COUNT]> {
    let mut l = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let pivot = a[i][i] - dot;
                if !(pivot > MIN_VARIANCE) {
                    return None;
                }
                l[i][i] = pivot.sqrt();
            } else {
                l[i][j] = (a[i][j] - dot) / l[j][j];
            }
        }
    }

    let mut y = [0.0; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        let dot: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (b[i] - dot) / l[i][i];
    }

    let mut x = [0.0; FEATURE_COUNT];
    for i in (0..FEATURE_COUNT).rev() {
        let dot: f64 = (i + 1..FEATURE_COUNT).map(|k| l[k][i] * x[k]).sum();
        x[i] = (y[i] - dot) / l[i][i];
    }

    x.iter().all(|value| value.is_finite()).then_some(x)
}

/// The current trained model, shared by every request.
///
/// Readers take a cheap [`snapshot`](Self::snapshot) and keep using it for
/// the whole request; retraining fits outside the lock and swaps the whole
/// model in on success, so nobody observes a half-built model.
#[derive(Debug, Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<TrainedModel>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: TrainedModel) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(model))),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedModel>> {
        self.current.read().clone()
    }

    pub fn is_trained(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn install(&self, model: TrainedModel) -> Arc<TrainedModel> {
        let model = Arc::new(model);
        *self.current.write() = Some(Arc::clone(&model));
        model
    }

    /// Trains on `samples` and swaps the result in.
    ///
    /// On failure the previous model (or the heuristic, if there was none)
    /// stays in charge and the error is only logged and returned.
    pub fn retrain(
        &self,
        predictor: &DurationPredictor,
        samples: &[TrainingSample],
    ) -> Result<Arc<TrainedModel>, TrainingError> {
        match predictor.train(samples) {
            Ok(model) => Ok(self.install(model)),
            Err(err) => {
                tracing::warn!(
                    samples = samples.len(),
                    kept_previous = self.is_trained(),
                    "retraining failed: {}",
                    err
                );
                Err(err)
            }
        }
    }

    /// Persists the current model; returns `false` when there is none.
    pub fn save(&self, path: &Path) -> Result<bool, StoreError> {
        match self.snapshot() {
            Some(model) => {
                write_json_atomic(path, model.as_ref())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Loads a persisted model. A missing or unreadable file gives an
    /// untrained handle; only I/O failures are errors.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match read_json::<TrainedModel>(path) {
            Ok(Some(model)) => Ok(Self::with_model(model)),
            Ok(None) => Ok(Self::new()),
            Err(StoreError::Json(err)) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable model: {}", err);
                Ok(Self::new())
            }
            Err(err) => Err(err),
        }
    }
}
