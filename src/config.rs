//! Advisor-wide configuration, assembled from defaults and `COMMUTE_*`
//! environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use jiff::tz::TimeZone;

use crate::error::ConfigError;
use crate::features::{FeatureConfig, HourWindow};
use crate::osrm::OsrmConfig;
use crate::patterns::PatternConfig;
use crate::predictor::PredictorConfig;
use crate::recommend::RecommendationConfig;
use crate::tracker::TrackerConfig;

const DEFAULT_DATA_DIR: &str = "data";
const MODEL_FILE: &str = "model.json";

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub features: FeatureConfig,
    pub predictor: PredictorConfig,
    pub recommendation: RecommendationConfig,
    pub patterns: PatternConfig,
    pub tracker: TrackerConfig,
    /// Routing backend; `None` falls back to straight-line estimates.
    pub osrm: Option<OsrmConfig>,
    pub data_dir: PathBuf,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            predictor: PredictorConfig::default(),
            recommendation: RecommendationConfig::default(),
            patterns: PatternConfig::default(),
            tracker: TrackerConfig::default(),
            osrm: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl AdvisorConfig {
    /// Defaults overridden by the process environment, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let vars = Vars(&lookup);

        if let Some(value) = vars.parse("COMMUTE_REROUTE_THRESHOLD_MINUTES")? {
            config.recommendation.threshold_minutes = value;
        }
        if let Some(value) = vars.parse("COMMUTE_MIN_CONFIDENCE")? {
            config.recommendation.min_confidence = value;
        }
        if let Some(value) = vars.parse("COMMUTE_MIN_TRAINING_SAMPLES")? {
            config.predictor.min_training_samples = value;
        }
        if let Some(value) = vars.parse("COMMUTE_HEURISTIC_CONFIDENCE")? {
            config.predictor.heuristic_confidence = value;
        }
        if let Some(value) = vars.parse("COMMUTE_MIN_MULTIPLIER")? {
            config.predictor.min_multiplier = value;
        }
        if let Some(value) = vars.parse("COMMUTE_MAX_MULTIPLIER")? {
            config.predictor.max_multiplier = value;
        }
        if let Some(value) = vars.parse("COMMUTE_RETRAIN_BATCH")? {
            config.tracker.retrain_batch = value;
        }
        if let Some(value) = vars.parse("COMMUTE_PATTERN_WINDOW")? {
            config.tracker.pattern_window = value;
        }
        if let Some(name) = vars.get("COMMUTE_TIME_ZONE") {
            config.patterns.time_zone = TimeZone::get(&name).map_err(|_| ConfigError::Parse {
                key: "COMMUTE_TIME_ZONE".to_string(),
                value: name,
            })?;
        }
        if let Some(base_url) = vars.get("COMMUTE_OSRM_URL") {
            config.osrm = Some(OsrmConfig {
                base_url,
                ..OsrmConfig::default()
            });
        }
        if let Some(dir) = vars.get("COMMUTE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rec = &self.recommendation;
        if !(rec.threshold_minutes >= 0.0) {
            return invalid("reroute threshold must be a non-negative number of minutes");
        }
        if !(0.0..=1.0).contains(&rec.min_confidence) {
            return invalid("minimum confidence must be within [0, 1]");
        }
        if !(rec.tie_epsilon_minutes >= 0.0) {
            return invalid("tie epsilon must be non-negative");
        }

        let pred = &self.predictor;
        if !(pred.min_multiplier > 0.0 && pred.min_multiplier < pred.max_multiplier) {
            return invalid("multiplier bounds must satisfy 0 < min < max");
        }
        if !(pred.heuristic_confidence >= 0.0
            && pred.heuristic_confidence < pred.trained_confidence_floor
            && pred.trained_confidence_floor <= pred.trained_confidence_ceiling
            && pred.trained_confidence_ceiling < 1.0)
        {
            return invalid(
                "confidences must satisfy 0 <= heuristic < trained floor <= trained ceiling < 1",
            );
        }
        if pred.min_training_samples < 1 {
            return invalid("minimum training samples must be at least 1");
        }
        if !(pred.recency_half_life_days > 0.0) {
            return invalid("recency half-life must be positive");
        }
        if !(pred.confidence_saturation_samples > 0.0) {
            return invalid("confidence saturation must be positive");
        }
        if !(pred.ridge_lambda > 0.0) {
            return invalid("ridge lambda must be positive");
        }

        for (label, window) in [
            ("morning rush", self.features.morning_rush),
            ("evening rush", self.features.evening_rush),
        ] {
            if !valid_window(window) {
                return invalid(&format!(
                    "{} window {}..{} is not a valid hour range",
                    label, window.start_hour, window.end_hour
                ));
            }
        }

        if self.tracker.retrain_batch < 1 {
            return invalid("retrain batch must be at least 1");
        }
        if self.tracker.pattern_window < 1 {
            return invalid("pattern window must be at least 1");
        }
        Ok(())
    }

    /// Where the trained model is persisted.
    pub fn model_path(&self) -> PathBuf {
        self.data_dir.join(MODEL_FILE)
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|_| ConfigError::Parse {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }
}

fn valid_window(window: HourWindow) -> bool {
    (0..=23).contains(&window.start_hour)
        && window.start_hour < window.end_hour
        && window.end_hour <= 24
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.to_string()))
}
