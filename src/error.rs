//! Error types shared across the advisor.

use thiserror::Error;

/// Errors surfaced to callers of the advisor, tracker and engine.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("trip {0} has already ended")]
    AlreadyEnded(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("training failed: {0}")]
    Training(#[from] TrainingError),
}

impl AdvisorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AdvisorError::InvalidInput(message.into())
    }

    pub fn commute_not_found(id: &str) -> Self {
        AdvisorError::NotFound {
            kind: "commute",
            id: id.to_string(),
        }
    }

    pub fn trip_not_found(id: &str) -> Self {
        AdvisorError::NotFound {
            kind: "trip",
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed store data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a training run can be rejected. None of these are fatal: the
/// model handle keeps whatever model it already had.
#[derive(Debug, Error, PartialEq)]
pub enum TrainingError {
    #[error("need at least {required} samples, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("observed multipliers have no variance")]
    NoTargetVariance,

    #[error("sample {0} contains a non-finite value")]
    NonFiniteSample(usize),

    #[error("normal equations are singular")]
    Singular,
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Provider(String),

    #[error("no routes between origin and destination")]
    NoRoutes,
}

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("traffic source unavailable: {0}")]
    Unavailable(String),

    #[error("route has no geometry to sample")]
    NoGeometry,
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Parse { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}
