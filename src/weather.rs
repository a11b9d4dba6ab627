//! Weather driving-impact scoring.
//!
//! Weather is an optional enrichment: a missing reading encodes as
//! [`WeatherImpact::None`] and never blocks a prediction.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// How much current weather is expected to slow driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherImpact {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Severe,
}

impl WeatherImpact {
    const ORDERED: [WeatherImpact; 5] = [
        WeatherImpact::None,
        WeatherImpact::Low,
        WeatherImpact::Moderate,
        WeatherImpact::High,
        WeatherImpact::Severe,
    ];

    pub fn ordinal(self) -> f64 {
        self as u8 as f64
    }

    /// Inverse of [`ordinal`](Self::ordinal); out-of-range values clamp.
    pub fn from_ordinal(value: f64) -> Self {
        let index = value.round().clamp(0.0, 4.0) as usize;
        Self::ORDERED[index]
    }

    fn from_score(score: u32) -> Self {
        match score {
            0 => WeatherImpact::None,
            1 => WeatherImpact::Low,
            2 => WeatherImpact::Moderate,
            3 | 4 => WeatherImpact::High,
            _ => WeatherImpact::Severe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherImpact::None => "none",
            WeatherImpact::Low => "low",
            WeatherImpact::Moderate => "moderate",
            WeatherImpact::High => "high",
            WeatherImpact::Severe => "severe",
        }
    }
}

impl Display for WeatherImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed conditions at one location, in OpenWeatherMap terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    /// OpenWeatherMap condition code (2xx thunderstorm … 800 clear).
    pub condition_id: u16,
    pub visibility_m: f64,
    pub wind_speed_ms: f64,
    #[serde(default)]
    pub rain_1h_mm: f64,
    #[serde(default)]
    pub snow_1h_mm: f64,
}

impl Default for WeatherConditions {
    fn default() -> Self {
        Self {
            condition_id: 800,
            visibility_m: 10_000.0,
            wind_speed_ms: 0.0,
            rain_1h_mm: 0.0,
            snow_1h_mm: 0.0,
        }
    }
}

const FOG: u16 = 741;
const HEAVY_RAIN_FROM: u16 = 502;
const HEAVY_SNOW_FROM: u16 = 602;

/// Scores conditions and maps the score to an impact category.
pub fn driving_impact(conditions: &WeatherConditions) -> WeatherImpact {
    let id = conditions.condition_id;
    let mut score = 0;

    score += match id {
        200..=299 => 4,
        500..=599 if id >= HEAVY_RAIN_FROM => 3,
        500..=599 => 1,
        600..=699 if id >= HEAVY_SNOW_FROM => 4,
        600..=699 => 2,
        FOG => 3,
        700..=799 => 1,
        _ => 0,
    };

    score += match conditions.visibility_m {
        v if v < 1000.0 => 3,
        v if v < 3000.0 => 2,
        v if v < 5000.0 => 1,
        _ => 0,
    };

    score += match conditions.wind_speed_ms {
        w if w > 20.0 => 3,
        w if w > 15.0 => 2,
        w if w > 10.0 => 1,
        _ => 0,
    };

    if conditions.rain_1h_mm > 10.0 || conditions.snow_1h_mm > 5.0 {
        score += 2;
    } else if conditions.rain_1h_mm > 5.0 || conditions.snow_1h_mm > 2.0 {
        score += 1;
    }

    WeatherImpact::from_score(score)
}

/// A short warning for the driver, if the conditions call for one.
pub fn driving_warning(impact: WeatherImpact, conditions: &WeatherConditions) -> Option<String> {
    if impact == WeatherImpact::None {
        return None;
    }

    let id = conditions.condition_id;
    let mut warnings = Vec::new();
    if (200..300).contains(&id) {
        warnings.push("Thunderstorm activity - use caution");
    }
    if (600..700).contains(&id) {
        warnings.push("Snowy conditions - reduce speed");
    }
    if id == FOG || conditions.visibility_m < 1000.0 {
        warnings.push("Low visibility - use fog lights");
    }
    if (HEAVY_RAIN_FROM..600).contains(&id) {
        warnings.push("Heavy rain - maintain safe following distance");
    }

    if warnings.is_empty() {
        match impact {
            WeatherImpact::Severe => {
                warnings.push("Severe weather conditions - consider delaying travel")
            }
            WeatherImpact::High => warnings.push("Poor driving conditions - exercise caution"),
            WeatherImpact::Moderate => warnings.push("Weather may affect driving conditions"),
            WeatherImpact::Low | WeatherImpact::None => {}
        }
    }

    if warnings.is_empty() {
        None
    } else {
        Some(warnings.join("; "))
    }
}

/// Impact for a whole trip: the worse of the two ends.
pub fn route_impact(origin: WeatherImpact, destination: WeatherImpact) -> WeatherImpact {
    origin.max(destination)
}
