//! commute-advisor core
//!
//! Duration prediction, trip pattern analysis and route switch
//! recommendations for recurring commutes.

pub mod types;
pub mod error;
pub mod config;
pub mod traits;
pub mod features;
pub mod predictor;
pub mod patterns;
pub mod recommend;
pub mod advisor;
pub mod tracker;
pub mod store;
pub mod traffic;
pub mod weather;
pub mod osrm;
pub mod haversine;
pub mod polyline;
