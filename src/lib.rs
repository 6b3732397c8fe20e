//! Fight outcome prediction for two-fighter MMA bouts.
//!
//! Three models share one entry point, [`prediction::PredictionService`]:
//! a round-by-round Monte Carlo simulator, a calibrated gradient-boosted
//! classifier over matchup features, and a confidence-weighted ensemble
//! of the two.

pub mod calibration;
pub mod config;
pub mod effectiveness;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod fight_sim;
pub mod fighter;
pub mod mismatch;
pub mod ml_model;
pub mod prediction;
pub mod round;

pub use config::PredictionConfig;
pub use error::{ModelError, PredictError};
pub use fighter::{FighterSource, FighterStats, Roster};
pub use prediction::{ModelKind, PredictRequest, PredictionResult, PredictionService};
