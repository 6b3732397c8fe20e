use std::env;
use std::path::PathBuf;

use crate::ensemble::DEFAULT_NEUTRAL_THRESHOLD;
use crate::fight_sim::{DEFAULT_BATCH_SIZE, DEFAULT_RUNS, DEFAULT_SEED, MAX_RUNS, SimulationConfig};
use crate::mismatch::{AttributeSet, MismatchConfig};

const MAX_THREADS: usize = 64;

/// Runtime knobs for the prediction service.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    pub simulation: SimulationConfig,
    /// Size of the dedicated simulation pool; `None` uses rayon's global pool.
    pub threads: Option<usize>,
    pub neutral_threshold: f64,
    /// Artifact to load instead of the bundled model.
    pub model_path: Option<PathBuf>,
    pub mismatch: MismatchConfig,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            threads: None,
            neutral_threshold: DEFAULT_NEUTRAL_THRESHOLD,
            model_path: None,
            mismatch: MismatchConfig::default(),
        }
    }
}

impl PredictionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Missing or unparsable values
    /// fall back to defaults; numbers are clamped to sane ranges.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty())
        };

        let runs = get("SIM_RUNS")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_RUNS)
            .clamp(1, MAX_RUNS);
        let seed = get("SIM_SEED")
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SEED);
        let batch_size = get("SIM_BATCH_SIZE")
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .clamp(1, MAX_RUNS);
        let threads = get("SIM_THREADS")
            .and_then(|val| val.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(|n| n.min(MAX_THREADS));
        let neutral_threshold = get("ENSEMBLE_NEUTRAL_THRESHOLD")
            .and_then(|val| val.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_NEUTRAL_THRESHOLD)
            .clamp(0.0, 1.0);
        let model_path = get("FIGHT_MODEL_PATH").map(PathBuf::from);

        let mut mismatch = MismatchConfig::default();
        if let Some(raw) = get("MISMATCH_WEIGHTS") {
            match AttributeSet::parse_overrides(&raw, mismatch.weights) {
                Ok(weights) => mismatch.weights = weights,
                Err(err) => tracing::warn!("ignoring MISMATCH_WEIGHTS: {err}"),
            }
        }
        if let Some(raw) = get("MISMATCH_SCALES") {
            match AttributeSet::parse_overrides(&raw, mismatch.scales) {
                Ok(scales) => mismatch.scales = scales,
                Err(err) => tracing::warn!("ignoring MISMATCH_SCALES: {err}"),
            }
        }

        Self {
            simulation: SimulationConfig {
                runs,
                seed,
                batch_size,
            },
            threads,
            neutral_threshold,
            model_path,
            mismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = PredictionConfig::from_lookup(|_| None);
        assert_eq!(cfg, PredictionConfig::default());
        assert_eq!(cfg.simulation.runs, 1000);
        assert_eq!(cfg.simulation.seed, 42);
    }

    #[test]
    fn values_are_parsed_and_clamped() {
        let cfg = PredictionConfig::from_lookup(lookup(&[
            ("SIM_RUNS", "5000"),
            ("SIM_SEED", "7"),
            ("SIM_BATCH_SIZE", "0"),
            ("SIM_THREADS", "512"),
            ("ENSEMBLE_NEUTRAL_THRESHOLD", "3.5"),
            ("FIGHT_MODEL_PATH", " /tmp/model.json "),
        ]));
        assert_eq!(cfg.simulation.runs, 5000);
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.simulation.batch_size, 1);
        assert_eq!(cfg.threads, Some(64));
        assert_eq!(cfg.neutral_threshold, 1.0);
        assert_eq!(cfg.model_path, Some(PathBuf::from("/tmp/model.json")));
    }

    #[test]
    fn garbage_falls_back() {
        let cfg = PredictionConfig::from_lookup(lookup(&[
            ("SIM_RUNS", "lots"),
            ("SIM_THREADS", "0"),
            ("ENSEMBLE_NEUTRAL_THRESHOLD", "NaN"),
            ("MISMATCH_WEIGHTS", "reach=oops"),
        ]));
        assert_eq!(cfg.simulation.runs, DEFAULT_RUNS);
        assert_eq!(cfg.threads, None);
        assert_eq!(cfg.neutral_threshold, DEFAULT_NEUTRAL_THRESHOLD);
        assert_eq!(cfg.mismatch, MismatchConfig::default());
    }

    #[test]
    fn mismatch_overrides_apply() {
        let cfg = PredictionConfig::from_lookup(lookup(&[
            ("MISMATCH_WEIGHTS", "weight=0.5,age=0"),
            ("MISMATCH_SCALES", "reach=10"),
        ]));
        assert_eq!(cfg.mismatch.weights.weight, 0.5);
        assert_eq!(cfg.mismatch.weights.age, 0.0);
        assert_eq!(cfg.mismatch.scales.reach, 10.0);
    }
}
