pub const ML_BASE_WEIGHT: f64 = 0.6;
pub const SIM_BASE_WEIGHT: f64 = 0.4;
pub const DEFAULT_NEUTRAL_THRESHOLD: f64 = 0.02;

/// Distance from a coin flip, scaled to `[0, 1]`.
pub fn confidence(p: f64) -> f64 {
    (2.0 * (p - 0.5).abs()).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleWeights {
    pub ml: f64,
    pub sim: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleOutput {
    pub probability: f64,
    pub weights: EnsembleWeights,
    /// Both inputs were too close to 0.5 to carry signal.
    pub neutral: bool,
}

/// Confidence-weighted blend of the classifier and simulator win probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleCombiner {
    pub neutral_threshold: f64,
}

impl Default for EnsembleCombiner {
    fn default() -> Self {
        Self {
            neutral_threshold: DEFAULT_NEUTRAL_THRESHOLD,
        }
    }
}

impl EnsembleCombiner {
    pub fn new(neutral_threshold: f64) -> Self {
        Self {
            neutral_threshold: neutral_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn weights(&self, p_ml: f64, p_sim: f64) -> EnsembleWeights {
        let w_ml = (ML_BASE_WEIGHT + confidence(p_ml)) / 2.0;
        let w_sim = (SIM_BASE_WEIGHT + confidence(p_sim)) / 2.0;
        // w_ml >= 0.3 so the sum is never zero.
        let total = w_ml + w_sim;
        EnsembleWeights {
            ml: w_ml / total,
            sim: w_sim / total,
        }
    }

    pub fn combine(&self, p_ml: f64, p_sim: f64) -> EnsembleOutput {
        let p_ml = p_ml.clamp(0.0, 1.0);
        let p_sim = p_sim.clamp(0.0, 1.0);
        let weights = self.weights(p_ml, p_sim);

        if confidence(p_ml) < self.neutral_threshold && confidence(p_sim) < self.neutral_threshold {
            return EnsembleOutput {
                probability: 0.5,
                weights,
                neutral: true,
            };
        }

        EnsembleOutput {
            probability: (weights.ml * p_ml + weights.sim * p_sim).clamp(0.0, 1.0),
            weights,
            neutral: false,
        }
    }
}
