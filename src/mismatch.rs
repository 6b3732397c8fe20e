use serde::{Deserialize, Serialize};

use crate::fighter::FighterStats;

pub const HIGH_MISMATCH: f64 = 0.3;
pub const MODERATE_MISMATCH: f64 = 0.15;

/// Signed physical differences, fighter A minus fighter B.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDiffs {
    pub weight_diff: f64,
    pub height_diff: f64,
    pub reach_diff: f64,
    pub age_diff: f64,
}

impl PhysicalDiffs {
    pub fn between(a: &FighterStats, b: &FighterStats) -> Self {
        Self {
            weight_diff: a.weight - b.weight,
            height_diff: a.height - b.height,
            reach_diff: a.reach - b.reach,
            age_diff: a.age - b.age,
        }
    }
}

/// One value per physical attribute. Used both for weights and for the
/// difference that counts as a full mismatch on that attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    pub weight: f64,
    pub height: f64,
    pub reach: f64,
    pub age: f64,
}

impl AttributeSet {
    /// Parses `weight=0.4,height=0.2,...`; unspecified keys keep `base` values.
    pub fn parse_overrides(raw: &str, base: AttributeSet) -> Result<AttributeSet, String> {
        let mut out = base;
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got {part:?}"))?;
            let value = value
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("bad number for {key}: {value:?}"))?;
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{key} must be a non-negative number"));
            }
            match key.trim().to_ascii_lowercase().as_str() {
                "weight" => out.weight = value,
                "height" => out.height = value,
                "reach" => out.reach = value,
                "age" => out.age = value,
                other => return Err(format!("unknown attribute {other:?}")),
            }
        }
        Ok(out)
    }
}

/// Attribute weights and normalising scales for the mismatch penalty.
///
/// The defaults are placeholders pending a product decision; deployments are
/// expected to override them through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MismatchConfig {
    pub weights: AttributeSet,
    pub scales: AttributeSet,
}

impl Default for MismatchConfig {
    fn default() -> Self {
        Self {
            weights: AttributeSet {
                weight: 0.25,
                height: 0.25,
                reach: 0.25,
                age: 0.25,
            },
            scales: AttributeSet {
                weight: 30.0,
                height: 6.0,
                reach: 8.0,
                age: 12.0,
            },
        }
    }
}

/// Weighted mean of `min(|diff| / scale, 1)`, in `[0, 1]`.
pub fn penalty_score(diffs: &PhysicalDiffs, cfg: &MismatchConfig) -> f64 {
    let terms = [
        (cfg.weights.weight, diffs.weight_diff, cfg.scales.weight),
        (cfg.weights.height, diffs.height_diff, cfg.scales.height),
        (cfg.weights.reach, diffs.reach_diff, cfg.scales.reach),
        (cfg.weights.age, diffs.age_diff, cfg.scales.age),
    ];

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (w, diff, scale) in terms {
        if w <= 0.0 {
            continue;
        }
        let norm = if scale > 0.0 {
            (diff.abs() / scale).min(1.0)
        } else if diff != 0.0 {
            1.0
        } else {
            0.0
        };
        weighted += w * norm;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return 0.0;
    }
    (weighted / weight_sum).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchBand {
    Low,
    Moderate,
    High,
}

impl MismatchBand {
    pub fn from_score(score: f64) -> Self {
        if score > HIGH_MISMATCH {
            MismatchBand::High
        } else if score > MODERATE_MISMATCH {
            MismatchBand::Moderate
        } else {
            MismatchBand::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MismatchBand::High => "High mismatch detected - significant physical differences",
            MismatchBand::Moderate => "Moderate mismatch - notable physical differences",
            MismatchBand::Low => "Low mismatch - similar physical attributes",
        }
    }
}
