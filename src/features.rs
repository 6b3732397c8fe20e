use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::effectiveness::{grappling_score, striking_score};
use crate::error::PredictError;
use crate::fighter::FighterStats;

pub const FEATURE_COUNT: usize = 52;

/// Guard for ratio denominators.
pub const RATIO_EPSILON: f64 = 0.1;

/// Column order the classifier was trained on. Changing this list changes the
/// schema fingerprint, and every artifact built for the old order stops loading.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // A - B differentials
    "slpm_diff",
    "str_acc_diff",
    "str_def_diff",
    "td_avg_diff",
    "td_acc_diff",
    "td_def_diff",
    "sub_avg_diff",
    "height_diff",
    "weight_diff",
    "reach_diff",
    "age_diff",
    // raw stats
    "a_slpm",
    "a_str_acc",
    "a_str_def",
    "a_td_avg",
    "a_td_acc",
    "a_td_def",
    "a_sub_avg",
    "b_slpm",
    "b_str_acc",
    "b_str_def",
    "b_td_avg",
    "b_td_acc",
    "b_td_def",
    "b_sub_avg",
    // A / max(B, eps)
    "slpm_ratio",
    "td_avg_ratio",
    "sub_avg_ratio",
    "str_acc_ratio",
    "td_acc_ratio",
    // 1 if A > B
    "reach_adv",
    "height_adv",
    "weight_adv",
    "age_adv",
    // effectiveness
    "a_striking_score",
    "b_striking_score",
    "a_grappling_score",
    "b_grappling_score",
    "a_effectiveness",
    "b_effectiveness",
    "a_strike_grapple_product",
    "b_strike_grapple_product",
    "effectiveness_diff",
    "effectiveness_share",
    // interactions
    "striking_x_grappling_diff",
    "style_matchup",
    "reach_x_slpm_diff",
    "height_x_td_avg_diff",
    "defense_composite_diff",
    "offense_composite_diff",
    "striking_defense_gap",
    "takedown_defense_gap",
];

static SCHEMA_FINGERPRINT: Lazy<String> = Lazy::new(|| fingerprint_names(FEATURE_NAMES));

/// SHA-256 over the ordered feature names.
pub fn schema_fingerprint() -> &'static str {
    SCHEMA_FINGERPRINT.as_str()
}

pub fn fingerprint_names<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Classifier input for one ordered fighter pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.0[idx])
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }

    pub fn check_finite(&self) -> Result<(), PredictError> {
        match self.named().find(|(_, v)| !v.is_finite()) {
            Some((name, v)) => Err(PredictError::computation(format!(
                "feature {name} is not finite ({v})"
            ))),
            None => Ok(()),
        }
    }
}

pub fn build_features(a: &FighterStats, b: &FighterStats) -> FeatureVector {
    let s_a = striking_score(a, b);
    let s_b = striking_score(b, a);
    let g_a = grappling_score(a, b);
    let g_b = grappling_score(b, a);
    let e_a = s_a + g_a;
    let e_b = s_b + g_b;

    let striking_diff = s_a - s_b;
    let grappling_diff = g_a - g_b;

    FeatureVector([
        a.slpm - b.slpm,
        a.str_acc - b.str_acc,
        a.str_def - b.str_def,
        a.td_avg - b.td_avg,
        a.td_acc - b.td_acc,
        a.td_def - b.td_def,
        a.sub_avg - b.sub_avg,
        a.height - b.height,
        a.weight - b.weight,
        a.reach - b.reach,
        a.age - b.age,
        a.slpm,
        a.str_acc,
        a.str_def,
        a.td_avg,
        a.td_acc,
        a.td_def,
        a.sub_avg,
        b.slpm,
        b.str_acc,
        b.str_def,
        b.td_avg,
        b.td_acc,
        b.td_def,
        b.sub_avg,
        ratio(a.slpm, b.slpm),
        ratio(a.td_avg, b.td_avg),
        ratio(a.sub_avg, b.sub_avg),
        ratio(a.str_acc, b.str_acc),
        ratio(a.td_acc, b.td_acc),
        flag(a.reach > b.reach),
        flag(a.height > b.height),
        flag(a.weight > b.weight),
        flag(a.age > b.age),
        s_a,
        s_b,
        g_a,
        g_b,
        e_a,
        e_b,
        s_a * g_a,
        s_b * g_b,
        e_a - e_b,
        share(e_a, e_b),
        striking_diff * grappling_diff,
        style_matchup(s_a, g_a, s_b, g_b),
        (a.reach - b.reach) * (a.slpm - b.slpm),
        (a.height - b.height) * (a.td_avg - b.td_avg),
        (a.str_def + a.td_def) / 2.0 - (b.str_def + b.td_def) / 2.0,
        (a.slpm * a.str_acc + a.td_avg * a.td_acc) - (b.slpm * b.str_acc + b.td_avg * b.td_acc),
        a.slpm * (1.0 - b.str_def) - b.slpm * (1.0 - a.str_def),
        a.td_avg * (1.0 - b.td_def) - b.td_avg * (1.0 - a.td_def),
    ])
}

fn ratio(a: f64, b: f64) -> f64 {
    a / b.max(RATIO_EPSILON)
}

fn flag(cond: bool) -> f64 {
    if cond { 1.0 } else { 0.0 }
}

fn share(a: f64, b: f64) -> f64 {
    let total = a + b;
    if total > 0.0 { a / total } else { 0.5 }
}

/// +1 when A leans striker and B leans grappler, -1 for the reverse, else 0.
fn style_matchup(s_a: f64, g_a: f64, s_b: f64, g_b: f64) -> f64 {
    let lean_a = share(s_a, g_a);
    let lean_b = share(s_b, g_b);
    if lean_a > 0.5 && lean_b < 0.5 {
        1.0
    } else if lean_a < 0.5 && lean_b > 0.5 {
        -1.0
    } else {
        0.0
    }
}
