use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Piecewise-linear monotone map from raw to calibrated probability.
///
/// `x` holds ascending raw-probability thresholds and `y` the calibrated value
/// at each threshold. Inputs outside `[x[0], x[last]]` are clipped to the end
/// values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl IsotonicCalibrator {
    pub fn identity() -> Self {
        Self {
            x: vec![0.0, 1.0],
            y: vec![0.0, 1.0],
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.x.is_empty() || self.x.len() != self.y.len() {
            return Err(ModelError::invalid(format!(
                "calibrator needs matching non-empty thresholds (x={}, y={})",
                self.x.len(),
                self.y.len()
            )));
        }
        if self.x.iter().chain(&self.y).any(|v| !v.is_finite()) {
            return Err(ModelError::invalid("calibrator contains non-finite values"));
        }
        if self.x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ModelError::invalid("calibrator thresholds must be strictly ascending"));
        }
        if self.y.windows(2).any(|w| w[1] < w[0]) {
            return Err(ModelError::invalid("calibrator values must be non-decreasing"));
        }
        if self.y.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(ModelError::invalid("calibrator values must lie in [0, 1]"));
        }
        Ok(())
    }

    pub fn apply(&self, p: f64) -> f64 {
        let (Some(&x0), Some(&xn)) = (self.x.first(), self.x.last()) else {
            return p.clamp(0.0, 1.0);
        };
        let out = if p <= x0 {
            self.y[0]
        } else if p >= xn {
            self.y[self.y.len() - 1]
        } else {
            let hi = self.x.partition_point(|v| *v <= p);
            let lo = hi - 1;
            let span = self.x[hi] - self.x[lo];
            let t = (p - self.x[lo]) / span;
            self.y[lo] + t * (self.y[hi] - self.y[lo])
        };
        out.clamp(0.0, 1.0)
    }

    /// Pool-adjacent-violators fit of outcome rate against raw prediction.
    pub fn fit(predictions: &[f64], outcomes: &[bool]) -> Self {
        if predictions.is_empty() || predictions.len() != outcomes.len() {
            return Self::identity();
        }

        let mut points: Vec<(f64, f64)> = predictions
            .iter()
            .zip(outcomes)
            .filter(|(p, _)| p.is_finite())
            .map(|(p, y)| (p.clamp(0.0, 1.0), if *y { 1.0 } else { 0.0 }))
            .collect();
        if points.is_empty() {
            return Self::identity();
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        // (sum_y, weight, min_x, max_x); tied predictions start pooled.
        let mut blocks: Vec<(f64, f64, f64, f64)> = Vec::with_capacity(points.len());
        for (x, y) in points {
            match blocks.last_mut() {
                Some(last) if last.3 == x => {
                    last.0 += y;
                    last.1 += 1.0;
                }
                _ => blocks.push((y, 1.0, x, x)),
            }
            while let [.., prev, cur] = blocks.as_slice() {
                let (prev, cur) = (*prev, *cur);
                if prev.0 / prev.1 <= cur.0 / cur.1 {
                    break;
                }
                blocks.truncate(blocks.len() - 1);
                if let Some(last) = blocks.last_mut() {
                    last.0 += cur.0;
                    last.1 += cur.1;
                    last.3 = cur.3;
                }
            }
        }

        let mut x = Vec::with_capacity(blocks.len() * 2);
        let mut y = Vec::with_capacity(blocks.len() * 2);
        for (sy, w, lo, hi) in blocks {
            let mean = sy / w;
            x.push(lo);
            y.push(mean);
            if hi > lo {
                x.push(hi);
                y.push(mean);
            }
        }
        Self { x, y }
    }
}

pub fn evaluate_probs(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, won) in predictions.iter().zip(outcomes) {
        let y = if *won { 1.0 } else { 0.0 };
        brier_sum += (p - y).powi(2);
        let actual_prob = if *won { *p } else { 1.0 - p }.clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();
        if (*p >= 0.5) == *won {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(
    predictions: &[f64],
    outcomes: &[bool],
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if *won {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Expected calibration error over the given bins.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    bins.iter()
        .map(|b| (b.count as f64 / total as f64) * (b.avg_pred - b.actual_rate).abs())
        .sum()
}
