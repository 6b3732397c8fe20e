use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PredictError;

/// Career statistics for one fighter, as supplied by the roster store.
///
/// Rates are per minute (`slpm`) or per 15 minutes (`td_avg`, `sub_avg`);
/// accuracy and defence values are fractions in `[0, 1]`. Physical values
/// are inches, pounds and years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterStats {
    pub name: String,
    pub slpm: f64,
    pub str_acc: f64,
    pub str_def: f64,
    pub td_avg: f64,
    pub td_acc: f64,
    pub td_def: f64,
    pub sub_avg: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub reach: f64,
    #[serde(default)]
    pub age: f64,
    #[serde(default, alias = "image_url", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl FighterStats {
    /// Zeroed stats under the given name.
    pub fn blank(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slpm: 0.0,
            str_acc: 0.0,
            str_def: 0.0,
            td_avg: 0.0,
            td_acc: 0.0,
            td_def: 0.0,
            sub_avg: 0.0,
            height: 0.0,
            weight: 0.0,
            reach: 0.0,
            age: 0.0,
            image: None,
        }
    }

    pub fn validate(&self) -> Result<(), PredictError> {
        if self.name.trim().is_empty() {
            return Err(PredictError::validation("fighter name is empty"));
        }

        let fields = [
            ("slpm", self.slpm),
            ("str_acc", self.str_acc),
            ("str_def", self.str_def),
            ("td_avg", self.td_avg),
            ("td_acc", self.td_acc),
            ("td_def", self.td_def),
            ("sub_avg", self.sub_avg),
            ("height", self.height),
            ("weight", self.weight),
            ("reach", self.reach),
            ("age", self.age),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(PredictError::validation(format!(
                    "{}: {field} must be a non-negative number, got {value}",
                    self.name
                )));
            }
        }

        let ratios = [
            ("str_acc", self.str_acc),
            ("str_def", self.str_def),
            ("td_acc", self.td_acc),
            ("td_def", self.td_def),
        ];
        for (field, value) in ratios {
            if value > 1.0 {
                return Err(PredictError::validation(format!(
                    "{}: {field} is a fraction in [0, 1], got {value}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Lookup of fighters by name. Implemented by whatever owns the roster.
pub trait FighterSource {
    fn fighter(&self, name: &str) -> Option<FighterStats>;
}

/// In-memory roster keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_name: HashMap<String, FighterStats>,
}

impl Roster {
    pub fn from_fighters(fighters: impl IntoIterator<Item = FighterStats>) -> Self {
        let mut by_name = HashMap::new();
        for f in fighters {
            by_name.insert(normalize_name(&f.name), f);
        }
        Self { by_name }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read roster {}", path.display()))?;
        let fighters = serde_json::from_str::<Vec<FighterStats>>(&raw)
            .with_context(|| format!("parse roster {}", path.display()))?;
        Ok(Self::from_fighters(fighters))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FighterSource for Roster {
    fn fighter(&self, name: &str) -> Option<FighterStats> {
        self.by_name.get(&normalize_name(name)).cloned()
    }
}

/// Lowercase, collapse whitespace/punctuation runs, keep letters and digits.
pub fn normalize_name(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut prev_space = false;
    for ch in lower.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            prev_space = false;
        } else if !prev_space && !out.is_empty() {
            out.push(' ');
            prev_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
