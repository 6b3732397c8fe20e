use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::IsotonicCalibrator;
use crate::error::ModelError;
use crate::features::{
    FEATURE_COUNT, FEATURE_NAMES, FeatureVector, fingerprint_names, schema_fingerprint,
};

const BUNDLED_ARTIFACT: &str = include_str!("../assets/fight_model_v1.json");

/// Training configuration recorded alongside the trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    #[serde(default = "default_sample_rate")]
    pub subsample: f64,
    #[serde(default = "default_sample_rate")]
    pub colsample_bytree: f64,
    #[serde(default)]
    pub class_balanced: bool,
}

fn default_sample_rate() -> f64 {
    1.0
}

/// A node is either a split (`x[feature] < threshold` goes left) or a leaf.
/// Leaf values are already scaled by the learning rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walks from the root. Validation guarantees children come after parents,
    /// so the walk always terminates.
    pub fn eval(&self, x: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { leaf }) => return *leaf,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if x[*feature] < *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    fn validate(&self, tree_idx: usize, max_depth: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::invalid(format!("tree {tree_idx} has no nodes")));
        }
        let mut depth = vec![0usize; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { leaf } => {
                    if !leaf.is_finite() {
                        return Err(ModelError::invalid(format!(
                            "tree {tree_idx} node {idx}: non-finite leaf"
                        )));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(ModelError::invalid(format!(
                            "tree {tree_idx} node {idx}: feature {feature} out of range"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(ModelError::invalid(format!(
                            "tree {tree_idx} node {idx}: non-finite threshold"
                        )));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(ModelError::invalid(format!(
                                "tree {tree_idx} node {idx}: bad child index {child}"
                            )));
                        }
                        depth[child] = depth[idx] + 1;
                        if depth[child] > max_depth {
                            return Err(ModelError::invalid(format!(
                                "tree {tree_idx} deeper than max_depth {max_depth}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// On-disk form of a trained classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub generated_at: String,
    #[serde(default)]
    pub source: Option<String>,
    pub feature_names: Vec<String>,
    pub feature_schema: String,
    pub params: BoosterParams,
    /// Log-odds prior added before the trees.
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
    pub calibrator: IsotonicCalibrator,
}

impl ModelArtifact {
    pub fn validate(&self) -> Result<(), ModelError> {
        let expected = schema_fingerprint();
        if self.feature_names.len() != FEATURE_COUNT
            || self.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ModelError::FeatureSchemaMismatch {
                expected: expected.to_string(),
                found: fingerprint_names(&self.feature_names),
            });
        }
        if self.feature_schema != expected {
            return Err(ModelError::FeatureSchemaMismatch {
                expected: expected.to_string(),
                found: self.feature_schema.clone(),
            });
        }
        if self.trees.is_empty() {
            return Err(ModelError::invalid("artifact has no trees"));
        }
        if self.trees.len() > self.params.n_estimators {
            return Err(ModelError::invalid(format!(
                "{} trees exceed n_estimators {}",
                self.trees.len(),
                self.params.n_estimators
            )));
        }
        if !self.base_score.is_finite() {
            return Err(ModelError::invalid("base_score is not finite"));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(idx, self.params.max_depth)?;
        }
        self.calibrator.validate()
    }
}

/// Calibrated gradient-boosted classifier. Read-only after load; share it
/// behind an `Arc` across threads.
#[derive(Debug, Clone)]
pub struct MlPredictor {
    artifact: ModelArtifact,
}

impl MlPredictor {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        artifact.validate()?;
        Ok(Self { artifact })
    }

    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        Self::from_artifact(serde_json::from_str::<ModelArtifact>(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// The reference artifact compiled into the binary.
    pub fn bundled() -> Result<Self, ModelError> {
        Self::from_json(BUNDLED_ARTIFACT)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Boosted log-odds before calibration.
    pub fn margin(&self, features: &FeatureVector) -> f64 {
        let x = features.as_slice();
        self.artifact.base_score + self.artifact.trees.iter().map(|t| t.eval(x)).sum::<f64>()
    }

    pub fn raw_probability(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.margin(features))
    }

    /// Calibrated probability that fighter A wins, in `[0, 1]`.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.artifact
            .calibrator
            .apply(self.raw_probability(features))
            .clamp(0.0, 1.0)
    }
}

/// Loads `path` when given, otherwise the bundled artifact. A configured path
/// that fails to load is an error, not a silent fallback.
pub fn load_predictor(path: Option<&Path>) -> Result<MlPredictor, ModelError> {
    let predictor = match path {
        Some(p) => MlPredictor::load(p)?,
        None => MlPredictor::bundled()?,
    };
    let a = predictor.artifact();
    tracing::info!(
        trees = a.trees.len(),
        version = a.version,
        source = a.source.as_deref().unwrap_or("unknown"),
        "loaded fight model"
    );
    Ok(predictor)
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
