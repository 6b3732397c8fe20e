use thiserror::Error;

/// Failures a single prediction request can end in.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    #[error("fighter not found: {name}")]
    NotFound { name: String },

    #[error("ML model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("computation error: {reason}")]
    Computation { reason: String },

    #[error("simulation cancelled after {completed} of {requested} runs")]
    Cancelled { completed: usize, requested: usize },
}

impl PredictError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn computation(reason: impl Into<String>) -> Self {
        Self::Computation {
            reason: reason.into(),
        }
    }
}

/// Failures while loading or checking a trained model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("feature schema mismatch: artifact {found}, engine {expected}")]
    FeatureSchemaMismatch { expected: String, found: String },

    #[error("invalid model artifact: {reason}")]
    InvalidArtifact { reason: String },
}

impl ModelError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            reason: reason.into(),
        }
    }
}

impl From<ModelError> for PredictError {
    fn from(err: ModelError) -> Self {
        PredictError::ModelUnavailable {
            reason: err.to_string(),
        }
    }
}

/// Rejects NaN/Inf before it can leak into a payload.
pub fn ensure_finite(label: &str, value: f64) -> Result<f64, PredictError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PredictError::computation(format!("{label} is not finite ({value})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_message_reports_progress() {
        let err = PredictError::Cancelled {
            completed: 250,
            requested: 1000,
        };
        assert_eq!(
            err.to_string(),
            "simulation cancelled after 250 of 1000 runs"
        );
    }

    #[test]
    fn schema_mismatch_maps_to_unavailable() {
        let err: PredictError = ModelError::FeatureSchemaMismatch {
            expected: "abc".into(),
            found: "def".into(),
        }
        .into();
        match err {
            PredictError::ModelUnavailable { reason } => assert!(reason.contains("schema")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ensure_finite_rejects_nan() {
        assert!(ensure_finite("p", f64::NAN).is_err());
        assert_eq!(ensure_finite("p", 0.25).unwrap(), 0.25);
    }
}
