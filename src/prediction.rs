use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::PredictionConfig;
use crate::ensemble::EnsembleCombiner;
use crate::error::{PredictError, ensure_finite};
use crate::features::build_features;
use crate::fight_sim::{CancelToken, FightSimulator, MAX_RUNS, SimulationSummary};
use crate::fighter::{FighterSource, FighterStats};
use crate::mismatch::{MismatchBand, PhysicalDiffs, penalty_score};
use crate::ml_model::{MlPredictor, load_predictor};
use crate::round::ExchangeProbs;

/// Key reserved for the draw share in `results`.
pub const DRAW_KEY: &str = "Draw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Sim,
    Ml,
    Ensemble,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Sim => "sim",
            ModelKind::Ml => "ml",
            ModelKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(ModelKind::Sim),
            "ml" => Ok(ModelKind::Ml),
            "ensemble" => Ok(ModelKind::Ensemble),
            other => Err(PredictError::validation(format!(
                "unknown model {other:?}, expected sim, ml or ensemble"
            ))),
        }
    }
}

fn default_model() -> String {
    ModelKind::Ensemble.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub fighter_a: FighterStats,
    pub fighter_b: FighterStats,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub runs: Option<i64>,
}

impl PredictRequest {
    pub fn new(fighter_a: FighterStats, fighter_b: FighterStats, model: ModelKind) -> Self {
        Self {
            fighter_a,
            fighter_b,
            model: model.as_str().to_string(),
            runs: None,
        }
    }

    pub fn with_runs(mut self, runs: i64) -> Self {
        self.runs = Some(runs);
        self
    }
}

/// A bout named by fighter, resolved through a [`FighterSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoutRequest {
    pub fighter_a: String,
    pub fighter_b: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub runs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bout {
    pub fighter_a: String,
    pub fighter_b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRequest {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub runs: Option<i64>,
    pub bouts: Vec<Bout>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardPrediction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub model: String,
    pub fights: Vec<PredictionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FighterRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl FighterRef {
    fn of(stats: &FighterStats) -> Self {
        Self {
            name: stats.name.clone(),
            image: stats.image.clone(),
        }
    }

    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            image: None,
        }
    }
}

/// Outcome percentages, serialized as `{ <a_name>: pct, <b_name>: pct, "Draw": pct }`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeSplit {
    pub name_a: String,
    pub name_b: String,
    pub a: f64,
    pub b: f64,
    pub draw: f64,
}

impl OutcomeSplit {
    /// Rounds to one decimal and pushes the rounding residue into the draw
    /// share so the three values add up to 100.
    fn from_percentages(name_a: &str, name_b: &str, pct_a: f64, pct_b: f64) -> Self {
        let a = round_to(pct_a.clamp(0.0, 100.0), 1);
        let mut b = round_to(pct_b.clamp(0.0, 100.0), 1);
        let mut draw = round_to(100.0 - a - b, 1);
        if draw < 0.0 {
            b = round_to(b + draw, 1);
            draw = 0.0;
        }
        Self {
            name_a: name_a.to_string(),
            name_b: name_b.to_string(),
            a,
            b,
            draw,
        }
    }

    pub fn total(&self) -> f64 {
        self.a + self.b + self.draw
    }
}

impl Serialize for OutcomeSplit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry(&self.name_a, &self.a)?;
        map.serialize_entry(&self.name_b, &self.b)?;
        map.serialize_entry(DRAW_KEY, &self.draw)?;
        map.end()
    }
}

/// Prediction payload. Optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub fighters: [FighterRef; 2],
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<ExchangeProbs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<OutcomeSplit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffs: Option<PhysicalDiffs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    fn rejected(fighters: [FighterRef; 2], model: &str, err: &PredictError) -> Self {
        Self {
            fighters,
            model: model.to_string(),
            probabilities: None,
            results: None,
            penalty_score: None,
            diffs: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.results.is_none()
    }
}

/// The classifier, or the reason it could not be loaded.
#[derive(Debug, Clone)]
pub enum ModelHandle {
    Ready(Arc<MlPredictor>),
    Unavailable(String),
}

impl ModelHandle {
    fn get(&self) -> Result<&MlPredictor, PredictError> {
        match self {
            ModelHandle::Ready(model) => Ok(model.as_ref()),
            ModelHandle::Unavailable(reason) => Err(PredictError::ModelUnavailable {
                reason: reason.clone(),
            }),
        }
    }
}

/// Entry point: validates a request, runs the selected model and assembles
/// the payload. Safe to share across threads; every request is independent.
pub struct PredictionService {
    config: PredictionConfig,
    simulator: FightSimulator,
    model: ModelHandle,
    combiner: EnsembleCombiner,
}

impl PredictionService {
    /// Loads the classifier from the configured path or the bundled artifact.
    /// A load failure leaves the service running in simulation-only mode.
    pub fn from_config(config: PredictionConfig) -> Self {
        let model = match load_predictor(config.model_path.as_deref()) {
            Ok(predictor) => ModelHandle::Ready(Arc::new(predictor)),
            Err(err) => {
                tracing::warn!(
                    "fight model unavailable, ml/ensemble will fall back to simulation: {err}"
                );
                ModelHandle::Unavailable(err.to_string())
            }
        };
        Self::assemble(config, model)
    }

    pub fn with_model(config: PredictionConfig, model: Arc<MlPredictor>) -> Self {
        Self::assemble(config, ModelHandle::Ready(model))
    }

    pub fn without_model(config: PredictionConfig, reason: impl Into<String>) -> Self {
        Self::assemble(config, ModelHandle::Unavailable(reason.into()))
    }

    fn assemble(config: PredictionConfig, model: ModelHandle) -> Self {
        let simulator = match config.threads {
            Some(threads) => FightSimulator::with_threads(config.simulation, threads),
            None => FightSimulator::new(config.simulation),
        };
        let combiner = EnsembleCombiner::new(config.neutral_threshold);
        Self {
            config,
            simulator,
            model,
            combiner,
        }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    pub fn model_handle(&self) -> &ModelHandle {
        &self.model
    }

    /// Never fails: expected errors are reported in the payload's `error`.
    pub fn predict(&self, request: &PredictRequest) -> PredictionResult {
        self.predict_with(request, &CancelToken::new())
    }

    pub fn predict_with(&self, request: &PredictRequest, cancel: &CancelToken) -> PredictionResult {
        match self.try_predict(request, cancel) {
            Ok(result) => result,
            Err(err) => {
                log_failure(&err);
                let fighters = [
                    FighterRef::of(&request.fighter_a),
                    FighterRef::of(&request.fighter_b),
                ];
                PredictionResult::rejected(fighters, &request.model, &err)
            }
        }
    }

    /// Looks both fighters up and predicts; unknown names give a NotFound payload.
    pub fn predict_by_name(
        &self,
        source: &dyn FighterSource,
        bout: &BoutRequest,
        cancel: &CancelToken,
    ) -> PredictionResult {
        let lookup = |name: &str| {
            source.fighter(name).ok_or_else(|| PredictError::NotFound {
                name: name.to_string(),
            })
        };
        match lookup(&bout.fighter_a).and_then(|a| lookup(&bout.fighter_b).map(|b| (a, b))) {
            Ok((fighter_a, fighter_b)) => {
                let request = PredictRequest {
                    fighter_a,
                    fighter_b,
                    model: bout.model.clone(),
                    runs: bout.runs,
                };
                self.predict_with(&request, cancel)
            }
            Err(err) => {
                log_failure(&err);
                let fighters = [
                    FighterRef::named(&bout.fighter_a),
                    FighterRef::named(&bout.fighter_b),
                ];
                PredictionResult::rejected(fighters, &bout.model, &err)
            }
        }
    }

    /// One payload per bout, in card order. Bouts fail independently.
    pub fn predict_card(
        &self,
        source: &dyn FighterSource,
        card: &CardRequest,
        cancel: &CancelToken,
    ) -> CardPrediction {
        let fights = card
            .bouts
            .iter()
            .map(|bout| {
                let request = BoutRequest {
                    fighter_a: bout.fighter_a.clone(),
                    fighter_b: bout.fighter_b.clone(),
                    model: card.model.clone(),
                    runs: card.runs,
                };
                self.predict_by_name(source, &request, cancel)
            })
            .collect();
        CardPrediction {
            event: card.event.clone(),
            model: card.model.clone(),
            fights,
        }
    }

    pub fn try_predict(
        &self,
        request: &PredictRequest,
        cancel: &CancelToken,
    ) -> Result<PredictionResult, PredictError> {
        let kind: ModelKind = request.model.parse()?;
        let runs = self.resolve_runs(request.runs)?;
        let (a, b) = (&request.fighter_a, &request.fighter_b);
        validate_pair(a, b)?;

        tracing::debug!(model = %kind, runs, fighter_a = %a.name, fighter_b = %b.name, "predict");

        match kind {
            ModelKind::Sim => self.predict_sim(a, b, runs, cancel),
            ModelKind::Ml | ModelKind::Ensemble => match self.model.get() {
                Ok(model) if kind == ModelKind::Ml => self.predict_ml(model, a, b),
                Ok(model) => self.predict_ensemble(model, a, b, runs, cancel),
                Err(unavailable) => {
                    tracing::warn!(model = %kind, "{unavailable}; serving simulation instead");
                    let mut result = self.predict_sim(a, b, runs, cancel)?;
                    result.model = kind.as_str().to_string();
                    result.error = Some(format!("{unavailable}; showing simulation result"));
                    Ok(result)
                }
            },
        }
    }

    fn resolve_runs(&self, requested: Option<i64>) -> Result<usize, PredictError> {
        match requested {
            None => Ok(self.simulator.config().runs),
            Some(n) if n <= 0 => Err(PredictError::validation(format!(
                "runs must be positive, got {n}"
            ))),
            Some(n) => usize::try_from(n)
                .ok()
                .filter(|runs| *runs <= MAX_RUNS)
                .ok_or_else(|| {
                    PredictError::validation(format!("runs must be at most {MAX_RUNS}, got {n}"))
                }),
        }
    }

    fn predict_sim(
        &self,
        a: &FighterStats,
        b: &FighterStats,
        runs: usize,
        cancel: &CancelToken,
    ) -> Result<PredictionResult, PredictError> {
        let summary = self.simulator.simulate_runs(a, b, runs, cancel)?;
        let results =
            OutcomeSplit::from_percentages(&a.name, &b.name, summary.pct_a, summary.pct_b);
        Ok(PredictionResult {
            fighters: [FighterRef::of(a), FighterRef::of(b)],
            model: ModelKind::Sim.as_str().to_string(),
            probabilities: Some(summary.probabilities),
            results: Some(results),
            penalty_score: None,
            diffs: None,
            error: None,
        })
    }

    fn predict_ml(
        &self,
        model: &MlPredictor,
        a: &FighterStats,
        b: &FighterStats,
    ) -> Result<PredictionResult, PredictError> {
        let p = classify(model, a, b)?;
        let results =
            OutcomeSplit::from_percentages(&a.name, &b.name, 100.0 * p, 100.0 * (1.0 - p));
        let (penalty, diffs) = self.mismatch(a, b)?;
        Ok(PredictionResult {
            fighters: [FighterRef::of(a), FighterRef::of(b)],
            model: ModelKind::Ml.as_str().to_string(),
            probabilities: None,
            results: Some(results),
            penalty_score: Some(penalty),
            diffs: Some(diffs),
            error: None,
        })
    }

    fn predict_ensemble(
        &self,
        model: &MlPredictor,
        a: &FighterStats,
        b: &FighterStats,
        runs: usize,
        cancel: &CancelToken,
    ) -> Result<PredictionResult, PredictError> {
        let p_ml = classify(model, a, b)?;
        let summary: SimulationSummary = self.simulator.simulate_runs(a, b, runs, cancel)?;
        let p_sim = summary.decisive_win_prob_a();
        let blended = self.combiner.combine(p_ml, p_sim);
        let p = ensure_finite("ensemble probability", blended.probability)?;
        tracing::debug!(
            p_ml,
            p_sim,
            p,
            w_ml = blended.weights.ml,
            neutral = blended.neutral,
            "ensemble blend"
        );

        let decisive = 100.0 - summary.pct_draw;
        let results = OutcomeSplit::from_percentages(
            &a.name,
            &b.name,
            decisive * p,
            decisive * (1.0 - p),
        );
        let (penalty, diffs) = self.mismatch(a, b)?;
        Ok(PredictionResult {
            fighters: [FighterRef::of(a), FighterRef::of(b)],
            model: ModelKind::Ensemble.as_str().to_string(),
            probabilities: Some(summary.probabilities),
            results: Some(results),
            penalty_score: Some(penalty),
            diffs: Some(diffs),
            error: None,
        })
    }

    fn mismatch(
        &self,
        a: &FighterStats,
        b: &FighterStats,
    ) -> Result<(f64, PhysicalDiffs), PredictError> {
        let diffs = PhysicalDiffs::between(a, b);
        let score = ensure_finite("penalty score", penalty_score(&diffs, &self.config.mismatch))?;
        tracing::debug!(score, band = MismatchBand::from_score(score).label(), "physical mismatch");
        Ok((round_to(score, 3), diffs))
    }
}

fn classify(model: &MlPredictor, a: &FighterStats, b: &FighterStats) -> Result<f64, PredictError> {
    let features = build_features(a, b);
    features.check_finite()?;
    ensure_finite("ml probability", model.predict(&features))
}

fn validate_pair(a: &FighterStats, b: &FighterStats) -> Result<(), PredictError> {
    a.validate()?;
    b.validate()?;
    if a.name == b.name {
        return Err(PredictError::validation(format!(
            "fighters must differ, both are {:?}",
            a.name
        )));
    }
    if a.name == DRAW_KEY || b.name == DRAW_KEY {
        return Err(PredictError::validation(format!(
            "{DRAW_KEY:?} is reserved and cannot be a fighter name"
        )));
    }
    Ok(())
}

fn log_failure(err: &PredictError) {
    match err {
        PredictError::Computation { .. } => tracing::error!("prediction failed: {err}"),
        PredictError::Cancelled { .. } => tracing::warn!("prediction abandoned: {err}"),
        _ => tracing::debug!("prediction rejected: {err}"),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_parses_case_insensitively() {
        assert_eq!("SIM".parse::<ModelKind>().unwrap(), ModelKind::Sim);
        assert_eq!(" ensemble ".parse::<ModelKind>().unwrap(), ModelKind::Ensemble);
        let err = "xgb".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, PredictError::Validation { .. }));
    }

    #[test]
    fn split_rounds_and_balances() {
        let s = OutcomeSplit::from_percentages("A", "B", 33.333, 33.333);
        assert_eq!(s.a, 33.3);
        assert_eq!(s.b, 33.3);
        assert!((s.draw - 33.4).abs() < 1e-9);
        assert!((s.total() - 100.0).abs() < 1e-9);

        let s = OutcomeSplit::from_percentages("A", "B", 50.05, 49.95);
        assert!(s.draw >= 0.0);
        assert!((s.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn split_serializes_in_fighter_order() {
        let s = OutcomeSplit::from_percentages("Zed", "Abe", 60.0, 30.0);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"Zed":60.0,"Abe":30.0,"Draw":10.0}"#);
    }

    #[test]
    fn draw_name_is_rejected() {
        let err =
            validate_pair(&FighterStats::blank("Draw"), &FighterStats::blank("B")).unwrap_err();
        assert!(err.to_string().contains("reserved"));
        let err =
            validate_pair(&FighterStats::blank("Same"), &FighterStats::blank("Same")).unwrap_err();
        assert!(err.to_string().contains("differ"));
    }

    #[test]
    fn request_defaults_to_ensemble() {
        let raw = r#"{
            "fighter_a": {"name":"A","slpm":1,"str_acc":0.4,"str_def":0.5,
                          "td_avg":1,"td_acc":0.3,"td_def":0.6,"sub_avg":0.2},
            "fighter_b": {"name":"B","slpm":2,"str_acc":0.5,"str_def":0.5,
                          "td_avg":0,"td_acc":0,"td_def":0.7,"sub_avg":0}
        }"#;
        let req: PredictRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.model, "ensemble");
        assert_eq!(req.runs, None);
    }

    #[test]
    fn round_to_handles_decimals() {
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(round_to(99.96, 1), 100.0);
    }
}
