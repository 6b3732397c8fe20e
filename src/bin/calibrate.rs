use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

use octagon_odds::calibration::{
    IsotonicCalibrator, Metrics, calibration_bins, evaluate_probs, expected_calibration_error,
};
use octagon_odds::features::build_features;
use octagon_odds::fighter::FighterStats;
use octagon_odds::ml_model::{MlPredictor, load_predictor};

/// Refit the isotonic layer of a fight model on labelled results.
#[derive(Debug, Parser)]
#[command(name = "calibrate")]
struct Args {
    /// JSON array of `{ fighter_a, fighter_b, a_won }` records.
    dataset: PathBuf,
    /// Artifact to recalibrate; defaults to the bundled model.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Where to write the recalibrated artifact. Nothing is written without it.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    bins: usize,
}

#[derive(Debug, Deserialize)]
struct LabelledFight {
    fighter_a: FighterStats,
    fighter_b: FighterStats,
    a_won: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let raw = fs::read_to_string(&args.dataset)
        .with_context(|| format!("read dataset {}", args.dataset.display()))?;
    let fights: Vec<LabelledFight> = serde_json::from_str(&raw)
        .with_context(|| format!("parse dataset {}", args.dataset.display()))?;
    if fights.len() < 2 {
        bail!("need at least two labelled fights, got {}", fights.len());
    }

    let model = load_predictor(args.model.as_deref()).context("load fight model")?;

    let mut raw_probs = Vec::with_capacity(fights.len());
    let mut current = Vec::with_capacity(fights.len());
    let mut outcomes = Vec::with_capacity(fights.len());
    for fight in &fights {
        let features = build_features(&fight.fighter_a, &fight.fighter_b);
        if let Err(err) = features.check_finite() {
            tracing::warn!(a = %fight.fighter_a.name, b = %fight.fighter_b.name, "skipping: {err}");
            continue;
        }
        raw_probs.push(model.raw_probability(&features));
        current.push(model.predict(&features));
        outcomes.push(fight.a_won);
    }
    if outcomes.is_empty() {
        bail!("no usable fights in dataset");
    }

    let calibrator = IsotonicCalibrator::fit(&raw_probs, &outcomes);
    let refit: Vec<f64> = raw_probs.iter().map(|p| calibrator.apply(*p)).collect();

    report("raw", &evaluate_probs(&raw_probs, &outcomes));
    report("current", &evaluate_probs(&current, &outcomes));
    report("refit", &evaluate_probs(&refit, &outcomes));
    println!(
        "ECE current={:.4} refit={:.4} ({} thresholds)",
        expected_calibration_error(&calibration_bins(&current, &outcomes, args.bins)),
        expected_calibration_error(&calibration_bins(&refit, &outcomes, args.bins)),
        calibrator.x.len()
    );

    if let Some(out) = args.out {
        let mut artifact = model.artifact().clone();
        artifact.calibrator = calibrator;
        artifact.generated_at = chrono::Utc::now().to_rfc3339();
        // Round-trip through validation before anything touches disk.
        let checked =
            MlPredictor::from_artifact(artifact).context("recalibrated artifact invalid")?;
        let json = serde_json::to_string(checked.artifact())?;
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("create output directory")?;
        }
        fs::write(&out, json).with_context(|| format!("write {}", out.display()))?;
        println!("wrote {}", out.display());
    }
    Ok(())
}

fn report(label: &str, m: &Metrics) {
    println!(
        "{label:<8} n={} brier={:.4} log_loss={:.4} accuracy={:.1}%",
        m.samples,
        m.brier,
        m.log_loss,
        m.accuracy * 100.0
    );
}
