use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use octagon_odds::features::build_features;
use octagon_odds::fight_sim::CancelToken;
use octagon_odds::mismatch::MismatchBand;
use octagon_odds::prediction::{BoutRequest, CardRequest};
use octagon_odds::{
    FighterSource, FighterStats, PredictRequest, PredictionConfig, PredictionService, Roster,
};

#[derive(Debug, Parser)]
#[command(name = "octagon_odds", about = "Predict MMA fight outcomes")]
struct Cli {
    /// Abandon the simulation after this many milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict one bout from roster names or fighter stats files.
    Predict {
        fighter_a: String,
        fighter_b: String,
        /// Roster JSON (array of fighter stats). Without it, both fighters
        /// are read as stats files.
        #[arg(long)]
        roster: Option<PathBuf>,
        #[arg(long, default_value = "ensemble")]
        model: String,
        #[arg(long)]
        runs: Option<i64>,
    },
    /// Predict every bout of a card file against a roster.
    Card {
        card: PathBuf,
        #[arg(long)]
        roster: PathBuf,
    },
    /// Print the named feature vector for a pairing.
    Features {
        fighter_a: PathBuf,
        fighter_b: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancelToken::new();
    if let Some(ms) = cli.timeout_ms {
        spawn_watchdog(cancel.clone(), Duration::from_millis(ms));
    }

    match cli.command {
        Command::Predict {
            fighter_a,
            fighter_b,
            roster,
            model,
            runs,
        } => {
            let service = PredictionService::from_config(PredictionConfig::from_env());
            let result = match roster {
                Some(path) => {
                    let roster = Roster::load(&path)?;
                    let bout = BoutRequest {
                        fighter_a,
                        fighter_b,
                        model,
                        runs,
                    };
                    service.predict_by_name(&roster, &bout, &cancel)
                }
                None => {
                    let request = PredictRequest {
                        fighter_a: read_fighter(Path::new(&fighter_a))?,
                        fighter_b: read_fighter(Path::new(&fighter_b))?,
                        model,
                        runs,
                    };
                    service.predict_with(&request, &cancel)
                }
            };
            print_json(&result, cli.pretty)?;
            if let Some(score) = result.penalty_score {
                eprintln!("{} ({score:.3})", MismatchBand::from_score(score).label());
            }
        }
        Command::Card {
            card: card_path,
            roster,
        } => {
            let raw = fs::read_to_string(&card_path)
                .with_context(|| format!("read card {}", card_path.display()))?;
            let card: CardRequest = serde_json::from_str(&raw)
                .with_context(|| format!("parse card {}", card_path.display()))?;
            let roster = Roster::load(&roster)?;
            if roster.is_empty() {
                bail!("roster is empty");
            }
            let missing: Vec<&str> = card
                .bouts
                .iter()
                .flat_map(|b| [b.fighter_a.as_str(), b.fighter_b.as_str()])
                .filter(|name| roster.fighter(name).is_none())
                .collect();
            if !missing.is_empty() {
                tracing::warn!(?missing, "fighters not in roster");
            }
            let service = PredictionService::from_config(PredictionConfig::from_env());
            let prediction = service.predict_card(&roster, &card, &cancel);
            print_json(&prediction, cli.pretty)?;
        }
        Command::Features {
            fighter_a,
            fighter_b,
        } => {
            let a = read_fighter(&fighter_a)?;
            let b = read_fighter(&fighter_b)?;
            for (name, value) in build_features(&a, &b).named() {
                println!("{name:<28} {value:>12.4}");
            }
        }
    }
    Ok(())
}

fn read_fighter(path: &Path) -> Result<FighterStats> {
    let raw = fs::read_to_string(path).with_context(|| format!("read fighter {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse fighter {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn spawn_watchdog(cancel: CancelToken, after: Duration) {
    thread::spawn(move || {
        thread::sleep(after);
        tracing::warn!(timeout_ms = after.as_millis() as u64, "timeout reached, cancelling");
        cancel.cancel();
    });
}
