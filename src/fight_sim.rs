use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::effectiveness::{EffectivenessScore, effectiveness};
use crate::error::{PredictError, ensure_finite};
use crate::fighter::FighterStats;
use crate::round::{
    ExchangeProbs, MOMENTUM_MAX, RoundOutcome, RoundState, exchange_probabilities, simulate_round,
};

pub const ROUNDS: u32 = 5;
pub const DEFAULT_RUNS: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 250;
pub const DEFAULT_SEED: u64 = 42;
/// Upper bound on Monte Carlo runs for one request.
pub const MAX_RUNS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    pub runs: usize,
    pub seed: u64,
    pub batch_size: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            seed: DEFAULT_SEED,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Cooperative cancellation flag, checked between Monte Carlo batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightOutcome {
    A,
    B,
    Draw,
}

/// Win/draw counts over a batch or a whole run. Summing tallies is order-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FightTally {
    pub wins_a: usize,
    pub wins_b: usize,
    pub draws: usize,
}

impl FightTally {
    pub fn runs(&self) -> usize {
        self.wins_a + self.wins_b + self.draws
    }

    pub fn add(&mut self, outcome: FightOutcome) {
        match outcome {
            FightOutcome::A => self.wins_a += 1,
            FightOutcome::B => self.wins_b += 1,
            FightOutcome::Draw => self.draws += 1,
        }
    }

    pub fn merge(self, other: FightTally) -> FightTally {
        FightTally {
            wins_a: self.wins_a + other.wins_a,
            wins_b: self.wins_b + other.wins_b,
            draws: self.draws + other.draws,
        }
    }
}

/// Aggregated Monte Carlo result for one matchup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSummary {
    /// Round-1 exchange probabilities (no fatigue, neutral momentum).
    pub probabilities: ExchangeProbs,
    pub tally: FightTally,
    pub pct_a: f64,
    pub pct_b: f64,
    pub pct_draw: f64,
}

impl SimulationSummary {
    /// Share of decisive fights won by A; 0.5 when every fight was drawn.
    pub fn decisive_win_prob_a(&self) -> f64 {
        let decisive = self.tally.wins_a + self.tally.wins_b;
        if decisive == 0 {
            0.5
        } else {
            self.tally.wins_a as f64 / decisive as f64
        }
    }
}

/// State snapshot for one round of a traced fight.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrace {
    pub round: u32,
    pub fatigue_a: f64,
    pub fatigue_b: f64,
    pub momentum_a: f64,
    pub momentum_b: f64,
    pub probabilities: ExchangeProbs,
    pub outcome: RoundOutcome,
}

/// Precomputed unscaled effectiveness for a pairing.
#[derive(Debug, Clone, Copy)]
struct Matchup {
    a: EffectivenessScore,
    b: EffectivenessScore,
}

impl Matchup {
    fn new(a: &FighterStats, b: &FighterStats) -> Self {
        Self {
            a: effectiveness(a, b, 1.0, 1.0),
            b: effectiveness(b, a, 1.0, 1.0),
        }
    }

    fn round_probabilities(&self, state: &RoundState) -> ExchangeProbs {
        let e_a = self.a.total * state.fatigue_a * state.momentum_a;
        let e_b = self.b.total * state.fatigue_b * state.momentum_b;
        exchange_probabilities(e_a, e_b)
    }
}

/// Exchange probabilities reported for interpretability: round 1, fresh state.
pub fn baseline_probabilities(a: &FighterStats, b: &FighterStats) -> ExchangeProbs {
    let m = Matchup::new(a, b);
    exchange_probabilities(m.a.total, m.b.total)
}

/// Plays one complete fight with the caller's random source.
pub fn simulate_fight_once(
    a: &FighterStats,
    b: &FighterStats,
    rng: &mut impl Rng,
) -> FightOutcome {
    run_fight(&Matchup::new(a, b), rng, |_| {})
}

/// Same as [`simulate_fight_once`] but records every round.
pub fn trace_fight(
    a: &FighterStats,
    b: &FighterStats,
    rng: &mut impl Rng,
) -> (FightOutcome, Vec<RoundTrace>) {
    let mut rounds = Vec::with_capacity(ROUNDS as usize);
    let outcome = run_fight(&Matchup::new(a, b), rng, |t| rounds.push(t));
    (outcome, rounds)
}

fn run_fight(
    matchup: &Matchup,
    rng: &mut impl Rng,
    mut on_round: impl FnMut(RoundTrace),
) -> FightOutcome {
    let mut state = RoundState::fresh();
    for round in 1..=ROUNDS {
        state.enter_round(round);
        let probabilities = matchup.round_probabilities(&state);
        let outcome = simulate_round(&probabilities, rng);
        on_round(RoundTrace {
            round,
            fatigue_a: state.fatigue_a,
            fatigue_b: state.fatigue_b,
            momentum_a: state.momentum_a,
            momentum_b: state.momentum_b,
            probabilities,
            outcome,
        });
        state.record(&outcome);
    }

    if state.score_a > state.score_b {
        FightOutcome::A
    } else if state.score_a < state.score_b {
        FightOutcome::B
    } else {
        FightOutcome::Draw
    }
}

/// Monte Carlo fight simulator. Batches run on the configured rayon pool,
/// each with its own seeded RNG, so results depend only on the config.
pub struct FightSimulator {
    config: SimulationConfig,
    pool: Option<rayon::ThreadPool>,
}

impl FightSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config, pool: None }
    }

    pub fn with_threads(config: SimulationConfig, threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|err| tracing::warn!("simulation pool unavailable, using global: {err}"))
            .ok();
        Self { config, pool }
    }

    pub fn config(&self) -> SimulationConfig {
        self.config
    }

    pub fn simulate(
        &self,
        a: &FighterStats,
        b: &FighterStats,
        cancel: &CancelToken,
    ) -> Result<SimulationSummary, PredictError> {
        self.simulate_runs(a, b, self.config.runs, cancel)
    }

    pub fn simulate_runs(
        &self,
        a: &FighterStats,
        b: &FighterStats,
        runs: usize,
        cancel: &CancelToken,
    ) -> Result<SimulationSummary, PredictError> {
        if runs == 0 {
            return Err(PredictError::validation("runs must be positive"));
        }
        if runs > MAX_RUNS {
            return Err(PredictError::validation(format!(
                "runs must be at most {MAX_RUNS}, got {runs}"
            )));
        }
        let matchup = Matchup::new(a, b);
        ensure_finite("effectiveness A", matchup.a.total)?;
        ensure_finite("effectiveness B", matchup.b.total)?;
        // Exchange shares divide by the pair total at peak momentum.
        ensure_finite(
            "combined effectiveness",
            (matchup.a.total + matchup.b.total) * MOMENTUM_MAX,
        )?;

        let batch_size = self.config.batch_size.max(1);
        let seed = self.config.seed;
        let batches = runs.div_ceil(batch_size);

        // (completed tally, some batch was skipped)
        let run_all = || {
            (0..batches)
                .into_par_iter()
                .map(|idx| {
                    if cancel.is_cancelled() {
                        return (FightTally::default(), true);
                    }
                    let start = idx * batch_size;
                    let len = batch_size.min(runs - start);
                    (run_batch(&matchup, batch_seed(seed, idx as u64), len), false)
                })
                .reduce(
                    || (FightTally::default(), false),
                    |(left, left_cut), (right, right_cut)| {
                        (left.merge(right), left_cut || right_cut)
                    },
                )
        };
        let (completed, cancelled) = match self.pool.as_ref() {
            Some(pool) => pool.install(run_all),
            None => run_all(),
        };

        if cancelled {
            tracing::debug!(completed = completed.runs(), runs, "simulation cancelled");
            return Err(PredictError::Cancelled {
                completed: completed.runs(),
                requested: runs,
            });
        }

        summarize(exchange_probabilities(matchup.a.total, matchup.b.total), completed)
    }
}

fn run_batch(matchup: &Matchup, seed: u64, len: usize) -> FightTally {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tally = FightTally::default();
    for _ in 0..len {
        tally.add(run_fight(matchup, &mut rng, |_| {}));
    }
    tally
}

fn summarize(
    probabilities: ExchangeProbs,
    tally: FightTally,
) -> Result<SimulationSummary, PredictError> {
    let n = tally.runs() as f64;
    let pct = |count: usize| count as f64 / n * 100.0;
    Ok(SimulationSummary {
        probabilities: ExchangeProbs {
            p_a: ensure_finite("P_A", probabilities.p_a)?,
            p_b: ensure_finite("P_B", probabilities.p_b)?,
            p_neutral: probabilities.p_neutral,
        },
        tally,
        pct_a: pct(tally.wins_a),
        pct_b: pct(tally.wins_b),
        pct_draw: pct(tally.draws),
    })
}

/// SplitMix64 over (seed, batch) so neighbouring batches get unrelated streams.
fn batch_seed(seed: u64, batch: u64) -> u64 {
    let mut z = seed ^ batch.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
