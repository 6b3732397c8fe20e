use rand::Rng;
use serde::{Deserialize, Serialize};

pub const EXCHANGES_PER_ROUND: usize = 10;
pub const P_NEUTRAL: f64 = 0.4;
const DECISIVE_SHARE: f64 = 1.0 - P_NEUTRAL;

pub const FATIGUE_PER_ROUND: f64 = 0.05;
pub const MOMENTUM_MIN: f64 = 0.70;
pub const MOMENTUM_MAX: f64 = 1.30;
const MOMENTUM_SURGE: f64 = 1.10;
const MOMENTUM_SLUMP: f64 = 0.95;
const MOMENTUM_SWING_DIFF: i32 = 2;

/// Per-exchange outcome probabilities. Always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeProbs {
    #[serde(rename = "P_A")]
    pub p_a: f64,
    #[serde(rename = "P_B")]
    pub p_b: f64,
    #[serde(rename = "P_neutral")]
    pub p_neutral: f64,
}

impl ExchangeProbs {
    pub fn even() -> Self {
        Self {
            p_a: DECISIVE_SHARE / 2.0,
            p_b: DECISIVE_SHARE / 2.0,
            p_neutral: P_NEUTRAL,
        }
    }

    pub fn sum(&self) -> f64 {
        self.p_a + self.p_b + self.p_neutral
    }
}

/// Splits the decisive 60% by effectiveness share.
pub fn exchange_probabilities(e_a: f64, e_b: f64) -> ExchangeProbs {
    let total = e_a + e_b;
    if total <= 0.0 {
        return ExchangeProbs::even();
    }
    let p_a = DECISIVE_SHARE * e_a / total;
    ExchangeProbs {
        p_a,
        // Derived by subtraction so the triple sums to 1 up to one rounding step.
        p_b: DECISIVE_SHARE - p_a,
        p_neutral: P_NEUTRAL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    A,
    B,
    Neutral,
}

pub fn draw_exchange(probs: &ExchangeProbs, rng: &mut impl Rng) -> Exchange {
    let u: f64 = rng.r#gen();
    if u < probs.p_a {
        Exchange::A
    } else if u < probs.p_a + probs.p_neutral {
        Exchange::Neutral
    } else {
        Exchange::B
    }
}

/// Tally of one simulated round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundOutcome {
    pub wins_a: u32,
    pub wins_b: u32,
    pub neutral: u32,
    pub score_a: u32,
    pub score_b: u32,
}

impl RoundOutcome {
    /// Exchange-win differential from fighter A's side.
    pub fn differential(&self) -> i32 {
        self.wins_a as i32 - self.wins_b as i32
    }
}

/// Plays the 10 exchanges of one round and scores it 10-9 or 10-10.
pub fn simulate_round(probs: &ExchangeProbs, rng: &mut impl Rng) -> RoundOutcome {
    let mut out = RoundOutcome::default();
    for _ in 0..EXCHANGES_PER_ROUND {
        match draw_exchange(probs, rng) {
            Exchange::A => out.wins_a += 1,
            Exchange::B => out.wins_b += 1,
            Exchange::Neutral => out.neutral += 1,
        }
    }
    let (score_a, score_b) = if out.wins_a > out.wins_b {
        (10, 9)
    } else if out.wins_a < out.wins_b {
        (9, 10)
    } else {
        (10, 10)
    };
    out.score_a = score_a;
    out.score_b = score_b;
    out
}

/// `max(0, 1 - 0.05·r)` for a 1-based round index.
pub fn fatigue_for_round(round: u32) -> f64 {
    (1.0 - round as f64 * FATIGUE_PER_ROUND).max(0.0)
}

/// Next momentum value given the previous round's differential for this fighter.
pub fn next_momentum(current: f64, differential: i32) -> f64 {
    let next = if differential > MOMENTUM_SWING_DIFF {
        (current * MOMENTUM_SURGE).min(MOMENTUM_MAX)
    } else if differential < -MOMENTUM_SWING_DIFF {
        (current * MOMENTUM_SLUMP).max(MOMENTUM_MIN)
    } else {
        current + 0.5 * (1.0 - current)
    };
    next.clamp(MOMENTUM_MIN, MOMENTUM_MAX)
}

/// Mutable state of one simulated fight. Never shared across iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundState {
    pub fatigue_a: f64,
    pub fatigue_b: f64,
    pub momentum_a: f64,
    pub momentum_b: f64,
    pub score_a: u32,
    pub score_b: u32,
}

impl RoundState {
    pub fn fresh() -> Self {
        Self {
            fatigue_a: 1.0,
            fatigue_b: 1.0,
            momentum_a: 1.0,
            momentum_b: 1.0,
            score_a: 0,
            score_b: 0,
        }
    }

    pub fn enter_round(&mut self, round: u32) {
        let fatigue = fatigue_for_round(round);
        // Recomputed from the index, but never allowed to recover.
        self.fatigue_a = self.fatigue_a.min(fatigue);
        self.fatigue_b = self.fatigue_b.min(fatigue);
    }

    pub fn record(&mut self, outcome: &RoundOutcome) {
        self.score_a += outcome.score_a;
        self.score_b += outcome.score_b;
        let d = outcome.differential();
        self.momentum_a = next_momentum(self.momentum_a, d);
        self.momentum_b = next_momentum(self.momentum_b, -d);
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::fresh()
    }
}
