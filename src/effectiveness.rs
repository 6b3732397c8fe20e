use crate::fighter::FighterStats;

const TAKEDOWN_WEIGHT: f64 = 0.3;
const SUBMISSION_WEIGHT: f64 = 0.2;

/// Offensive output of one fighter against one opponent for a single round.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectivenessScore {
    pub striking: f64,
    pub grappling: f64,
    pub total: f64,
}

/// `S = SLpM · StrAcc · (1 + OppStrDef)`
pub fn striking_score(attacker: &FighterStats, defender: &FighterStats) -> f64 {
    attacker.slpm * attacker.str_acc * (1.0 + defender.str_def)
}

/// `T = TDAvg · TDAcc · (1 + OppTDDef)`
pub fn takedown_score(attacker: &FighterStats, defender: &FighterStats) -> f64 {
    attacker.td_avg * attacker.td_acc * (1.0 + defender.td_def)
}

/// `G = 0.3·T + 0.2·SubAvg`
pub fn grappling_score(attacker: &FighterStats, defender: &FighterStats) -> f64 {
    TAKEDOWN_WEIGHT * takedown_score(attacker, defender) + SUBMISSION_WEIGHT * attacker.sub_avg
}

/// `E = (S + G) · fatigue · momentum`. Non-negative inputs give a non-negative result.
pub fn effectiveness(
    attacker: &FighterStats,
    defender: &FighterStats,
    fatigue: f64,
    momentum: f64,
) -> EffectivenessScore {
    let striking = striking_score(attacker, defender);
    let grappling = grappling_score(attacker, defender);
    EffectivenessScore {
        striking,
        grappling,
        total: (striking + grappling) * fatigue * momentum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn striking_matches_formula_exactly() {
        let mut a = FighterStats::blank("A");
        a.slpm = 5.0;
        a.str_acc = 0.5;
        let mut b = FighterStats::blank("B");
        b.str_def = 0.4;

        let s = striking_score(&a, &b);
        assert!((s - 3.5).abs() < 1e-12);
        let e = effectiveness(&a, &b, 1.0, 1.0);
        assert!((e.total - 3.5).abs() < 1e-12);
        assert_eq!(e.grappling, 0.0);
    }

    #[test]
    fn grappling_combines_takedowns_and_submissions() {
        let mut a = FighterStats::blank("A");
        a.td_avg = 2.0;
        a.td_acc = 0.5;
        a.sub_avg = 1.0;
        let mut b = FighterStats::blank("B");
        b.td_def = 0.6;

        // T = 2 * 0.5 * 1.6 = 1.6; G = 0.48 + 0.2
        let g = grappling_score(&a, &b);
        assert!((g - 0.68).abs() < 1e-12);
    }

    #[test]
    fn fatigue_and_momentum_scale_total() {
        let mut a = FighterStats::blank("A");
        a.slpm = 4.0;
        a.str_acc = 0.5;
        let b = FighterStats::blank("B");
        let e = effectiveness(&a, &b, 0.8, 1.2);
        assert!((e.total - 2.0 * 0.8 * 1.2).abs() < 1e-12);
        assert!((e.striking - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_stats_give_zero() {
        let a = FighterStats::blank("A");
        let b = FighterStats::blank("B");
        assert_eq!(effectiveness(&a, &b, 1.0, 1.0).total, 0.0);
    }

    #[test]
    fn never_negative_on_grid() {
        let levels = [0.0, 0.3, 1.0, 7.5];
        for &x in &levels {
            for &y in &levels {
                let mut a = FighterStats::blank("A");
                a.slpm = x;
                a.str_acc = y.min(1.0);
                a.td_avg = y;
                a.td_acc = x.min(1.0);
                a.sub_avg = x;
                let mut b = FighterStats::blank("B");
                b.str_def = x.min(1.0);
                b.td_def = y.min(1.0);
                let e = effectiveness(&a, &b, 0.75, 0.7);
                assert!(e.total >= 0.0);
            }
        }
    }
}
