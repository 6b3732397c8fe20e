use std::sync::Arc;

use octagon_odds::fight_sim::{CancelToken, MAX_RUNS};
use octagon_odds::ml_model::MlPredictor;
use octagon_odds::prediction::{Bout, BoutRequest, CardRequest};
use octagon_odds::{
    FighterStats, ModelKind, PredictRequest, PredictionConfig, PredictionService, Roster,
};

fn elite() -> FighterStats {
    FighterStats {
        name: "Elite".to_string(),
        slpm: 6.5,
        str_acc: 0.58,
        str_def: 0.65,
        td_avg: 3.0,
        td_acc: 0.5,
        td_def: 0.85,
        sub_avg: 1.0,
        height: 72.0,
        weight: 170.0,
        reach: 75.0,
        age: 28.0,
        image: Some("https://img.example/elite.png".to_string()),
    }
}

fn scrub() -> FighterStats {
    FighterStats {
        name: "Scrub".to_string(),
        slpm: 1.8,
        str_acc: 0.35,
        str_def: 0.45,
        td_avg: 0.3,
        td_acc: 0.2,
        td_def: 0.4,
        sub_avg: 0.0,
        height: 71.0,
        weight: 170.0,
        reach: 71.0,
        age: 36.0,
        image: None,
    }
}

fn service() -> PredictionService {
    let model = MlPredictor::bundled().expect("bundled artifact loads");
    PredictionService::with_model(PredictionConfig::default(), Arc::new(model))
}

fn unavailable() -> PredictionService {
    PredictionService::without_model(PredictionConfig::default(), "artifact missing")
}

#[test]
fn sim_payload_has_probabilities_but_no_penalty() {
    let out = service().predict(&PredictRequest::new(elite(), scrub(), ModelKind::Sim));
    assert_eq!(out.error, None);
    assert_eq!(out.model, "sim");
    let p = out.probabilities.expect("probabilities");
    assert!((p.p_a + p.p_b + p.p_neutral - 1.0).abs() < 1e-9);
    assert!(out.penalty_score.is_none());
    assert!(out.diffs.is_none());
    let results = out.results.expect("results");
    assert!((results.total() - 100.0).abs() < 1e-6);
    assert!(results.a > results.b);
}

#[test]
fn ml_payload_has_penalty_and_diffs_but_no_probabilities() {
    let out = service().predict(&PredictRequest::new(elite(), scrub(), ModelKind::Ml));
    assert_eq!(out.error, None);
    assert!(out.probabilities.is_none());
    let results = out.results.expect("results");
    assert_eq!(results.draw, 0.0);
    assert!(results.a > 50.0);
    assert!((results.total() - 100.0).abs() < 1e-6);
    let penalty = out.penalty_score.expect("penalty");
    assert!((0.0..=1.0).contains(&penalty));
    let diffs = out.diffs.expect("diffs");
    assert_eq!(diffs.reach_diff, 4.0);
    assert_eq!(diffs.age_diff, -8.0);
}

#[test]
fn ensemble_payload_has_everything() {
    let out = service().predict(&PredictRequest::new(elite(), scrub(), ModelKind::Ensemble));
    assert_eq!(out.error, None);
    assert_eq!(out.model, "ensemble");
    assert!(out.probabilities.is_some());
    assert!(out.penalty_score.is_some());
    assert!(out.diffs.is_some());
    let results = out.results.expect("results");
    assert!(results.a > results.b);
    assert!((results.total() - 100.0).abs() < 1e-6);
}

#[test]
fn swapped_ml_prediction_favours_the_same_fighter() {
    let svc = service();
    let ab = svc.predict(&PredictRequest::new(elite(), scrub(), ModelKind::Ml));
    let ba = svc.predict(&PredictRequest::new(scrub(), elite(), ModelKind::Ml));
    let (ab, ba) = (ab.results.expect("ab"), ba.results.expect("ba"));
    assert!(ab.a > ab.b);
    assert!(ba.b > ba.a);
}

#[test]
fn missing_model_degrades_to_simulation() {
    for kind in [ModelKind::Ml, ModelKind::Ensemble] {
        let out = unavailable().predict(&PredictRequest::new(elite(), scrub(), kind));
        let error = out.error.as_deref().expect("degradation note");
        assert!(error.contains("unavailable"), "{error}");
        assert!(out.results.is_some());
        assert!(out.probabilities.is_some());
        assert!(out.penalty_score.is_none());
    }
}

#[test]
fn sim_is_unaffected_by_missing_model() {
    let out = unavailable().predict(&PredictRequest::new(elite(), scrub(), ModelKind::Sim));
    assert_eq!(out.error, None);
    assert!(out.results.is_some());
}

#[test]
fn invalid_requests_are_rejected_without_results() {
    let svc = service();

    let out = svc.predict(&PredictRequest::new(elite(), scrub(), ModelKind::Sim).with_runs(0));
    assert!(out.results.is_none());
    assert!(out.error.expect("error").contains("runs"));

    let out = svc.predict(&PredictRequest::new(elite(), scrub(), ModelKind::Sim).with_runs(-5));
    assert!(out.is_error());

    let mut bad = scrub();
    bad.str_acc = 1.5;
    let out = svc.predict(&PredictRequest::new(elite(), bad, ModelKind::Ml));
    assert!(out.is_error());

    let mut request = PredictRequest::new(elite(), scrub(), ModelKind::Sim);
    request.model = "neural".to_string();
    let out = svc.predict(&request);
    assert!(out.error.expect("error").contains("unknown model"));

    let out = svc.predict(&PredictRequest::new(elite(), elite(), ModelKind::Sim));
    assert!(out.is_error());
}

#[test]
fn runs_override_is_honoured() {
    let request = PredictRequest::new(elite(), scrub(), ModelKind::Sim).with_runs(7);
    let out = service().predict(&request);
    let results = out.results.expect("results");
    // Seven fights can only produce multiples of 100/7 before rounding.
    let wins = results.a * 7.0 / 100.0;
    assert!((wins - wins.round()).abs() < 0.01, "{results:?}");
}

#[test]
fn nan_stats_fail_the_single_request() {
    let mut bad = scrub();
    bad.reach = f64::NAN;
    let svc = service();
    let out = svc.predict(&PredictRequest::new(elite(), bad, ModelKind::Ml));
    assert!(out.is_error());
    let ok = svc.predict(&PredictRequest::new(elite(), scrub(), ModelKind::Ml));
    assert!(!ok.is_error());
}

#[test]
fn lookup_by_name_reports_unknown_fighters() {
    let roster = Roster::from_fighters([elite(), scrub()]);
    let svc = service();
    let cancel = CancelToken::new();

    let bout = BoutRequest {
        fighter_a: "elite".to_string(),
        fighter_b: "  SCRUB ".to_string(),
        model: "sim".to_string(),
        runs: Some(200),
    };
    let out = svc.predict_by_name(&roster, &bout, &cancel);
    assert_eq!(out.error, None);
    assert_eq!(out.fighters[0].name, "Elite");
    assert_eq!(out.fighters[0].image.as_deref(), Some("https://img.example/elite.png"));

    let missing = BoutRequest {
        fighter_b: "Nobody".to_string(),
        ..bout
    };
    let out = svc.predict_by_name(&roster, &missing, &cancel);
    assert!(out.results.is_none());
    assert_eq!(out.error.as_deref(), Some("fighter not found: Nobody"));
}

#[test]
fn card_returns_one_payload_per_bout() {
    let mut other = scrub();
    other.name = "Other".to_string();
    let roster = Roster::from_fighters([elite(), scrub(), other]);
    let card = CardRequest {
        event: Some("Fight Night".to_string()),
        model: "ensemble".to_string(),
        runs: Some(300),
        bouts: vec![
            Bout {
                fighter_a: "Elite".to_string(),
                fighter_b: "Scrub".to_string(),
            },
            Bout {
                fighter_a: "Other".to_string(),
                fighter_b: "Ghost".to_string(),
            },
        ],
    };
    let out = service().predict_card(&roster, &card, &CancelToken::new());
    assert_eq!(out.fights.len(), 2);
    assert!(!out.fights[0].is_error());
    assert!(out.fights[1].is_error());
    assert_eq!(out.model, "ensemble");
}

#[test]
fn payload_json_omits_absent_fields() {
    let out = service().predict(&PredictRequest::new(elite(), scrub(), ModelKind::Sim));
    let json: serde_json::Value = serde_json::to_value(&out).unwrap();
    let obj = json.as_object().unwrap();
    assert!(obj.contains_key("probabilities"));
    assert!(!obj.contains_key("penalty_score"));
    assert!(!obj.contains_key("error"));
    let results = obj["results"].as_object().unwrap();
    assert!(results.contains_key("Elite"));
    assert!(results.contains_key("Scrub"));
    assert!(results.contains_key("Draw"));
    assert!(json["probabilities"].get("P_neutral").is_some());
    assert!(json["fighters"][1].get("image").is_none());
}

#[test]
fn ml_output_stays_in_unit_interval() {
    use octagon_odds::features::build_features;

    let model = MlPredictor::bundled().expect("bundled artifact loads");
    let mut roster = vec![elite(), scrub(), FighterStats::blank("Zero")];
    let mut giant = elite();
    giant.name = "Giant".to_string();
    giant.slpm = 40.0;
    giant.td_avg = 25.0;
    giant.reach = 90.0;
    giant.weight = 265.0;
    roster.push(giant);
    for a in &roster {
        for b in &roster {
            let p = model.predict(&build_features(a, b));
            assert!((0.0..=1.0).contains(&p), "{} vs {}: {p}", a.name, b.name);
        }
    }
}

#[test]
fn oversized_run_counts_are_rejected_up_front() {
    let svc = service();
    // A tripped token would cancel any simulation that actually started.
    let cancel = CancelToken::new();
    cancel.cancel();
    for runs in [i64::MAX, MAX_RUNS as i64 + 1] {
        let request = PredictRequest::new(elite(), scrub(), ModelKind::Sim).with_runs(runs);
        let out = svc.predict_with(&request, &cancel);
        assert!(out.results.is_none());
        let error = out.error.expect("error");
        assert!(error.contains("at most"), "{error}");
    }
}

#[test]
fn overflowing_stats_fail_instead_of_skewing_results() {
    let mut a = FighterStats::blank("Huge A");
    a.slpm = 6e307;
    a.str_acc = 1.0;
    a.str_def = 0.5;
    let mut b = a.clone();
    b.name = "Huge B".to_string();
    let out = service().predict(&PredictRequest::new(a, b, ModelKind::Sim));
    assert!(out.is_error());
    assert!(out.results.is_none());
}
