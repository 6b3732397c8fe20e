use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use octagon_odds::features::build_features;
use octagon_odds::fight_sim::{CancelToken, FightSimulator, SimulationConfig};
use octagon_odds::ml_model::MlPredictor;
use octagon_odds::{FighterStats, ModelKind, PredictRequest, PredictionConfig, PredictionService};

fn fighter(name: &str, slpm: f64, str_acc: f64, td_avg: f64) -> FighterStats {
    FighterStats {
        name: name.to_string(),
        slpm,
        str_acc,
        str_def: 0.55,
        td_avg,
        td_acc: 0.4,
        td_def: 0.7,
        sub_avg: 0.5,
        height: 71.0,
        weight: 170.0,
        reach: 73.0,
        age: 30.0,
        image: None,
    }
}

fn bench_simulation(c: &mut Criterion) {
    let a = fighter("A", 5.2, 0.52, 1.4);
    let b = fighter("B", 3.9, 0.47, 2.1);
    let sim = FightSimulator::new(SimulationConfig::default());
    let cancel = CancelToken::new();
    c.bench_function("simulate_1000_fights", |bench| {
        bench.iter(|| sim.simulate(black_box(&a), black_box(&b), &cancel))
    });
}

fn bench_ml(c: &mut Criterion) {
    let a = fighter("A", 5.2, 0.52, 1.4);
    let b = fighter("B", 3.9, 0.47, 2.1);
    let model = MlPredictor::bundled().expect("bundled artifact");
    c.bench_function("build_features", |bench| {
        bench.iter(|| build_features(black_box(&a), black_box(&b)))
    });
    let features = build_features(&a, &b);
    c.bench_function("ml_predict", |bench| bench.iter(|| model.predict(black_box(&features))));

    let service = PredictionService::with_model(PredictionConfig::default(), Arc::new(model));
    let request = PredictRequest::new(a, b, ModelKind::Ensemble);
    c.bench_function("ensemble_request", |bench| {
        bench.iter(|| service.predict(black_box(&request)))
    });
}

criterion_group!(benches, bench_simulation, bench_ml);
criterion_main!(benches);
