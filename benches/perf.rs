use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use tennis_prep::ratings::{MatchKey, RatingStore, compute_rating_features};
use tennis_prep::score::{extract_score_features, invert_score};

const SCORES: &[&str] = &[
    "6-4 6-4",
    "6-3 6-7(5) 7-5",
    "7-6(3) 6-4",
    "6-0 6-1",
    "W/O",
    "6-3 2-1 RET",
    "7-5 0-6 6-3",
    "6-4 3-6 7-6(10)",
    "4-6 6-4 6-7(8) 7-6(2) 10-8",
];

fn synthetic_matches(n: usize) -> Vec<MatchKey> {
    let players = [
        "Moreno", "Kovac", "Bertini", "Herrera", "Andersen", "Silva", "Novak", "Ramos",
    ];
    (0..n)
        .map(|i| {
            let a = players[i % players.len()];
            let mut b = players[(i * 5 + 3) % players.len()];
            if a == b {
                b = players[(i * 5 + 4) % players.len()];
            }
            MatchKey {
                match_id: i as i64,
                datetime: format!("2021-01-01T00:{:02}:{:02}", (i / 60) % 60, i % 60),
                player_a: a.to_string(),
                player_b: b.to_string(),
                outcome: ((i / 7) % 2) as i64,
            }
        })
        .collect()
}

fn bench_score_features(c: &mut Criterion) {
    c.bench_function("score_features", |b| {
        b.iter(|| {
            for score in SCORES {
                black_box(extract_score_features(Some(black_box(score))));
            }
        })
    });
}

fn bench_score_inversion(c: &mut Criterion) {
    c.bench_function("score_inversion", |b| {
        b.iter(|| {
            for score in SCORES {
                black_box(invert_score(black_box(score)));
            }
        })
    });
}

fn bench_rating_loop(c: &mut Criterion) {
    let matches = synthetic_matches(5000);
    c.bench_function("rating_loop_5k", |b| {
        b.iter(|| {
            let mut store = RatingStore::default();
            let features = compute_rating_features(black_box(&matches), &mut store);
            black_box(features.len())
        })
    });
}

criterion_group!(
    benches,
    bench_score_features,
    bench_score_inversion,
    bench_rating_loop
);
criterion_main!(benches);
