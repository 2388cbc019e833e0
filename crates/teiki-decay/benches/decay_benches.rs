//! Criterion benchmarks for teiki-decay critical operations.
//!
//! Covers: fraction exponentiation and the full decay step.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use teiki_core::fraction::Fraction;
use teiki_core::traits::DecayCalculator;
use teiki_decay::TeikiDecayEngine;

fn bench_fraction_pow(c: &mut Criterion) {
    let ratio = Fraction {
        numerator: 400_000,
        denominator: 1_000_000,
    };

    c.bench_function("fraction_pow_365", |b| {
        b.iter(|| black_box(ratio).pow(black_box(365)))
    });
}

fn bench_remaining(c: &mut Criterion) {
    let engine = TeikiDecayEngine::new();

    c.bench_function("decay_remaining_one_epoch", |b| {
        b.iter(|| engine.remaining(black_box(1_000_000_000), black_box(400_000), black_box(1)))
    });

    // A project left untouched for years.
    c.bench_function("decay_remaining_many_epochs", |b| {
        b.iter(|| engine.remaining(black_box(1_000_000_000), black_box(400_000), black_box(10_000)))
    });
}

criterion_group!(benches, bench_fraction_pow, bench_remaining);
criterion_main!(benches);
