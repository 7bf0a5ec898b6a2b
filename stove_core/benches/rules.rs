use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use std::time::{Duration, Instant};
use stove_core::{CombustionRules, RuleInputs, TemperaturePipeline, TimestampedValue};
use stove_core::config::PipelineCfg;

// Synthetic burn: fast rise, plateau, slow exponential decay, plus noise
fn synth_burn(n: usize, seed: u32) -> Vec<f64> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| {
            let minutes = i as f64 / 60.0;
            let base = if minutes < 20.0 {
                20.0 + minutes * 13.0
            } else {
                20.0 + 260.0 * (-(minutes - 20.0) / 90.0).exp()
            };
            base + (next_f64() * 2.0 - 1.0) * 0.5
        })
        .collect()
}

pub fn bench_target_rate(c: &mut Criterion) {
    let mut g = c.benchmark_group("rules");
    //   BENCH_SAMPLE_SIZE=10 cargo bench -p stove_core --bench rules
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(1));
    }

    for &(name, celsius, rate) in &[
        ("idle", 20.0, 0.0),
        ("full_fire", 300.0, 0.0),
        ("embers", 190.0, -54.0),
    ] {
        let rules = CombustionRules::new(RuleInputs::constant(
            celsius,
            rate,
            Duration::from_secs(3 * 3600),
            Duration::MAX,
            None,
        ));
        g.bench_function(format!("target_rate_{name}"), |b| {
            b.iter(|| black_box(rules.target_rate()));
        });
    }

    g.bench_function("phase_confidences", |b| {
        let rules = CombustionRules::new(RuleInputs::constant(
            200.0,
            -30.0,
            Duration::from_secs(600),
            Duration::from_secs(120),
            Some(0.5),
        ));
        b.iter(|| black_box(rules.phase_confidences()));
    });
    g.finish();
}

pub fn bench_pipeline(c: &mut Criterion) {
    let mut g = c.benchmark_group("pipeline");
    g.sample_size(20);
    // One reading per second over four hours
    let trace = synth_burn(4 * 3600, 0xC0FFEE);
    g.bench_function("four_hour_burn", |b| {
        b.iter_batched(
            || (TemperaturePipeline::new(&PipelineCfg::default()), Instant::now()),
            |(mut pipeline, t0)| {
                for (i, &celsius) in trace.iter().enumerate() {
                    let at = t0 + Duration::from_secs(i as u64);
                    black_box(pipeline.push(TimestampedValue::new(celsius, at)));
                }
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(benches, bench_target_rate, bench_pipeline);
criterion_main!(benches);
