use chronos_core::experiment::compute;
use chronos_core::experiment::history::HistoryRing;
use chronos_core::{BlockRange, ExperimentMode};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

fn range(start_us: u64, end_us: u64) -> Option<BlockRange> {
    Some(BlockRange { start_us, end_us })
}

fn bench_formulas(c: &mut Criterion) {
    let mut g = c.benchmark_group("formulas");
    g.bench_function("uniform_accel", |b| {
        b.iter(|| {
            compute::uniform_accel(
                black_box(50.0),
                black_box(range(0, 10_000)),
                black_box(range(100_000, 105_000)),
            )
        });
    });
    g.bench_function("free_fall", |b| {
        b.iter(|| compute::free_fall(black_box(50.0), black_box(500.0), range(0, 20_000)));
    });
    g.finish();
}

// Every push restamps sigma over the whole window; measure it at full capacity.
fn bench_history_push(c: &mut Criterion) {
    let m = compute::uniform_accel(50.0, range(0, 10_000), range(100_000, 105_000))
        .expect("reference measurement");
    c.bench_function("history_push_full_ring", |b| {
        b.iter_batched(
            || {
                let mut ring = HistoryRing::new(ExperimentMode::UniformAccel, 50);
                for _ in 0..50 {
                    ring.push(&m, String::new());
                }
                ring
            },
            |mut ring| {
                ring.push(black_box(&m), String::new());
                ring
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_formulas, bench_history_push);
criterion_main!(benches);
