//! Benchmarks for plan scheduling.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fleetflow::workflow::{normalize_steps, StageScheduler, Step};

/// A layered plan: `width` independent steps per layer, each depending on
/// every step of the previous layer.
fn layered_plan(layers: usize, width: usize) -> Vec<Step> {
    let mut steps = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for slot in 0..width {
            let mut step = Step::new("repo.rename").with_name(format!("l{layer}-s{slot}"));
            if layer > 0 {
                for prev in 0..width {
                    step = step.with_after(format!("l{}-s{prev}", layer - 1));
                }
            }
            steps.push(step);
        }
    }
    steps
}

fn scheduler_benchmark(c: &mut Criterion) {
    let scheduler = StageScheduler::new();
    let mut group = c.benchmark_group("schedule");
    for (layers, width) in [(10, 1), (10, 10), (50, 20)] {
        let mut steps = layered_plan(layers, width);
        let _ = normalize_steps(&mut steps);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{layers}x{width}")),
            &steps,
            |b, steps| b.iter(|| scheduler.schedule(black_box(steps))),
        );
    }
    group.finish();
}

criterion_group!(benches, scheduler_benchmark);
criterion_main!(benches);
