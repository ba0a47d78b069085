use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regpoison::RegressionModel;
use regpoison::data::{Dataset, PoisonSet};
use regpoison::objective::ObjectiveEvaluator;

fn random_problem(n: usize, d: usize) -> (Dataset, PoisonSet) {
    let mut rng = StdRng::seed_from_u64(0x5EED_0000 + (n * d) as u64);
    let x = Array2::from_shape_fn((n, d), |_| rng.sample::<f64, _>(Standard));
    let y = Array1::from_shape_fn(n, |_| rng.sample::<f64, _>(Standard));
    let k = (n / 10).max(1);
    let poison = PoisonSet::new(
        Array2::from_shape_fn((k, d), |_| rng.sample::<f64, _>(Standard)),
        Array1::from_shape_fn(k, |_| rng.sample::<f64, _>(Standard)),
    );
    (Dataset::new(x, y).expect("finite random data"), poison)
}

fn benchmark_surrogate(c: &mut Criterion) {
    let shapes = [(200_usize, 5_usize), (1_000, 20), (5_000, 50)];

    let mut group = c.benchmark_group("surrogate");
    for &(n, d) in shapes.iter() {
        let (train, poison) = random_problem(n, d);
        let evaluator = ObjectiveEvaluator::new(
            RegressionModel::Ridge { lambda: 0.1 },
            &train,
            train.clone(),
        )
        .expect("evaluator");
        let label = format!("{n}x{d}");
        group.throughput(Throughput::Elements(poison.len() as u64));

        group.bench_with_input(BenchmarkId::new("evaluate", &label), &poison, |b, input| {
            b.iter(|| {
                let evaluation = evaluator.evaluate(black_box(input)).expect("evaluate");
                black_box(evaluation.objective);
            });
        });

        group.bench_with_input(
            BenchmarkId::new("evaluate_and_gradient", &label),
            &poison,
            |b, input| {
                b.iter(|| {
                    let evaluation = evaluator.evaluate(black_box(input)).expect("evaluate");
                    let gradient = evaluator.gradient(&evaluation, input).expect("gradient");
                    black_box(gradient);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(surrogate, benchmark_surrogate);
criterion_main!(surrogate);
