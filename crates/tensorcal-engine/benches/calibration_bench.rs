//! Calibration Benchmarks
//!
//! Encoding, tensor extraction and full runs on synthetic survey chains.
//!
//! Run with: cargo bench --bench calibration_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tensorcal_core::Cosmology;
use tensorcal_engine::synthetic::{
    reference_chain, survey_chain, SurveyConfig, SyntheticParameter, Systematic,
};
use tensorcal_engine::{
    ConvergenceController, ExtractorConfig, ResolutionSchedule, SpatialEncoder, TensorExtractor,
};

fn periodic_survey(num_samples: usize) -> tensorcal_core::Chain {
    survey_chain(&SurveyConfig {
        num_samples,
        systematic: Systematic::Periodic {
            amplitude: 4.0,
            wavelength_mpc: 109.375,
        },
        ..Default::default()
    })
    .unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let encoder = SpatialEncoder::default();
    let cosmology = Cosmology::planck2018();
    let chain = periodic_survey(1_000);
    let tags: Vec<_> = chain.samples().iter().filter_map(|s| s.spatial()).collect();

    group.throughput(Throughput::Elements(tags.len() as u64));
    for precision in [8u8, 20, 40] {
        group.bench_with_input(
            BenchmarkId::from_parameter(precision),
            &precision,
            |b, &precision| {
                b.iter(|| {
                    for tag in &tags {
                        black_box(encoder.encode(tag, &cosmology, precision).unwrap());
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let cosmology = Cosmology::planck2018();

    for size in [2_000usize, 20_000, 100_000] {
        let chain = periodic_survey(size);
        group.throughput(Throughput::Elements(size as u64));

        let sequential = TensorExtractor::new(
            SpatialEncoder::default(),
            ExtractorConfig {
                min_parallel_size: usize::MAX,
                ..Default::default()
            },
        )
        .unwrap();
        let parallel = TensorExtractor::default();

        group.bench_with_input(BenchmarkId::new("sequential", size), &chain, |b, chain| {
            b.iter(|| black_box(sequential.extract(chain, &cosmology, 12).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), &chain, |b, chain| {
            b.iter(|| black_box(parallel.extract(chain, &cosmology, 12).unwrap()))
        });
    }
    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");
    group.sample_size(20);

    let controller = ConvergenceController::default();
    let cosmology = Cosmology::planck2018();
    let reference =
        reference_chain("cmb", &[SyntheticParameter::new("H0", 67.4, 0.5)], 1_000).unwrap();
    let survey = periodic_survey(2_000);

    let schedules = [
        ("early_exit", ResolutionSchedule::new(vec![4, 8, 12, 16]).unwrap()),
        ("dense", ResolutionSchedule::range(4, 40, 1).unwrap()),
    ];
    for (name, schedule) in &schedules {
        group.bench_function(*name, |b| {
            b.iter(|| {
                black_box(
                    controller
                        .run(&reference, &survey, &cosmology, &cosmology, schedule)
                        .unwrap(),
                )
            })
        });
    }

    group.bench_function("diagnostic_sweep", |b| {
        let schedule = ResolutionSchedule::range(4, 40, 1).unwrap();
        b.iter(|| {
            black_box(
                controller
                    .diagnostic_sweep(&reference, &survey, &cosmology, &cosmology, &schedule)
                    .unwrap(),
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_extract, bench_run);
criterion_main!(benches);
