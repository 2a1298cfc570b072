//! Structural properties of encoding, extraction and distance

use tensorcal_core::{Chain, Cosmology, DistanceError};
use tensorcal_engine::synthetic::{
    reference_chain, survey_chain, SurveyConfig, SyntheticParameter, Systematic,
};
use tensorcal_engine::{
    compute_delta_t, CalibrationConfig, ConvergenceController, ExtractorConfig,
    ResolutionSchedule, SpatialEncoder, TensorExtractor,
};

fn reference() -> Chain {
    reference_chain("cmb", &[SyntheticParameter::new("H0", 67.4, 0.5)], 1000).unwrap()
}

fn periodic_survey() -> Chain {
    survey_chain(&SurveyConfig {
        systematic: Systematic::Periodic {
            amplitude: 4.0,
            wavelength_mpc: 109.375,
        },
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_addresses_nest_across_precisions() {
    let encoder = SpatialEncoder::default();
    let cosmology = Cosmology::planck2018();
    let chain = periodic_survey();

    for sample in chain.samples().iter().step_by(37) {
        let tag = sample.spatial().unwrap();
        let fine = encoder.encode(tag, &cosmology, 24).unwrap();
        for coarse_precision in [4, 8, 12, 16, 20] {
            let coarse = encoder.encode(tag, &cosmology, coarse_precision).unwrap();
            assert_eq!(fine.truncate(coarse_precision), Some(coarse));
            assert!(coarse.contains(&fine));
        }
    }
}

#[test]
fn test_cell_counts_never_decrease() {
    let controller = ConvergenceController::default();
    let cosmology = Cosmology::planck2018();
    let a = reference();
    let b = periodic_survey();
    let schedule = ResolutionSchedule::range(4, 24, 1).unwrap();

    let steps = controller
        .diagnostic_sweep(&a, &b, &cosmology, &cosmology, &schedule)
        .unwrap();
    assert_eq!(steps.len(), schedule.len());
    for pair in steps.windows(2) {
        assert!(pair[0].precision < pair[1].precision);
        assert!(pair[0].n_cells_b <= pair[1].n_cells_b);
    }
    // Untagged chain never populates a cell
    assert!(steps.iter().all(|s| s.n_cells_a == 0));
}

#[test]
fn test_extraction_is_deterministic() {
    let cosmology = Cosmology::planck2018();
    let chain = periodic_survey();
    let extractor = TensorExtractor::default();

    let first = extractor.extract(&chain, &cosmology, 10).unwrap();
    let second = extractor.extract(&chain, &cosmology, 10).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_parallel_extraction_matches_sequential() {
    let cosmology = Cosmology::planck2018();
    let chain = periodic_survey();
    let sequential = TensorExtractor::new(
        SpatialEncoder::default(),
        ExtractorConfig {
            shard_size: 128,
            min_parallel_size: usize::MAX,
            ..Default::default()
        },
    )
    .unwrap();
    let parallel = TensorExtractor::new(
        SpatialEncoder::default(),
        ExtractorConfig {
            shard_size: 128,
            min_parallel_size: 0,
            ..Default::default()
        },
    )
    .unwrap();

    for precision in [6, 8, 12] {
        assert_eq!(
            sequential.extract(&chain, &cosmology, precision).unwrap(),
            parallel.extract(&chain, &cosmology, precision).unwrap()
        );
    }
}

#[test]
fn test_delta_t_identity_and_symmetry() {
    let cosmology = Cosmology::planck2018();
    let extractor = TensorExtractor::default();
    let a = extractor.extract(&reference(), &cosmology, 8).unwrap();
    let b = extractor.extract(&periodic_survey(), &cosmology, 8).unwrap();

    assert_eq!(compute_delta_t(&a, &a).unwrap(), 0.0);
    assert_eq!(compute_delta_t(&b, &b).unwrap(), 0.0);

    let ab = compute_delta_t(&a, &b).unwrap();
    let ba = compute_delta_t(&b, &a).unwrap();
    assert_eq!(ab, ba);
    assert!((0.0..1.0).contains(&ab));
}

#[test]
fn test_delta_t_rejects_mismatched_precision() {
    let cosmology = Cosmology::planck2018();
    let extractor = TensorExtractor::default();
    let chain = periodic_survey();
    let coarse = extractor.extract(&chain, &cosmology, 8).unwrap();
    let fine = extractor.extract(&chain, &cosmology, 12).unwrap();

    assert!(matches!(
        compute_delta_t(&coarse, &fine),
        Err(DistanceError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_tensor_dimension_tracks_schema() {
    let cosmology = Cosmology::planck2018();
    let chain = reference_chain(
        "cmb",
        &[
            SyntheticParameter::new("H0", 67.4, 0.5),
            SyntheticParameter::new("Omega_m", 0.315, 0.007),
        ],
        400,
    )
    .unwrap();
    let tensor = TensorExtractor::default()
        .extract(&chain, &cosmology, 8)
        .unwrap();

    assert_eq!(tensor.dimension(), 3 * 2 + 5);
    assert_eq!(tensor.components().len(), tensor.dimension());
    assert!(!tensor.spatial().resolved);
}

#[test]
fn test_schedule_invariance_of_convergence() {
    let controller = ConvergenceController::default();
    let cosmology = Cosmology::planck2018();
    let a = reference();
    let b = periodic_survey();

    let regular = ResolutionSchedule::new(vec![4, 8, 12, 16, 20]).unwrap();
    let dense = ResolutionSchedule::range(4, 20, 2).unwrap();
    let offset = ResolutionSchedule::new(vec![4, 6, 10, 14, 20]).unwrap();

    let r1 = controller.run(&a, &b, &cosmology, &cosmology, &regular).unwrap();
    let r2 = controller.run(&a, &b, &cosmology, &cosmology, &dense).unwrap();
    let r3 = controller.run(&a, &b, &cosmology, &cosmology, &offset).unwrap();

    // Both contain precision 12 and stop there
    assert_eq!(r1.converged_precision, Some(12));
    assert_eq!(r2.converged_precision, Some(12));
    assert_eq!(r1.merged, r2.merged);
    assert_eq!(r1.final_delta_t, r2.final_delta_t);

    // Stops at a different precision, lands on nearly the same estimate
    let m1 = r1.merged.unwrap();
    let m3 = r3.merged.unwrap();
    assert_ne!(m1.precision, m3.precision);
    let v1 = m1.parameter("H0").unwrap().value;
    let v3 = m3.parameter("H0").unwrap().value;
    assert!((v1 - v3).abs() / v1.abs() < 0.01, "{v1} vs {v3}");
}

#[test]
fn test_early_exit_stops_at_first_converged_step() {
    let controller = ConvergenceController::default();
    let cosmology = Cosmology::planck2018();
    let a = reference();
    let b = periodic_survey();

    for schedule in [
        ResolutionSchedule::new(vec![4, 8, 12, 16]).unwrap(),
        ResolutionSchedule::range(4, 16, 1).unwrap(),
    ] {
        let result = controller.run(&a, &b, &cosmology, &cosmology, &schedule).unwrap();
        assert!(result.is_converged());
        assert_eq!(result.history.last().map(|s| s.precision), Some(12));
        assert!(result.history[..result.history.len() - 1]
            .iter()
            .all(|s| !s.converged));
    }
}

#[test]
fn test_without_early_exit_every_precision_is_evaluated() {
    let controller =
        ConvergenceController::new(CalibrationConfig::builder().early_exit(false).build()).unwrap();
    let cosmology = Cosmology::planck2018();
    let schedule = ResolutionSchedule::new(vec![4, 8, 12, 16]).unwrap();

    let result = controller
        .run(&reference(), &periodic_survey(), &cosmology, &cosmology, &schedule)
        .unwrap();
    assert!(result.is_converged());
    assert_eq!(result.history.len(), 4);
    assert_eq!(result.converged_precision, Some(12));
    assert_eq!(result.terminal_step().map(|s| s.precision), Some(12));
}
