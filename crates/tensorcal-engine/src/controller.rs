//! Convergence controller.
//!
//! Walks a resolution schedule from coarse to fine. At every precision both
//! chains are summarized afresh, ΔT is computed and the step is recorded.
//! The first step with `ΔT < τ` ends the run as converged; running out of
//! precisions ends it as exhausted, which is a valid negative result.
//!
//! ```text
//!              ┌──────────── ΔT < τ ───────────► CONVERGED
//!              │
//!   RUNNING ───┼──── schedule exhausted ───────► EXHAUSTED
//!              │
//!              ├──── step error ───────────────► FAILED
//!              │
//!              └──── cancelled between steps ──► CANCELLED
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tensorcal_core::{Chain, Cosmology, ValidationError};
use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::distance::{parameter_gaps, parameter_tensions, EpistemicDistance};
use crate::encoder::SpatialEncoder;
use crate::error::{CalibrationError, Result};
use crate::extractor::TensorExtractor;
use crate::result::{ConvergenceResult, MergedEstimate, ResolutionStep, RunStatus, VarianceKind};
use crate::schedule::ResolutionSchedule;

/// Cooperative cancellation flag, checked between resolution steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect before the next step starts.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A chain together with the cosmology it was analysed in.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementProgram<'a> {
    /// Posterior samples
    pub chain: &'a Chain,
    /// Fiducial cosmology used to place samples
    pub cosmology: &'a Cosmology,
}

impl<'a> MeasurementProgram<'a> {
    /// Pair a chain with its cosmology.
    #[must_use]
    pub fn new(chain: &'a Chain, cosmology: &'a Cosmology) -> Self {
        Self { chain, cosmology }
    }
}

/// Result of one pair in a multi-program run.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseResult {
    /// Name of the first chain
    pub chain_a: String,
    /// Name of the second chain
    pub chain_b: String,
    /// Calibration outcome for the pair
    pub result: ConvergenceResult,
}

/// Mutable bookkeeping of a single run.
struct RunState {
    status: RunStatus,
    history: Vec<ResolutionStep>,
    converged_at: Option<usize>,
}

impl RunState {
    fn new() -> Self {
        Self {
            status: RunStatus::Running,
            history: Vec::new(),
            converged_at: None,
        }
    }

    fn transition(&mut self, to: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(CalibrationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn record(&mut self, step: ResolutionStep) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CalibrationError::InvalidTransition {
                from: self.status,
                to: RunStatus::Running,
            });
        }
        if step.converged && self.converged_at.is_none() {
            self.converged_at = Some(self.history.len());
        }
        self.history.push(step);
        Ok(())
    }

    fn finish(self, schedule: &ResolutionSchedule, threshold: f64) -> ConvergenceResult {
        let terminal = match self.converged_at {
            Some(index) => self.history.get(index),
            None => self.history.last(),
        };
        let merged = match self.status {
            RunStatus::Cancelled => None,
            _ => terminal.map(|step| {
                MergedEstimate::from_tensors(&step.tensor_a, &step.tensor_b, VarianceKind::Effective)
            }),
        };
        let final_delta_t = terminal.map(|step| step.delta_t);
        let converged_precision = self
            .converged_at
            .and_then(|index| self.history.get(index))
            .map(|step| step.precision);

        ConvergenceResult {
            status: self.status,
            threshold,
            schedule_used: schedule.precisions().to_vec(),
            history: self.history,
            merged,
            converged_precision,
            final_delta_t,
        }
    }
}

/// Drives a calibration run over a resolution schedule.
#[derive(Debug, Clone)]
pub struct ConvergenceController {
    config: CalibrationConfig,
    extractor: TensorExtractor,
    distance: EpistemicDistance,
}

impl Default for ConvergenceController {
    fn default() -> Self {
        Self {
            config: CalibrationConfig::default(),
            extractor: TensorExtractor::default(),
            distance: EpistemicDistance::default(),
        }
    }
}

impl ConvergenceController {
    /// Create a controller from a validated configuration.
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        config.validate()?;
        let encoder = SpatialEncoder::new(config.encoder.clone())?;
        let extractor = TensorExtractor::new(encoder, config.extractor.clone())?;
        let distance = EpistemicDistance::new(config.distance.clone())?;
        Ok(Self {
            config,
            extractor,
            distance,
        })
    }

    /// Controller configuration.
    #[must_use]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// The extractor used for every step.
    #[must_use]
    pub fn extractor(&self) -> &TensorExtractor {
        &self.extractor
    }

    /// Run a calibration to completion.
    pub fn run(
        &self,
        chain_a: &Chain,
        chain_b: &Chain,
        cosmology_a: &Cosmology,
        cosmology_b: &Cosmology,
        schedule: &ResolutionSchedule,
    ) -> Result<ConvergenceResult> {
        self.execute(
            MeasurementProgram::new(chain_a, cosmology_a),
            MeasurementProgram::new(chain_b, cosmology_b),
            schedule,
            None,
            &mut |_: &ResolutionStep| {},
        )
    }

    /// Run a calibration that can be cancelled between steps.
    ///
    /// A cancelled run returns `Ok` with status `Cancelled`, the steps
    /// completed so far, and no merged estimate.
    pub fn run_with_cancellation(
        &self,
        chain_a: &Chain,
        chain_b: &Chain,
        cosmology_a: &Cosmology,
        cosmology_b: &Cosmology,
        schedule: &ResolutionSchedule,
        cancel: &CancellationToken,
    ) -> Result<ConvergenceResult> {
        self.execute(
            MeasurementProgram::new(chain_a, cosmology_a),
            MeasurementProgram::new(chain_b, cosmology_b),
            schedule,
            Some(cancel),
            &mut |_: &ResolutionStep| {},
        )
    }

    /// Run with cancellation, calling `on_step` after every completed step.
    ///
    /// The callback runs on the controller's thread before the next
    /// cancellation check, so cancelling from inside it stops the run after
    /// the step just reported.
    pub fn run_observed(
        &self,
        a: MeasurementProgram<'_>,
        b: MeasurementProgram<'_>,
        schedule: &ResolutionSchedule,
        cancel: &CancellationToken,
        mut on_step: impl FnMut(&ResolutionStep),
    ) -> Result<ConvergenceResult> {
        self.execute(a, b, schedule, Some(cancel), &mut on_step)
    }

    /// Calibrate every pair of two or more programs against each other.
    pub fn run_pairwise(
        &self,
        programs: &[MeasurementProgram<'_>],
        schedule: &ResolutionSchedule,
    ) -> Result<Vec<PairwiseResult>> {
        if programs.len() < 2 {
            return Err(ValidationError::TooFewPrograms {
                count: programs.len(),
            }
            .into());
        }

        let mut results = Vec::with_capacity(programs.len() * (programs.len() - 1) / 2);
        for (i, a) in programs.iter().enumerate() {
            for b in &programs[i + 1..] {
                let result =
                    self.execute(*a, *b, schedule, None, &mut |_: &ResolutionStep| {})?;
                results.push(PairwiseResult {
                    chain_a: a.chain.name().to_string(),
                    chain_b: b.chain.name().to_string(),
                    result,
                });
            }
        }
        Ok(results)
    }

    /// Evaluate every precision of `schedule` independently and in parallel.
    ///
    /// Offline diagnostic: there is no early exit and no run state. Steps
    /// come back sorted by precision.
    pub fn diagnostic_sweep(
        &self,
        chain_a: &Chain,
        chain_b: &Chain,
        cosmology_a: &Cosmology,
        cosmology_b: &Cosmology,
        schedule: &ResolutionSchedule,
    ) -> Result<Vec<ResolutionStep>> {
        self.validate_inputs(chain_a, chain_b)?;
        schedule
            .precisions()
            .par_iter()
            .map(|&precision| {
                self.evaluate_step(chain_a, chain_b, cosmology_a, cosmology_b, precision)
            })
            .collect()
    }

    /// Extract both tensors at `precision` and compare them.
    pub fn evaluate_step(
        &self,
        chain_a: &Chain,
        chain_b: &Chain,
        cosmology_a: &Cosmology,
        cosmology_b: &Cosmology,
        precision: u8,
    ) -> Result<ResolutionStep> {
        let (tensor_a, tensor_b) = rayon::join(
            || self.extractor.extract(chain_a, cosmology_a, precision),
            || self.extractor.extract(chain_b, cosmology_b, precision),
        );
        let (tensor_a, tensor_b) = (tensor_a?, tensor_b?);

        let delta_t = self.distance.compute(&tensor_a, &tensor_b)?;
        let tension_sigma = parameter_tensions(&tensor_a, &tensor_b)?;
        let gap = parameter_gaps(&tensor_a, &tensor_b)?;

        Ok(ResolutionStep {
            precision,
            cell_size_mpc: self.extractor.encoder().cell_size(precision),
            n_cells_a: tensor_a.counts().cells,
            n_cells_b: tensor_b.counts().cells,
            excluded_a: tensor_a.counts().excluded,
            excluded_b: tensor_b.counts().excluded,
            gap,
            tension_sigma,
            converged: delta_t < self.config.threshold,
            delta_t,
            tensor_a,
            tensor_b,
        })
    }

    /// Check chain lengths and schema agreement.
    pub fn validate_inputs(&self, chain_a: &Chain, chain_b: &Chain) -> Result<()> {
        for chain in [chain_a, chain_b] {
            if chain.len() < self.config.min_chain_samples {
                return Err(ValidationError::InsufficientSamples {
                    chain: chain.name().to_string(),
                    count: chain.len(),
                    minimum: self.config.min_chain_samples,
                }
                .into());
            }
        }
        if chain_a.schema() != chain_b.schema() {
            return Err(ValidationError::SchemaMismatch {
                chain_a: chain_a.name().to_string(),
                chain_b: chain_b.name().to_string(),
                schema_a: chain_a.schema().to_vec(),
                schema_b: chain_b.schema().to_vec(),
            }
            .into());
        }
        Ok(())
    }

    /// Upper bound on sample encodings for a run.
    #[must_use]
    pub fn estimated_cost(chain_a: &Chain, chain_b: &Chain, schedule: &ResolutionSchedule) -> u64 {
        schedule.estimated_cost(chain_a.len() + chain_b.len())
    }

    fn execute(
        &self,
        a: MeasurementProgram<'_>,
        b: MeasurementProgram<'_>,
        schedule: &ResolutionSchedule,
        cancel: Option<&CancellationToken>,
        on_step: &mut dyn FnMut(&ResolutionStep),
    ) -> Result<ConvergenceResult> {
        self.validate_inputs(a.chain, b.chain)?;

        info!(
            chain_a = a.chain.name(),
            chain_b = b.chain.name(),
            precisions = ?schedule.precisions(),
            threshold = self.config.threshold,
            "Starting calibration run"
        );

        let mut state = RunState::new();
        for precision in schedule.iter() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                state.transition(RunStatus::Cancelled)?;
                break;
            }

            let evaluated =
                self.evaluate_step(a.chain, b.chain, a.cosmology, b.cosmology, precision);
            let step = match evaluated {
                Ok(step) => step,
                Err(err) => {
                    state.transition(RunStatus::Failed)?;
                    warn!(precision, error = %err, "Calibration step failed");
                    return Err(CalibrationError::run_failed(precision, state.history, err));
                }
            };

            debug!(
                precision,
                delta_t = step.delta_t,
                cells_a = step.n_cells_a,
                cells_b = step.n_cells_b,
                excluded_a = step.excluded_a,
                excluded_b = step.excluded_b,
                "Resolution step complete"
            );

            on_step(&step);
            let converged = step.converged;
            state.record(step)?;
            if converged && self.config.early_exit {
                state.transition(RunStatus::Converged)?;
                break;
            }
        }

        if state.status == RunStatus::Running {
            let terminal = if state.converged_at.is_some() {
                RunStatus::Converged
            } else {
                RunStatus::Exhausted
            };
            state.transition(terminal)?;
        }

        let result = state.finish(schedule, self.config.threshold);
        info!(
            status = %result.status,
            steps = result.history.len(),
            converged_precision = ?result.converged_precision,
            final_delta_t = ?result.final_delta_t,
            "Calibration run finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensorcal_core::Sample;

    fn constant_chain(name: &str, value: f64, n: usize) -> Chain {
        Chain::builder(name)
            .parameter("H0")
            .samples((0..n).map(|i| {
                let jitter = ((i as f64) * 0.618_033_988_749_895).fract() - 0.5;
                Sample::new(vec![value + jitter])
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_state_rejects_leaving_terminal() {
        let mut state = RunState::new();
        state.transition(RunStatus::Exhausted).unwrap();
        assert!(matches!(
            state.transition(RunStatus::Converged),
            Err(CalibrationError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_short_chain_rejected_before_any_step() {
        let a = constant_chain("a", 70.0, 99);
        let b = constant_chain("b", 70.0, 200);
        let cosmology = Cosmology::planck2018();
        let err = ConvergenceController::default()
            .run(&a, &b, &cosmology, &cosmology, &ResolutionSchedule::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Validation(ValidationError::InsufficientSamples { count: 99, .. })
        ));
    }

    #[test]
    fn test_schema_mismatch() {
        let a = constant_chain("a", 70.0, 100);
        let b = Chain::builder("b")
            .parameter("S8")
            .samples((0..100).map(|_| Sample::new(vec![0.8])))
            .build()
            .unwrap();
        let cosmology = Cosmology::planck2018();
        let err = ConvergenceController::default()
            .run(&a, &b, &cosmology, &cosmology, &ResolutionSchedule::default())
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Validation(ValidationError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CalibrationConfig::builder().threshold(1.5).build();
        assert!(ConvergenceController::new(config).unwrap_err().is_validation());
    }

    #[test]
    fn test_pre_cancelled_run() {
        let a = constant_chain("a", 70.0, 100);
        let cosmology = Cosmology::planck2018();
        let token = CancellationToken::new();
        token.cancel();
        let result = ConvergenceController::default()
            .run_with_cancellation(
                &a,
                &a,
                &cosmology,
                &cosmology,
                &ResolutionSchedule::default(),
                &token,
            )
            .unwrap();
        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(result.history.is_empty());
        assert!(result.merged.is_none());
    }

    #[test]
    fn test_pairwise_requires_two_programs() {
        let a = constant_chain("a", 70.0, 100);
        let cosmology = Cosmology::planck2018();
        let err = ConvergenceController::default()
            .run_pairwise(
                &[MeasurementProgram::new(&a, &cosmology)],
                &ResolutionSchedule::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Validation(ValidationError::TooFewPrograms { count: 1 })
        ));
    }

    #[test]
    fn test_estimated_cost() {
        let a = constant_chain("a", 70.0, 100);
        let b = constant_chain("b", 70.0, 300);
        let schedule = ResolutionSchedule::new(vec![8, 12, 16]).unwrap();
        assert_eq!(ConvergenceController::estimated_cost(&a, &b, &schedule), 1200);
    }
}
