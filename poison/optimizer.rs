//! # Poisoning Optimizer
//!
//! Projected gradient ascent on the validation error, repeated from several seeds.
//!
//! One restart runs:
//!
//! 1. Seed a poison set, project it onto the feasible region and score it.
//! 2. Differentiate the objective through the inner fit, take a normalized step,
//!    project, rescore.
//! 3. Accept the candidate if it improves the objective by at least `tolerance`.
//!    Otherwise shrink the step and retry, and finally keep the previous set.
//! 4. Stop on convergence, the iteration cap, the time budget, divergence, or an
//!    iteration in which every trial fit was numerically unstable.
//!
//! Restarts are independent and run on the rayon pool. Their results are reduced in
//! restart order after all of them finish, so the winner never depends on scheduling.

use crate::config::{ConfigError, PoisonConfig};
use crate::data::{CategoricalMask, Dataset, PoisonSet};
use crate::model::ModelError;
use crate::objective::ObjectiveEvaluator;
use crate::progress::{NoopPoisonProgress, PoisonProgressObserver};
use crate::projection::FeasibleRegion;
use crate::seeding::PoisonSeeder;
use crate::step::Termination;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoisonError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "A poison proportion of {proportion} over {samples} clean samples rounds to zero poison points."
    )]
    InsufficientPoisonBudget { proportion: f64, samples: usize },

    #[error("All {restarts} restarts diverged before reaching a finite objective.")]
    Diverged { restarts: usize },

    #[error("The clean data could not be prepared for the attack: {0}")]
    NumericalInstability(#[from] ModelError),

    #[error("Restart {restart} hit a dimension error in the surrogate model: {source}")]
    InconsistentDimensions { restart: usize, source: ModelError },
}

/// Diagnostics of one outer iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Objective of the accepted poison set after this iteration.
    pub objective: f64,
    /// Objective gain of this iteration; zero when every trial was rejected.
    pub change: f64,
    /// Labels clipped when the poison set kept after this iteration was projected.
    pub out_of_bounds: usize,
    /// Whether most poison labels are pinned to the label bounds.
    pub saturated: bool,
    pub progress: bool,
    /// Step length of the last trial, in range-normalized units.
    pub step_size: f64,
}

/// Outcome of one restart.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub restart: usize,
    pub seed: u64,
    /// Best objective reached. `-inf` when the seed set itself could not be scored.
    pub objective: f64,
    pub initial_objective: f64,
    /// The poison set achieving `objective`.
    pub poison: PoisonSet,
    pub records: Vec<IterationRecord>,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartSummary {
    pub restart: usize,
    pub seed: u64,
    pub initial_objective: f64,
    pub objective: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl From<&RunResult> for RestartSummary {
    fn from(result: &RunResult) -> Self {
        Self {
            restart: result.restart,
            seed: result.seed,
            initial_objective: result.initial_objective,
            objective: result.objective,
            iterations: result.records.len(),
            termination: result.termination,
        }
    }
}

/// Summary of a whole generation call, with the winning restart's iteration trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Number of poison rows.
    pub budget: usize,
    /// Validation error of the clean fit, when the clean data can be fitted.
    pub clean_objective: Option<f64>,
    pub best_restart: usize,
    pub best_objective: f64,
    pub restarts: Vec<RestartSummary>,
    pub iterations: Vec<IterationRecord>,
}

impl GenerationReport {
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }
}

/// Rows returned by a generation call: poison rows alone, or clean rows then poison rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PoisonedData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

/// Where the outer objective is measured.
enum ValidationSource<'a> {
    TrainingRows,
    Holdout(f64),
    Explicit(ArrayView2<'a, f64>, ArrayView1<'a, f64>),
}

/// Crafts poison sets according to a [`PoisonConfig`].
pub struct PoisoningOptimizer {
    config: PoisonConfig,
    seeder: Box<dyn PoisonSeeder>,
}

impl PoisoningOptimizer {
    /// Builds an optimizer seeded by the strategy named in `config.seeding`.
    pub fn new(config: PoisonConfig) -> Result<Self, PoisonError> {
        config.validate().map_err(PoisonError::InvalidConfiguration)?;
        let seeder = Box::new(config.seeding);
        Ok(Self { config, seeder })
    }

    /// Replaces the seeding strategy.
    pub fn with_seeder(mut self, seeder: impl PoisonSeeder + 'static) -> Self {
        self.seeder = Box::new(seeder);
        self
    }

    pub fn config(&self) -> &PoisonConfig {
        &self.config
    }

    pub fn generate(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        mask: &CategoricalMask,
    ) -> Result<PoisonedData, PoisonError> {
        let validation = ValidationSource::default_for(&self.config);
        let (data, _) = self.run(x, y, mask, validation, &NoopPoisonProgress)?;
        Ok(data)
    }

    /// Like [`generate`](Self::generate), also returning diagnostics and reporting progress.
    pub fn generate_with_report(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        mask: &CategoricalMask,
        observer: &dyn PoisonProgressObserver,
    ) -> Result<(PoisonedData, GenerationReport), PoisonError> {
        self.run(x, y, mask, ValidationSource::default_for(&self.config), observer)
    }

    /// Measures the objective on caller-supplied validation rows. All clean rows train.
    pub fn generate_with_validation(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        mask: &CategoricalMask,
        x_val: ArrayView2<f64>,
        y_val: ArrayView1<f64>,
        observer: &dyn PoisonProgressObserver,
    ) -> Result<(PoisonedData, GenerationReport), PoisonError> {
        self.run(x, y, mask, ValidationSource::Explicit(x_val.reborrow(), y_val.reborrow()), observer)
    }

    fn run(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        mask: &CategoricalMask,
        validation: ValidationSource<'_>,
        observer: &dyn PoisonProgressObserver,
    ) -> Result<(PoisonedData, GenerationReport), PoisonError> {
        let config = &self.config;

        let clean = Dataset::from_views(x, y)
            .map_err(|e| PoisonError::InvalidConfiguration(e.to_string()))?;
        if mask.len() != clean.n_features() {
            return Err(PoisonError::InvalidConfiguration(format!(
                "categorical mask has {} entries but the data has {} feature columns",
                mask.len(),
                clean.n_features()
            )));
        }

        let n = clean.n_samples();
        let budget = (config.poison_proportion * n as f64).round() as usize;
        if budget < 1 {
            return Err(PoisonError::InsufficientPoisonBudget {
                proportion: config.poison_proportion,
                samples: n,
            });
        }

        let (train, validation) = internal::split_validation(&clean, validation, config.seed)?;
        let evaluator = ObjectiveEvaluator::new(config.model, &train, validation)?;
        let region = FeasibleRegion::from_clean(&train, mask, config.clip_features);
        for column in mask.columns() {
            if let Some(categories) = region.categories.categories(column) {
                log::debug!(
                    "Feature column {column} is categorical with {} observed values.",
                    categories.len()
                );
            }
        }
        let clean_objective = match evaluator.baseline() {
            Ok(objective) => Some(objective),
            Err(e) => {
                log::warn!("The clean data alone cannot be fitted: {e}");
                None
            }
        };

        log::info!(
            "Generating {} poison points for {} clean rows ({} training, {} features) with {} restart(s) of at most {} iterations.",
            budget,
            n,
            train.n_samples(),
            train.n_features(),
            config.num_inits,
            config.max_iters
        );

        let attack = internal::Attack {
            config,
            evaluator: &evaluator,
            region: &region,
            train: &train,
            seeder: self.seeder.as_ref(),
            budget,
            time_budget: config.time_budget_secs.map(Duration::from_secs_f64),
        };

        let results = (0..config.num_inits)
            .into_par_iter()
            .map(|restart| {
                let result = attack.run_restart(restart, observer)?;
                observer.on_restart_finish(restart, &result);
                Ok(result)
            })
            .collect::<Result<Vec<RunResult>, PoisonError>>()?;

        let best = internal::best_result(&results).ok_or(PoisonError::Diverged {
            restarts: results.len(),
        })?;
        log::info!(
            "Best restart {} reached objective {:.6e} ({}).",
            best.restart,
            best.objective,
            best.termination
        );

        let report = GenerationReport {
            budget,
            clean_objective,
            best_restart: best.restart,
            best_objective: best.objective,
            restarts: results.iter().map(RestartSummary::from).collect(),
            iterations: best.records.clone(),
        };

        let data = if config.return_only_poisoned {
            PoisonedData {
                x: best.poison.x.clone(),
                y: best.poison.y.clone(),
            }
        } else {
            let rows = n + budget;
            let mut x = Array2::zeros((rows, clean.n_features()));
            x.slice_mut(s![..n, ..]).assign(&clean.x);
            x.slice_mut(s![n.., ..]).assign(&best.poison.x);
            let mut y = Array1::zeros(rows);
            y.slice_mut(s![..n]).assign(&clean.y);
            y.slice_mut(s![n..]).assign(&best.poison.y);
            PoisonedData { x, y }
        };
        Ok((data, report))
    }
}

impl ValidationSource<'_> {
    fn default_for(config: &PoisonConfig) -> Self {
        if config.validation_fraction > 0.0 {
            ValidationSource::Holdout(config.validation_fraction)
        } else {
            ValidationSource::TrainingRows
        }
    }
}

/// Runs the attack with the default configuration and the given core settings.
///
/// Returns the poison rows and their labels.
pub fn generate(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    categorical_mask: &CategoricalMask,
    poison_proportion: f64,
    num_inits: usize,
    max_iters: usize,
    tolerance: f64,
) -> Result<(Array2<f64>, Array1<f64>), PoisonError> {
    let config = PoisonConfig {
        poison_proportion,
        num_inits,
        max_iters,
        tolerance,
        ..PoisonConfig::default()
    };
    let data = PoisoningOptimizer::new(config)?.generate(x, y, categorical_mask)?;
    Ok((data.x, data.y))
}

/// Internal module for the per-restart loop and the result reduction.
mod internal {
    use super::*;
    use crate::objective::Evaluation;
    use crate::step::{StepController, Verdict};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::index;
    use std::time::Instant;

    pub(super) fn split_validation(
        clean: &Dataset,
        source: ValidationSource<'_>,
        seed: u64,
    ) -> Result<(Dataset, Dataset), PoisonError> {
        match source {
            ValidationSource::TrainingRows => Ok((clean.clone(), clean.clone())),
            ValidationSource::Explicit(x_val, y_val) => {
                let validation = Dataset::from_views(x_val, y_val).map_err(|e| {
                    PoisonError::InvalidConfiguration(format!("validation data: {e}"))
                })?;
                if validation.n_features() != clean.n_features() {
                    return Err(PoisonError::InvalidConfiguration(format!(
                        "validation data has {} feature columns but the training data has {}",
                        validation.n_features(),
                        clean.n_features()
                    )));
                }
                Ok((clean.clone(), validation))
            }
            ValidationSource::Holdout(fraction) => {
                let n = clean.n_samples();
                if n < 2 {
                    return Err(PoisonError::InvalidConfiguration(
                        "a validation holdout needs at least two clean rows".to_string(),
                    ));
                }
                let held = ((fraction * n as f64).round() as usize).clamp(1, n - 1);
                let mut rng = StdRng::seed_from_u64(seed);
                let order = index::sample(&mut rng, n, n).into_vec();
                let mut validation_rows = order[..held].to_vec();
                let mut training_rows = order[held..].to_vec();
                validation_rows.sort_unstable();
                training_rows.sort_unstable();
                log::info!(
                    "Holding out {} of {} clean rows as validation data.",
                    held,
                    n
                );
                Ok((
                    clean.select_rows(&training_rows),
                    clean.select_rows(&validation_rows),
                ))
            }
        }
    }

    /// Highest objective wins; ties go to the earliest restart. Restarts that diverged
    /// without ever producing a finite objective are not candidates.
    pub(super) fn best_result(results: &[RunResult]) -> Option<&RunResult> {
        results
            .iter()
            .filter(|r| r.termination != Termination::Diverged || r.objective.is_finite())
            .fold(None, |best: Option<&RunResult>, candidate| match best {
                Some(current) if candidate.objective <= current.objective => Some(current),
                _ => Some(candidate),
            })
    }

    /// Hands numerical failures back for local handling; anything else ends the call.
    pub(super) fn contain(restart: usize, error: ModelError) -> Result<ModelError, PoisonError> {
        if error.is_recoverable() {
            Ok(error)
        } else {
            Err(PoisonError::InconsistentDimensions {
                restart,
                source: error,
            })
        }
    }

    /// Checks a seeder's output against the requested budget and feature width.
    pub(super) fn check_seed_shape(
        poison: &PoisonSet,
        budget: usize,
        n_features: usize,
    ) -> Result<(), PoisonError> {
        if poison.x.dim() == (budget, n_features) && poison.y.len() == budget {
            return Ok(());
        }
        Err(PoisonError::InvalidConfiguration(format!(
            "the seeder returned {} rows of {} features with {} labels, expected {} rows of {} features",
            poison.x.nrows(),
            poison.x.ncols(),
            poison.y.len(),
            budget,
            n_features
        )))
    }

    enum TrialOutcome {
        Accepted(PoisonSet, Evaluation, usize),
        Rejected,
        Diverged,
    }

    pub(super) struct Attack<'a> {
        pub(super) config: &'a PoisonConfig,
        pub(super) evaluator: &'a ObjectiveEvaluator,
        pub(super) region: &'a FeasibleRegion,
        pub(super) train: &'a Dataset,
        pub(super) seeder: &'a dyn PoisonSeeder,
        pub(super) budget: usize,
        pub(super) time_budget: Option<Duration>,
    }

    impl Attack<'_> {
        pub(super) fn run_restart(
            &self,
            restart: usize,
            observer: &dyn PoisonProgressObserver,
        ) -> Result<RunResult, PoisonError> {
            let config = self.config;
            let seed = config.seed.wrapping_add(restart as u64);
            let mut rng = StdRng::seed_from_u64(seed);
            let started = Instant::now();

            let mut poison = self
                .seeder
                .seed(self.train, &self.region.labels, self.budget, &mut rng);
            check_seed_shape(&poison, self.budget, self.train.n_features())?;
            let mut kept_clipped = self.region.project(&mut poison);
            debug_assert!(self.region.contains(&poison));

            let mut current = match self.evaluator.evaluate(&poison) {
                Ok(evaluation) if evaluation.objective.is_finite() => evaluation,
                Ok(evaluation) => {
                    log::warn!(
                        "Restart {restart}: the seed set scores a non-finite objective ({}).",
                        evaluation.objective
                    );
                    return Ok(self.unscored(restart, seed, poison, Termination::Diverged));
                }
                Err(e) => {
                    let e = contain(restart, e)?;
                    log::warn!(
                        "Restart {restart}: the seed set cannot be fitted ({e}); keeping the seed set."
                    );
                    return Ok(self.unscored(restart, seed, poison, Termination::Unstable));
                }
            };
            let initial_objective = current.objective;
            log::debug!("Restart {restart} (seed {seed}): initial objective {initial_objective:.6e}");

            let feature_spans = self.region.feature_spans().view();
            let label_span = self.region.labels.span();
            let mut controller = StepController::new(config.step, config.tolerance, config.max_iters);
            let mut records = Vec::new();

            let termination = loop {
                if let Some(limit) = self.time_budget {
                    if started.elapsed() >= limit {
                        log::warn!(
                            "Restart {restart}: time budget exhausted after {} iterations.",
                            controller.iteration()
                        );
                        break Termination::TimeBudget;
                    }
                }

                controller.begin_iteration();
                let direction = match self.evaluator.gradient(&current, &poison) {
                    Ok(gradient) if gradient.is_finite() => gradient.ascent_direction(
                        feature_spans,
                        label_span,
                        config.optimize_labels,
                    ),
                    Ok(_) => {
                        log::warn!("Restart {restart}: the objective gradient is not finite.");
                        break Termination::Diverged;
                    }
                    Err(e) => {
                        let e = contain(restart, e)?;
                        log::warn!("Restart {restart}: gradient solve failed ({e}).");
                        break Termination::Unstable;
                    }
                };

                let mut step_size;
                let outcome = loop {
                    step_size = controller.step_size();
                    let mut candidate = poison.clone();
                    candidate.advance(
                        direction.features.view(),
                        direction.labels.view(),
                        step_size,
                        config.optimize_labels,
                    );
                    let clipped = self.region.project(&mut candidate);

                    let (verdict, evaluation) = match self.evaluator.evaluate(&candidate) {
                        Ok(evaluation) => (
                            controller.judge(current.objective, evaluation.objective),
                            Some(evaluation),
                        ),
                        Err(e) => {
                            let e = contain(restart, e)?;
                            log::debug!(
                                "Restart {restart}: unstable fit at step {step_size:.3e} ({e})."
                            );
                            (controller.judge_unstable(), None)
                        }
                    };

                    match (verdict, evaluation) {
                        (Verdict::Accept, Some(evaluation)) => {
                            break TrialOutcome::Accepted(candidate, evaluation, clipped);
                        }
                        (Verdict::Retry, _) => continue,
                        (Verdict::Diverged, _) => break TrialOutcome::Diverged,
                        _ => break TrialOutcome::Rejected,
                    }
                };

                let (change, progress) = match outcome {
                    TrialOutcome::Accepted(candidate, evaluation, clipped) => {
                        let change = evaluation.objective - current.objective;
                        poison = candidate;
                        current = evaluation;
                        kept_clipped = clipped;
                        (change, true)
                    }
                    TrialOutcome::Rejected => (0.0, false),
                    TrialOutcome::Diverged => {
                        log::warn!(
                            "Restart {restart}: non-finite objective at iteration {}; keeping the best accepted set.",
                            controller.iteration() + 1
                        );
                        break Termination::Diverged;
                    }
                };

                if controller.observe_clipping(kept_clipped, poison.len()) {
                    log::debug!(
                        "Restart {restart}: {kept_clipped} of {} poison labels are pinned to the label bounds.",
                        poison.len()
                    );
                }

                let record = IterationRecord {
                    iteration: controller.iteration() + 1,
                    objective: current.objective,
                    change,
                    out_of_bounds: kept_clipped,
                    saturated: controller.is_saturated(),
                    progress,
                    step_size,
                };
                log::debug!(
                    "Restart {restart} iteration {}: objective {:.6e}, change {:.3e}, out of bounds {}, step {:.3e}",
                    record.iteration,
                    record.objective,
                    record.change,
                    record.out_of_bounds,
                    record.step_size
                );
                observer.on_iteration(restart, &record);
                records.push(record);

                if !progress && controller.all_trials_unstable() {
                    log::warn!(
                        "Restart {restart}: every trial of iteration {} was numerically unstable; keeping the best accepted set.",
                        controller.iteration() + 1
                    );
                    break Termination::Unstable;
                }
                if let Some(termination) = controller.finish_iteration(change) {
                    break termination;
                }
            };

            log::info!(
                "Restart {restart} finished ({termination}) after {} iterations: objective {:.6e} -> {:.6e}.",
                records.len(),
                initial_objective,
                current.objective
            );

            Ok(RunResult {
                restart,
                seed,
                objective: current.objective,
                initial_objective,
                poison,
                records,
                termination,
            })
        }

        fn unscored(
            &self,
            restart: usize,
            seed: u64,
            poison: PoisonSet,
            termination: Termination,
        ) -> RunResult {
            RunResult {
                restart,
                seed,
                objective: f64::NEG_INFINITY,
                initial_objective: f64::NEG_INFINITY,
                poison,
                records: Vec::new(),
                termination,
            }
        }
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn result(restart: usize, objective: f64, termination: Termination) -> RunResult {
        RunResult {
            restart,
            seed: restart as u64,
            objective,
            initial_objective: objective,
            poison: PoisonSet::new(array![[0.0]], array![0.0]),
            records: Vec::new(),
            termination,
        }
    }

    #[test]
    fn best_result_prefers_earliest_on_ties() {
        let results = vec![
            result(0, 1.0, Termination::Converged),
            result(1, 2.0, Termination::MaxIterations),
            result(2, 2.0, Termination::Converged),
        ];
        assert_eq!(internal::best_result(&results).unwrap().restart, 1);
    }

    #[test]
    fn diverged_seed_sets_are_not_candidates() {
        let results = vec![
            result(0, f64::NEG_INFINITY, Termination::Diverged),
            result(1, f64::NEG_INFINITY, Termination::Unstable),
        ];
        assert_eq!(internal::best_result(&results).unwrap().restart, 1);

        let all_diverged = vec![result(0, f64::NEG_INFINITY, Termination::Diverged)];
        assert!(internal::best_result(&all_diverged).is_none());
    }

    #[test]
    fn holdout_split_is_disjoint_and_seeded() {
        let clean = Dataset::new(
            Array2::from_shape_fn((10, 1), |(i, _)| i as f64),
            Array1::from_shape_fn(10, |i| i as f64),
        )
        .unwrap();
        let (train, validation) =
            internal::split_validation(&clean, ValidationSource::Holdout(0.3), 4).unwrap();
        assert_eq!(train.n_samples(), 7);
        assert_eq!(validation.n_samples(), 3);
        for v in validation.y.iter() {
            assert!(!train.y.iter().any(|t| t == v));
        }
        let (again, _) =
            internal::split_validation(&clean, ValidationSource::Holdout(0.3), 4).unwrap();
        assert_eq!(train, again);
    }

    #[test]
    fn only_numerical_model_errors_are_contained() {
        let unstable = ModelError::NumericalInstability { pivot_ratio: 1e-14 };
        assert!(matches!(
            internal::contain(0, unstable),
            Ok(ModelError::NumericalInstability { .. })
        ));

        let width = ModelError::WidthMismatch {
            expected: 3,
            found: 2,
        };
        assert!(matches!(
            internal::contain(4, width),
            Err(PoisonError::InconsistentDimensions { restart: 4, .. })
        ));

        let rows = ModelError::DimensionMismatch { rows: 3, labels: 2 };
        assert!(internal::contain(1, rows).is_err());
    }

    #[test]
    fn seed_shape_must_match_budget_and_width() {
        let seed = PoisonSet::new(Array2::zeros((3, 2)), Array1::zeros(3));
        assert!(internal::check_seed_shape(&seed, 3, 2).is_ok());
        assert!(matches!(
            internal::check_seed_shape(&seed, 2, 2),
            Err(PoisonError::InvalidConfiguration(_))
        ));
        assert!(internal::check_seed_shape(&seed, 3, 3).is_err());

        let short_labels = PoisonSet {
            x: Array2::zeros((3, 2)),
            y: Array1::zeros(2),
        };
        assert!(internal::check_seed_shape(&short_labels, 3, 2).is_err());
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = PoisonConfig {
            max_iters: 0,
            ..PoisonConfig::default()
        };
        assert!(matches!(
            PoisoningOptimizer::new(config),
            Err(PoisonError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn report_saves_as_toml() {
        let report = GenerationReport {
            budget: 3,
            clean_objective: Some(0.5),
            best_restart: 0,
            best_objective: 1.5,
            restarts: vec![RestartSummary::from(&result(0, 1.5, Termination::Converged))],
            iterations: vec![IterationRecord {
                iteration: 1,
                objective: 1.5,
                change: 1.0,
                out_of_bounds: 2,
                saturated: false,
                progress: true,
                step_size: 0.25,
            }],
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        report.save(path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let back: GenerationReport = toml::from_str(&text).unwrap();
        assert_eq!(back, report);
        assert!(text.contains("termination = \"converged\""));
    }
}
