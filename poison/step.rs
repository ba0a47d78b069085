//! # Step Control
//!
//! Each outer iteration proposes a step, scores it and asks the controller what to do:
//!
//! ```text
//! Initial → Stepping → { Progress, NoProgress } → Stepping → … → Converged | MaxIterations | Diverged
//! ```
//!
//! A candidate that improves on the previous objective by at least `tolerance` is
//! accepted. Otherwise the step shrinks by `backoff_factor` and the iteration retries,
//! up to `max_backoffs` times, after which the previous poison set is kept and the
//! iteration is recorded with zero change. `patience` consecutive iterations whose
//! change stays below `tolerance` end the run as converged.

use serde::{Deserialize, Serialize};

/// Tunables of the adaptive step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Step length in range-normalized units at the first iteration.
    pub initial_step: f64,
    /// Factor applied to the step after a failed trial. Must lie in (0, 1).
    pub backoff_factor: f64,
    /// Failed trials allowed per iteration before the iteration is rejected.
    pub max_backoffs: usize,
    /// Consecutive below-tolerance iterations that count as convergence.
    pub patience: usize,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            initial_step: 0.25,
            backoff_factor: 0.5,
            max_backoffs: 6,
            patience: 3,
        }
    }
}

impl StepConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(format!(
                "step.initial_step must be a positive finite number, got {}",
                self.initial_step
            ));
        }
        if !(self.backoff_factor > 0.0 && self.backoff_factor < 1.0) {
            return Err(format!(
                "step.backoff_factor must lie strictly between 0 and 1, got {}",
                self.backoff_factor
            ));
        }
        if self.patience == 0 {
            return Err("step.patience must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Where the controller currently is in the iteration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Initial,
    Stepping,
    Progress,
    NoProgress,
    Converged,
    MaxIterations,
    Diverged,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Converged | StepState::MaxIterations | StepState::Diverged
        )
    }
}

/// Why a restart stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    MaxIterations,
    /// A non-finite objective appeared; the best accepted state was kept.
    Diverged,
    /// Every trial of one iteration hit a numerically unstable fit.
    Unstable,
    /// The per-restart wall-clock budget ran out.
    TimeBudget,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Termination::Converged => "converged",
            Termination::MaxIterations => "max iterations",
            Termination::Diverged => "diverged",
            Termination::Unstable => "unstable",
            Termination::TimeBudget => "time budget",
        };
        f.write_str(text)
    }
}

/// What to do with a scored candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the candidate.
    Accept,
    /// Discard the candidate and try again with the (already reduced) step.
    Retry,
    /// Discard the candidate and keep the previous poison set for this iteration.
    Reject,
    /// Abort the restart.
    Diverged,
}

/// Drives the step size and termination of one restart.
#[derive(Debug, Clone)]
pub struct StepController {
    config: StepConfig,
    tolerance: f64,
    max_iters: usize,
    state: StepState,
    step: f64,
    iteration: usize,
    backoffs: usize,
    trials: usize,
    unstable_trials: usize,
    stagnant: usize,
    saturated: bool,
}

impl StepController {
    pub fn new(config: StepConfig, tolerance: f64, max_iters: usize) -> Self {
        Self {
            config,
            tolerance,
            max_iters,
            state: StepState::Initial,
            step: config.initial_step,
            iteration: 0,
            backoffs: 0,
            trials: 0,
            unstable_trials: 0,
            stagnant: 0,
            saturated: false,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn step_size(&self) -> f64 {
        self.step
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Starts a new iteration.
    pub fn begin_iteration(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = StepState::Stepping;
        self.backoffs = 0;
        self.trials = 0;
        self.unstable_trials = 0;
    }

    /// Judges a candidate objective against the previous accepted one.
    pub fn judge(&mut self, previous: f64, candidate: f64) -> Verdict {
        self.trials += 1;
        if !candidate.is_finite() {
            self.state = StepState::Diverged;
            return Verdict::Diverged;
        }
        if candidate - previous >= self.tolerance {
            self.state = StepState::Progress;
            if self.backoffs == 0 {
                // A first-try success lets the step recover toward its initial length.
                self.step = (self.step / self.config.backoff_factor).min(self.config.initial_step);
            }
            return Verdict::Accept;
        }
        self.back_off()
    }

    /// Records a trial whose fit was numerically unstable.
    pub fn judge_unstable(&mut self) -> Verdict {
        self.trials += 1;
        self.unstable_trials += 1;
        self.back_off()
    }

    /// Whether every trial of the current iteration was unstable.
    pub fn all_trials_unstable(&self) -> bool {
        self.trials > 0 && self.unstable_trials == self.trials
    }

    /// Takes the number of labels clipped when the kept poison set was projected.
    ///
    /// More than half of `labels` pinned to a bound marks the run as saturated: label
    /// steps no longer move those points. Returns true only when saturation begins.
    pub fn observe_clipping(&mut self, clipped: usize, labels: usize) -> bool {
        let saturated = labels > 0 && 2 * clipped > labels;
        let onset = saturated && !self.saturated;
        self.saturated = saturated;
        onset
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    fn back_off(&mut self) -> Verdict {
        self.state = StepState::NoProgress;
        if self.backoffs < self.config.max_backoffs {
            self.backoffs += 1;
            self.step *= self.config.backoff_factor;
            Verdict::Retry
        } else {
            Verdict::Reject
        }
    }

    /// Closes the iteration with the objective change that was recorded for it.
    ///
    /// Convergence is checked before the iteration cap, so a run that converges on its
    /// last allowed iteration reports `Converged`.
    pub fn finish_iteration(&mut self, change: f64) -> Option<Termination> {
        self.iteration += 1;
        if change.abs() < self.tolerance {
            self.stagnant += 1;
        } else {
            self.stagnant = 0;
        }

        if self.stagnant >= self.config.patience {
            self.state = StepState::Converged;
            return Some(Termination::Converged);
        }
        if self.iteration >= self.max_iters {
            self.state = StepState::MaxIterations;
            return Some(Termination::MaxIterations);
        }
        self.state = StepState::Stepping;
        None
    }
}
