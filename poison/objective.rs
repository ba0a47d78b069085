//! Scores candidate poison sets.
//!
//! The clean normal equations are accumulated once. Each evaluation clones them, adds
//! the poison rows, refits and measures the mean squared error on the validation set.

use crate::data::{Dataset, PoisonSet};
use crate::gradient::{PoisonGradient, poison_gradient};
use crate::model::{FittedModel, ModelError, NormalEquations, RegressionModel};

/// A scored poison set together with the model it produced.
pub struct Evaluation {
    pub objective: f64,
    pub fit: FittedModel,
}

/// Outer objective of the attack: validation MSE of the model trained on clean ∪ poison.
#[derive(Debug, Clone)]
pub struct ObjectiveEvaluator {
    model: RegressionModel,
    clean: NormalEquations,
    validation: Dataset,
}

impl ObjectiveEvaluator {
    pub fn new(
        model: RegressionModel,
        train: &Dataset,
        validation: Dataset,
    ) -> Result<Self, ModelError> {
        if validation.n_features() != train.n_features() {
            return Err(ModelError::WidthMismatch {
                expected: train.n_features(),
                found: validation.n_features(),
            });
        }
        let mut clean = NormalEquations::new(train.n_features());
        clean.accumulate(train.x.view(), train.y.view())?;
        Ok(Self {
            model,
            clean,
            validation,
        })
    }

    /// Validation error of the model trained on the clean rows alone.
    pub fn baseline(&self) -> Result<f64, ModelError> {
        let fit = self.model.solve(&self.clean)?;
        Ok(fit.loss(self.validation.x.view(), self.validation.y.view()))
    }

    /// Refits on clean ∪ `poison` and scores the result.
    pub fn evaluate(&self, poison: &PoisonSet) -> Result<Evaluation, ModelError> {
        let mut normal = self.clean.clone();
        normal.accumulate(poison.x.view(), poison.y.view())?;
        let fit = self.model.solve(&normal)?;
        let objective = fit.loss(self.validation.x.view(), self.validation.y.view());
        Ok(Evaluation { objective, fit })
    }

    /// Gradient of the objective at an evaluation with respect to the poison rows.
    pub fn gradient(
        &self,
        evaluation: &Evaluation,
        poison: &PoisonSet,
    ) -> Result<PoisonGradient, ModelError> {
        let outer = evaluation
            .fit
            .loss_gradient(self.validation.x.view(), self.validation.y.view());
        poison_gradient(&evaluation.fit, &outer, poison)
    }
}
