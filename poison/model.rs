//! # Surrogate Regression Models
//!
//! The attacker differentiates through a closed-form regression fit, so the
//! surrogate is kept deliberately simple: ordinary least squares or ridge, both
//! with an unpenalized intercept.
//!
//! With the augmented design `Z = [X, 1]` and the penalty selector
//! `P = diag(1, ..., 1, 0)`, the coefficients `θ = [w; b]` solve the normal equations
//!
//! ```text
//!     (ZᵀZ + λP) θ = Zᵀy
//! ```
//!
//! The system is factored once by Cholesky. The factor is kept on the fitted model
//! because the gradient of the outer objective needs one more solve against the
//! same matrix (see `gradient.rs`).

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, OwnedRepr, s};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{CholeskyFactorized, FactorizeC, SolveC, UPLO};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted ratio between a Cholesky pivot and its diagonal entry.
///
/// `L_jj² / A_jj` is the share of column `j` that earlier columns cannot explain,
/// i.e. the reciprocal of its variance inflation factor.
const PIVOT_RATIO_FLOOR: f64 = 1e-10;

/// Errors raised while fitting or applying a surrogate model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(
        "The normal equations are singular or ill-conditioned (smallest pivot ratio {pivot_ratio:.3e})."
    )]
    NumericalInstability { pivot_ratio: f64 },

    #[error("A linear system solve failed while fitting the surrogate: {0}")]
    LinearAlgebra(#[from] LinalgError),

    #[error("Design matrix has {rows} rows but the label vector has {labels} entries.")]
    DimensionMismatch { rows: usize, labels: usize },

    #[error("Expected {expected} coefficients or feature columns but found {found}.")]
    WidthMismatch { expected: usize, found: usize },
}

impl ModelError {
    /// Whether the optimizer may contain this failure by rejecting the current step.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModelError::NumericalInstability { .. } | ModelError::LinearAlgebra(_)
        )
    }
}

/// The regression family used as the attacker's surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressionModel {
    /// Ordinary least squares.
    #[default]
    Linear,
    /// L2-penalized least squares. The intercept is never penalized.
    Ridge { lambda: f64 },
}

impl RegressionModel {
    /// Regularization strength; zero for plain least squares.
    pub fn lambda(&self) -> f64 {
        match self {
            RegressionModel::Linear => 0.0,
            RegressionModel::Ridge { lambda } => *lambda,
        }
    }

    /// Fits the model on a single feature/label pair.
    pub fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<FittedModel, ModelError> {
        let mut normal = NormalEquations::new(x.ncols());
        normal.accumulate(x, y)?;
        self.solve(&normal)
    }

    /// Solves pre-accumulated normal equations.
    pub fn solve(&self, normal: &NormalEquations) -> Result<FittedModel, ModelError> {
        let d = normal.n_features();
        let mut system = normal.gram.clone();
        let lambda = self.lambda();
        for j in 0..d {
            system[[j, j]] += lambda;
        }

        let factor = system
            .factorizec(UPLO::Lower)
            .map_err(|_| ModelError::NumericalInstability { pivot_ratio: 0.0 })?;

        let pivot_ratio = smallest_pivot_ratio(&factor.factor, &system);
        if !(pivot_ratio >= PIVOT_RATIO_FLOOR) {
            return Err(ModelError::NumericalInstability { pivot_ratio });
        }

        let theta = factor.solvec(&normal.moment)?;
        if !theta.iter().all(|v| v.is_finite()) {
            return Err(ModelError::NumericalInstability { pivot_ratio });
        }

        Ok(FittedModel {
            weights: theta.slice(s![..d]).to_owned(),
            intercept: theta[d],
            factor,
        })
    }
}

/// Smallest `L_jj² / A_jj` over the diagonal; zero when any diagonal entry is not positive.
fn smallest_pivot_ratio(factor: &Array2<f64>, system: &Array2<f64>) -> f64 {
    factor
        .diag()
        .iter()
        .zip(system.diag().iter())
        .map(|(&l, &a)| if a > 0.0 { l * l / a } else { 0.0 })
        .fold(f64::INFINITY, f64::min)
}

/// Running sums `ZᵀZ` and `Zᵀy` for the augmented design `Z = [X, 1]`.
///
/// Clean rows are accumulated once per attack; each candidate poison set is added
/// on top of a clone, so a refit costs O(k·d² + d³) instead of O(n·d²).
#[derive(Debug, Clone)]
pub struct NormalEquations {
    gram: Array2<f64>,
    moment: Array1<f64>,
}

impl NormalEquations {
    pub fn new(n_features: usize) -> Self {
        Self {
            gram: Array2::zeros((n_features + 1, n_features + 1)),
            moment: Array1::zeros(n_features + 1),
        }
    }

    pub fn n_features(&self) -> usize {
        self.moment.len() - 1
    }

    /// Adds the rows of `x` with labels `y`.
    pub fn accumulate(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), ModelError> {
        if x.nrows() != y.len() {
            return Err(ModelError::DimensionMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        if x.ncols() != self.n_features() {
            return Err(ModelError::WidthMismatch {
                expected: self.n_features(),
                found: x.ncols(),
            });
        }
        let z = augment(x);
        self.gram += &z.t().dot(&z);
        self.moment += &z.t().dot(&y);
        Ok(())
    }
}

/// Appends the intercept column of ones.
fn augment(x: ArrayView2<f64>) -> Array2<f64> {
    let mut z = Array2::ones((x.nrows(), x.ncols() + 1));
    z.slice_mut(s![.., ..x.ncols()]).assign(&x);
    z
}

/// A fitted surrogate: weights, intercept and the factored normal equations.
pub struct FittedModel {
    pub weights: Array1<f64>,
    pub intercept: f64,
    factor: CholeskyFactorized<OwnedRepr<f64>>,
}

impl std::fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FittedModel")
            .field("weights", &self.weights)
            .field("intercept", &self.intercept)
            .finish_non_exhaustive()
    }
}

impl FittedModel {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.intercept
    }

    /// Squared error of every row.
    pub fn residual_losses(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        (self.predict(x) - &y).mapv(|r| r * r)
    }

    /// Mean squared error.
    pub fn loss(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        self.residual_losses(x, y).mean().unwrap_or(0.0)
    }

    /// Gradient of the mean squared error on `(x, y)` with respect to `[w; b]`.
    pub fn loss_gradient(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        let n = y.len().max(1) as f64;
        let residuals = self.predict(x) - &y;
        let d = self.weights.len();
        let mut grad = Array1::zeros(d + 1);
        grad.slice_mut(s![..d])
            .assign(&(x.t().dot(&residuals) * (2.0 / n)));
        grad[d] = residuals.sum() * (2.0 / n);
        grad
    }

    /// Solves `(ZᵀZ + λP) v = rhs` with the factor computed during the fit.
    pub fn solve_normal(&self, rhs: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
        Ok(self.factor.solvec(rhs)?)
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Axis, array};

    #[test]
    fn linear_fit_recovers_exact_plane() {
        // y = 2 x0 - 3 x1 + 0.5
        let x = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [2.0, 1.5],
            [-1.0, 0.5]
        ];
        let y = x.map_axis(Axis(1), |r| 2.0 * r[0] - 3.0 * r[1] + 0.5);
        let fit = RegressionModel::Linear.fit(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(fit.weights[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.weights[1], -3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.intercept, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.loss(x.view(), y.view()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ridge_matches_one_dimensional_closed_form() {
        // With one centered feature the ridge slope is Sxy / (Sxx + λ).
        let x = array![[-1.0], [0.0], [1.0]];
        let y = array![-2.0, 1.0, 4.0];
        let lambda = 2.0;
        let fit = RegressionModel::Ridge { lambda }
            .fit(x.view(), y.view())
            .unwrap();
        assert_abs_diff_eq!(fit.weights[0], 6.0 / (2.0 + lambda), epsilon = 1e-10);
        assert_abs_diff_eq!(fit.intercept, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn duplicated_column_is_unstable_for_linear_only() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0], [5.0, 5.0]];
        let y = array![1.0, 3.0, 2.0, 5.0, 4.0];

        let err = RegressionModel::Linear.fit(x.view(), y.view()).unwrap_err();
        assert!(matches!(err, ModelError::NumericalInstability { .. }));
        assert!(err.is_recoverable());

        let fit = RegressionModel::Ridge { lambda: 0.5 }
            .fit(x.view(), y.view())
            .unwrap();
        // The penalty splits the shared effect evenly between the two copies.
        assert_abs_diff_eq!(fit.weights[0], fit.weights[1], epsilon = 1e-9);
    }

    #[test]
    fn incremental_accumulation_matches_single_fit() {
        let x = array![[0.5, 1.0], [1.5, -1.0], [2.0, 0.0], [3.0, 2.0], [-1.0, 0.5]];
        let y = array![1.0, 0.0, 2.0, 3.5, -0.5];
        let model = RegressionModel::Ridge { lambda: 0.1 };

        let whole = model.fit(x.view(), y.view()).unwrap();

        let mut normal = NormalEquations::new(2);
        normal
            .accumulate(x.slice(s![..3, ..]), y.slice(s![..3]))
            .unwrap();
        normal
            .accumulate(x.slice(s![3.., ..]), y.slice(s![3..]))
            .unwrap();
        let narrow = normal.accumulate(x.slice(s![.., ..1]), y.view());
        assert!(matches!(
            narrow,
            Err(ModelError::WidthMismatch {
                expected: 2,
                found: 1
            })
        ));
        let split = model.solve(&normal).unwrap();

        for j in 0..2 {
            assert_abs_diff_eq!(whole.weights[j], split.weights[j], epsilon = 1e-10);
        }
        assert_abs_diff_eq!(whole.intercept, split.intercept, epsilon = 1e-10);
    }

    #[test]
    fn loss_gradient_matches_finite_differences() {
        let x = array![[0.0, 1.0], [1.0, 3.0], [2.0, -1.0], [4.0, 0.5]];
        let y = array![1.0, -1.0, 2.0, 0.0];
        let fit = RegressionModel::Linear.fit(x.view(), y.view()).unwrap();
        let xv = array![[1.0, 1.0], [3.0, -2.0]];
        let yv = array![5.0, -4.0];
        let grad = fit.loss_gradient(xv.view(), yv.view());

        let h = 1e-6;
        let mse = |w: &Array1<f64>, b: f64| -> f64 {
            let pred = xv.dot(w) + b;
            (pred - &yv).mapv(|r| r * r).mean().unwrap()
        };
        for j in 0..2 {
            let mut up = fit.weights.clone();
            up[j] += h;
            let mut down = fit.weights.clone();
            down[j] -= h;
            let fd = (mse(&up, fit.intercept) - mse(&down, fit.intercept)) / (2.0 * h);
            assert_abs_diff_eq!(grad[j], fd, epsilon = 1e-5);
        }
        let fd_b = (mse(&fit.weights, fit.intercept + h) - mse(&fit.weights, fit.intercept - h))
            / (2.0 * h);
        assert_abs_diff_eq!(grad[2], fd_b, epsilon = 1e-5);
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        let err = RegressionModel::Linear
            .fit(Array2::<f64>::zeros((3, 1)).view(), Array1::<f64>::zeros(2).view())
            .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn model_kind_round_trips_through_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            model: RegressionModel,
        }
        let text = toml::to_string(&Wrapper {
            model: RegressionModel::Ridge { lambda: 0.25 },
        })
        .unwrap();
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.model, RegressionModel::Ridge { lambda: 0.25 });
    }
}
