//! # Implicit Gradient of the Outer Objective
//!
//! The inner fit `θ = A⁻¹ Zᵀy`, with `A = ZᵀZ + λP`, is differentiated through
//! directly. For a poison row `c` with augmented features `z_c = [x_c, 1]`, label `y_c`
//! and residual `r_c = θ·z_c − y_c`:
//!
//! ```text
//!     ∂θ/∂y_c   =  A⁻¹ z_c
//!     ∂θ/∂x_cj  = −A⁻¹ (r_c e_j + w_j z_c)
//! ```
//!
//! With `g = ∂O/∂θ` and `v = A⁻¹ g` (A is symmetric), the chain rule collapses to
//!
//! ```text
//!     ∂O/∂y_c   =  z_c · v
//!     ∂O/∂x_c   = −(r_c v[..d] + (z_c · v) w)
//! ```
//!
//! so a single extra solve serves every poison row.

use crate::data::PoisonSet;
use crate::model::{FittedModel, ModelError};
use ndarray::{Array1, Array2, ArrayView1, Axis, s};

/// Gradient of the outer objective with respect to every poison row and label.
#[derive(Debug, Clone, PartialEq)]
pub struct PoisonGradient {
    /// One row per poison row, `k × d`.
    pub features: Array2<f64>,
    /// One entry per poison label.
    pub labels: Array1<f64>,
}

impl PoisonGradient {
    pub fn is_finite(&self) -> bool {
        self.features.iter().chain(self.labels.iter()).all(|v| v.is_finite())
    }

    /// Per-row ascent direction in range-normalized coordinates, mapped back to data units.
    ///
    /// Each component is first scaled by the observed span of its column (the label span
    /// for labels), every row's joint vector is normalized to unit length, and the result
    /// is scaled by the span again. Rows with a vanishing gradient stay put. When `labels`
    /// is false the label component is excluded from the norm and its direction is zero.
    pub fn ascent_direction(
        &self,
        feature_spans: ArrayView1<f64>,
        label_span: f64,
        labels: bool,
    ) -> PoisonGradient {
        let mut features = &self.features * &feature_spans;
        let mut label_dir = if labels {
            &self.labels * label_span
        } else {
            Array1::zeros(self.labels.len())
        };

        for (mut row, label) in features.axis_iter_mut(Axis(0)).zip(label_dir.iter_mut()) {
            let norm = (row.dot(&row) + *label * *label).sqrt();
            if norm > 0.0 && norm.is_finite() {
                row /= norm;
                *label /= norm;
            } else {
                row.fill(0.0);
                *label = 0.0;
            }
        }

        features *= &feature_spans;
        label_dir *= label_span;
        PoisonGradient {
            features,
            labels: label_dir,
        }
    }
}

/// Computes `∂O/∂x_c` and `∂O/∂y_c` for every poison row.
///
/// `objective_grad` is `∂O/∂[w; b]` at `fit`, and `fit` must be the model trained on
/// the clean rows together with `poison`.
pub fn poison_gradient(
    fit: &FittedModel,
    objective_grad: &Array1<f64>,
    poison: &PoisonSet,
) -> Result<PoisonGradient, ModelError> {
    let d = fit.weights.len();
    if objective_grad.len() != d + 1 {
        return Err(ModelError::WidthMismatch {
            expected: d + 1,
            found: objective_grad.len(),
        });
    }

    let v = fit.solve_normal(objective_grad)?;
    let v_weights = v.slice(s![..d]);
    let v_intercept = v[d];

    // z_c · v and r_c for every poison row at once.
    let zv = poison.x.dot(&v_weights) + v_intercept;
    let residuals = fit.predict(poison.x.view()) - &poison.y;

    let mut features = Array2::zeros((poison.len(), d));
    for (c, mut row) in features.axis_iter_mut(Axis(0)).enumerate() {
        row.scaled_add(-residuals[c], &v_weights);
        row.scaled_add(-zv[c], &fit.weights);
    }

    Ok(PoisonGradient {
        features,
        labels: zv,
    })
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegressionModel;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, concatenate};

    fn validation_mse(
        model: RegressionModel,
        clean_x: &Array2<f64>,
        clean_y: &Array1<f64>,
        poison: &PoisonSet,
        val_x: &Array2<f64>,
        val_y: &Array1<f64>,
    ) -> f64 {
        let x = concatenate![Axis(0), clean_x.view(), poison.x.view()];
        let y = concatenate![Axis(0), clean_y.view(), poison.y.view()];
        let fit = model.fit(x.view(), y.view()).unwrap();
        fit.loss(val_x.view(), val_y.view())
    }

    #[test]
    fn closed_form_matches_central_differences() {
        let clean_x = array![
            [0.1, 1.0],
            [0.5, -0.3],
            [1.2, 0.4],
            [2.0, 1.5],
            [-0.7, 0.9],
            [1.1, -1.2]
        ];
        let clean_y = array![0.3, -0.1, 1.4, 2.2, -0.8, 0.9];
        let val_x = array![[0.0, 0.0], [1.0, 1.0], [2.0, -1.0]];
        let val_y = array![0.1, 1.3, 1.8];
        let poison = PoisonSet::new(array![[0.9, 0.2], [-0.4, 1.1]], array![3.0, -2.0]);

        for model in [RegressionModel::Linear, RegressionModel::Ridge { lambda: 0.7 }] {
            let x = concatenate![Axis(0), clean_x.view(), poison.x.view()];
            let y = concatenate![Axis(0), clean_y.view(), poison.y.view()];
            let fit = model.fit(x.view(), y.view()).unwrap();
            let outer = fit.loss_gradient(val_x.view(), val_y.view());
            let grad = poison_gradient(&fit, &outer, &poison).unwrap();

            let h = 1e-6;
            for c in 0..poison.len() {
                for j in 0..2 {
                    let mut up = poison.clone();
                    up.x[[c, j]] += h;
                    let mut down = poison.clone();
                    down.x[[c, j]] -= h;
                    let fd = (validation_mse(model, &clean_x, &clean_y, &up, &val_x, &val_y)
                        - validation_mse(model, &clean_x, &clean_y, &down, &val_x, &val_y))
                        / (2.0 * h);
                    assert_abs_diff_eq!(grad.features[[c, j]], fd, epsilon = 1e-5);
                }
                let mut up = poison.clone();
                up.y[c] += h;
                let mut down = poison.clone();
                down.y[c] -= h;
                let fd = (validation_mse(model, &clean_x, &clean_y, &up, &val_x, &val_y)
                    - validation_mse(model, &clean_x, &clean_y, &down, &val_x, &val_y))
                    / (2.0 * h);
                assert_abs_diff_eq!(grad.labels[c], fd, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn ascent_direction_is_unit_length_in_scaled_space() {
        let grad = PoisonGradient {
            features: array![[3.0, 0.0], [0.0, 0.0]],
            labels: array![4.0, 0.0],
        };
        let spans = array![2.0, 5.0];
        let dir = grad.ascent_direction(spans.view(), 1.0, true);
        // Scaled row is [6, 0 | 4]; its norm is sqrt(52).
        let norm = 52.0_f64.sqrt();
        assert_abs_diff_eq!(dir.features[[0, 0]], 2.0 * 6.0 / norm, epsilon = 1e-12);
        assert_abs_diff_eq!(dir.labels[0], 4.0 / norm, epsilon = 1e-12);
        assert_eq!(dir.features.row(1), array![0.0, 0.0]);
        assert_eq!(dir.labels[1], 0.0);
    }

    #[test]
    fn frozen_labels_do_not_enter_the_norm() {
        let grad = PoisonGradient {
            features: array![[0.0, 2.0]],
            labels: array![100.0],
        };
        let dir = grad.ascent_direction(array![1.0, 1.0].view(), 3.0, false);
        assert_abs_diff_eq!(dir.features[[0, 1]], 1.0, epsilon = 1e-12);
        assert_eq!(dir.labels[0], 0.0);
    }

    #[test]
    fn rejects_objective_gradient_of_wrong_length() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 1.0, 3.0];
        let fit = RegressionModel::Linear.fit(x.view(), y.view()).unwrap();
        let poison = PoisonSet::new(array![[1.0]], array![0.0]);
        let err = poison_gradient(&fit, &array![1.0], &poison).unwrap_err();
        assert!(matches!(err, ModelError::WidthMismatch { .. }));
    }
}
