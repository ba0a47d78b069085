//! Projection of poison points back onto the feasible set.
//!
//! After every continuous step, poison points are mapped back onto the region an
//! honest sample could occupy: categorical columns snap to a category observed in the
//! clean data, continuous columns stay inside their observed range, and labels stay
//! inside the observed label range. The label clip count is reported as a saturation
//! signal.

use crate::data::{CategoricalMask, Dataset, PoisonSet};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Snaps categorical columns to the nearest category seen in clean data.
#[derive(Debug, Clone)]
pub struct CategoricalProjector {
    /// `(column, sorted distinct categories)` for every categorical column.
    columns: Vec<(usize, Vec<f64>)>,
}

impl CategoricalProjector {
    /// Collects the distinct values of every masked column of `clean`.
    pub fn from_clean(clean: &Dataset, mask: &CategoricalMask) -> Self {
        let columns = mask
            .columns()
            .map(|column| {
                let mut values: Vec<f64> = clean.x.column(column).to_vec();
                values.sort_by(f64::total_cmp);
                values.dedup();
                (column, values)
            })
            .collect();
        Self { columns }
    }

    /// The sorted categories of `column`, if it is categorical.
    pub fn categories(&self, column: usize) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, values)| values.as_slice())
    }

    /// Nearest category by absolute distance; ties go to the smaller category.
    pub fn nearest(categories: &[f64], value: f64) -> f64 {
        let upper = categories.partition_point(|&c| c < value);
        if upper == 0 {
            return categories[0];
        }
        if upper == categories.len() {
            return categories[upper - 1];
        }
        let below = categories[upper - 1];
        let above = categories[upper];
        if value - below <= above - value {
            below
        } else {
            above
        }
    }

    /// Projects every categorical entry of `x` in place. Returns how many entries moved.
    pub fn project(&self, x: &mut Array2<f64>) -> usize {
        let mut moved = 0usize;
        for (column, categories) in &self.columns {
            if categories.is_empty() {
                continue;
            }
            for value in x.column_mut(*column).iter_mut() {
                let snapped = Self::nearest(categories, *value);
                if snapped != *value {
                    moved += 1;
                    *value = snapped;
                }
            }
        }
        moved
    }
}

/// Per-column box `[lower, upper]` for the continuous features.
#[derive(Debug, Clone)]
pub struct FeatureBox {
    lower: Array1<f64>,
    upper: Array1<f64>,
    active: Vec<bool>,
}

impl FeatureBox {
    /// Observed column ranges of `clean`; categorical columns are left to the projector.
    pub fn from_clean(clean: &Dataset, mask: &CategoricalMask) -> Self {
        let d = clean.n_features();
        let mut lower = Array1::zeros(d);
        let mut upper = Array1::zeros(d);
        for j in 0..d {
            let (lo, hi) = clean.column_range(j);
            lower[j] = lo;
            upper[j] = hi;
        }
        let active = (0..d).map(|j| !mask.is_categorical(j)).collect();
        Self {
            lower,
            upper,
            active,
        }
    }

    /// Width of every column's observed range.
    pub fn spans(&self) -> Array1<f64> {
        &self.upper - &self.lower
    }

    /// Clips the continuous columns of `x` in place. Returns how many entries moved.
    pub fn clip(&self, x: &mut Array2<f64>) -> usize {
        let mut moved = 0usize;
        for (j, mut column) in x.axis_iter_mut(Axis(1)).enumerate() {
            if !self.active[j] {
                continue;
            }
            let (lo, hi) = (self.lower[j], self.upper[j]);
            for value in column.iter_mut() {
                let clipped = value.clamp(lo, hi);
                if clipped != *value {
                    moved += 1;
                    *value = clipped;
                }
            }
        }
        moved
    }
}

/// Keeps poison labels inside `[min(y_clean), max(y_clean)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundEnforcer {
    pub lower: f64,
    pub upper: f64,
}

impl BoundEnforcer {
    pub fn from_labels(y: ArrayView1<f64>) -> Self {
        let (lower, upper) = y
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Self { lower, upper }
    }

    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Clips every label in place and returns how many were pushed out of bounds.
    pub fn clip(&self, y: &mut Array1<f64>) -> usize {
        let mut clipped = 0usize;
        for value in y.iter_mut() {
            let bounded = value.clamp(self.lower, self.upper);
            if bounded != *value {
                clipped += 1;
                *value = bounded;
            }
        }
        clipped
    }
}

/// Everything a poison set must satisfy after a step.
#[derive(Debug, Clone)]
pub struct FeasibleRegion {
    pub categories: CategoricalProjector,
    pub features: Option<FeatureBox>,
    pub labels: BoundEnforcer,
    spans: Array1<f64>,
}

impl FeasibleRegion {
    /// Builds the region from clean data. `clip_features` enables the continuous box.
    pub fn from_clean(clean: &Dataset, mask: &CategoricalMask, clip_features: bool) -> Self {
        let feature_box = FeatureBox::from_clean(clean, mask);
        let spans = feature_box.spans();
        Self {
            categories: CategoricalProjector::from_clean(clean, mask),
            features: clip_features.then_some(feature_box),
            labels: BoundEnforcer::from_labels(clean.y.view()),
            spans,
        }
    }

    /// Observed range width of every feature column, used to scale steps.
    pub fn feature_spans(&self) -> &Array1<f64> {
        &self.spans
    }

    /// Projects `set` in place and returns the number of labels that were clipped.
    pub fn project(&self, set: &mut PoisonSet) -> usize {
        self.categories.project(&mut set.x);
        if let Some(feature_box) = &self.features {
            feature_box.clip(&mut set.x);
        }
        self.labels.clip(&mut set.y)
    }

    /// Whether every row of `set` already lies in the region.
    pub fn contains(&self, set: &PoisonSet) -> bool {
        let mut probe = set.clone();
        self.categories.project(&mut probe.x) == 0
            && self
                .features
                .as_ref()
                .is_none_or(|feature_box| feature_box.clip(&mut probe.x) == 0)
            && set.y.iter().all(|&v| self.labels.contains(v))
    }
}
