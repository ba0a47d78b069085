//! Initial poison sets.
//!
//! Every restart starts from its own seed set drawn with a per-restart `StdRng`. The
//! built-in strategies all copy clean rows and push their labels toward the opposite
//! side of the label range, which already hurts the fit before any gradient step.

use crate::data::{Dataset, PoisonSet};
use crate::projection::BoundEnforcer;
use ndarray::{Array1, Axis};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStrategy {
    /// Random clean rows, label moved to the far end of the label range.
    BoundaryFlip,
    /// Random clean rows, label reflected through the middle of the range.
    ReflectFlip,
    /// Rows far from the standardized centroid, label moved to the far end.
    Extremal,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub strategy: SeedStrategy,
    /// `Extremal` draws from the `extremal_pool_factor × k` most extreme rows.
    pub extremal_pool_factor: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            strategy: SeedStrategy::BoundaryFlip,
            extremal_pool_factor: 2,
        }
    }
}

/// Produces the starting poison set of a restart.
///
/// Implementations must return exactly `budget` rows with `clean.n_features()` columns;
/// any other shape fails the whole generation with `InvalidConfiguration`.
/// The result is projected onto the feasible region before it is first scored, so a
/// seeder does not need to respect categorical or label constraints itself.
pub trait PoisonSeeder: Send + Sync {
    fn seed(
        &self,
        clean: &Dataset,
        labels: &BoundEnforcer,
        budget: usize,
        rng: &mut StdRng,
    ) -> PoisonSet;
}

impl PoisonSeeder for SeedConfig {
    fn seed(
        &self,
        clean: &Dataset,
        labels: &BoundEnforcer,
        budget: usize,
        rng: &mut StdRng,
    ) -> PoisonSet {
        let rows = match self.strategy {
            SeedStrategy::BoundaryFlip | SeedStrategy::ReflectFlip => {
                choose_rows(clean.n_samples(), budget, rng)
            }
            SeedStrategy::Extremal => {
                let ranked = rank_by_extremity(clean);
                let pool = (self.extremal_pool_factor.max(1) * budget)
                    .max(budget)
                    .min(ranked.len());
                choose_rows(pool, budget, rng)
                    .into_iter()
                    .map(|i| ranked[i])
                    .collect()
            }
        };

        let x = clean.x.select(Axis(0), &rows);
        let y: Array1<f64> = rows
            .iter()
            .map(|&i| {
                let label = clean.y[i];
                match self.strategy {
                    SeedStrategy::ReflectFlip => labels.lower + labels.upper - label,
                    SeedStrategy::BoundaryFlip | SeedStrategy::Extremal => {
                        boundary_flip(label, labels)
                    }
                }
            })
            .collect();
        PoisonSet::new(x, y)
    }
}

fn boundary_flip(label: f64, labels: &BoundEnforcer) -> f64 {
    if label >= labels.midpoint() {
        labels.lower
    } else {
        labels.upper
    }
}

/// `count` indices below `population`: distinct when possible, with replacement otherwise.
fn choose_rows(population: usize, count: usize, rng: &mut StdRng) -> Vec<usize> {
    if population == 0 {
        return Vec::new();
    }
    if count <= population {
        index::sample(rng, population, count).into_vec()
    } else {
        (0..count).map(|_| rng.gen_range(0..population)).collect()
    }
}

/// Row indices sorted by decreasing distance from the standardized centroid.
fn rank_by_extremity(clean: &Dataset) -> Vec<usize> {
    let mean = clean.x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(clean.n_features()));
    let std = clean.x.std_axis(Axis(0), 0.0);
    let scale = std.mapv(|s| if s > 0.0 { 1.0 / s } else { 0.0 });

    let distances: Vec<f64> = clean
        .x
        .axis_iter(Axis(0))
        .map(|row| {
            let z = (&row - &mean) * &scale;
            z.dot(&z)
        })
        .collect();

    let mut order: Vec<usize> = (0..clean.n_samples()).collect();
    order.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]).then(a.cmp(&b)));
    order
}
