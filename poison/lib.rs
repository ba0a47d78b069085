#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Gradient-based poisoning of linear and ridge regression.
//!
//! The crate crafts a small set of (feature, label) rows that, once appended to a
//! clean training set, maximize the validation error of the regression model
//! trained on the union. Categorical columns stay on their observed categories and
//! labels stay inside the observed label range throughout.

pub mod config;
pub mod data;
pub mod gradient;
pub mod model;
pub mod objective;
pub mod optimizer;
pub mod progress;
pub mod projection;
pub mod seeding;
pub mod step;

pub use config::PoisonConfig;
pub use data::{CategoricalMask, Dataset, PoisonSet};
pub use model::{FittedModel, ModelError, RegressionModel};
pub use optimizer::{
    GenerationReport, PoisonError, PoisonedData, PoisoningOptimizer, RunResult, generate,
};
