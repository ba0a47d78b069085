//! Attack configuration.
//!
//! Every field has a default, so a TOML file only needs to name the values it changes:
//!
//! ```toml
//! poison_proportion = 0.1
//! num_inits = 4
//!
//! [model]
//! kind = "ridge"
//! lambda = 0.5
//! ```

use crate::model::RegressionModel;
use crate::seeding::SeedConfig;
use crate::step::StepConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write the configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse the configuration file as TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize the configuration to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// All settings of one poisoning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoisonConfig {
    /// Poison rows as a share of the clean rows, in (0, 1].
    pub poison_proportion: f64,
    /// Independent restarts; the best one wins.
    pub num_inits: usize,
    /// Iteration cap per restart.
    pub max_iters: usize,
    /// Smallest objective gain that counts as progress.
    pub tolerance: f64,
    pub model: RegressionModel,
    /// Return only the poison rows instead of clean rows followed by poison rows.
    pub return_only_poisoned: bool,
    /// Base seed; restart `r` uses `seed + r`.
    pub seed: u64,
    /// Let the optimizer move poison labels. When off, labels keep their seeded values.
    pub optimize_labels: bool,
    /// Keep continuous poison features inside the observed clean range.
    pub clip_features: bool,
    /// Share of clean rows held out as validation data and kept out of the inner fit.
    /// Zero scores against the clean training rows themselves.
    pub validation_fraction: f64,
    /// Wall-clock budget per restart, in seconds.
    pub time_budget_secs: Option<f64>,
    pub seeding: SeedConfig,
    pub step: StepConfig,
}

impl Default for PoisonConfig {
    fn default() -> Self {
        Self {
            poison_proportion: 0.2,
            num_inits: 1,
            max_iters: 50,
            tolerance: 1e-6,
            model: RegressionModel::Linear,
            return_only_poisoned: true,
            seed: 0,
            optimize_labels: true,
            clip_features: true,
            validation_fraction: 0.0,
            time_budget_secs: None,
            seeding: SeedConfig::default(),
            step: StepConfig::default(),
        }
    }
}

impl PoisonConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Checks the settings that do not depend on the data.
    pub fn validate(&self) -> Result<(), String> {
        let p = self.poison_proportion;
        if !(p.is_finite() && p > 0.0 && p <= 1.0) {
            return Err(format!("poison_proportion must lie in (0, 1], got {p}"));
        }
        if self.num_inits == 0 {
            return Err("num_inits must be at least 1".to_string());
        }
        if self.max_iters == 0 {
            return Err("max_iters must be at least 1".to_string());
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            ));
        }
        let lambda = self.model.lambda();
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(format!(
                "ridge lambda must be a finite non-negative number, got {lambda}"
            ));
        }
        let v = self.validation_fraction;
        if !(v.is_finite() && (0.0..1.0).contains(&v)) {
            return Err(format!("validation_fraction must lie in [0, 1), got {v}"));
        }
        if let Some(budget) = self.time_budget_secs {
            if !(budget.is_finite() && budget > 0.0) {
                return Err(format!(
                    "time_budget_secs must be a positive number of seconds, got {budget}"
                ));
            }
        }
        self.step.validate()
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeding::SeedStrategy;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        assert!(PoisonConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let text = r#"
            poison_proportion = 0.1
            num_inits = 4

            [model]
            kind = "ridge"
            lambda = 0.5

            [seeding]
            strategy = "extremal"
        "#;
        let config: PoisonConfig = toml::from_str(text).unwrap();
        assert_eq!(config.poison_proportion, 0.1);
        assert_eq!(config.num_inits, 4);
        assert_eq!(config.model, RegressionModel::Ridge { lambda: 0.5 });
        assert_eq!(config.seeding.strategy, SeedStrategy::Extremal);
        assert_eq!(config.seeding.extremal_pool_factor, 2);
        assert_eq!(config.max_iters, 50);
        assert_eq!(config.step, StepConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let config = PoisonConfig {
            seed: 77,
            time_budget_secs: Some(2.5),
            optimize_labels: false,
            model: RegressionModel::Ridge { lambda: 1.25 },
            ..PoisonConfig::default()
        };
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        config.save(path).unwrap();
        assert_eq!(PoisonConfig::load(path).unwrap(), config);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            PoisonConfig {
                poison_proportion: 0.0,
                ..PoisonConfig::default()
            },
            PoisonConfig {
                poison_proportion: 1.5,
                ..PoisonConfig::default()
            },
            PoisonConfig {
                num_inits: 0,
                ..PoisonConfig::default()
            },
            PoisonConfig {
                tolerance: f64::NAN,
                ..PoisonConfig::default()
            },
            PoisonConfig {
                model: RegressionModel::Ridge { lambda: -1.0 },
                ..PoisonConfig::default()
            },
            PoisonConfig {
                validation_fraction: 1.0,
                ..PoisonConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }
}
