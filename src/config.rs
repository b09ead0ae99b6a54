use crate::error::{BoundsError, Result};
use crate::good_set::SeparatorSelection;
use crate::graph::DSeparationMethod;
use serde::{Deserialize, Serialize};

/// Which backend computes the bounds.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Enumerate every mechanism and solve the LP directly
    #[default]
    Simplex,
    /// Price mechanisms in on demand
    ColumnGeneration,
}

/// Which oracle solves the column generation pricing problem.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingKind {
    #[default]
    BranchAndBound,
    /// Needs the `glpk` feature
    Glpk,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(default)]
pub struct SimplexConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        SimplexConfig {
            tolerance: 1e-9,
            max_iterations: 50_000,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(default)]
pub struct ColumnGenerationConfig {
    /// Cost of the artificial columns seeding the master problem
    pub big_m: f64,
    pub max_iterations: usize,
    pub reduced_cost_tolerance: f64,
    pub pricing: PricingKind,
}

impl Default for ColumnGenerationConfig {
    fn default() -> Self {
        ColumnGenerationConfig {
            big_m: 1e4,
            max_iterations: 2000,
            reduced_cost_tolerance: 1e-9,
            pricing: PricingKind::default(),
        }
    }
}

/// Settings of a bound computation. Every field has a default, so a JSON
/// document only needs the fields it changes.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(default)]
pub struct BoundsConfig {
    pub optimizer: OptimizerKind,
    pub separator_selection: SeparatorSelection,
    pub d_separation: DSeparationMethod,
    pub simplex: SimplexConfig,
    pub column_generation: ColumnGenerationConfig,
}

impl BoundsConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<BoundsConfig> {
        let config: BoundsConfig =
            serde_json::from_str(json).map_err(|e| BoundsError::InvalidConfig {
                field: "json".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| BoundsError::InvalidConfig {
            field: "json".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| {
            Err(BoundsError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };
        if !(self.simplex.tolerance > 0.0) {
            return invalid("simplex.tolerance", "must be positive");
        }
        if self.simplex.max_iterations == 0 {
            return invalid("simplex.max_iterations", "must be at least 1");
        }
        let cg = &self.column_generation;
        if !(cg.big_m > 0.0) || !cg.big_m.is_finite() {
            return invalid("column_generation.big_m", "must be positive and finite");
        }
        if cg.max_iterations == 0 {
            return invalid("column_generation.max_iterations", "must be at least 1");
        }
        if !(cg.reduced_cost_tolerance > 0.0) {
            return invalid("column_generation.reduced_cost_tolerance", "must be positive");
        }
        if cg.pricing == PricingKind::Glpk && !cfg!(feature = "glpk") {
            return invalid("column_generation.pricing", "built without the glpk feature");
        }
        Ok(())
    }
}
