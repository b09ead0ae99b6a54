mod column_generation;
mod config;
mod constraints;
mod dataset;
mod error;
mod good_set;
mod graph;
mod linear;
mod mechanism;
mod model;
mod objective;
mod optimizer;

pub use column_generation::{
    BranchAndBoundPricing, ColumnGenerationEngine, ColumnGenerationOptimizer,
    ColumnGenerationResult, PricedColumn, PricingOracle, PricingProblem,
};
#[cfg(feature = "glpk")]
pub use column_generation::GlpkPricing;
pub use config::{BoundsConfig, ColumnGenerationConfig, OptimizerKind, PricingKind, SimplexConfig};
pub use constraints::{ConstraintBuilder, ConstraintRow, ConstraintSystem};
pub use dataset::{Dataset, Distribution, WeightedRow};
pub use error::{BoundsError, Result};
pub use good_set::{GoodSet, GoodSetFinder, SeparatorSelection, Term};
pub use graph::{
    parse_edges, CComponent, DSeparationMethod, Graph, MoralGraph, Node, NodeId,
    DEFAULT_OBSERVED_CARDINALITY,
};
pub use linear::{
    Bound, DenseMatrix, DenseSimplex, LinearProgram, LinearSolver, LpOutcome, LpSolution,
    SparseMatrix,
};
pub use mechanism::{
    coefficient, domain_product, latent_bit_length, IndicatorTerm, Mechanism, MechanismSpace,
    ParentKey, Slot,
};
pub use model::{Bounds, CausalModel};
pub use objective::{Objective, ObjectiveBuilder};
pub use optimizer::{optimizer_for, solve_bounds, BoundsProblem, Optimizer, Sense, SimplexOptimizer};
