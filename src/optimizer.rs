use crate::column_generation::{BranchAndBoundPricing, ColumnGenerationOptimizer};
use crate::config::{BoundsConfig, OptimizerKind, PricingKind};
use crate::constraints::ConstraintSystem;
use crate::error::{BoundsError, Result};
use crate::linear::{DenseSimplex, LinearProgram, LinearSolver, LpOutcome};
use crate::mechanism::MechanismSpace;
use crate::objective::Objective;
use tracing::{debug, warn};

/// Everything an optimizer needs to bound one query.
#[derive(Clone, Debug)]
pub struct BoundsProblem {
    pub space: MechanismSpace,
    pub constraints: ConstraintSystem,
    pub objective: Objective,
}

/// Optimization direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sense {
    Minimize,
    Maximize,
}

impl Sense {
    /// Multiplier turning the objective into one to minimize.
    pub fn sign(self) -> f64 {
        match self {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        }
    }
}

/// A backend bounding the objective over the mechanism polytope.
///
/// `None` from `minimize`/`maximize` means the backend found no optimum
/// (infeasible data, or a solver status other than optimal).
pub trait Optimizer {
    fn setup(&mut self, problem: &BoundsProblem) -> Result<()>;
    fn minimize(&mut self) -> Result<Option<f64>>;
    fn maximize(&mut self) -> Result<Option<f64>>;
}

/// Solves the LP over every enumerated mechanism.
pub struct SimplexOptimizer<S: LinearSolver = DenseSimplex> {
    solver: S,
    program: Option<LinearProgram>,
}

impl<S: LinearSolver> SimplexOptimizer<S> {
    pub fn new(solver: S) -> Self {
        SimplexOptimizer { solver, program: None }
    }

    /// The program built by the last `setup`, for dumps.
    pub fn linear_program(&self) -> Option<&LinearProgram> {
        self.program.as_ref()
    }

    fn solve(&self, sense: Sense) -> Result<Option<f64>> {
        let program = self.program.as_ref().ok_or_else(|| BoundsError::Solver {
            reason: "optimizer used before setup".to_string(),
        })?;
        let outcome = match sense {
            Sense::Minimize => self.solver.minimize(program)?,
            Sense::Maximize => self.solver.minimize(&program.negated())?,
        };
        match outcome {
            LpOutcome::Optimal(solution) => {
                debug!(
                    ?sense,
                    objective = solution.objective,
                    iterations = solution.iterations,
                    "lp solved"
                );
                Ok(Some(sense.sign() * solution.objective))
            }
            other => {
                warn!(?sense, outcome = ?other, "lp has no optimum");
                Ok(None)
            }
        }
    }
}

impl<S: LinearSolver> Optimizer for SimplexOptimizer<S> {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn setup(&mut self, problem: &BoundsProblem) -> Result<()> {
        let mechanisms = problem.space.enumerate();
        debug!(
            mechanisms = mechanisms.len(),
            rows = problem.constraints.num_rows(),
            "enumerated mechanisms"
        );
        self.program = Some(LinearProgram::new(
            (0..mechanisms.len()).map(|j| format!("m{}", j)).collect(),
            problem.objective.coefficients(&mechanisms),
            problem.constraints.matrix(&mechanisms),
            problem.constraints.rhs(),
            vec![(0.0, 1.0); mechanisms.len()],
        )?);
        Ok(())
    }

    fn minimize(&mut self) -> Result<Option<f64>> {
        self.solve(Sense::Minimize)
    }

    fn maximize(&mut self) -> Result<Option<f64>> {
        self.solve(Sense::Maximize)
    }
}

/// Builds the optimizer selected by `config`.
pub fn optimizer_for(config: &BoundsConfig) -> Result<Box<dyn Optimizer>> {
    config.validate()?;
    let simplex = DenseSimplex {
        tolerance: config.simplex.tolerance,
        max_iterations: config.simplex.max_iterations,
    };
    match (config.optimizer, config.column_generation.pricing) {
        (OptimizerKind::Simplex, _) => Ok(Box::new(SimplexOptimizer::new(simplex))),
        (OptimizerKind::ColumnGeneration, PricingKind::BranchAndBound) => {
            Ok(Box::new(ColumnGenerationOptimizer::new(
                BranchAndBoundPricing,
                simplex,
                config.column_generation.clone(),
            )))
        }
        #[cfg(feature = "glpk")]
        (OptimizerKind::ColumnGeneration, PricingKind::Glpk) => {
            Ok(Box::new(ColumnGenerationOptimizer::new(
                crate::column_generation::GlpkPricing,
                simplex,
                config.column_generation.clone(),
            )))
        }
        #[cfg(not(feature = "glpk"))]
        (OptimizerKind::ColumnGeneration, PricingKind::Glpk) => Err(BoundsError::InvalidConfig {
            field: "column_generation.pricing".to_string(),
            reason: "built without the glpk feature".to_string(),
        }),
    }
}

/// Sets `optimizer` up and returns `(lower, upper)`.
pub fn solve_bounds(
    optimizer: &mut dyn Optimizer,
    problem: &BoundsProblem,
) -> Result<(Option<f64>, Option<f64>)> {
    optimizer.setup(problem)?;
    let lower = optimizer.minimize()?;
    let upper = optimizer.maximize()?;
    Ok((lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintBuilder;
    use crate::dataset::Dataset;
    use crate::graph::Graph;
    use crate::objective::ObjectiveBuilder;
    use std::collections::HashMap;

    // U1 -> X, U1 -> Y, X -> Y with P(X=1, Y=1) = 0.5 and P(X=0) = 0.3
    fn confounded_problem() -> BoundsProblem {
        let graph = Graph::parse("U1 -> X, U1 -> Y, X -> Y", ["U1"], &HashMap::new()).unwrap();
        let data = Dataset::from_weighted_rows(
            ["X", "Y"],
            vec![(vec![0, 0], 0.1), (vec![0, 1], 0.2), (vec![1, 0], 0.2), (vec![1, 1], 0.5)],
        )
        .unwrap();
        let distribution = data.distribution(&graph).unwrap();
        let (x, y, u1) = (
            graph.node_id("X").unwrap(),
            graph.node_id("Y").unwrap(),
            graph.node_id("U1").unwrap(),
        );
        let good_set = crate::good_set::GoodSetFinder::new(&graph).find(x, y).unwrap();
        let considered = good_set.considered_c_component(&graph);
        let space = MechanismSpace::new(&graph, u1, &considered);
        let constraints = ConstraintBuilder::new(&graph, &distribution)
            .build(u1, &considered, &space)
            .unwrap();
        let objective = ObjectiveBuilder::new(&graph, &distribution)
            .build(&good_set, &space, 1, 1)
            .unwrap();
        BoundsProblem {
            space,
            constraints,
            objective,
        }
    }

    #[test]
    fn test_simplex_optimizer_gives_natural_bounds() {
        let problem = confounded_problem();
        let mut optimizer = SimplexOptimizer::new(DenseSimplex::default());
        let (lower, upper) = solve_bounds(&mut optimizer, &problem).unwrap();
        assert!((lower.unwrap() - 0.5).abs() < 1e-7);
        assert!((upper.unwrap() - 0.8).abs() < 1e-7);
        let program = optimizer.linear_program().unwrap();
        assert_eq!(program.num_cols(), 8);
        assert_eq!(program.num_rows(), 5);
    }

    #[test]
    fn test_optimizer_requires_setup() {
        let mut optimizer = SimplexOptimizer::new(DenseSimplex::default());
        assert!(matches!(optimizer.minimize(), Err(BoundsError::Solver { .. })));
    }

    #[test]
    fn test_infeasible_constraints_give_none() {
        let mut problem = confounded_problem();
        for row in problem.constraints.rows.iter_mut() {
            row.rhs = 0.9;
        }
        let mut optimizer = SimplexOptimizer::new(DenseSimplex::default());
        assert_eq!(solve_bounds(&mut optimizer, &problem).unwrap(), (None, None));
    }

    #[test]
    fn test_optimizer_for_config() {
        let problem = confounded_problem();
        let mut config = BoundsConfig::default();
        config.optimizer = OptimizerKind::ColumnGeneration;
        let mut optimizer = optimizer_for(&config).unwrap();
        let (lower, upper) = solve_bounds(optimizer.as_mut(), &problem).unwrap();
        assert!((lower.unwrap() - 0.5).abs() < 1e-6);
        assert!((upper.unwrap() - 0.8).abs() < 1e-6);
    }
}
