use crate::config::ColumnGenerationConfig;
use crate::error::{BoundsError, Result};
use crate::linear::{DenseSimplex, LinearProgram, LinearSolver, LpOutcome, LpSolution, SparseMatrix};
use crate::mechanism::{IndicatorTerm, Mechanism, MechanismSpace};
use crate::optimizer::{BoundsProblem, Optimizer, Sense};
use tracing::{debug, info, warn};

/// Artificial flow left in the final master above which the data is
/// declared inconsistent with the graph.
const ARTIFICIAL_TOLERANCE: f64 = 1e-6;

/// Reduced cost of a mechanism, written as a sum of indicator terms plus a
/// constant: `Σ_t w_t·[t holds] + constant`.
#[derive(Clone, Debug)]
pub struct PricingProblem<'a> {
    pub space: &'a MechanismSpace,
    pub terms: Vec<IndicatorTerm>,
    pub constant: f64,
    /// Columns must price below `-tolerance` to count as improving
    pub tolerance: f64,
}

impl PricingProblem<'_> {
    pub fn reduced_cost(&self, mechanism: &Mechanism) -> f64 {
        self.constant + crate::mechanism::coefficient(&self.terms, mechanism)
    }
}

/// An improving column returned by a pricing oracle.
#[derive(Clone, PartialEq, Debug)]
pub struct PricedColumn {
    pub mechanism: Mechanism,
    pub reduced_cost: f64,
}

/// Searches for the mechanism of least reduced cost.
pub trait PricingOracle {
    /// Returns a column with reduced cost below `-problem.tolerance`, or
    /// None when no such column exists.
    fn price(&mut self, problem: &PricingProblem) -> Result<Option<PricedColumn>>;
}

impl<P: PricingOracle + ?Sized> PricingOracle for Box<P> {
    fn price(&mut self, problem: &PricingProblem) -> Result<Option<PricedColumn>> {
        (**self).price(problem)
    }
}

/// Exact depth-first search over slot values.
///
/// A partial assignment is bounded below by counting complete terms at their
/// weight, live incomplete terms at `min(0, weight)` and violated terms at 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchAndBoundPricing;

#[derive(Clone, Copy)]
struct TermState {
    weight: f64,
    remaining: usize,
    violated: usize,
}

impl TermState {
    fn contribution(&self) -> f64 {
        if self.violated > 0 {
            0.0
        } else if self.remaining == 0 {
            self.weight
        } else {
            self.weight.min(0.0)
        }
    }
}

struct Search<'a> {
    cardinalities: Vec<usize>,
    by_slot: Vec<Vec<(usize, usize)>>,
    states: Vec<TermState>,
    values: Vec<usize>,
    bound: f64,
    threshold: f64,
    best: Option<PricedColumn>,
    problem: &'a PricingProblem<'a>,
}

impl Search<'_> {
    fn assign(&mut self, slot: usize, value: usize, sign: isize) {
        for (term, required) in self.by_slot[slot].iter().copied() {
            let state = &mut self.states[term];
            let before = state.contribution();
            match (required == value, sign > 0) {
                (true, true) => state.remaining -= 1,
                (true, false) => state.remaining += 1,
                (false, true) => state.violated += 1,
                (false, false) => state.violated -= 1,
            }
            self.bound += state.contribution() - before;
        }
    }

    fn descend(&mut self, slot: usize) {
        if self.bound >= self.threshold {
            return;
        }
        if slot == self.cardinalities.len() {
            // every term is decided here, so the bound is exact
            let reduced_cost = self.problem.reduced_cost(&Mechanism {
                values: self.values.clone(),
            });
            if reduced_cost < self.threshold {
                self.threshold = reduced_cost;
                self.best = Some(PricedColumn {
                    mechanism: Mechanism {
                        values: self.values.clone(),
                    },
                    reduced_cost,
                });
            }
            return;
        }
        for value in 0..self.cardinalities[slot] {
            self.values[slot] = value;
            self.assign(slot, value, 1);
            self.descend(slot + 1);
            self.assign(slot, value, -1);
        }
    }
}

impl PricingOracle for BranchAndBoundPricing {
    fn price(&mut self, problem: &PricingProblem) -> Result<Option<PricedColumn>> {
        let slots = problem.space.slots();
        let mut by_slot: Vec<Vec<(usize, usize)>> = vec![Vec::new(); slots.len()];
        let mut states = Vec::with_capacity(problem.terms.len());
        for (index, term) in problem.terms.iter().enumerate() {
            for (slot, value) in term.requirements.iter().copied() {
                by_slot
                    .get_mut(slot)
                    .ok_or_else(|| BoundsError::DimensionMismatch {
                        expected: slots.len(),
                        got: slot + 1,
                        what: "pricing term slot".to_string(),
                    })?
                    .push((index, value));
            }
            states.push(TermState {
                weight: term.weight,
                remaining: term.requirements.len(),
                violated: 0,
            });
        }
        let bound = problem.constant + states.iter().map(TermState::contribution).sum::<f64>();
        let mut search = Search {
            cardinalities: slots.iter().map(|s| s.cardinality).collect(),
            by_slot,
            states,
            values: vec![0; slots.len()],
            bound,
            threshold: -problem.tolerance,
            best: None,
            problem,
        };
        search.descend(0);
        Ok(search.best)
    }
}

/// Pricing through an integer program solved by GLPK.
///
/// One binary per (slot, value) with a one-hot row per slot, and one binary
/// per term linearizing the AND of its requirements.
#[cfg(feature = "glpk")]
#[derive(Clone, Copy, Debug, Default)]
pub struct GlpkPricing;

#[cfg(feature = "glpk")]
impl PricingOracle for GlpkPricing {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn price(&mut self, problem: &PricingProblem) -> Result<Option<PricedColumn>> {
        use glpk_rust::{
            solve_ilps, IntegerSparseMatrix, SparseLEIntegerPolyhedron, Status, Variable,
        };
        use std::collections::HashMap;

        let slots = problem.space.slots();
        let mut names: Vec<String> = Vec::new();
        let mut offsets = Vec::with_capacity(slots.len());
        for (s, slot) in slots.iter().enumerate() {
            offsets.push(names.len());
            names.extend((0..slot.cardinality).map(|v| format!("b_{}_{}", s, v)));
        }
        let term_offset = names.len();
        names.extend((0..problem.terms.len()).map(|k| format!("t_{}", k)));

        let (mut rows, mut cols, mut vals) = (Vec::new(), Vec::new(), Vec::new());
        let mut b = Vec::new();
        let mut push_row = |entries: Vec<(usize, i32)>, rhs: i32, b: &mut Vec<(i32, i32)>| {
            let row = b.len() as i32;
            for (col, val) in entries {
                rows.push(row);
                cols.push(col as i32);
                vals.push(val);
            }
            b.push((0, rhs));
        };
        for (s, slot) in slots.iter().enumerate() {
            let one_hot: Vec<usize> = (0..slot.cardinality).map(|v| offsets[s] + v).collect();
            push_row(one_hot.iter().map(|c| (*c, 1)).collect(), 1, &mut b);
            push_row(one_hot.iter().map(|c| (*c, -1)).collect(), -1, &mut b);
        }
        for (k, term) in problem.terms.iter().enumerate() {
            let t = term_offset + k;
            let bits: Vec<usize> = term.requirements.iter().map(|(s, v)| offsets[*s] + v).collect();
            for bit in bits.iter() {
                push_row(vec![(t, 1), (*bit, -1)], 0, &mut b);
            }
            let mut entries: Vec<(usize, i32)> = bits.iter().map(|bit| (*bit, 1)).collect();
            entries.push((t, -1));
            push_row(entries, bits.len() as i32 - 1, &mut b);
        }

        let mut polyhedron = SparseLEIntegerPolyhedron {
            a: IntegerSparseMatrix { rows, cols, vals },
            b,
            variables: names
                .iter()
                .map(|name| Variable {
                    id: name.as_str(),
                    bound: (0, 1),
                })
                .collect(),
            double_bound: false,
        };
        let objective: HashMap<&str, f64> = problem
            .terms
            .iter()
            .enumerate()
            .map(|(k, term)| (names[term_offset + k].as_str(), term.weight))
            .collect();

        let solutions = solve_ilps(&mut polyhedron, vec![objective], false, false);
        let Some(solution) = solutions.first().filter(|s| s.status == Status::Optimal) else {
            return Err(BoundsError::Solver {
                reason: "GLPK found no optimal pricing solution".to_string(),
            });
        };
        let values = slots
            .iter()
            .enumerate()
            .map(|(s, slot)| {
                (0..slot.cardinality)
                    .find(|v| {
                        let name = names[offsets[s] + v].as_str();
                        solution.solution.get(name).copied().unwrap_or(0) == 1
                    })
                    .ok_or_else(|| BoundsError::Solver {
                        reason: format!("slot {} has no active value", s),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;
        let mechanism = Mechanism { values };
        let reduced_cost = problem.reduced_cost(&mechanism);
        Ok((reduced_cost < -problem.tolerance).then_some(PricedColumn {
            mechanism,
            reduced_cost,
        }))
    }
}

/// Outcome of one column generation run.
#[derive(Clone, PartialEq, Debug)]
pub struct ColumnGenerationResult {
    /// Objective value at the final master, None when artificial flow remains
    pub value: Option<f64>,
    pub iterations: usize,
    pub columns: Vec<Mechanism>,
}

enum State {
    Master,
    Pricing(LpSolution),
    Finalize(LpSolution),
    Done(Option<f64>),
}

/// Restricted master over generated mechanisms, grown by a pricing oracle.
///
/// Master rows are the constraint rows followed by the sum-to-one row. The
/// master starts from one artificial column per row at cost `big_m`.
pub struct ColumnGenerationEngine<P: PricingOracle, S: LinearSolver = DenseSimplex> {
    pricing: P,
    solver: S,
    config: ColumnGenerationConfig,
}

impl<P: PricingOracle, S: LinearSolver> ColumnGenerationEngine<P, S> {
    pub fn new(pricing: P, solver: S, config: ColumnGenerationConfig) -> Self {
        ColumnGenerationEngine {
            pricing,
            solver,
            config,
        }
    }

    fn master(
        &self,
        problem: &BoundsProblem,
        sense: Sense,
        columns: &[Mechanism],
    ) -> Result<LinearProgram> {
        let constraint_rows = problem.constraints.rows.len();
        let rows = constraint_rows + 1;
        let mut matrix = SparseMatrix::new(rows, rows + columns.len());
        let mut objective = vec![self.config.big_m; rows];
        for r in 0..rows {
            matrix.push(r, r, 1.0);
        }
        for (j, mechanism) in columns.iter().enumerate() {
            for (r, row) in problem.constraints.rows.iter().enumerate() {
                if row.indicator.holds(mechanism) {
                    matrix.push(r, rows + j, 1.0);
                }
            }
            matrix.push(constraint_rows, rows + j, 1.0);
            objective.push(sense.sign() * problem.objective.coefficient(mechanism));
        }
        let names = (0..rows)
            .map(|r| format!("a{}", r))
            .chain((0..columns.len()).map(|j| format!("m{}", j)))
            .collect();
        let rhs = problem
            .constraints
            .rows
            .iter()
            .map(|row| row.rhs)
            .chain(std::iter::once(1.0))
            .collect();
        let bounds = vec![(0.0, f64::INFINITY); rows + columns.len()];
        LinearProgram::new(names, objective, matrix, rhs, bounds)
    }

    fn pricing_problem<'a>(
        &self,
        problem: &'a BoundsProblem,
        sense: Sense,
        duals: &[f64],
    ) -> PricingProblem<'a> {
        let sum_row = problem.constraints.rows.len();
        let objective_terms = problem.objective.terms.iter().map(|term| IndicatorTerm {
            weight: sense.sign() * term.weight,
            requirements: term.requirements.clone(),
        });
        let row_terms = problem
            .constraints
            .rows
            .iter()
            .zip(duals.iter())
            .filter(|(_, dual)| **dual != 0.0)
            .map(|(row, dual)| IndicatorTerm {
                weight: -dual,
                requirements: row.indicator.requirements.clone(),
            });
        PricingProblem {
            space: &problem.space,
            terms: objective_terms.chain(row_terms).collect(),
            constant: -duals.get(sum_row).copied().unwrap_or(0.0),
            tolerance: self.config.reduced_cost_tolerance,
        }
    }

    /// Alternates master solves and pricing until no column improves.
    ///
    /// # Returns
    /// The bound in the unsigned objective scale, `None` when the master
    /// cannot drive its artificial columns out, or `IterationLimitExceeded`
    /// when the loop does not converge within `max_iterations` columns.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn run(&mut self, problem: &BoundsProblem, sense: Sense) -> Result<ColumnGenerationResult> {
        let rows = problem.constraints.num_rows();
        let mut columns: Vec<Mechanism> = Vec::new();
        let mut iterations = 0;
        let mut state = State::Master;
        loop {
            state = match state {
                State::Master => {
                    let master = self.master(problem, sense, &columns)?;
                    match self.solver.minimize(&master)? {
                        LpOutcome::Optimal(solution) => {
                            debug!(
                                iteration = iterations,
                                objective = solution.objective,
                                "master solved"
                            );
                            State::Pricing(solution)
                        }
                        other => {
                            return Err(BoundsError::Solver {
                                reason: format!("restricted master ended with {:?}", other),
                            })
                        }
                    }
                }
                State::Pricing(solution) => {
                    let pricing = self.pricing_problem(problem, sense, &solution.duals);
                    match self.pricing.price(&pricing)? {
                        Some(column) if columns.contains(&column.mechanism) => {
                            warn!(
                                reduced_cost = column.reduced_cost,
                                "pricing returned a column already in the master"
                            );
                            State::Finalize(solution)
                        }
                        Some(column) => {
                            if iterations >= self.config.max_iterations {
                                return Err(BoundsError::IterationLimitExceeded {
                                    max_iters: self.config.max_iterations,
                                });
                            }
                            debug!(
                                iteration = iterations,
                                reduced_cost = column.reduced_cost,
                                "adding column"
                            );
                            iterations += 1;
                            columns.push(column.mechanism);
                            State::Master
                        }
                        None => State::Finalize(solution),
                    }
                }
                State::Finalize(solution) => {
                    let artificial: f64 = solution.x[..rows].iter().sum();
                    if artificial > ARTIFICIAL_TOLERANCE {
                        warn!(artificial, "artificial columns remain in the final master");
                        State::Done(None)
                    } else {
                        let value = columns
                            .iter()
                            .zip(solution.x[rows..].iter())
                            .map(|(mechanism, x)| problem.objective.coefficient(mechanism) * x)
                            .sum();
                        State::Done(Some(value))
                    }
                }
                State::Done(value) => {
                    info!(
                        ?sense,
                        ?value,
                        iterations,
                        columns = columns.len(),
                        "column generation finished"
                    );
                    return Ok(ColumnGenerationResult {
                        value,
                        iterations,
                        columns,
                    });
                }
            };
        }
    }
}

/// `Optimizer` adapter running column generation for each direction.
pub struct ColumnGenerationOptimizer<P: PricingOracle, S: LinearSolver = DenseSimplex> {
    engine: ColumnGenerationEngine<P, S>,
    problem: Option<BoundsProblem>,
}

impl<P: PricingOracle, S: LinearSolver> ColumnGenerationOptimizer<P, S> {
    pub fn new(pricing: P, solver: S, config: ColumnGenerationConfig) -> Self {
        ColumnGenerationOptimizer {
            engine: ColumnGenerationEngine::new(pricing, solver, config),
            problem: None,
        }
    }

    fn solve(&mut self, sense: Sense) -> Result<Option<f64>> {
        let problem = self.problem.as_ref().ok_or_else(|| BoundsError::Solver {
            reason: "optimizer used before setup".to_string(),
        })?;
        Ok(self.engine.run(problem, sense)?.value)
    }
}

impl<P: PricingOracle, S: LinearSolver> Optimizer for ColumnGenerationOptimizer<P, S> {
    fn setup(&mut self, problem: &BoundsProblem) -> Result<()> {
        self.problem = Some(problem.clone());
        Ok(())
    }

    fn minimize(&mut self) -> Result<Option<f64>> {
        self.solve(Sense::Minimize)
    }

    fn maximize(&mut self) -> Result<Option<f64>> {
        self.solve(Sense::Maximize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintBuilder;
    use crate::dataset::Dataset;
    use crate::good_set::GoodSetFinder;
    use crate::graph::Graph;
    use crate::objective::ObjectiveBuilder;
    use crate::optimizer::{solve_bounds, SimplexOptimizer};
    use std::collections::{HashMap, VecDeque};

    fn iv_problem(
        cards: &[(&str, usize)],
        rows: Vec<(Vec<usize>, f64)>,
        x: usize,
        y: usize,
    ) -> BoundsProblem {
        let cards: HashMap<String, usize> =
            cards.iter().map(|(l, c)| (l.to_string(), *c)).collect();
        let graph =
            Graph::parse("Z -> X, X -> Y, U1 -> X, U1 -> Y, U2 -> Z", ["U1", "U2"], &cards)
                .unwrap();
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let distribution = data.distribution(&graph).unwrap();
        let good_set = GoodSetFinder::new(&graph)
            .find(graph.node_id("X").unwrap(), graph.node_id("Y").unwrap())
            .unwrap();
        let considered = good_set.considered_c_component(&graph);
        let latent = good_set.intervention_latent;
        let space = MechanismSpace::new(&graph, latent, &considered);
        BoundsProblem {
            constraints: ConstraintBuilder::new(&graph, &distribution)
                .build(latent, &considered, &space)
                .unwrap(),
            objective: ObjectiveBuilder::new(&graph, &distribution)
                .build(&good_set, &space, x, y)
                .unwrap(),
            space,
        }
    }

    // Z independent of a four-state latent U; X = f(Z, U), Y = g(X, U)
    fn scm_rows(z_card: usize, x_card: usize) -> Vec<(Vec<usize>, f64)> {
        let mut rows = Vec::new();
        for z in 0..z_card {
            for u in 0..4 {
                let x = (z * (u % 2) + u / 2) % x_card;
                let y = (x * (u % 2) + u / 2) % 2;
                rows.push((vec![z, x, y], ((z + 2) * (u + 1)) as f64));
            }
        }
        rows
    }

    fn binary_iv() -> BoundsProblem {
        iv_problem(&[], scm_rows(2, 2), 1, 1)
    }

    /// Replays canned columns, then reports convergence.
    struct CannedPricing {
        columns: VecDeque<PricedColumn>,
        calls: usize,
    }

    impl PricingOracle for CannedPricing {
        fn price(&mut self, _problem: &PricingProblem) -> Result<Option<PricedColumn>> {
            self.calls += 1;
            Ok(self.columns.pop_front())
        }
    }

    fn canned(mechanisms: Vec<Mechanism>) -> CannedPricing {
        CannedPricing {
            columns: mechanisms
                .into_iter()
                .map(|mechanism| PricedColumn {
                    mechanism,
                    reduced_cost: -1.0,
                })
                .collect(),
            calls: 0,
        }
    }

    #[test]
    fn test_branch_and_bound_finds_least_reduced_cost() {
        let problem = binary_iv();
        let mechanisms = problem.space.enumerate();
        let rows = problem.constraints.rows.len();
        // arbitrary duals
        let duals: Vec<f64> = (0..=rows).map(|i| ((i * 7) % 5) as f64 * 0.3 - 0.4).collect();
        let engine = ColumnGenerationEngine::new(
            BranchAndBoundPricing,
            DenseSimplex::default(),
            Default::default(),
        );
        for sense in [Sense::Minimize, Sense::Maximize] {
            let pricing = engine.pricing_problem(&problem, sense, &duals);
            let brute = mechanisms
                .iter()
                .map(|m| pricing.reduced_cost(m))
                .fold(f64::INFINITY, f64::min);
            let found = BranchAndBoundPricing.price(&pricing).unwrap();
            if brute < -pricing.tolerance {
                let found = found.unwrap();
                assert!((found.reduced_cost - brute).abs() < 1e-9);
                assert!((pricing.reduced_cost(&found.mechanism) - brute).abs() < 1e-9);
            } else {
                assert!(found.is_none());
            }
        }
    }

    #[test]
    fn test_reduced_cost_matches_master_columns() {
        let problem = binary_iv();
        let engine = ColumnGenerationEngine::new(
            BranchAndBoundPricing,
            DenseSimplex::default(),
            Default::default(),
        );
        let mechanisms = problem.space.enumerate();
        let master = engine.master(&problem, Sense::Minimize, &mechanisms).unwrap();
        let duals: Vec<f64> = (0..master.num_rows()).map(|i| i as f64 * 0.01).collect();
        let pricing = engine.pricing_problem(&problem, Sense::Minimize, &duals);
        let dense = crate::linear::DenseMatrix::from(master.a.clone());
        let offset = master.num_rows();
        for (j, mechanism) in mechanisms.iter().enumerate() {
            let priced: f64 = (0..master.num_rows())
                .map(|i| duals[i] * dense.data[i][offset + j])
                .sum();
            let expected = master.objective[offset + j] - priced;
            assert!((pricing.reduced_cost(mechanism) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_column_generation_matches_enumeration() {
        let problem = binary_iv();
        let mut direct = SimplexOptimizer::new(DenseSimplex::default());
        let (lower, upper) = solve_bounds(&mut direct, &problem).unwrap();

        let mut engine = ColumnGenerationEngine::new(
            BranchAndBoundPricing,
            DenseSimplex::default(),
            Default::default(),
        );
        let min = engine.run(&problem, Sense::Minimize).unwrap();
        let max = engine.run(&problem, Sense::Maximize).unwrap();
        assert!((min.value.unwrap() - lower.unwrap()).abs() < 1e-6);
        assert!((max.value.unwrap() - upper.unwrap()).abs() < 1e-6);
        assert!(min.columns.len() <= problem.space.enumerate().len());
    }

    #[test]
    fn test_non_binary_column_generation_matches_enumeration() {
        let problem = iv_problem(&[("Z", 3), ("X", 3)], scm_rows(3, 3), 2, 1);
        let mut direct = SimplexOptimizer::new(DenseSimplex::default());
        let (lower, upper) = solve_bounds(&mut direct, &problem).unwrap();
        let mut generated = ColumnGenerationOptimizer::new(
            BranchAndBoundPricing,
            DenseSimplex::default(),
            Default::default(),
        );
        let (cg_lower, cg_upper) = solve_bounds(&mut generated, &problem).unwrap();
        assert!((cg_lower.unwrap() - lower.unwrap()).abs() < 1e-6);
        assert!((cg_upper.unwrap() - upper.unwrap()).abs() < 1e-6);
    }

    #[test]
    fn test_canned_pricing_drives_the_loop() {
        let problem = binary_iv();
        let mechanisms = problem.space.enumerate();
        let mut engine = ColumnGenerationEngine::new(
            canned(mechanisms.clone()),
            DenseSimplex::default(),
            Default::default(),
        );
        let result = engine.run(&problem, Sense::Minimize).unwrap();
        assert_eq!(result.iterations, 16);
        assert_eq!(result.columns, mechanisms);
        assert_eq!(engine.pricing.calls, 17);

        let mut direct = SimplexOptimizer::new(DenseSimplex::default());
        let (lower, _) = solve_bounds(&mut direct, &problem).unwrap();
        assert!((result.value.unwrap() - lower.unwrap()).abs() < 1e-6);
    }

    #[test]
    fn test_iteration_limit() {
        let problem = binary_iv();
        let config = ColumnGenerationConfig {
            max_iterations: 3,
            ..Default::default()
        };
        let mut engine = ColumnGenerationEngine::new(
            canned(problem.space.enumerate()),
            DenseSimplex::default(),
            config,
        );
        assert_eq!(
            engine.run(&problem, Sense::Minimize).unwrap_err(),
            BoundsError::IterationLimitExceeded { max_iters: 3 }
        );
    }

    #[test]
    fn test_leftover_artificial_flow_is_infeasible() {
        let problem = binary_iv();
        // a single column cannot reproduce the data
        let first = problem.space.enumerate().remove(0);
        let mut engine = ColumnGenerationEngine::new(
            canned(vec![first]),
            DenseSimplex::default(),
            Default::default(),
        );
        let result = engine.run(&problem, Sense::Minimize).unwrap();
        assert_eq!(result.value, None);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_duplicate_column_stops_the_loop() {
        let problem = binary_iv();
        let first = problem.space.enumerate().remove(0);
        let mut engine = ColumnGenerationEngine::new(
            canned(vec![first.clone(), first]),
            DenseSimplex::default(),
            Default::default(),
        );
        let result = engine.run(&problem, Sense::Minimize).unwrap();
        assert_eq!(result.columns.len(), 1);
        assert_eq!(engine.pricing.calls, 2);
    }
}
