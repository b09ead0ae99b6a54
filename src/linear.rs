use crate::error::{BoundsError, Result};
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Lower and upper bound of a column. The upper bound may be `f64::INFINITY`.
pub type Bound = (f64, f64);

/// Phase 1 objective above which the equality system is declared infeasible.
const FEASIBILITY_TOLERANCE: f64 = 1e-7;

/// Sparse representation of a real matrix.
///
/// Stores only non-zero elements using coordinate format (COO):
/// - `rows\[i\]`, `cols\[i\]`, `vals\[i\]` represent a non-zero element at position
///   (rows\[i\], cols\[i\]) with value vals\[i\]
#[derive(Serialize, Clone, PartialEq, Debug, Default)]
pub struct SparseMatrix {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub vals: Vec<f64>,
    /// Matrix dimensions: (number_of_rows, number_of_columns)
    pub shape: (usize, usize),
}

impl SparseMatrix {
    pub fn new(rows: usize, cols: usize) -> SparseMatrix {
        SparseMatrix {
            rows: Vec::new(),
            cols: Vec::new(),
            vals: Vec::new(),
            shape: (rows, cols),
        }
    }

    /// Appends an entry, ignoring exact zeros.
    pub fn push(&mut self, row: usize, col: usize, val: f64) {
        if val != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.vals.push(val);
        }
    }

    /// Entries of one row as `(col, value)` pairs.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter().zip(self.vals.iter()))
            .filter(move |(r, _)| **r == row)
            .map(|(_, (c, v))| (*c, *v))
    }
}

impl fmt::Display for SparseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DenseMatrix::from(self.clone()).fmt(f)
    }
}

/// Dense representation of a real matrix, stored row by row.
#[derive(Clone, PartialEq, Debug)]
pub struct DenseMatrix {
    pub data: Vec<Vec<f64>>,
    pub shape: (usize, usize),
}

impl fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.data {
            for val in row {
                write!(f, "{:>8.4} ", val)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl DenseMatrix {
    /// Creates a zero matrix.
    pub fn new(rows: usize, cols: usize) -> DenseMatrix {
        DenseMatrix {
            data: vec![vec![0.0; cols]; rows],
            shape: (rows, cols),
        }
    }

    /// Computes the matrix-vector product. The vector length must match the
    /// number of columns.
    pub fn dot_product(&self, vector: &[f64]) -> Vec<f64> {
        self.data
            .iter()
            .map(|row| row.iter().zip(vector.iter()).map(|(a, b)| a * b).sum())
            .collect()
    }
}

impl From<SparseMatrix> for DenseMatrix {
    fn from(sparse: SparseMatrix) -> DenseMatrix {
        let mut dense = DenseMatrix::new(sparse.shape.0, sparse.shape.1);
        for ((&row, &col), &val) in sparse.rows.iter().zip(&sparse.cols).zip(&sparse.vals) {
            dense.data[row][col] += val;
        }
        dense
    }
}

impl From<DenseMatrix> for SparseMatrix {
    fn from(dense: DenseMatrix) -> SparseMatrix {
        let mut sparse = SparseMatrix::new(dense.shape.0, dense.shape.1);
        for (i, row) in dense.data.iter().enumerate() {
            for (j, &val) in row.iter().enumerate() {
                sparse.push(i, j, val);
            }
        }
        sparse
    }
}

/// `min objective·x` subject to `a x = b` and the column bounds.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct LinearProgram {
    pub columns: Vec<String>,
    pub objective: Vec<f64>,
    pub a: SparseMatrix,
    pub b: Vec<f64>,
    pub column_bounds: Vec<Bound>,
}

impl LinearProgram {
    /// Checks that objective, matrix, right-hand side and bounds line up.
    pub fn new(
        columns: Vec<String>,
        objective: Vec<f64>,
        a: SparseMatrix,
        b: Vec<f64>,
        column_bounds: Vec<Bound>,
    ) -> Result<LinearProgram> {
        let (rows, cols) = a.shape;
        for (what, got, expected) in [
            ("objective", objective.len(), cols),
            ("column names", columns.len(), cols),
            ("column bounds", column_bounds.len(), cols),
            ("right-hand side", b.len(), rows),
        ] {
            if got != expected {
                return Err(BoundsError::DimensionMismatch {
                    expected,
                    got,
                    what: what.to_string(),
                });
            }
        }
        if let Some(pos) = a
            .rows
            .iter()
            .zip(a.cols.iter())
            .position(|(r, c)| *r >= rows || *c >= cols)
        {
            return Err(BoundsError::DimensionMismatch {
                expected: rows.max(cols),
                got: a.rows[pos].max(a.cols[pos]),
                what: "matrix entry".to_string(),
            });
        }
        Ok(LinearProgram {
            columns,
            objective,
            a,
            b,
            column_bounds,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.a.shape.0
    }

    pub fn num_cols(&self) -> usize {
        self.a.shape.1
    }

    /// The same program with the objective negated, so that minimizing it
    /// maximizes the original.
    pub fn negated(&self) -> LinearProgram {
        LinearProgram {
            objective: self.objective.iter().map(|c| -c).collect(),
            ..self.clone()
        }
    }

    /// Renders the program in an LP-file style listing for debugging.
    pub fn to_lp_string(&self) -> String {
        let term = |coef: f64, name: &str| format!("{:+} {}", coef, name);
        let mut out = String::from("Minimize\n obj: ");
        out.push_str(
            &self
                .objective
                .iter()
                .zip(self.columns.iter())
                .filter(|(c, _)| **c != 0.0)
                .map(|(c, name)| term(*c, name))
                .join(" "),
        );
        out.push_str("\nSubject To\n");
        for (i, rhs) in self.b.iter().enumerate() {
            let lhs = self.a.row(i).map(|(j, v)| term(v, &self.columns[j])).join(" ");
            out.push_str(&format!(" r{}: {} = {}\n", i, lhs, rhs));
        }
        out.push_str("Bounds\n");
        for (name, (lower, upper)) in self.columns.iter().zip(self.column_bounds.iter()) {
            if upper.is_finite() {
                out.push_str(&format!(" {} <= {} <= {}\n", lower, name, upper));
            } else {
                out.push_str(&format!(" {} >= {}\n", name, lower));
            }
        }
        out.push_str("End\n");
        out
    }
}

/// An optimal vertex of a linear program.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct LpSolution {
    pub objective: f64,
    pub x: Vec<f64>,
    /// One dual price per equality row
    pub duals: Vec<f64>,
    pub iterations: usize,
}

#[derive(Clone, PartialEq, Debug)]
pub enum LpOutcome {
    Optimal(LpSolution),
    Infeasible,
    Unbounded,
    IterationLimit,
}

impl LpOutcome {
    pub fn optimal(self) -> Option<LpSolution> {
        match self {
            LpOutcome::Optimal(solution) => Some(solution),
            _ => None,
        }
    }
}

/// A backend able to minimize a `LinearProgram`.
pub trait LinearSolver {
    fn minimize(&self, lp: &LinearProgram) -> Result<LpOutcome>;
}

/// Two-phase primal simplex on a dense tableau with bounded columns.
#[derive(Clone, Debug)]
pub struct DenseSimplex {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for DenseSimplex {
    fn default() -> Self {
        DenseSimplex {
            tolerance: 1e-9,
            max_iterations: 50_000,
        }
    }
}

enum Phase {
    Optimal,
    Unbounded,
    IterationLimit,
}

// Columns are shifted so every lower bound is zero. Nonbasic columns sit at
// zero or at their upper bound; `beta` holds the basic values.
struct Tableau {
    t: Vec<Vec<f64>>,
    beta: Vec<f64>,
    basis: Vec<usize>,
    is_basic: Vec<bool>,
    at_upper: Vec<bool>,
    upper: Vec<f64>,
}

impl Tableau {
    fn reduced_costs(&self, costs: &[f64]) -> Vec<f64> {
        let mut reduced = costs.to_vec();
        for (row, basic) in self.t.iter().zip(self.basis.iter()) {
            let cb = costs[*basic];
            if cb != 0.0 {
                for (d, v) in reduced.iter_mut().zip(row.iter()) {
                    *d -= cb * v;
                }
            }
        }
        reduced
    }

    // Dantzig's rule, or Bland's (lowest index) right after a degenerate step.
    fn entering(&self, reduced: &[f64], tolerance: f64, bland: bool) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64, f64)> = None;
        for (j, d) in reduced.iter().enumerate() {
            if self.is_basic[j] || self.upper[j] <= tolerance {
                continue;
            }
            let direction = if !self.at_upper[j] && *d < -tolerance {
                1.0
            } else if self.at_upper[j] && *d > tolerance {
                -1.0
            } else {
                continue;
            };
            if bland {
                return Some((j, direction));
            }
            if best.map_or(true, |(_, _, score)| d.abs() > score) {
                best = Some((j, direction, d.abs()));
            }
        }
        best.map(|(j, direction, _)| (j, direction))
    }

    // Moves the entering column as far as the bounds allow. Returns the step
    // length, or None when nothing blocks it.
    fn step(&mut self, entering: usize, direction: f64, tolerance: f64) -> Option<f64> {
        let mut limit = self.upper[entering];
        let mut leaving: Option<(usize, bool)> = None;
        for (i, row) in self.t.iter().enumerate() {
            let alpha = direction * row[entering];
            let basic = self.basis[i];
            let (ratio, to_upper) = if alpha > tolerance {
                (self.beta[i].max(0.0) / alpha, false)
            } else if alpha < -tolerance && self.upper[basic].is_finite() {
                ((self.upper[basic] - self.beta[i]).max(0.0) / -alpha, true)
            } else {
                continue;
            };
            if ratio < limit {
                limit = ratio;
                leaving = Some((i, to_upper));
            }
        }
        if !limit.is_finite() {
            return None;
        }

        for (beta, row) in self.beta.iter_mut().zip(self.t.iter()) {
            *beta -= direction * row[entering] * limit;
        }
        match leaving {
            None => self.at_upper[entering] = !self.at_upper[entering],
            Some((r, to_upper)) => {
                let value = if direction > 0.0 {
                    limit
                } else {
                    self.upper[entering] - limit
                };
                let old = self.basis[r];
                self.pivot(r, entering);
                self.basis[r] = entering;
                self.is_basic[entering] = true;
                self.is_basic[old] = false;
                self.at_upper[entering] = false;
                self.at_upper[old] = to_upper;
                self.beta[r] = value;
            }
        }
        Some(limit)
    }

    fn pivot(&mut self, r: usize, col: usize) {
        let p = self.t[r][col];
        for v in self.t[r].iter_mut() {
            *v /= p;
        }
        let pivot_row = self.t[r].clone();
        for (i, row) in self.t.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let factor = row[col];
            if factor != 0.0 {
                for (v, pv) in row.iter_mut().zip(pivot_row.iter()) {
                    *v -= factor * pv;
                }
            }
        }
    }

    fn run(
        &mut self,
        costs: &[f64],
        tolerance: f64,
        max_iterations: usize,
        iterations: &mut usize,
    ) -> Phase {
        let mut bland = false;
        loop {
            let reduced = self.reduced_costs(costs);
            let Some((entering, direction)) = self.entering(&reduced, tolerance, bland) else {
                return Phase::Optimal;
            };
            if *iterations >= max_iterations {
                return Phase::IterationLimit;
            }
            *iterations += 1;
            match self.step(entering, direction, tolerance) {
                Some(length) => bland = length <= tolerance,
                None => return Phase::Unbounded,
            }
        }
    }

    fn value(&self, col: usize) -> f64 {
        if self.is_basic[col] {
            self.basis
                .iter()
                .position(|b| *b == col)
                .map_or(0.0, |r| self.beta[r])
        } else if self.at_upper[col] {
            self.upper[col]
        } else {
            0.0
        }
    }
}

impl LinearSolver for DenseSimplex {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn minimize(&self, lp: &LinearProgram) -> Result<LpOutcome> {
        let (m, n) = lp.a.shape;
        let dense = DenseMatrix::from(lp.a.clone());
        let lower: Vec<f64> = lp.column_bounds.iter().map(|b| b.0).collect();
        let shifted: Vec<f64> = lp
            .b
            .iter()
            .zip(dense.dot_product(&lower))
            .map(|(b, al)| b - al)
            .collect();
        let signs: Vec<f64> = shifted.iter().map(|b| if *b < 0.0 { -1.0 } else { 1.0 }).collect();

        let mut t = Vec::with_capacity(m);
        for (i, row) in dense.data.iter().enumerate() {
            let mut full: Vec<f64> = row.iter().map(|v| signs[i] * v).collect();
            full.extend((0..m).map(|k| if k == i { 1.0 } else { 0.0 }));
            t.push(full);
        }
        let mut upper: Vec<f64> = lp.column_bounds.iter().map(|(l, u)| u - l).collect();
        upper.extend(std::iter::repeat(f64::INFINITY).take(m));
        let mut is_basic = vec![false; n + m];
        is_basic[n..].iter_mut().for_each(|b| *b = true);

        let mut tableau = Tableau {
            t,
            beta: shifted.iter().map(|b| b.abs()).collect(),
            basis: (n..n + m).collect(),
            is_basic,
            at_upper: vec![false; n + m],
            upper,
        };

        let mut iterations = 0;
        let phase_one: Vec<f64> = std::iter::repeat(0.0)
            .take(n)
            .chain(std::iter::repeat(1.0).take(m))
            .collect();
        match tableau.run(&phase_one, self.tolerance, self.max_iterations, &mut iterations) {
            Phase::Optimal => {}
            Phase::IterationLimit => return Ok(LpOutcome::IterationLimit),
            Phase::Unbounded => {
                return Err(BoundsError::Solver {
                    reason: "phase 1 reported an unbounded ray".to_string(),
                })
            }
        }
        let infeasibility: f64 = (n..n + m).map(|col| tableau.value(col)).sum();
        if infeasibility > FEASIBILITY_TOLERANCE {
            debug!(infeasibility, "linear program is infeasible");
            return Ok(LpOutcome::Infeasible);
        }
        tableau.upper[n..].iter_mut().for_each(|u| *u = 0.0);

        let phase_two: Vec<f64> = lp
            .objective
            .iter()
            .copied()
            .chain(std::iter::repeat(0.0).take(m))
            .collect();
        match tableau.run(&phase_two, self.tolerance, self.max_iterations, &mut iterations) {
            Phase::Optimal => {}
            Phase::IterationLimit => return Ok(LpOutcome::IterationLimit),
            Phase::Unbounded => return Ok(LpOutcome::Unbounded),
        }

        let x: Vec<f64> = (0..n).map(|j| lower[j] + tableau.value(j)).collect();
        let duals: Vec<f64> = (0..m)
            .map(|i| {
                signs[i]
                    * tableau
                        .t
                        .iter()
                        .zip(tableau.basis.iter())
                        .map(|(row, basic)| phase_two[*basic] * row[n + i])
                        .sum::<f64>()
            })
            .collect();
        let objective = lp.objective.iter().zip(x.iter()).map(|(c, v)| c * v).sum();
        Ok(LpOutcome::Optimal(LpSolution {
            objective,
            x,
            duals,
            iterations,
        }))
    }
}
