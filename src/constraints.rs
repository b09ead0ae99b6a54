use crate::dataset::Distribution;
use crate::error::{BoundsError, Result};
use crate::graph::{Graph, NodeId};
use crate::linear::SparseMatrix;
use crate::mechanism::{coefficient, domain_product, IndicatorTerm, Mechanism, MechanismSpace};
use serde::Serialize;
use tracing::debug;

/// One equality: the mechanisms consistent with `realization` carry
/// probability `rhs` in total.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct ConstraintRow {
    /// Values of the `wc` nodes, in `wc` order
    pub realization: Vec<usize>,
    pub rhs: f64,
    pub indicator: IndicatorTerm,
}

/// Equalities tying empirical conditionals to mechanism probabilities.
///
/// The sum-to-one row is implicit; `rows` holds one row per realization of
/// `wc`.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct ConstraintSystem {
    pub latent: NodeId,
    /// c-component nodes in reverse topological order
    pub c_comp_order: Vec<NodeId>,
    pub wc: Vec<NodeId>,
    /// `(node, conditioning nodes)` for each factor of a right-hand side
    pub factors: Vec<(NodeId, Vec<NodeId>)>,
    pub rows: Vec<ConstraintRow>,
}

impl ConstraintSystem {
    /// Number of rows including the sum-to-one row.
    pub fn num_rows(&self) -> usize {
        self.rows.len() + 1
    }

    /// Right-hand side with the sum-to-one row first.
    pub fn rhs(&self) -> Vec<f64> {
        std::iter::once(1.0)
            .chain(self.rows.iter().map(|row| row.rhs))
            .collect()
    }

    /// Column of a mechanism, matching `rhs()`.
    pub fn column(&self, mechanism: &Mechanism) -> Vec<f64> {
        std::iter::once(1.0)
            .chain(
                self.rows
                    .iter()
                    .map(|row| coefficient(std::slice::from_ref(&row.indicator), mechanism)),
            )
            .collect()
    }

    pub fn matrix(&self, mechanisms: &[Mechanism]) -> SparseMatrix {
        let mut matrix = SparseMatrix::new(self.num_rows(), mechanisms.len());
        for (j, mechanism) in mechanisms.iter().enumerate() {
            for (i, value) in self.column(mechanism).into_iter().enumerate() {
                matrix.push(i, j, value);
            }
        }
        matrix
    }

    /// Factors as `(label, conditioning labels)`.
    pub fn symbolic(&self, graph: &Graph) -> Vec<(String, Vec<String>)> {
        self.factors
            .iter()
            .map(|(node, condition)| (graph.label(*node).to_string(), graph.labels(condition)))
            .collect()
    }
}

pub struct ConstraintBuilder<'g, 'd> {
    graph: &'g Graph,
    distribution: &'g Distribution<'d>,
}

impl<'g, 'd> ConstraintBuilder<'g, 'd> {
    pub fn new(graph: &'g Graph, distribution: &'g Distribution<'d>) -> Self {
        ConstraintBuilder { graph, distribution }
    }

    /// Builds the equality system of the c-component of `latent`.
    ///
    /// # Arguments
    /// * `latent` - the intervention's latent parent
    /// * `considered` - c-component members kept by the good-set search
    /// * `space` - mechanism slots of `considered`
    ///
    /// # Returns
    /// One row per realization of the c-component and its tail, each with the
    /// chained conditional probability as right-hand side.
    pub fn build(
        &self,
        latent: NodeId,
        considered: &[NodeId],
        space: &MechanismSpace,
    ) -> Result<ConstraintSystem> {
        let graph = self.graph;
        let mut c_comp_order: Vec<NodeId> = graph
            .topological_order()
            .iter()
            .copied()
            .filter(|n| graph.node(*n).parents.contains(&latent) && considered.contains(n))
            .collect();
        c_comp_order.reverse();

        let mut tail = c_comp_order.clone();
        for node in c_comp_order.iter() {
            for parent in graph.node(*node).parents.iter().copied() {
                if parent != latent && !tail.contains(&parent) {
                    tail.push(parent);
                }
            }
        }

        let mut wc = c_comp_order.clone();
        let mut factors = Vec::with_capacity(c_comp_order.len());
        for node in c_comp_order.iter().copied() {
            let condition: Vec<NodeId> = tail
                .iter()
                .copied()
                .filter(|c| graph.topological_rank(*c) < graph.topological_rank(node))
                .collect();
            for c in condition.iter() {
                if !wc.contains(c) {
                    wc.push(*c);
                }
            }
            factors.push((node, condition));
        }

        let mut rows = Vec::new();
        for realization in domain_product(graph, &wc) {
            let value_of =
                |node: NodeId| wc.iter().position(|w| *w == node).map(|i| realization[i]);
            let assign = |nodes: &[NodeId]| -> Vec<(NodeId, usize)> {
                nodes
                    .iter()
                    .filter_map(|n| value_of(*n).map(|v| (*n, v)))
                    .collect()
            };

            let mut rhs = 1.0;
            for (node, condition) in factors.iter() {
                rhs *= self.distribution.conditional(&assign(&[*node]), &assign(condition));
                if rhs == 0.0 {
                    break;
                }
            }

            let mut requirements = Vec::with_capacity(c_comp_order.len());
            for node in c_comp_order.iter().copied() {
                let slot = space
                    .slot_for(graph, node, value_of)
                    .ok_or_else(|| BoundsError::NodeNotFound {
                        node_id: graph.label(node).to_string(),
                    })?;
                requirements.extend(value_of(node).map(|v| (slot, v)));
            }
            let indicator =
                IndicatorTerm::new(1.0, requirements).ok_or_else(|| BoundsError::Solver {
                    reason: "conflicting mechanism requirements in a constraint row".to_string(),
                })?;
            rows.push(ConstraintRow {
                realization,
                rhs,
                indicator,
            });
        }

        debug!(
            wc = ?graph.labels(&wc),
            rows = rows.len() + 1,
            "built constraint system"
        );
        Ok(ConstraintSystem {
            latent,
            c_comp_order,
            wc,
            factors,
            rows,
        })
    }
}
