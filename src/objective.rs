use crate::dataset::Distribution;
use crate::error::{BoundsError, Result};
use crate::good_set::{GoodSet, Term};
use crate::graph::{Graph, NodeId};
use crate::mechanism::{coefficient, domain_product, IndicatorTerm, Mechanism, MechanismSpace};
use serde::Serialize;
use tracing::debug;

/// Objective of the bound LP as a sum of weighted mechanism indicators.
///
/// Each term comes from one realization of the summand nodes: its weight is
/// the product of the empirical and conditional factors, its requirements
/// are the mechanism responses that realization needs.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Objective {
    pub summand_nodes: Vec<NodeId>,
    pub terms: Vec<IndicatorTerm>,
}

impl Objective {
    pub fn coefficient(&self, mechanism: &Mechanism) -> f64 {
        coefficient(&self.terms, mechanism)
    }

    pub fn coefficients(&self, mechanisms: &[Mechanism]) -> Vec<f64> {
        mechanisms.iter().map(|m| self.coefficient(m)).collect()
    }
}

pub struct ObjectiveBuilder<'g, 'd> {
    graph: &'g Graph,
    distribution: &'g Distribution<'d>,
}

impl<'g, 'd> ObjectiveBuilder<'g, 'd> {
    pub fn new(graph: &'g Graph, distribution: &'g Distribution<'d>) -> Self {
        ObjectiveBuilder { graph, distribution }
    }

    /// Sums over every realization of the summand nodes, with the target at
    /// `target_value` and the intervention at `intervention_value`.
    pub fn build(
        &self,
        good_set: &GoodSet,
        space: &MechanismSpace,
        intervention_value: usize,
        target_value: usize,
    ) -> Result<Objective> {
        let graph = self.graph;
        let summand_nodes = good_set.summand_nodes();
        let mut nodes = summand_nodes.clone();
        nodes.push(good_set.target);

        let mut terms = Vec::new();
        for mut realization in domain_product(graph, &summand_nodes) {
            realization.push(target_value);
            let value_of = |node: NodeId| {
                if node == good_set.intervention {
                    Some(intervention_value)
                } else {
                    nodes.iter().position(|n| *n == node).map(|i| realization[i])
                }
            };
            let missing = |node: NodeId| BoundsError::NodeNotFound {
                node_id: graph.label(node).to_string(),
            };

            let mut weight = 1.0;
            let mut requirements = Vec::new();
            for (node, value) in nodes.iter().copied().zip(realization.iter().copied()) {
                match good_set.term(node) {
                    Some(Term::Empirical) => {
                        weight *= self.distribution.probability(&[(node, value)]);
                    }
                    Some(Term::Mechanism) => {
                        let slot = space
                            .slot_for(graph, node, value_of)
                            .ok_or_else(|| missing(node))?;
                        requirements.push((slot, value));
                    }
                    Some(Term::Conditional(condition)) => {
                        let condition = condition
                            .iter()
                            .map(|c| value_of(*c).map(|v| (*c, v)).ok_or_else(|| missing(*c)))
                            .collect::<Result<Vec<(NodeId, usize)>>>()?;
                        weight *= self.distribution.conditional(&[(node, value)], &condition);
                    }
                    None => return Err(missing(node)),
                }
                if weight == 0.0 {
                    break;
                }
            }
            if weight == 0.0 {
                continue;
            }
            if let Some(term) = IndicatorTerm::new(weight, requirements) {
                terms.push(term);
            }
        }

        debug!(
            summand_nodes = ?graph.labels(&summand_nodes),
            terms = terms.len(),
            "built objective"
        );
        Ok(Objective { summand_nodes, terms })
    }
}
