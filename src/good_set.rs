use crate::error::{BoundsError, Result};
use crate::graph::{DSeparationMethod, Graph, NodeId};
use crate::mechanism::{domain_product, ParentKey};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Which valid conditioning set wins when several subsets d-separate.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorSelection {
    /// Keep the last valid subset in enumeration order
    #[default]
    LastValid,
    /// Stop at the first valid subset
    FirstValid,
}

/// How one visited node enters the objective.
#[derive(Clone, PartialEq, Debug)]
pub enum Term {
    /// Not a descendant of the intervention: its empirical marginal
    Empirical,
    /// Confounded with the intervention: a mechanism indicator
    Mechanism,
    /// A conditional probability given a d-separating set
    Conditional(Vec<NodeId>),
}

/// The decomposition of P(target | do(intervention)) into estimable terms.
#[derive(Clone, PartialEq, Debug)]
pub struct GoodSet {
    pub intervention: NodeId,
    pub intervention_latent: NodeId,
    pub target: NodeId,
    /// Nodes in the order they were popped from the worklist
    pub visited: Vec<NodeId>,
    pub empirical: Vec<NodeId>,
    pub mechanism: Vec<NodeId>,
    pub conditional: IndexMap<NodeId, Vec<NodeId>>,
}

impl GoodSet {
    pub fn term(&self, node: NodeId) -> Option<Term> {
        if self.mechanism.contains(&node) {
            Some(Term::Mechanism)
        } else if let Some(conditioning) = self.conditional.get(&node) {
            Some(Term::Conditional(conditioning.clone()))
        } else if self.empirical.contains(&node) {
            Some(Term::Empirical)
        } else {
            None
        }
    }

    /// Children of the intervention's latent that were visited, plus the
    /// intervention itself, in topological order.
    pub fn considered_c_component(&self, graph: &Graph) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = graph
            .node(self.intervention_latent)
            .children
            .iter()
            .copied()
            .filter(|child| self.visited.contains(child) || *child == self.intervention)
            .collect();
        if !nodes.contains(&self.intervention) {
            nodes.push(self.intervention);
        }
        nodes.sort_by_key(|n| graph.topological_rank(*n));
        nodes
    }

    /// Nodes summed over in the objective: visited nodes other than the
    /// intervention, its latent and the target.
    pub fn summand_nodes(&self) -> Vec<NodeId> {
        self.visited
            .iter()
            .copied()
            .filter(|n| {
                *n != self.intervention && *n != self.intervention_latent && *n != self.target
            })
            .collect()
    }

    /// Probability factors of the objective as `(label, conditioning labels)`;
    /// `None` marks a plain marginal.
    pub fn symbolic_objective(&self, graph: &Graph) -> Vec<(String, Option<Vec<String>>)> {
        let marginals = self
            .empirical
            .iter()
            .filter(|n| !graph.node(**n).is_latent)
            .map(|n| (graph.label(*n).to_string(), None));
        let conditionals = self
            .conditional
            .iter()
            .map(|(n, set)| (graph.label(*n).to_string(), Some(graph.labels(set))));
        marginals.chain(conditionals).collect()
    }

    /// One entry per mechanism variable and observed-parent realization.
    pub fn symbolic_decision_function(&self, graph: &Graph) -> Vec<(String, ParentKey)> {
        let mut entries = Vec::new();
        for node in self.mechanism.iter().copied() {
            let parents: Vec<NodeId> = graph.node(node).observed_parents(graph).collect();
            for values in domain_product(graph, &parents) {
                let key =
                    ParentKey::new(parents.iter().zip(values).map(|(p, v)| (graph.label(*p), v)));
                entries.push((graph.label(node).to_string(), key));
            }
        }
        entries
    }
}

/// Worklist search that classifies every node the query depends on.
pub struct GoodSetFinder<'a> {
    graph: &'a Graph,
    selection: SeparatorSelection,
    method: DSeparationMethod,
}

impl<'a> GoodSetFinder<'a> {
    pub fn new(graph: &'a Graph) -> GoodSetFinder<'a> {
        GoodSetFinder {
            graph,
            selection: SeparatorSelection::default(),
            method: DSeparationMethod::default(),
        }
    }

    pub fn with_selection(mut self, selection: SeparatorSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_d_separation(mut self, method: DSeparationMethod) -> Self {
        self.method = method;
        self
    }

    /// Runs the worklist from `target` until every dependency is classified.
    ///
    /// # Arguments
    /// * `intervention` - the observed node set by do(.)
    /// * `target` - the observed node whose probability is bounded
    ///
    /// # Returns
    /// The classification, or `SeparatorNotFound` when some node cannot be
    /// d-separated from the intervention's latent.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn find(&self, intervention: NodeId, target: NodeId) -> Result<GoodSet> {
        let graph = self.graph;
        for node in [intervention, target] {
            if graph.node(node).is_latent {
                return Err(BoundsError::NotObserved {
                    node_id: graph.label(node).to_string(),
                });
            }
        }
        let intervention_latent =
            graph
                .node(intervention)
                .latent_parent
                .ok_or_else(|| BoundsError::MissingLatentParent {
                    node_id: graph.label(intervention).to_string(),
                })?;

        let mut worklist: IndexSet<NodeId> = IndexSet::from([target]);
        let mut good_set = GoodSet {
            intervention,
            intervention_latent,
            target,
            visited: Vec::new(),
            empirical: Vec::new(),
            mechanism: Vec::new(),
            conditional: IndexMap::new(),
        };

        loop {
            let pending: Vec<NodeId> = worklist.iter().copied().collect();
            let Some(current) = graph.closest_to_leaf(&pending) else {
                break;
            };
            worklist.shift_remove(&current);
            good_set.visited.push(current);
            let label = graph.label(current);

            if !graph.is_descendant(intervention, current) {
                debug!(node = label, "case 1: not a descendant of the intervention");
                good_set.empirical.push(current);
            } else if graph.node(current).latent_parent == Some(intervention_latent) {
                debug!(node = label, "case 2: mechanism variable");
                good_set.mechanism.push(current);
                for parent in graph.node(current).observed_parents(graph) {
                    if parent != intervention {
                        worklist.insert(parent);
                    }
                }
            } else {
                debug!(node = label, "case 3: searching for a d-separator");
                let always_conditioned: Vec<NodeId> = worklist
                    .iter()
                    .copied()
                    .filter(|n| *n != current && *n != intervention_latent)
                    .collect();
                let separator = self.find_separator(current, &always_conditioned, intervention)?;
                for node in separator.iter().copied() {
                    if node != intervention && node != current {
                        worklist.insert(node);
                    }
                }
                good_set.conditional.insert(current, separator);
            }
        }
        Ok(good_set)
    }

    /// Exhaustive search for a conditioning set of `target`.
    ///
    /// Tries every subset of the conditionable ancestors of `target` (observed,
    /// not `target`, not already in `always_conditioned`), each joined with
    /// `always_conditioned`. Bit `i` of the subset counter selects ancestor
    /// `i`. A set is valid when it separates `target` from the intervention's
    /// latent in the full graph and from the intervention in the graph
    /// without the intervention's out-edges (trivially when it contains the
    /// intervention).
    pub fn find_separator(
        &self,
        target: NodeId,
        always_conditioned: &[NodeId],
        intervention: NodeId,
    ) -> Result<Vec<NodeId>> {
        let graph = self.graph;
        let latent = graph
            .node(intervention)
            .latent_parent
            .ok_or_else(|| BoundsError::MissingLatentParent {
                node_id: graph.label(intervention).to_string(),
            })?;
        let conditionable: Vec<NodeId> = graph
            .ancestors(target)
            .into_iter()
            .filter(|a| {
                graph.node(*a).cardinality > 0 && *a != target && !always_conditioned.contains(a)
            })
            .collect();
        if conditionable.len() >= u64::BITS as usize {
            return Err(BoundsError::UnsupportedQuery {
                reason: format!(
                    "{} has {} conditionable ancestors",
                    graph.label(target),
                    conditionable.len()
                ),
            });
        }

        let mut chosen: Option<Vec<NodeId>> = None;
        for mask in 0..(1u64 << conditionable.len()) {
            let candidate: Vec<NodeId> = always_conditioned
                .iter()
                .copied()
                .chain(
                    conditionable
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| (mask >> i) & 1 == 1)
                        .map(|(_, a)| *a),
                )
                .collect();

            let blocks_latent =
                graph.d_separated_by(self.method, &[target], &[latent], &candidate, None);
            let blocks_intervention = candidate.contains(&intervention)
                || graph.d_separated_by(
                    self.method,
                    &[target],
                    &[intervention],
                    &candidate,
                    Some(intervention),
                );
            if blocks_latent && blocks_intervention {
                chosen = Some(candidate);
                if self.selection == SeparatorSelection::FirstValid {
                    break;
                }
            }
        }

        match chosen {
            Some(separator) => {
                debug!(
                    node = graph.label(target),
                    separator = ?graph.labels(&separator),
                    "found d-separator"
                );
                Ok(separator)
            }
            None => {
                error!(node = graph.label(target), "could not find a separator set");
                Err(BoundsError::SeparatorNotFound {
                    target: graph.label(target).to_string(),
                    candidates: graph.labels(&conditionable),
                })
            }
        }
    }
}
