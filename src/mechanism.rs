use crate::graph::{Graph, NodeId};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;

/// Canonical key of an observed-parent realization.
///
/// Entries are ordered by their `label=value` rendering compared as strings,
/// so the key prints identically to the comma-joined form, e.g. `X=1,Z=0`.
#[derive(Serialize, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct ParentKey(Vec<(String, usize)>);

impl ParentKey {
    pub fn new<S>(pairs: impl IntoIterator<Item = (S, usize)>) -> ParentKey
    where
        S: ToString,
    {
        let mut pairs: Vec<(String, usize)> = pairs
            .into_iter()
            .map(|(label, value)| (label.to_string(), value))
            .collect();
        pairs.sort_by_cached_key(|(label, value)| format!("{}={}", label, value));
        ParentKey(pairs)
    }

    pub fn pairs(&self) -> &[(String, usize)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .iter()
                .map(|(label, value)| format!("{}={}", label, value))
                .join(",")
        )
    }
}

/// One entry of a response function: the value `node` takes when its observed
/// parents are at `parent_values`.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Slot {
    pub node: NodeId,
    pub key: ParentKey,
    pub parent_values: Vec<(NodeId, usize)>,
    pub cardinality: usize,
}

/// A deterministic response function for every endogenous node of a
/// c-component. `values[i]` is the response for slot `i` of the owning space.
#[derive(Serialize, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Mechanism {
    pub values: Vec<usize>,
}

/// A weighted conjunction over mechanism slots: a mechanism earns `weight`
/// when it responds with `value` at every required `slot`.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct IndicatorTerm {
    pub weight: f64,
    /// `(slot, value)` pairs, sorted by slot
    pub requirements: Vec<(usize, usize)>,
}

impl IndicatorTerm {
    /// Returns None when two requirements ask different values of one slot.
    pub fn new(
        weight: f64,
        requirements: impl IntoIterator<Item = (usize, usize)>,
    ) -> Option<IndicatorTerm> {
        let mut requirements: Vec<(usize, usize)> = requirements.into_iter().collect();
        requirements.sort_unstable();
        requirements.dedup();
        if requirements.windows(2).any(|w| w[0].0 == w[1].0) {
            return None;
        }
        Some(IndicatorTerm { weight, requirements })
    }

    pub fn holds(&self, mechanism: &Mechanism) -> bool {
        self.requirements
            .iter()
            .all(|(slot, value)| mechanism.values[*slot] == *value)
    }
}

/// Sum of the weights of the terms `mechanism` satisfies.
pub fn coefficient(terms: &[IndicatorTerm], mechanism: &Mechanism) -> f64 {
    terms
        .iter()
        .filter(|term| term.holds(mechanism))
        .map(|term| term.weight)
        .sum()
}

/// The response-function slots of a set of nodes sharing one latent parent.
#[derive(Clone, Debug)]
pub struct MechanismSpace {
    latent: NodeId,
    nodes: Vec<NodeId>,
    slots: Vec<Slot>,
    index: IndexMap<(NodeId, ParentKey), usize>,
}

impl MechanismSpace {
    /// Collects the slots of `endogenous`, node by node and, within a node,
    /// over the Cartesian product of its observed parents' domains.
    pub fn new(graph: &Graph, latent: NodeId, endogenous: &[NodeId]) -> MechanismSpace {
        let mut slots = Vec::new();
        let mut index = IndexMap::new();
        for node in endogenous.iter().copied() {
            let parents: Vec<NodeId> = graph.node(node).observed_parents(graph).collect();
            for parent_values in domain_product(graph, &parents) {
                let parent_values: Vec<(NodeId, usize)> =
                    parents.iter().copied().zip(parent_values).collect();
                let key = ParentKey::new(parent_values.iter().map(|(p, v)| (graph.label(*p), *v)));
                index.insert((node, key.clone()), slots.len());
                slots.push(Slot {
                    node,
                    key,
                    parent_values,
                    cardinality: graph.node(node).cardinality,
                });
            }
        }
        MechanismSpace {
            latent,
            nodes: endogenous.to_vec(),
            slots,
            index,
        }
    }

    pub fn latent(&self) -> NodeId {
        self.latent
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, node: NodeId, key: &ParentKey) -> Option<usize> {
        self.index.get(&(node, key.clone())).copied()
    }

    /// The slot of `node` selected by an assignment of (at least) its observed
    /// parents.
    pub fn slot_for(
        &self,
        graph: &Graph,
        node: NodeId,
        value_of: impl Fn(NodeId) -> Option<usize>,
    ) -> Option<usize> {
        let pairs = graph
            .node(node)
            .observed_parents(graph)
            .map(|parent| value_of(parent).map(|value| (graph.label(parent), value)))
            .collect::<Option<Vec<(&str, usize)>>>()?;
        self.slot(node, &ParentKey::new(pairs))
    }

    /// Number of mechanisms: Π over nodes of card^(Π observed-parent cards).
    pub fn count(&self) -> u128 {
        self.slots
            .iter()
            .fold(1u128, |acc, slot| acc.saturating_mul(slot.cardinality as u128))
    }

    /// Every mechanism, with the last slot varying fastest.
    pub fn enumerate(&self) -> Vec<Mechanism> {
        if self.slots.is_empty() {
            return vec![Mechanism { values: Vec::new() }];
        }
        self.slots
            .iter()
            .map(|slot| 0..slot.cardinality)
            .multi_cartesian_product()
            .map(|values| Mechanism { values })
            .collect()
    }

    /// Readable response table of one mechanism: `(node label, key, value)`.
    pub fn response_table(
        &self,
        graph: &Graph,
        mechanism: &Mechanism,
    ) -> Vec<(String, ParentKey, usize)> {
        self.slots
            .iter()
            .zip(mechanism.values.iter())
            .map(|(slot, value)| (graph.label(slot.node).to_string(), slot.key.clone(), *value))
            .collect()
    }
}

/// All joint values of `nodes`, as a Cartesian product over their cardinalities.
/// An empty node list has exactly one (empty) realization.
pub fn domain_product(graph: &Graph, nodes: &[NodeId]) -> Vec<Vec<usize>> {
    if nodes.is_empty() {
        return vec![Vec::new()];
    }
    nodes
        .iter()
        .map(|node| 0..graph.node(*node).cardinality)
        .multi_cartesian_product()
        .collect()
}

/// Number of (child, observed-parent realization) pairs under `latent`,
/// i.e. the width of one mechanism in the pricing encoding.
pub fn latent_bit_length(graph: &Graph, latent: NodeId) -> usize {
    graph
        .node(latent)
        .children
        .iter()
        .map(|child| {
            graph
                .node(*child)
                .observed_parents(graph)
                .map(|parent| graph.node(parent).cardinality)
                .product::<usize>()
        })
        .sum()
}
