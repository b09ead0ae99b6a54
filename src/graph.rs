use crate::error::{BoundsError, Result};
use bimap::BiMap;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Type alias for node identifiers in the graph.
pub type NodeId = usize;

/// Default number of states of an observed node when no override is given.
pub const DEFAULT_OBSERVED_CARDINALITY: usize = 2;

/// A variable of the causal graph.
///
/// Latent nodes have cardinality 0 and no parents. Every observed node has
/// exactly one latent parent, recorded in `latent_parent`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Node {
    pub label: String,
    pub cardinality: usize,
    pub is_latent: bool,
    /// Parents in edge insertion order
    pub parents: Vec<NodeId>,
    /// Children in edge insertion order
    pub children: Vec<NodeId>,
    pub latent_parent: Option<NodeId>,
}

impl Node {
    /// Parents that are observed variables, in edge insertion order.
    pub fn observed_parents<'a>(&'a self, graph: &'a Graph) -> impl Iterator<Item = NodeId> + 'a {
        self.parents
            .iter()
            .copied()
            .filter(move |parent| !graph.node(*parent).is_latent)
    }
}

/// How d-separation is decided. Both methods must agree.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum DSeparationMethod {
    /// Connectivity in the moralized ancestral graph
    #[default]
    Moralization,
    /// Bayes-ball reachability on the DAG
    Reachability,
}

/// The observed nodes confounded by one latent node.
#[derive(Clone, PartialEq, Debug)]
pub struct CComponent {
    pub latent: NodeId,
    pub members: Vec<NodeId>,
}

/// Undirected graph produced by moralizing part of the DAG.
#[derive(Clone, Debug, Default)]
pub struct MoralGraph {
    adjacency: IndexMap<NodeId, IndexSet<NodeId>>,
}

impl MoralGraph {
    fn connect(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    fn remove(&mut self, node: NodeId) {
        if let Some(neighbours) = self.adjacency.shift_remove(&node) {
            for neighbour in neighbours {
                if let Some(adjacent) = self.adjacency.get_mut(&neighbour) {
                    adjacent.shift_remove(&node);
                }
            }
        }
    }

    /// Neighbours of a node, empty if the node is not part of the moral graph.
    pub fn neighbours(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|adjacent| adjacent.iter().copied())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    /// Returns true if any node of `from` reaches any node of `to`.
    pub fn connected(&self, from: &[NodeId], to: &[NodeId]) -> bool {
        let mut visited: IndexSet<NodeId> = IndexSet::new();
        let mut stack: Vec<NodeId> = from.to_vec();
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            if to.contains(&node) {
                return true;
            }
            stack.extend(self.neighbours(node).filter(|n| !visited.contains(n)));
        }
        false
    }
}

/// A causal DAG with latent confounders.
///
/// Traversals keep their visited state in local buffers, so a `Graph` can be
/// shared between concurrent queries.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    labels: BiMap<String, NodeId>,
    topological_order: Vec<NodeId>,
    topological_rank: Vec<usize>,
}

/// Splits an edge description such as `"Z -> X, X -> Y"` into label pairs.
pub fn parse_edges(edges: &str) -> Result<Vec<(String, String)>> {
    edges
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once("->") {
            Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
                Ok((left.trim().to_string(), right.trim().to_string()))
            }
            _ => Err(BoundsError::MalformedEdge {
                edge: part.to_string(),
            }),
        })
        .collect()
}

impl Graph {
    /// Builds a graph from directed edges.
    ///
    /// # Arguments
    /// * `edges` - `(parent, child)` label pairs
    /// * `latents` - labels of the unobserved nodes
    /// * `cardinalities` - optional per-label cardinality overrides. Latent nodes
    ///   default to 0, observed nodes to 2.
    ///
    /// # Returns
    /// The graph, or the first construction error found: an edge into a latent
    /// node, an undeclared latent, a bad cardinality, a cycle, or an observed
    /// node without exactly one latent parent.
    pub fn from_edges<E, L>(
        edges: impl IntoIterator<Item = (E, E)>,
        latents: impl IntoIterator<Item = L>,
        cardinalities: &HashMap<String, usize>,
    ) -> Result<Graph>
    where
        E: ToString,
        L: ToString,
    {
        let latent_labels: IndexSet<String> = latents.into_iter().map(|l| l.to_string()).collect();

        let mut labels: BiMap<String, NodeId> = BiMap::new();
        let mut names: Vec<String> = Vec::new();
        let mut intern = |label: String| match labels.get_by_left(&label) {
            Some(id) => *id,
            None => {
                let id = names.len();
                names.push(label.clone());
                labels.insert(label, id);
                id
            }
        };
        let mut edge_list: Vec<(NodeId, NodeId)> = Vec::new();
        for (parent, child) in edges {
            let parent_id = intern(parent.to_string());
            let child_id = intern(child.to_string());
            if !edge_list.contains(&(parent_id, child_id)) {
                edge_list.push((parent_id, child_id));
            }
        }

        for latent in latent_labels.iter() {
            if !labels.contains_left(latent) {
                return Err(BoundsError::UnknownLatent {
                    node_id: latent.clone(),
                });
            }
        }

        let mut nodes: Vec<Node> = names
            .into_iter()
            .map(|label| {
                let is_latent = latent_labels.contains(&label)
                    || cardinalities.get(&label).copied() == Some(0);
                let cardinality = match cardinalities.get(&label) {
                    Some(card) => *card,
                    None if is_latent => 0,
                    None => DEFAULT_OBSERVED_CARDINALITY,
                };
                Node {
                    label,
                    cardinality,
                    is_latent,
                    parents: Vec::new(),
                    children: Vec::new(),
                    latent_parent: None,
                }
            })
            .collect();

        for node in nodes.iter() {
            let valid = if node.is_latent {
                node.cardinality == 0
            } else {
                node.cardinality >= 2
            };
            if !valid {
                return Err(BoundsError::InvalidCardinality {
                    node_id: node.label.clone(),
                    cardinality: node.cardinality,
                });
            }
        }

        for (parent, child) in edge_list.iter().copied() {
            if nodes[child].is_latent {
                return Err(BoundsError::LatentWithIncomingEdge {
                    node_id: nodes[child].label.clone(),
                    parent_id: nodes[parent].label.clone(),
                });
            }
            nodes[parent].children.push(child);
            nodes[child].parents.push(parent);
        }

        let topological_order = Self::kahn_order(&nodes)?;
        let mut topological_rank = vec![0; nodes.len()];
        for (rank, id) in topological_order.iter().enumerate() {
            topological_rank[*id] = rank;
        }

        for id in 0..nodes.len() {
            if nodes[id].is_latent {
                continue;
            }
            let latent_parents: Vec<NodeId> = nodes[id]
                .parents
                .iter()
                .copied()
                .filter(|parent| nodes[*parent].is_latent)
                .collect();
            match latent_parents.as_slice() {
                [latent] => nodes[id].latent_parent = Some(*latent),
                [] => {
                    return Err(BoundsError::MissingLatentParent {
                        node_id: nodes[id].label.clone(),
                    })
                }
                _ => {
                    return Err(BoundsError::MultipleLatentParents {
                        node_id: nodes[id].label.clone(),
                        latent_parents: latent_parents
                            .iter()
                            .map(|p| nodes[*p].label.clone())
                            .collect(),
                    })
                }
            }
        }

        Ok(Graph {
            nodes,
            labels,
            topological_order,
            topological_rank,
        })
    }

    /// Convenience constructor taking the edge string format `"A -> B, B -> C"`.
    pub fn parse<L>(
        edges: &str,
        latents: impl IntoIterator<Item = L>,
        cardinalities: &HashMap<String, usize>,
    ) -> Result<Graph>
    where
        L: ToString,
    {
        Graph::from_edges(parse_edges(edges)?, latents, cardinalities)
    }

    // Kahn's algorithm; ties go to the node whose label appeared first.
    fn kahn_order(nodes: &[Node]) -> Result<Vec<NodeId>> {
        let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.parents.len()).collect();
        let mut queue: VecDeque<NodeId> =
            (0..nodes.len()).filter(|id| in_degree[*id] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for child in nodes[id].children.iter() {
                in_degree[*child] -= 1;
                if in_degree[*child] == 0 {
                    queue.push_back(*child);
                }
            }
        }
        // every node left with incoming edges sits on or behind a cycle
        if let Some(stuck) = (0..nodes.len()).find(|id| in_degree[*id] > 0) {
            return Err(BoundsError::CycleDetected {
                node_id: nodes[stuck].label.clone(),
            });
        }
        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate()
    }

    pub fn label(&self, id: NodeId) -> &str {
        &self.nodes[id].label
    }

    pub fn labels(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| self.nodes[*id].label.clone()).collect()
    }

    /// Looks a node up by label.
    pub fn node_id(&self, label: &str) -> Result<NodeId> {
        self.labels
            .get_by_left(label)
            .copied()
            .ok_or_else(|| BoundsError::NodeNotFound {
                node_id: label.to_string(),
            })
    }

    pub fn node_ids<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<NodeId>> {
        labels.iter().map(|l| self.node_id(l.as_ref())).collect()
    }

    pub fn latents(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).filter(|id| self.nodes[*id].is_latent).collect()
    }

    pub fn observed(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).filter(|id| !self.nodes[*id].is_latent).collect()
    }

    pub fn topological_order(&self) -> &[NodeId] {
        &self.topological_order
    }

    pub fn topological_rank(&self, node: NodeId) -> usize {
        self.topological_rank[node]
    }

    /// The node of `nodes` latest in topological order, i.e. closest to a leaf.
    pub fn closest_to_leaf(&self, nodes: &[NodeId]) -> Option<NodeId> {
        nodes.iter().copied().max_by_key(|n| self.topological_rank[*n])
    }

    /// Parents of `node` after removing the out-edges of `mutilated`.
    fn parents_in(
        &self,
        node: NodeId,
        mutilated: Option<NodeId>,
    ) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node]
            .parents
            .iter()
            .copied()
            .filter(move |parent| Some(*parent) != mutilated)
    }

    /// Children of `node` after removing the out-edges of `mutilated`.
    fn children_in(
        &self,
        node: NodeId,
        mutilated: Option<NodeId>,
    ) -> impl Iterator<Item = NodeId> + '_ {
        let cut = Some(node) == mutilated;
        self.nodes[node]
            .children
            .iter()
            .copied()
            .filter(move |_| !cut)
    }

    fn ancestor_mask(&self, start: &[NodeId], mutilated: Option<NodeId>) -> Vec<bool> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = start.to_vec();
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            stack.extend(self.parents_in(node, mutilated).filter(|p| !visited[*p]));
        }
        visited
    }

    /// All ancestors of `node`, the node itself included, in node id order.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        self.ancestor_mask(&[node], None)
            .into_iter()
            .enumerate()
            .filter_map(|(id, visited)| visited.then_some(id))
            .collect()
    }

    /// Returns true if `descendant` is reachable from `ancestor` along
    /// directed edges. A node counts as its own descendant.
    pub fn is_descendant(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![ancestor];
        while let Some(node) = stack.pop() {
            if node == descendant {
                return true;
            }
            if visited[node] {
                continue;
            }
            visited[node] = true;
            stack.extend(self.nodes[node].children.iter().copied().filter(|c| !visited[*c]));
        }
        false
    }

    /// Partitions the observed nodes into c-components, one per latent node.
    ///
    /// A component collects every observed node reachable from its latent
    /// through alternating child / latent-parent edges.
    pub fn c_components(&self) -> Vec<CComponent> {
        let mut visited = vec![false; self.nodes.len()];
        let mut components = Vec::new();
        for latent in self.latents() {
            if visited[latent] {
                continue;
            }
            let mut members = Vec::new();
            let mut stack = vec![latent];
            while let Some(node) = stack.pop() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                if self.nodes[node].is_latent {
                    stack.extend(self.nodes[node].children.iter().copied());
                } else {
                    members.push(node);
                    stack.extend(
                        self.nodes[node]
                            .parents
                            .iter()
                            .copied()
                            .filter(|p| self.nodes[*p].is_latent),
                    );
                }
            }
            members.sort_by_key(|m| self.topological_rank[*m]);
            components.push(CComponent { latent, members });
        }
        components
    }

    /// The c-component induced by one latent node.
    pub fn c_component_of(&self, latent: NodeId) -> Option<CComponent> {
        self.c_components().into_iter().find(|c| c.latent == latent)
    }

    /// Moralizes the subgraph induced by `considered`.
    ///
    /// Every node is linked to its considered parents and those parents are
    /// married. Nodes in `conditioned` are then removed together with their
    /// links. When `exclude_intervention_out_edges` is set, the edges leaving
    /// `intervention` are dropped before moralizing.
    pub fn build_moral_graph(
        &self,
        considered: &[NodeId],
        conditioned: &[NodeId],
        exclude_intervention_out_edges: bool,
        intervention: Option<NodeId>,
    ) -> MoralGraph {
        let mutilated = if exclude_intervention_out_edges {
            intervention
        } else {
            None
        };
        let mut moral = MoralGraph::default();
        for node in considered.iter().copied() {
            moral.adjacency.entry(node).or_default();
            let parents: Vec<NodeId> = self
                .parents_in(node, mutilated)
                .filter(|p| considered.contains(p))
                .collect();
            for parent in parents.iter() {
                moral.connect(*parent, node);
            }
            for (a, b) in parents.iter().tuple_combinations() {
                moral.connect(*a, *b);
            }
        }
        for node in conditioned {
            moral.remove(*node);
        }
        moral
    }

    /// Is `x` d-separated from `y` given `z`?
    ///
    /// `mutilated` names an intervened node whose out-edges are removed first.
    /// Members of `x` or `y` that are also in `z` are ignored; overlapping `x`
    /// and `y` are never separated.
    pub fn d_separated(
        &self,
        x: &[NodeId],
        y: &[NodeId],
        z: &[NodeId],
        mutilated: Option<NodeId>,
    ) -> bool {
        self.d_separated_by(DSeparationMethod::Moralization, x, y, z, mutilated)
    }

    pub fn d_separated_by(
        &self,
        method: DSeparationMethod,
        x: &[NodeId],
        y: &[NodeId],
        z: &[NodeId],
        mutilated: Option<NodeId>,
    ) -> bool {
        let x: Vec<NodeId> = x.iter().copied().filter(|n| !z.contains(n)).unique().collect();
        let y: Vec<NodeId> = y.iter().copied().filter(|n| !z.contains(n)).unique().collect();
        if x.is_empty() || y.is_empty() {
            return true;
        }
        if x.iter().any(|n| y.contains(n)) {
            return false;
        }
        match method {
            DSeparationMethod::Moralization => self.moral_d_separated(&x, &y, z, mutilated),
            DSeparationMethod::Reachability => self.reachability_d_separated(&x, &y, z, mutilated),
        }
    }

    fn moral_d_separated(
        &self,
        x: &[NodeId],
        y: &[NodeId],
        z: &[NodeId],
        mutilated: Option<NodeId>,
    ) -> bool {
        let start: Vec<NodeId> = x.iter().chain(y).chain(z).copied().collect();
        let considered: Vec<NodeId> = self
            .ancestor_mask(&start, mutilated)
            .into_iter()
            .enumerate()
            .filter_map(|(id, keep)| keep.then_some(id))
            .collect();
        let moral = self.build_moral_graph(&considered, z, mutilated.is_some(), mutilated);
        !moral.connected(x, y)
    }

    // Bayes-ball: walk (node, direction) pairs, where `up` means the ball
    // arrived from a child and `down` from a parent.
    fn reachability_d_separated(
        &self,
        x: &[NodeId],
        y: &[NodeId],
        z: &[NodeId],
        mutilated: Option<NodeId>,
    ) -> bool {
        let conditioned_ancestors = self.ancestor_mask(z, mutilated);
        let mut visited: IndexSet<(NodeId, bool)> = IndexSet::new();
        let mut stack: Vec<(NodeId, bool)> = x.iter().map(|n| (*n, true)).collect();
        while let Some((node, up)) = stack.pop() {
            if !visited.insert((node, up)) {
                continue;
            }
            let observed = z.contains(&node);
            if !observed && y.contains(&node) {
                return false;
            }
            if up && !observed {
                stack.extend(self.parents_in(node, mutilated).map(|p| (p, true)));
                stack.extend(self.children_in(node, mutilated).map(|c| (c, false)));
            } else if !up {
                if !observed {
                    stack.extend(self.children_in(node, mutilated).map(|c| (c, false)));
                }
                if conditioned_ancestors[node] {
                    stack.extend(self.parents_in(node, mutilated).map(|p| (p, true)));
                }
            }
        }
        true
    }

    /// Label-based d-separation, as exposed to callers of the model.
    ///
    /// Every node in `mutilated` loses its out-edges.
    pub fn d_separated_labels<S: AsRef<str>>(
        &self,
        method: DSeparationMethod,
        x: &[S],
        y: &[S],
        z: &[S],
        mutilated: &[S],
    ) -> Result<bool> {
        let (x, y, z) = (self.node_ids(x)?, self.node_ids(y)?, self.node_ids(z)?);
        let mutilated = self.node_ids(mutilated)?;
        match mutilated.as_slice() {
            [] => Ok(self.d_separated_by(method, &x, &y, &z, None)),
            [single] => Ok(self.d_separated_by(method, &x, &y, &z, Some(*single))),
            _ => Ok(self.mutilated_many(&mutilated).d_separated_by(method, &x, &y, &z, None)),
        }
    }

    // A copy of the graph with the out-edges of every node in `cut` removed.
    fn mutilated_many(&self, cut: &[NodeId]) -> Graph {
        let mut graph = self.clone();
        for node in cut.iter().copied() {
            let children = std::mem::take(&mut graph.nodes[node].children);
            for child in children {
                graph.nodes[child].parents.retain(|p| *p != node);
            }
        }
        graph
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.topological_order.iter() {
            let node = &self.nodes[*id];
            let kind = if node.is_latent { "latent" } else { "observed" };
            write!(f, "{} ({}, card {})", node.label, kind, node.cardinality)?;
            if !node.children.is_empty() {
                write!(
                    f,
                    " -> {}",
                    node.children.iter().map(|c| &self.nodes[*c].label).join(", ")
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
