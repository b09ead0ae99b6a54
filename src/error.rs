use std::fmt;

/// Result type alias for bound computations
pub type Result<T> = std::result::Result<T, BoundsError>;

/// Error types that can occur while building a causal model or bounding a query
#[derive(Debug, Clone, PartialEq)]
pub enum BoundsError {
    /// An edge points into a node declared latent
    LatentWithIncomingEdge {
        node_id: String,
        parent_id: String,
    },

    /// A latent label was declared but never appears in an edge
    UnknownLatent {
        node_id: String,
    },

    /// An observed node has no latent parent
    MissingLatentParent {
        node_id: String,
    },

    /// An observed node has more than one latent parent
    MultipleLatentParents {
        node_id: String,
        latent_parents: Vec<String>,
    },

    // Observed nodes need at least two states, latent nodes exactly zero
    InvalidCardinality {
        node_id: String,
        cardinality: usize,
    },

    /// A cycle was detected in the graph, which violates the acyclic property
    CycleDetected {
        node_id: String,
    },

    /// A referenced node was not found in the graph
    NodeNotFound {
        node_id: String,
    },

    // A value does not fit the node's cardinality
    ValueOutOfRange {
        node_id: String,
        value: usize,
        cardinality: usize,
    },

    // Interventions and targets must be observed nodes
    NotObserved {
        node_id: String,
    },

    /// The dataset lacks a column for an observed node
    MissingColumn {
        column: String,
    },

    // An edge description is not of the form `parent -> child`
    MalformedEdge {
        edge: String,
    },

    /// A dataset row could not be read
    MalformedRow {
        line: usize,
        reason: String,
    },

    /// The dataset carries no probability mass
    EmptyDataset,

    /// No subset of the conditionable ancestors d-separates the target
    SeparatorNotFound {
        target: String,
        candidates: Vec<String>,
    },

    // Column generation did not converge within the allowed iterations
    IterationLimitExceeded {
        max_iters: usize,
    },

    /// The query shape is not handled by the engine
    UnsupportedQuery {
        reason: String,
    },

    /// A configuration value is out of its valid range
    InvalidConfig {
        field: String,
        reason: String,
    },

    // Objective, matrix, right-hand side and bounds do not line up
    DimensionMismatch {
        expected: usize,
        got: usize,
        what: String,
    },

    /// An LP/MILP backend failed for a reason other than infeasibility
    Solver {
        reason: String,
    },
}

impl fmt::Display for BoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsError::LatentWithIncomingEdge { node_id, parent_id } => {
                write!(
                    f,
                    "Invalid latent node '{}': it has an incoming edge from '{}'",
                    node_id, parent_id
                )
            }
            BoundsError::UnknownLatent { node_id } => {
                write!(f, "Invalid latent node '{}': not present in the graph", node_id)
            }
            BoundsError::MissingLatentParent { node_id } => {
                write!(f, "Observed node '{}' has no latent parent", node_id)
            }
            BoundsError::MultipleLatentParents {
                node_id,
                latent_parents,
            } => {
                write!(
                    f,
                    "Observed node '{}' has more than one latent parent: {:?}",
                    node_id, latent_parents
                )
            }
            BoundsError::InvalidCardinality {
                node_id,
                cardinality,
            } => {
                write!(
                    f,
                    "Node '{}' has invalid cardinality {}",
                    node_id, cardinality
                )
            }
            BoundsError::CycleDetected { node_id } => {
                write!(f, "Cycle detected in graph at node '{}'", node_id)
            }
            BoundsError::NodeNotFound { node_id } => {
                write!(f, "Node '{}' not present in the graph", node_id)
            }
            BoundsError::ValueOutOfRange {
                node_id,
                value,
                cardinality,
            } => {
                write!(
                    f,
                    "Value {} out of range for node '{}' with cardinality {}",
                    value, node_id, cardinality
                )
            }
            BoundsError::NotObserved { node_id } => {
                write!(f, "Node '{}' is latent and cannot be queried", node_id)
            }
            BoundsError::MissingColumn { column } => {
                write!(f, "Dataset has no column '{}'", column)
            }
            BoundsError::MalformedEdge { edge } => {
                write!(f, "Malformed edge '{}': expected 'parent -> child'", edge)
            }
            BoundsError::MalformedRow { line, reason } => {
                write!(f, "Malformed dataset row {}: {}", line, reason)
            }
            BoundsError::EmptyDataset => write!(f, "Dataset has no rows"),
            BoundsError::SeparatorNotFound { target, candidates } => {
                write!(
                    f,
                    "Could not find a separator set for '{}' among {:?}",
                    target, candidates
                )
            }
            BoundsError::IterationLimitExceeded { max_iters } => {
                write!(f, "Too many column generation iterations (max: {})", max_iters)
            }
            BoundsError::UnsupportedQuery { reason } => {
                write!(f, "Unsupported query: {}", reason)
            }
            BoundsError::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for '{}': {}", field, reason)
            }
            BoundsError::DimensionMismatch {
                expected,
                got,
                what,
            } => {
                write!(
                    f,
                    "Dimension mismatch in {}: expected {}, got {}",
                    what, expected, got
                )
            }
            BoundsError::Solver { reason } => write!(f, "Solver failure: {}", reason),
        }
    }
}

impl std::error::Error for BoundsError {}
