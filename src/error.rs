//! Error taxonomy for the operator layer.
//!
//! Only two failure classes surface as Rust errors. Invalid construction
//! parameters are [`ConfigError`]s, raised once at setup and never during
//! sampling. Broken tree invariants are [`TopologyError`]s, reported by
//! [`Tree::validate`](crate::state::Tree::validate); an operator that trips
//! one mid-relink has no restoration path and treats it as fatal.
//!
//! Everything else that can go wrong during a proposal (a value leaving its
//! bounds, a structurally impossible move, an unlucky candidate draw) is a
//! normal outcome: the proposal returns `f64::NEG_INFINITY` and the driver
//! rejects it. Those cases never produce an `Err`.

use thiserror::Error;

/// Invalid operator configuration, detected at construction time.
///
/// These are programming or model-setup mistakes. They are never raised
/// during sampling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Scale factors parameterize `scale = s + u * (1/s - s)` and must lie
    /// strictly between 0 and 1.
    #[error("scale factor must lie in (0, 1), got {0}")]
    ScaleFactorOutOfRange(f64),

    /// Window sizes and deltas must be positive.
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        /// Name of the offending tuning parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Integer-mode exchange needs an integer delta.
    #[error("integer-mode exchange requires an integer delta >= 1, got {0}")]
    NonIntegerDelta(f64),

    /// A dimension count argument is out of range for the parameter.
    #[error("{name} = {value} is out of range for a parameter of dimension {dim}")]
    DimensionOutOfRange {
        /// Name of the offending argument.
        name: &'static str,
        /// The rejected value.
        value: usize,
        /// Dimension of the target parameter.
        dim: usize,
    },

    /// A weight vector does not match the parameter it re-weights.
    #[error("weight vector has length {weights}, parameter has dimension {dim}")]
    WeightDimensionMismatch {
        /// Length of the supplied weight vector.
        weights: usize,
        /// Dimension of the target parameter.
        dim: usize,
    },

    /// A configured taxon is not a leaf of the tree.
    #[error("taxon {0:?} not found in tree")]
    UnknownTaxon(String),

    /// The operator was configured without anything to operate on.
    #[error("operator has no state nodes to operate on")]
    NoStateNodes,

    /// A state node has the wrong kind for this operator.
    #[error("state node {index} is a {actual}, expected {expected}")]
    WrongStateNodeKind {
        /// Arena index of the offending state node.
        index: usize,
        /// Kind found in the state arena.
        actual: &'static str,
        /// Kind the operator requires.
        expected: &'static str,
    },

    /// The operator requires finite bounds on its target parameter.
    #[error("parameter bounds [{lower}, {upper}] must be finite for this operator")]
    UnboundedParameter {
        /// Configured lower bound.
        lower: f64,
        /// Configured upper bound.
        upper: f64,
    },

    /// A parameter was constructed with no dimensions or inverted bounds.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// A structural invariant of the tree does not hold.
///
/// Operators assume a strictly bifurcating, singly-rooted tree with
/// non-decreasing heights from the leaves to the root. Moves that would
/// violate these invariants must be rejected before mutation; observing one
/// of these errors after a proposal means the tree is broken beyond repair.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// An internal node does not have exactly two children.
    #[error("node {0} is not strictly bifurcating")]
    NotBifurcating(usize),

    /// A node is reachable from the root through two different parents.
    #[error("node {0} is reachable more than once from the root")]
    DuplicateNode(usize),

    /// A node in the arena is not reachable from the root at all.
    #[error("node {0} is unreachable from the root")]
    UnreachableNode(usize),

    /// The root node has a dangling parent reference.
    #[error("root node {0} has a parent")]
    RootHasParent(usize),

    /// Nodes below the taxa count must be the leaves and everything above
    /// them internal; operators index both groups by position.
    #[error("node {0} breaks the leaves-first index layout")]
    LeafLayout(usize),

    /// A child's parent back-reference does not match its actual parent.
    #[error("node {child} has a stale parent reference (expected {parent})")]
    StaleParent {
        /// The child with the bad back-reference.
        child: usize,
        /// The node that actually owns the child.
        parent: usize,
    },

    /// An internal node sits below one of its children.
    #[error("node {node} at height {height} is below its child {child} at height {child_height}")]
    HeightOrder {
        /// The offending internal node.
        node: usize,
        /// Its height.
        height: f64,
        /// The child above it.
        child: usize,
        /// The child's height.
        child_height: f64,
    },
}
