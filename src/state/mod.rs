//! Mutable model state: an arena of parameter vectors and trees.
//!
//! Operators never own state. They are configured with typed handles into a
//! [`State`] arena and receive `&mut State` at proposal time. The driver
//! uses the untyped [`StateNodeId`]s from
//! [`Operator::state_nodes`](crate::operator::Operator::state_nodes) to
//! checkpoint exactly the nodes a proposal may touch and to roll them back
//! on rejection.

mod parameter;
mod tree;

pub use parameter::{BoolParameter, IntParameter, Parameter, RealParameter, ScaleViolation};
pub use tree::{Tree, IS_CLEAN, IS_DIRTY, IS_FILTHY};

/// Untyped handle to a state node, used for checkpoint declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateNodeId(usize);

impl StateNodeId {
    /// Position of the node in the state arena.
    pub fn index(self) -> usize {
        self.0
    }
}

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(StateNodeId);

        impl $name {
            /// The untyped id of this state node.
            pub fn id(self) -> StateNodeId {
                self.0
            }
        }
    };
}

typed_id!(
    /// Handle to a real-valued parameter.
    RealId
);
typed_id!(
    /// Handle to an integer-valued parameter.
    IntId
);
typed_id!(
    /// Handle to a boolean parameter.
    BoolId
);
typed_id!(
    /// Handle to a tree.
    TreeId
);

/// The union capability both parameters and trees satisfy: in-place
/// mutation plus external checkpoint/restore.
#[derive(Debug, Clone)]
pub enum StateNode {
    /// Real-valued parameter vector.
    Real(RealParameter),
    /// Integer-valued parameter vector.
    Int(IntParameter),
    /// Boolean parameter vector.
    Bool(BoolParameter),
    /// Rooted binary tree of divergence times.
    Tree(Tree),
}

impl StateNode {
    fn kind(&self) -> &'static str {
        match self {
            StateNode::Real(_) => "real parameter",
            StateNode::Int(_) => "integer parameter",
            StateNode::Bool(_) => "boolean parameter",
            StateNode::Tree(_) => "tree",
        }
    }

    /// Apply a bulk multiplicative scale, reporting how many entries
    /// actually changed.
    ///
    /// Integer and boolean parameters cannot be scaled; attempting to do so
    /// is a [`ScaleViolation`] and the enclosing proposal is rejected.
    pub fn scale(&mut self, factor: f64) -> Result<usize, ScaleViolation> {
        match self {
            StateNode::Real(p) => p.scale(factor),
            StateNode::Tree(t) => t.scale(factor),
            StateNode::Int(_) | StateNode::Bool(_) => Err(ScaleViolation),
        }
    }

    /// Checkpoint the node.
    pub fn store(&mut self) {
        match self {
            StateNode::Real(p) => p.store(),
            StateNode::Int(p) => p.store(),
            StateNode::Bool(p) => p.store(),
            StateNode::Tree(t) => t.store(),
        }
    }

    /// Roll back to the last checkpoint.
    pub fn restore(&mut self) {
        match self {
            StateNode::Real(p) => p.restore(),
            StateNode::Int(p) => p.restore(),
            StateNode::Bool(p) => p.restore(),
            StateNode::Tree(t) => t.restore(),
        }
    }

    /// Flag the node so downstream caches recompute from it.
    pub fn mark_dirty(&mut self) {
        match self {
            StateNode::Real(p) => p.mark_dirty(),
            StateNode::Int(p) => p.mark_dirty(),
            StateNode::Bool(p) => p.mark_dirty(),
            StateNode::Tree(t) => t.mark_all_dirty(IS_FILTHY),
        }
    }
}

/// Arena of state nodes, constructed once before sampling begins and
/// mutated in place for the lifetime of the chain.
#[derive(Debug, Default)]
pub struct State {
    nodes: Vec<StateNode>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a real parameter, returning its typed handle.
    pub fn add_real(&mut self, p: RealParameter) -> RealId {
        self.nodes.push(StateNode::Real(p));
        RealId(StateNodeId(self.nodes.len() - 1))
    }

    /// Add an integer parameter, returning its typed handle.
    pub fn add_int(&mut self, p: IntParameter) -> IntId {
        self.nodes.push(StateNode::Int(p));
        IntId(StateNodeId(self.nodes.len() - 1))
    }

    /// Add a boolean parameter, returning its typed handle.
    pub fn add_bool(&mut self, p: BoolParameter) -> BoolId {
        self.nodes.push(StateNode::Bool(p));
        BoolId(StateNodeId(self.nodes.len() - 1))
    }

    /// Add a tree, returning its typed handle.
    pub fn add_tree(&mut self, t: Tree) -> TreeId {
        self.nodes.push(StateNode::Tree(t));
        TreeId(StateNodeId(self.nodes.len() - 1))
    }

    /// Number of state nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The state node behind an untyped id.
    pub fn node(&self, id: StateNodeId) -> &StateNode {
        &self.nodes[id.0]
    }

    /// Mutable access to the state node behind an untyped id.
    pub fn node_mut(&mut self, id: StateNodeId) -> &mut StateNode {
        &mut self.nodes[id.0]
    }

    /// The real parameter behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if the handle was minted by a different state arena and the
    /// slot holds another kind. Typed handles from this arena cannot
    /// mismatch.
    pub fn real(&self, id: RealId) -> &RealParameter {
        match &self.nodes[id.0 .0] {
            StateNode::Real(p) => p,
            other => panic!("state node {} is a {}, expected real parameter", id.0 .0, other.kind()),
        }
    }

    /// Mutable access to the real parameter behind `id`.
    pub fn real_mut(&mut self, id: RealId) -> &mut RealParameter {
        match &mut self.nodes[id.0 .0] {
            StateNode::Real(p) => p,
            other => panic!("state node {} is a {}, expected real parameter", id.0 .0, other.kind()),
        }
    }

    /// The integer parameter behind `id`.
    pub fn int(&self, id: IntId) -> &IntParameter {
        match &self.nodes[id.0 .0] {
            StateNode::Int(p) => p,
            other => panic!("state node {} is a {}, expected integer parameter", id.0 .0, other.kind()),
        }
    }

    /// Mutable access to the integer parameter behind `id`.
    pub fn int_mut(&mut self, id: IntId) -> &mut IntParameter {
        match &mut self.nodes[id.0 .0] {
            StateNode::Int(p) => p,
            other => panic!("state node {} is a {}, expected integer parameter", id.0 .0, other.kind()),
        }
    }

    /// The boolean parameter behind `id`.
    pub fn bool(&self, id: BoolId) -> &BoolParameter {
        match &self.nodes[id.0 .0] {
            StateNode::Bool(p) => p,
            other => panic!("state node {} is a {}, expected boolean parameter", id.0 .0, other.kind()),
        }
    }

    /// Mutable access to the boolean parameter behind `id`.
    pub fn bool_mut(&mut self, id: BoolId) -> &mut BoolParameter {
        match &mut self.nodes[id.0 .0] {
            StateNode::Bool(p) => p,
            other => panic!("state node {} is a {}, expected boolean parameter", id.0 .0, other.kind()),
        }
    }

    /// The tree behind `id`.
    pub fn tree(&self, id: TreeId) -> &Tree {
        match &self.nodes[id.0 .0] {
            StateNode::Tree(t) => t,
            other => panic!("state node {} is a {}, expected tree", id.0 .0, other.kind()),
        }
    }

    /// Mutable access to the tree behind `id`.
    pub fn tree_mut(&mut self, id: TreeId) -> &mut Tree {
        match &mut self.nodes[id.0 .0] {
            StateNode::Tree(t) => t,
            other => panic!("state node {} is a {}, expected tree", id.0 .0, other.kind()),
        }
    }

    /// Checkpoint the named nodes. The driver calls this with an operator's
    /// declared node set before invoking its proposal.
    pub fn store_nodes(&mut self, ids: &[StateNodeId]) {
        for id in ids {
            self.nodes[id.0].store();
        }
    }

    /// Roll the named nodes back to their checkpoints. The driver calls
    /// this when a proposal is rejected.
    pub fn restore_nodes(&mut self, ids: &[StateNodeId]) {
        for id in ids {
            self.nodes[id.0].restore();
        }
    }

    /// Force downstream recomputation for the named nodes.
    ///
    /// Composite proposals call this between sub-proposals so that a later
    /// sub-operator observes the dirtiness of what an earlier one wrote.
    pub fn force_recalculation(&mut self, ids: &[StateNodeId]) {
        for id in ids {
            self.nodes[id.0].mark_dirty();
        }
    }

    /// Kind name of the node behind an untyped id, for diagnostics and
    /// construction-time validation.
    pub fn kind(&self, id: StateNodeId) -> &'static str {
        self.nodes[id.0].kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_handles_round_trip() {
        let mut state = State::new();
        let r = state.add_real(RealParameter::new(vec![1.0, 2.0], 0.0, 10.0).unwrap());
        let b = state.add_bool(BoolParameter::from_bits(vec![true, false]).unwrap());
        assert_eq!(state.real(r).dimension(), 2);
        assert_eq!(state.bool(b).sum(), 1);
        state.real_mut(r).set_value(0, 5.0);
        assert_eq!(state.real(r).value(0), 5.0);
    }

    #[test]
    fn store_restore_by_id() {
        let mut state = State::new();
        let r = state.add_real(RealParameter::new(vec![1.0], 0.0, 10.0).unwrap());
        let ids = [r.id()];
        state.store_nodes(&ids);
        state.real_mut(r).set_value(0, 9.0);
        state.restore_nodes(&ids);
        assert_eq!(state.real(r).value(0), 1.0);
    }

    #[test]
    fn scaling_an_integer_parameter_is_a_violation() {
        let mut state = State::new();
        let i = state.add_int(IntParameter::new(vec![1], 0, 10).unwrap());
        assert!(state.node_mut(i.id()).scale(2.0).is_err());
    }
}
