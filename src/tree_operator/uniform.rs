//! Uniform resample of an internal node height.

use rand::{Rng, RngCore};

use crate::operator::Operator;
use crate::state::{State, StateNodeId, TreeId};

/// Resamples the height of a random internal non-root node uniformly
/// between the higher of its children and its parent.
///
/// Uniform to uniform over a fixed interval, so the ratio is 0. A tree
/// whose only internal node is the root has no candidate and rejects.
#[derive(Debug, Clone)]
pub struct UniformNodeHeightOperator {
    id: TreeId,
    weight: f64,
}

impl UniformNodeHeightOperator {
    /// Internal-height resampler over the given tree.
    pub fn new(id: TreeId) -> Self {
        Self { id, weight: 1.0 }
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for UniformNodeHeightOperator {
    fn name(&self) -> &str {
        "UniformNodeHeight"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let tree = state.tree_mut(self.id);
        if tree.internal_node_count() <= 1 {
            return f64::NEG_INFINITY;
        }
        let mut node = rng.random_range(tree.leaf_count()..tree.node_count());
        while tree.is_root(node) {
            node = rng.random_range(tree.leaf_count()..tree.node_count());
        }
        let parent = tree
            .parent(node)
            .unwrap_or_else(|| unreachable!("node is not the root"));
        let (l, r) = tree.children(node);
        let lower = tree.height(l).max(tree.height(r));
        let upper = tree.height(parent);
        let new_height = lower + rng.random::<f64>() * (upper - lower);
        tree.set_height(node, new_height);
        0.0
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        vec![self.id.id()]
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Tree;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn four_taxon_tree() -> Tree {
        Tree::from_parents(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0],
            vec![Some(4), Some(4), Some(5), Some(6), Some(5), Some(6), None],
        )
        .unwrap()
    }

    #[test]
    fn resampled_heights_stay_between_children_and_parent() {
        let mut state = State::new();
        let id = state.add_tree(four_taxon_tree());
        let mut op = UniformNodeHeightOperator::new(id);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(91);
        for _ in 0..500 {
            assert_eq!(op.propose(&mut state, &mut rng), 0.0);
            state.tree(id).validate().unwrap();
            assert_eq!(state.tree(id).height(6), 3.0);
        }
    }

    #[test]
    fn root_only_tree_rejects() {
        let mut state = State::new();
        let tree = Tree::from_parents(
            vec!["A".into(), "B".into()],
            vec![0.0, 0.0, 1.0],
            vec![Some(2), Some(2), None],
        )
        .unwrap();
        let id = state.add_tree(tree);
        let mut op = UniformNodeHeightOperator::new(id);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(93);
        assert_eq!(op.propose(&mut state, &mut rng), f64::NEG_INFINITY);
    }
}
