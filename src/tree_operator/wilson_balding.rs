//! Wilson-Balding subtree prune and regraft.

use rand::{Rng, RngCore};

use crate::operator::Operator;
use crate::state::{State, StateNodeId, TreeId};
use crate::tree_operator::random_non_root;

/// Prunes the parent of a random non-root node and regrafts it onto an
/// unrelated edge above the node's height, at a uniform new age.
///
/// The ratio is `log(new_range / |old_range|)`, the spans available for the
/// attachment age after and before the move. Moves that would change the
/// root are rejected, as are candidates with shared ancestry among the four
/// nodes involved. A range of exactly zero arises from zero-length branches
/// and rejects outright; the ratio has no usable value there.
#[derive(Debug, Clone)]
pub struct WilsonBaldingOperator {
    id: TreeId,
    weight: f64,
}

impl WilsonBaldingOperator {
    /// Wilson-Balding move over the given tree.
    pub fn new(id: TreeId) -> Self {
        Self { id, weight: 1.0 }
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for WilsonBaldingOperator {
    fn name(&self) -> &str {
        "WilsonBalding"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let tree = state.tree_mut(self.id);
        let node_count = tree.node_count();

        let i = random_non_root(tree, rng);
        let p = tree
            .parent(i)
            .unwrap_or_else(|| unreachable!("i is not the root"));

        // target edge (jp, j) must sit above the moved subtree; the root
        // always terminates the search and is rejected below
        let mut j = rng.random_range(0..node_count);
        while j == i || tree.parent(j).is_some_and(|jp| tree.height(jp) <= tree.height(i)) {
            j = rng.random_range(0..node_count);
        }

        if tree.is_root(j) || tree.is_root(p) {
            return f64::NEG_INFINITY;
        }
        let jp = tree
            .parent(j)
            .unwrap_or_else(|| unreachable!("j is not the root"));
        if jp == p || j == p || jp == i {
            return f64::NEG_INFINITY;
        }

        let cip = tree.other_child(p, i);
        let pip = tree
            .parent(p)
            .unwrap_or_else(|| unreachable!("p is not the root"));

        let new_min_age = tree.height(i).max(tree.height(j));
        let new_range = tree.height(jp) - new_min_age;
        let new_age = new_min_age + rng.random::<f64>() * new_range;
        let old_min_age = tree.height(i).max(tree.height(cip));
        let old_range = tree.height(pip) - old_min_age;

        if old_range == 0.0 || new_range == 0.0 {
            // zero-length branches make the attachment span degenerate
            return f64::NEG_INFINITY;
        }
        let q = new_range / old_range.abs();

        // detach p, then reattach it along (jp, j)
        tree.replace(pip, p, cip);
        tree.replace(p, cip, j);
        tree.replace(jp, j, p);
        tree.set_height(p, new_age);

        q.ln()
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
    fn repeated_moves_keep_the_tree_valid_and_rooted() {
        let mut state = State::new();
        let id = state.add_tree(four_taxon_tree());
        let mut op = WilsonBaldingOperator::new(id);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(83);
        let mut moved = 0;
        for _ in 0..1000 {
            state.tree_mut(id).store();
            let hr = op.propose(&mut state, &mut rng);
            if hr == f64::NEG_INFINITY {
                state.tree_mut(id).restore();
            } else {
                moved += 1;
                assert!(hr.is_finite());
            }
            state.tree(id).validate().unwrap();
            assert_eq!(state.tree(id).root(), 6);
        }
        assert!(moved > 0, "wilson-balding never moved");
    }

    #[test]
    fn zero_range_rejects() {
        // leaf B level with both internal nodes: every candidate move has a
        // degenerate attachment span (or would touch the root) and rejects
        let mut state = State::new();
        let tree = Tree::from_parents(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.0, 3.0, 0.0, 3.0, 3.0],
            vec![Some(3), Some(3), Some(4), Some(4), None],
        )
        .unwrap();
        let id = state.add_tree(tree);
        let mut op = WilsonBaldingOperator::new(id);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(89);
        for _ in 0..100 {
            assert_eq!(op.propose(&mut state, &mut rng), f64::NEG_INFINITY);
            state.tree(id).validate().unwrap();
        }
    }
}
