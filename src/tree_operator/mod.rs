//! Moves that rewire tree topology or perturb node heights.
//!
//! Topology changes are composed entirely out of
//! [`Tree::replace`](crate::state::Tree::replace) calls, so the tree is
//! never observable half-relinked. Structural preconditions that fail for
//! the sampled candidates (a leaf where an internal node was needed, no
//! valid reattachment edge, a degenerate height range) reject the proposal
//! with `NEG_INFINITY`; they are expected outcomes, not errors.

mod exchange;
mod reheight;
mod subtree_slide;
mod tip_dates;
mod uniform;
mod wilson_balding;

pub use exchange::ExchangeOperator;
pub use reheight::NodeReheightOperator;
pub use subtree_slide::SubtreeSlideOperator;
pub use tip_dates::{TipDatesRandomWalker, TipDatesScaler};
pub use uniform::UniformNodeHeightOperator;
pub use wilson_balding::WilsonBaldingOperator;

use rand::{Rng, RngCore};

use crate::state::Tree;

/// Draw a uniform node index that is not the root.
pub(crate) fn random_non_root(tree: &Tree, rng: &mut dyn RngCore) -> usize {
    loop {
        let i = rng.random_range(0..tree.node_count());
        if !tree.is_root(i) {
            return i;
        }
    }
}

/// Swap the subtrees rooted at `i` and `j`, given their parents.
///
/// Precondition: `i` is a child of `ip`, `j` a child of `jp`, and the two
/// subtrees are unrelated (neither contains the other's parent).
pub(crate) fn exchange_nodes(tree: &mut Tree, i: usize, j: usize, ip: usize, jp: usize) {
    tree.replace(ip, i, j);
    tree.replace(jp, j, i);
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn random_non_root_never_yields_the_root() {
        let tree = four_taxon_tree();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for _ in 0..100 {
            assert_ne!(random_non_root(&tree, &mut rng), tree.root());
        }
    }

    #[test]
    fn exchange_nodes_swaps_unrelated_subtrees() {
        let mut tree = four_taxon_tree();
        // swap leaf A (child of 4) with leaf C (child of 5)
        exchange_nodes(&mut tree, 0, 2, 4, 5);
        tree.validate().unwrap();
        assert_eq!(tree.parent(0), Some(5));
        assert_eq!(tree.parent(2), Some(4));
    }
}
