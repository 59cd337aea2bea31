//! Species-tree reheight constrained by gene trees.

use nalgebra::DMatrix;
use rand::{Rng, RngCore};

use crate::error::ConfigError;
use crate::operator::Operator;
use crate::state::{State, StateNodeId, Tree, TreeId};

/// Moves one internal height of a species tree and rebuilds its topology,
/// keeping it compatible with a set of constraining gene trees.
///
/// The move randomly flips left/right order at every internal node (a pure
/// relabeling), lays the nodes out in-order, resamples one internal height
/// uniformly below the tightest pairwise coalescence bound implied by the
/// gene trees, and then reconstructs the whole topology top-down by
/// repeatedly joining the highest unattached nodes on either side of each
/// internal height. The reported ratio is 0 under the uniform resample.
#[derive(Debug, Clone)]
pub struct NodeReheightOperator {
    species: TreeId,
    gene_trees: Vec<TreeId>,
    /// Per gene tree: leaf index to species leaf index.
    taxon_maps: Vec<Vec<usize>>,
    weight: f64,
}

impl NodeReheightOperator {
    /// Reheight operator for `species`, constrained by the given gene
    /// trees. Every gene tree leaf must carry the name of a species leaf.
    pub fn new(
        state: &State,
        species: TreeId,
        gene_trees: Vec<TreeId>,
    ) -> Result<Self, ConfigError> {
        if gene_trees.is_empty() {
            return Err(ConfigError::NoStateNodes);
        }
        let species_tree = state.tree(species);
        let mut taxon_maps = Vec::with_capacity(gene_trees.len());
        for &gt in &gene_trees {
            let gene_tree = state.tree(gt);
            let map = gene_tree
                .taxa_names()
                .iter()
                .map(|name| {
                    species_tree
                        .taxon_index(name)
                        .ok_or_else(|| ConfigError::UnknownTaxon(name.clone()))
                })
                .collect::<Result<Vec<usize>, _>>()?;
            taxon_maps.push(map);
        }
        Ok(Self {
            species,
            gene_trees,
            taxon_maps,
            weight: 1.0,
        })
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Tightest height the selected node may take without contradicting any
    /// gene tree: the minimum pairwise coalescence bound between the
    /// species left of the node in the in-order layout and those right of
    /// it.
    fn calc_max_height(&self, state: &State, order: &[usize], node_index: usize) -> f64 {
        let species_count = state.tree(self.species).leaf_count();
        let mut bounds = DMatrix::from_element(species_count, species_count, f64::INFINITY);
        for (&gt, map) in self.gene_trees.iter().zip(&self.taxon_maps) {
            let gene_tree = state.tree(gt);
            find_maxima(gene_tree, gene_tree.root(), map, &mut bounds);
        }

        let mut is_lower = vec![false; species_count];
        for &node in &order[..node_index] {
            if node < species_count {
                is_lower[node] = true;
            }
        }
        let mut cap = f64::INFINITY;
        for i in 0..species_count {
            if !is_lower[i] {
                continue;
            }
            for j in 0..species_count {
                if !is_lower[j] {
                    cap = cap.min(bounds[(i, j)]);
                }
            }
        }
        cap
    }
}

/// Fill `bounds` with, for each species pair, the lowest gene tree node
/// joining them. Returns the species present below `node`.
fn find_maxima(
    tree: &Tree,
    node: usize,
    taxon_map: &[usize],
    bounds: &mut DMatrix<f64>,
) -> Vec<bool> {
    let species_count = bounds.nrows();
    if tree.is_leaf(node) {
        let mut set = vec![false; species_count];
        set[taxon_map[node]] = true;
        return set;
    }
    let (l, r) = tree.children(node);
    let left = find_maxima(tree, l, taxon_map, bounds);
    let right = find_maxima(tree, r, taxon_map, bounds);
    let height = tree.height(node);
    for i in 0..species_count {
        if !left[i] {
            continue;
        }
        for j in 0..species_count {
            if j != i && right[j] {
                let bound = bounds[(i, j)].min(height);
                bounds[(i, j)] = bound;
                bounds[(j, i)] = bound;
            }
        }
    }
    left.iter().zip(&right).map(|(a, b)| a | b).collect()
}

/// Randomly flip left/right order below `node`.
fn reorder(tree: &mut Tree, node: usize, rng: &mut dyn RngCore) {
    if tree.is_leaf(node) {
        return;
    }
    if rng.random_bool(0.5) {
        tree.swap_children(node);
    }
    let (l, r) = tree.children(node);
    reorder(tree, l, rng);
    reorder(tree, r, rng);
}

/// In-order layout of node indices and their heights.
fn collect_heights(tree: &Tree, node: usize, heights: &mut Vec<f64>, order: &mut Vec<usize>) {
    if tree.is_leaf(node) {
        heights.push(tree.height(node));
        order.push(node);
        return;
    }
    let (l, r) = tree.children(node);
    collect_heights(tree, l, heights, order);
    heights.push(tree.height(node));
    order.push(node);
    collect_heights(tree, r, heights, order);
}

/// Rebuild the topology over `order[from..to]`: the highest internal height
/// in the range becomes the join of the highest unattached nodes on either
/// side of it, recursively.
fn reconstruct(
    tree: &mut Tree,
    heights: &mut [f64],
    order: &[usize],
    from: usize,
    to: usize,
    has_parent: &mut [bool],
) -> Option<usize> {
    let mut node_index = None;
    let mut max = f64::NEG_INFINITY;
    for j in from..to {
        if max < heights[j] && !tree.is_leaf(order[j]) {
            max = heights[j];
            node_index = Some(j);
        }
    }
    let node_index = node_index?;
    let node = order[node_index];

    let mut left = None;
    max = f64::NEG_INFINITY;
    for j in from..node_index {
        if max < heights[j] && !has_parent[j] {
            max = heights[j];
            left = Some(j);
        }
    }
    let mut right = None;
    max = f64::NEG_INFINITY;
    for j in node_index + 1..to {
        if max < heights[j] && !has_parent[j] {
            max = heights[j];
            right = Some(j);
        }
    }
    let (left, right) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => unreachable!("in-order layout flanks every internal node"),
    };

    tree.set_children(node, order[left], order[right]);
    if tree.is_leaf(order[left]) {
        heights[left] = f64::NEG_INFINITY;
    }
    if tree.is_leaf(order[right]) {
        heights[right] = f64::NEG_INFINITY;
    }
    has_parent[left] = true;
    has_parent[right] = true;
    heights[node_index] = f64::NEG_INFINITY;

    reconstruct(tree, heights, order, from, node_index, has_parent);
    reconstruct(tree, heights, order, node_index, to, has_parent);
    Some(node)
}

impl Operator for NodeReheightOperator {
    fn name(&self) -> &str {
        "NodeReheight"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let leaf_count = state.tree(self.species).leaf_count();

        let root = state.tree(self.species).root();
        reorder(state.tree_mut(self.species), root, rng);

        let (mut heights, order) = {
            let tree = state.tree(self.species);
            let mut heights = Vec::with_capacity(tree.node_count());
            let mut order = Vec::with_capacity(tree.node_count());
            collect_heights(tree, tree.root(), &mut heights, &mut order);
            (heights, order)
        };

        let mut node_index = rng.random_range(0..order.len());
        while order[node_index] < leaf_count {
            node_index = rng.random_range(0..order.len());
        }

        let cap = self.calc_max_height(state, &order, node_index);
        if !cap.is_finite() {
            tracing::debug!(
                node = order[node_index],
                "no gene tree constrains the selected split"
            );
            return f64::NEG_INFINITY;
        }
        let new_height = rng.random::<f64>() * cap;
        heights[node_index] = new_height;

        let tree = state.tree_mut(self.species);
        tree.set_height(order[node_index], new_height);
        let mut has_parent = vec![false; order.len()];
        let root = reconstruct(tree, &mut heights, &order, 0, order.len(), &mut has_parent)
            .unwrap_or_else(|| unreachable!("the layout contains at least one internal node"));
        tree.set_root(root);
        0.0
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        vec![self.species.id()]
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn three_taxon_tree(h1: f64, h2: f64) -> Tree {
        Tree::from_parents(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.0, 0.0, 0.0, h1, h2],
            vec![Some(3), Some(3), Some(4), Some(4), None],
        )
        .unwrap()
    }

    #[test]
    fn pairwise_bounds_take_the_lowest_join() {
        let mut state = State::new();
        let species = state.add_tree(three_taxon_tree(1.0, 2.0));
        let g1 = state.add_tree(three_taxon_tree(1.5, 2.5));
        let g2 = state.add_tree(three_taxon_tree(1.2, 3.0));
        let op = NodeReheightOperator::new(&state, species, vec![g1, g2]).unwrap();

        let species_count = 3;
        let mut bounds = DMatrix::from_element(species_count, species_count, f64::INFINITY);
        for (&gt, map) in op.gene_trees.iter().zip(&op.taxon_maps) {
            let t = state.tree(gt);
            find_maxima(t, t.root(), map, &mut bounds);
        }
        assert_eq!(bounds[(0, 1)], 1.2);
        assert_eq!(bounds[(0, 2)], 2.5);
        assert_eq!(bounds[(1, 2)], 2.5);
    }

    #[test]
    fn proposals_respect_gene_tree_caps_and_validity() {
        let mut state = State::new();
        let species = state.add_tree(three_taxon_tree(1.0, 2.0));
        let g1 = state.add_tree(three_taxon_tree(1.5, 2.5));
        let g2 = state.add_tree(three_taxon_tree(1.2, 3.0));
        let mut op = NodeReheightOperator::new(&state, species, vec![g1, g2]).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(103);
        for _ in 0..500 {
            assert_eq!(op.propose(&mut state, &mut rng), 0.0);
            let tree = state.tree(species);
            tree.validate().unwrap();
            for leaf in 0..3 {
                assert_eq!(tree.height(leaf), 0.0);
            }
            // no internal height may exceed the loosest pairwise bound
            for node in 3..5 {
                assert!(tree.height(node) <= 2.5 + 1e-12);
            }
        }
    }

    #[test]
    fn mismatched_taxa_are_a_config_error() {
        let mut state = State::new();
        let species = state.add_tree(three_taxon_tree(1.0, 2.0));
        let alien = state.add_tree(
            Tree::from_parents(
                vec!["A".into(), "B".into(), "Z".into()],
                vec![0.0, 0.0, 0.0, 1.0, 2.0],
                vec![Some(3), Some(3), Some(4), Some(4), None],
            )
            .unwrap(),
        );
        assert!(matches!(
            NodeReheightOperator::new(&state, species, vec![alien]),
            Err(ConfigError::UnknownTaxon(_))
        ));
    }
}
