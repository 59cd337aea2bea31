//! Slide a parent node up or down its lineage, relinking as needed.

use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

use crate::error::ConfigError;
use crate::operator::{suggest_window, Operator, Tuner, TuningStats};
use crate::state::{State, StateNodeId, Tree, TreeId};
use crate::tree_operator::random_non_root;

/// Moves the parent of a random non-root node by a height delta, sliding
/// the attachment point along the tree.
///
/// Sliding up past an ancestor reattaches below the first ancestor above
/// the new height, possibly creating a new root; the ratio is
/// `-log(possible_sources)`, the number of edges the move could have come
/// from. Sliding down below the sibling subtree picks uniformly among the
/// edges crossing the new height; the ratio is `+log(possible_destinations)`.
/// A slide below the node's own height, or with no destination edge,
/// rejects.
#[derive(Debug, Clone)]
pub struct SubtreeSlideOperator {
    id: TreeId,
    size: f64,
    gaussian: bool,
    optimise: bool,
    size_limit: Option<f64>,
    weight: f64,
    tuner: Tuner,
}

impl SubtreeSlideOperator {
    /// Subtree slide with the given window size.
    pub fn new(id: TreeId, size: f64) -> Result<Self, ConfigError> {
        if size <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "size",
                value: size,
            });
        }
        Ok(Self {
            id,
            size,
            gaussian: true,
            optimise: true,
            size_limit: None,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Draw the delta from `Uniform(-size/2, size/2)` instead of
    /// `Normal(0, size)`.
    pub fn uniform_delta(mut self) -> Self {
        self.gaussian = false;
        self
    }

    /// Cap the tuned window size at `limit * tree_height / log2(leaves)`,
    /// evaluated against the configured tree's current shape.
    pub fn with_limit(mut self, state: &State, limit: f64) -> Result<Self, ConfigError> {
        if limit <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "limit",
                value: limit,
            });
        }
        let tree = state.tree(self.id);
        let height = tree.height(tree.root());
        let k = (tree.leaf_count() as f64).log2();
        self.size_limit = Some(limit * height / k);
        Ok(self)
    }

    /// Aim adaptation at `target` instead of the 0.234 default acceptance
    /// probability.
    pub fn with_target_acceptance(mut self, target: f64) -> Self {
        self.tuner = self.tuner.with_target(target);
        self
    }

    /// Leave the window size untouched for the first `delay` acceptance
    /// decisions.
    pub fn with_tuning_delay(mut self, delay: u64) -> Self {
        self.tuner = self.tuner.with_delay(delay);
        self
    }

    /// Disable auto-tuning of the window size.
    pub fn without_optimise(mut self) -> Self {
        self.optimise = false;
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    fn draw_delta(&self, rng: &mut dyn RngCore) -> f64 {
        if self.gaussian {
            let z: f64 = rng.sample(StandardNormal);
            z * self.size
        } else {
            rng.random::<f64>() * self.size - self.size / 2.0
        }
    }
}

/// Collect the edges under `node` that cross `height`: for each, the child
/// endpoint is pushed. `node` must have a parent.
fn intersecting_edges(tree: &Tree, node: usize, height: f64, out: &mut Vec<usize>) {
    let parent = tree
        .parent(node)
        .unwrap_or_else(|| unreachable!("edge search starts below an existing parent"));
    if tree.height(parent) < height {
        return;
    }
    if tree.height(node) < height {
        out.push(node);
        return;
    }
    if !tree.is_leaf(node) {
        let (l, r) = tree.children(node);
        intersecting_edges(tree, l, height, out);
        intersecting_edges(tree, r, height, out);
    }
}

impl Operator for SubtreeSlideOperator {
    fn name(&self) -> &str {
        "SubtreeSlide"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let tree = state.tree_mut(self.id);
        let i = random_non_root(tree, rng);
        let ip = tree
            .parent(i)
            .unwrap_or_else(|| unreachable!("i is not the root"));
        let cip = tree.other_child(ip, i);
        let pip = tree.parent(ip);

        let delta = self.draw_delta(rng);
        let old_height = tree.height(ip);
        let new_height = old_height + delta;

        if delta > 0.0 {
            // sliding up: topology changes only past ip's own parent
            match pip {
                Some(pip) if tree.height(pip) < new_height => {
                    // walk up to the first ancestor above the new height
                    let mut new_child = ip;
                    let mut new_parent = Some(pip);
                    while let Some(np) = new_parent {
                        if tree.height(np) >= new_height {
                            break;
                        }
                        new_child = np;
                        new_parent = tree.parent(np);
                    }
                    match new_parent {
                        None => {
                            // ip becomes the new root above the old one
                            tree.replace(ip, cip, new_child);
                            tree.replace(pip, ip, cip);
                            tree.set_root(ip);
                        }
                        Some(new_parent) => {
                            tree.replace(ip, cip, new_child);
                            tree.replace(pip, ip, cip);
                            tree.replace(new_parent, new_child, ip);
                        }
                    }
                    tree.set_height(ip, new_height);
                    let mut sources = Vec::new();
                    intersecting_edges(tree, new_child, old_height, &mut sources);
                    -(sources.len() as f64).ln()
                }
                _ => {
                    tree.set_height(ip, new_height);
                    0.0
                }
            }
        } else {
            if tree.height(i) > new_height {
                return f64::NEG_INFINITY;
            }
            // sliding down: topology changes only below the sibling
            if tree.height(cip) > new_height {
                let mut destinations = Vec::new();
                intersecting_edges(tree, cip, new_height, &mut destinations);
                if destinations.is_empty() {
                    return f64::NEG_INFINITY;
                }
                let new_child = destinations[rng.random_range(0..destinations.len())];
                let new_parent = tree
                    .parent(new_child)
                    .unwrap_or_else(|| unreachable!("destination edges have parents"));
                match pip {
                    None => {
                        // ip was the root; the sibling takes over
                        tree.replace(ip, cip, new_child);
                        tree.replace(new_parent, new_child, ip);
                        tree.set_root(cip);
                    }
                    Some(pip) => {
                        tree.replace(ip, cip, new_child);
                        tree.replace(pip, ip, cip);
                        tree.replace(new_parent, new_child, ip);
                    }
                }
                tree.set_height(ip, new_height);
                (destinations.len() as f64).ln()
            } else {
                tree.set_height(ip, new_height);
                0.0
            }
        }
    }

    fn optimize(&mut self, log_alpha: f64) {
        if self.optimise {
            let delta = self.tuner.calc_delta(log_alpha);
            let tuned = (delta + self.size.ln()).exp();
            match self.size_limit {
                Some(limit) if tuned > limit => {}
                _ => self.size = tuned,
            }
        }
    }

    fn coercable_value(&self) -> f64 {
        self.size
    }

    fn set_coercable_value(&mut self, value: f64) {
        self.size = value;
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        vec![self.id.id()]
    }

    fn accept(&mut self) {
        self.tuner.accept();
    }

    fn reject(&mut self) {
        self.tuner.reject();
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn performance_suggestion(&self) -> Option<String> {
        suggest_window(&self.tuner, self.size)
    }

    fn tuning_stats(&self) -> Option<TuningStats> {
        Some(self.tuner.stats(self.size))
    }

    fn set_tuning_stats(&mut self, stats: &TuningStats) {
        self.size = stats.parameter;
        self.tuner.restore(stats);
    }
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
    fn repeated_slides_keep_the_tree_valid() {
        let mut state = State::new();
        let id = state.add_tree(four_taxon_tree());
        let mut op = SubtreeSlideOperator::new(id, 1.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(73);
        let mut moved = 0;
        for _ in 0..1000 {
            state.tree_mut(id).store();
            let hr = op.propose(&mut state, &mut rng);
            if hr == f64::NEG_INFINITY {
                state.tree_mut(id).restore();
            } else {
                moved += 1;
            }
            state.tree(id).validate().unwrap();
        }
        assert!(moved > 0);
    }

    #[test]
    fn intersecting_edges_counts_crossings() {
        let tree = four_taxon_tree();
        let mut out = Vec::new();
        intersecting_edges(&tree, 5, 2.5, &mut out);
        assert_eq!(out, vec![5]);
        let mut out = Vec::new();
        intersecting_edges(&tree, 5, 0.5, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out.contains(&0) && out.contains(&1) && out.contains(&2));
    }

    #[test]
    fn height_only_slide_reports_zero() {
        let mut state = State::new();
        let id = state.add_tree(four_taxon_tree());
        // tiny window: the parent nearly always stays between its child and
        // its own parent, leaving topology alone
        let mut op = SubtreeSlideOperator::new(id, 1e-6).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(79);
        for _ in 0..50 {
            let hr = op.propose(&mut state, &mut rng);
            assert!(hr == 0.0 || hr == f64::NEG_INFINITY);
            state.tree(id).validate().unwrap();
        }
    }

    #[test]
    fn window_cap_blocks_runaway_growth() {
        let mut state = State::new();
        let id = state.add_tree(four_taxon_tree());
        let mut op = SubtreeSlideOperator::new(id, 1.0)
            .unwrap()
            .with_limit(&state, 1.0)
            .unwrap();
        // cap is 1.0 * 3.0 / log2(4) = 1.5
        for _ in 0..200 {
            op.accept();
            op.optimize(0.0);
        }
        assert!(op.coercable_value() <= 1.5 + 1e-9);
    }
}
