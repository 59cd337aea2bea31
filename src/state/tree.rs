//! Rooted binary tree of divergence times, stored in a flat arena.
//!
//! Nodes live in a `Vec` and refer to each other by index: leaves occupy
//! indices `0..leaf_count`, internal nodes `leaf_count..node_count`. Parent
//! and child fields are `Option<usize>`, so relinking a subtree is pure
//! index reassignment with no aliasing hazards.
//!
//! [`Tree::replace`] is the sole mutation boundary for topology changes: it
//! atomically detaches one child and attaches another, updating the parent
//! back-reference and dirty flags together. Operators compose whole moves
//! out of `replace` calls; the tree must never be observable half-relinked
//! between them.

use crate::error::{ConfigError, TopologyError};
use crate::state::parameter::ScaleViolation;

/// Node is untouched since the last restore.
pub const IS_CLEAN: u8 = 0;
/// Node height changed; partial recomputation suffices.
pub const IS_DIRTY: u8 = 1;
/// Node topology changed; everything above it must be recomputed.
pub const IS_FILTHY: u8 = 2;

/// One timed node. Leaves have no children; internal nodes have exactly two.
#[derive(Debug, Clone)]
struct Node {
    height: f64,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    dirty: u8,
}

/// An indexed collection of nodes plus a root pointer.
///
/// The structural invariants operators rely on: one root with no parent,
/// every internal node strictly bifurcating, every node reachable from the
/// root exactly once, and no internal node below either of its children.
/// [`Tree::validate`] checks all of them.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: usize,
    taxa: Vec<String>,
    stored_nodes: Vec<Node>,
    stored_root: usize,
}

impl Tree {
    /// Build a tree from per-node heights and parent links.
    ///
    /// Nodes `0..taxa.len()` are the leaves, in taxa order; the remaining
    /// entries are internal nodes. `parents[i]` is `None` exactly for the
    /// root. Children are assigned left-then-right in encounter order. The
    /// resulting tree is validated before being returned.
    pub fn from_parents(
        taxa: Vec<String>,
        heights: Vec<f64>,
        parents: Vec<Option<usize>>,
    ) -> Result<Self, ConfigError> {
        let n = heights.len();
        if taxa.is_empty() || n != parents.len() || n < taxa.len() {
            return Err(ConfigError::InvalidParameter(
                "taxa, heights and parents have inconsistent lengths".into(),
            ));
        }
        let mut nodes: Vec<Node> = heights
            .iter()
            .map(|&h| Node {
                height: h,
                parent: None,
                left: None,
                right: None,
                dirty: IS_CLEAN,
            })
            .collect();
        let mut root = None;
        for (i, &p) in parents.iter().enumerate() {
            match p {
                Some(p) => {
                    if p >= n {
                        return Err(ConfigError::InvalidParameter(format!(
                            "parent index {p} out of range"
                        )));
                    }
                    nodes[i].parent = Some(p);
                    if nodes[p].left.is_none() {
                        nodes[p].left = Some(i);
                    } else if nodes[p].right.is_none() {
                        nodes[p].right = Some(i);
                    } else {
                        return Err(ConfigError::InvalidParameter(format!(
                            "node {p} has more than two children"
                        )));
                    }
                }
                None => {
                    if root.replace(i).is_some() {
                        return Err(ConfigError::InvalidParameter(
                            "more than one root".into(),
                        ));
                    }
                }
            }
        }
        let root = root
            .ok_or_else(|| ConfigError::InvalidParameter("no root node".into()))?;
        let tree = Self {
            stored_nodes: nodes.clone(),
            nodes,
            root,
            taxa,
            stored_root: root,
        };
        tree.validate()
            .map_err(|e| ConfigError::InvalidParameter(e.to_string()))?;
        Ok(tree)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.taxa.len()
    }

    /// Number of internal nodes.
    pub fn internal_node_count(&self) -> usize {
        self.nodes.len() - self.taxa.len()
    }

    /// Index of the root node.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Whether `i` is the current root.
    pub fn is_root(&self, i: usize) -> bool {
        i == self.root
    }

    /// Whether `i` is a leaf.
    pub fn is_leaf(&self, i: usize) -> bool {
        self.nodes[i].left.is_none()
    }

    /// Height of node `i`.
    pub fn height(&self, i: usize) -> f64 {
        self.nodes[i].height
    }

    /// Set the height of node `i`, marking it dirty.
    pub fn set_height(&mut self, i: usize, height: f64) {
        self.nodes[i].height = height;
        self.nodes[i].dirty |= IS_DIRTY;
    }

    /// Parent of node `i`, `None` for the root.
    pub fn parent(&self, i: usize) -> Option<usize> {
        self.nodes[i].parent
    }

    /// Left child of node `i`.
    pub fn left(&self, i: usize) -> Option<usize> {
        self.nodes[i].left
    }

    /// Right child of node `i`.
    pub fn right(&self, i: usize) -> Option<usize> {
        self.nodes[i].right
    }

    /// Both children of internal node `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` does not have exactly two children. Operators assume a
    /// strictly bifurcating tree and must fail loudly when it is not.
    pub fn children(&self, i: usize) -> (usize, usize) {
        match (self.nodes[i].left, self.nodes[i].right) {
            (Some(l), Some(r)) => (l, r),
            _ => panic!("node {i} is not strictly bifurcating"),
        }
    }

    /// The sibling of `child` under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not have exactly two children, or if `child`
    /// is not one of them. Both indicate a broken invariant, not a
    /// recoverable proposal failure.
    pub fn other_child(&self, parent: usize, child: usize) -> usize {
        let (l, r) = self.children(parent);
        if l == child {
            r
        } else if r == child {
            l
        } else {
            panic!("node {child} is not a child of node {parent}");
        }
    }

    /// Atomically detach `old_child` from `parent` and attach `replacement`
    /// in its place.
    ///
    /// Updates the replacement's parent back-reference and marks both
    /// `parent` and `replacement` filthy. This is the only way operators
    /// rewire topology; a proposal is a sequence of `replace` calls plus
    /// height updates.
    ///
    /// # Panics
    ///
    /// Panics if `old_child` is not a child of `parent`.
    pub fn replace(&mut self, parent: usize, old_child: usize, replacement: usize) {
        if self.nodes[parent].left == Some(old_child) {
            self.nodes[parent].left = Some(replacement);
        } else if self.nodes[parent].right == Some(old_child) {
            self.nodes[parent].right = Some(replacement);
        } else {
            panic!("node {old_child} is not a child of node {parent}");
        }
        self.nodes[parent].dirty |= IS_FILTHY;
        self.nodes[replacement].parent = Some(parent);
        self.nodes[replacement].dirty |= IS_FILTHY;
    }

    /// Make node `i` the root, clearing its parent reference.
    pub fn set_root(&mut self, i: usize) {
        self.nodes[i].parent = None;
        self.nodes[i].dirty |= IS_FILTHY;
        self.root = i;
    }

    /// Swap the left and right children of internal node `i`.
    ///
    /// A pure relabeling; the set of clades is unchanged.
    pub(crate) fn swap_children(&mut self, i: usize) {
        let node = &mut self.nodes[i];
        std::mem::swap(&mut node.left, &mut node.right);
    }

    /// Overwrite both children of internal node `i`, fixing up the
    /// children's parent back-references. Used by moves that rebuild whole
    /// topologies rather than editing them edge by edge.
    pub(crate) fn set_children(&mut self, i: usize, left: usize, right: usize) {
        self.nodes[i].left = Some(left);
        self.nodes[i].right = Some(right);
        self.nodes[i].dirty |= IS_FILTHY;
        self.nodes[left].parent = Some(i);
        self.nodes[right].parent = Some(i);
    }

    /// Scale every internal node height by `factor`.
    ///
    /// Returns the number of internal nodes whose height changed. Fails
    /// with [`ScaleViolation`] if any internal node would end up below one
    /// of its children (a negative branch length), in which case no heights
    /// are modified.
    pub fn scale(&mut self, factor: f64) -> Result<usize, ScaleViolation> {
        let leaf_count = self.leaf_count();
        for i in leaf_count..self.nodes.len() {
            let (l, r) = self.children(i);
            let scaled = self.nodes[i].height * factor;
            let l_height = if self.is_leaf(l) {
                self.nodes[l].height
            } else {
                self.nodes[l].height * factor
            };
            let r_height = if self.is_leaf(r) {
                self.nodes[r].height
            } else {
                self.nodes[r].height * factor
            };
            if scaled < l_height || scaled < r_height {
                return Err(ScaleViolation);
            }
        }
        let mut changed = 0;
        for i in leaf_count..self.nodes.len() {
            let scaled = self.nodes[i].height * factor;
            if scaled != self.nodes[i].height {
                changed += 1;
            }
            self.nodes[i].height = scaled;
            self.nodes[i].dirty |= IS_DIRTY;
        }
        Ok(changed)
    }

    /// Leaf taxa names, in node-index order.
    pub fn taxa_names(&self) -> &[String] {
        &self.taxa
    }

    /// Node index of the leaf with the given taxon name.
    pub fn taxon_index(&self, name: &str) -> Option<usize> {
        self.taxa.iter().position(|t| t == name)
    }

    /// Mark node `i` with a dirty flag (`IS_DIRTY` or `IS_FILTHY`).
    pub fn mark_dirty(&mut self, i: usize, flag: u8) {
        self.nodes[i].dirty |= flag;
    }

    /// Mark every node with a dirty flag.
    pub fn mark_all_dirty(&mut self, flag: u8) {
        for node in &mut self.nodes {
            node.dirty |= flag;
        }
    }

    /// Current dirty flag of node `i`.
    pub fn dirty(&self, i: usize) -> u8 {
        self.nodes[i].dirty
    }

    /// Checkpoint heights, topology and root.
    pub fn store(&mut self) {
        self.stored_nodes.clone_from(&self.nodes);
        self.stored_root = self.root;
    }

    /// Roll back heights, topology and root to the last checkpoint, and
    /// clear all dirty flags.
    pub fn restore(&mut self) {
        self.nodes.clone_from(&self.stored_nodes);
        self.root = self.stored_root;
        for node in &mut self.nodes {
            node.dirty = IS_CLEAN;
        }
    }

    /// Check every structural invariant: a parentless root, the
    /// leaves-first index layout, strict bifurcation, consistent parent
    /// back-references, each node reachable from the root exactly once, and
    /// heights non-decreasing from child to parent.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.nodes[self.root].parent.is_some() {
            return Err(TopologyError::RootHasParent(self.root));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            let leaf = node.left.is_none() && node.right.is_none();
            if leaf != (i < self.taxa.len()) {
                return Err(TopologyError::LeafLayout(i));
            }
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(i) = stack.pop() {
            if seen[i] {
                return Err(TopologyError::DuplicateNode(i));
            }
            seen[i] = true;
            match (self.nodes[i].left, self.nodes[i].right) {
                (None, None) => {}
                (Some(l), Some(r)) => {
                    for child in [l, r] {
                        if self.nodes[child].parent != Some(i) {
                            return Err(TopologyError::StaleParent { child, parent: i });
                        }
                        if self.nodes[i].height < self.nodes[child].height {
                            return Err(TopologyError::HeightOrder {
                                node: i,
                                height: self.nodes[i].height,
                                child,
                                child_height: self.nodes[child].height,
                            });
                        }
                        stack.push(child);
                    }
                }
                _ => return Err(TopologyError::NotBifurcating(i)),
            }
        }
        if let Some(i) = seen.iter().position(|&s| !s) {
            return Err(TopologyError::UnreachableNode(i));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four-taxon caterpillar: ((A,B),C),D with internal heights 1, 2, 3.
    pub(crate) fn four_taxon_tree() -> Tree {
        Tree::from_parents(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0],
            vec![
                Some(4),
                Some(4),
                Some(5),
                Some(6),
                Some(5),
                Some(6),
                None,
            ],
        )
        .unwrap()
    }

    #[test]
    fn construction_and_accessors() {
        let tree = four_taxon_tree();
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.leaf_count(), 4);
        assert_eq!(tree.internal_node_count(), 3);
        assert_eq!(tree.root(), 6);
        assert_eq!(tree.parent(0), Some(4));
        assert_eq!(tree.other_child(4, 0), 1);
        assert_eq!(tree.taxon_index("C"), Some(2));
        tree.validate().unwrap();
    }

    #[test]
    fn replace_rewires_and_marks_filthy() {
        let mut tree = four_taxon_tree();
        // swap subtree 0 (leaf A) with subtree 2 (leaf C)
        tree.replace(4, 0, 2);
        tree.replace(5, 2, 0);
        tree.validate().unwrap();
        assert_eq!(tree.parent(2), Some(4));
        assert_eq!(tree.parent(0), Some(5));
        assert_eq!(tree.dirty(4) & IS_FILTHY, IS_FILTHY);
        assert_eq!(tree.dirty(2) & IS_FILTHY, IS_FILTHY);
    }

    #[test]
    fn leaf_index_with_children_is_rejected() {
        // node 0 sits in the leaf range but parents the other two nodes
        let result = Tree::from_parents(
            vec!["A".into(), "B".into()],
            vec![1.0, 0.0, 0.0],
            vec![None, Some(0), Some(0)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn scale_counts_internal_nodes() {
        let mut tree = four_taxon_tree();
        let changed = tree.scale(2.0).unwrap();
        assert_eq!(changed, 3);
        assert_eq!(tree.height(6), 6.0);
        tree.validate().unwrap();
    }

    #[test]
    fn scale_rejecting_negative_branches() {
        let mut tree = Tree::from_parents(
            vec!["A".into(), "B".into()],
            vec![0.0, 5.0, 6.0],
            vec![Some(2), Some(2), None],
        )
        .unwrap();
        // scaling by 0.5 puts the root (3.0) below leaf B (5.0)
        assert_eq!(tree.scale(0.5), Err(ScaleViolation));
        assert_eq!(tree.height(2), 6.0);
    }

    #[test]
    fn store_restore_round_trip() {
        let mut tree = four_taxon_tree();
        tree.store();
        tree.replace(4, 0, 2);
        tree.replace(5, 2, 0);
        tree.set_height(5, 2.5);
        tree.restore();
        assert_eq!(tree.parent(0), Some(4));
        assert_eq!(tree.height(5), 2.0);
        assert_eq!(tree.dirty(4), IS_CLEAN);
        tree.validate().unwrap();
    }

    #[test]
    fn validate_catches_height_inversion() {
        let mut tree = four_taxon_tree();
        tree.set_height(5, 0.5); // below child 4 at height 1.0
        assert!(matches!(
            tree.validate(),
            Err(TopologyError::HeightOrder { node: 5, .. })
        ));
    }
}
