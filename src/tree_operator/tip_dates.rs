//! Perturbations of sampled leaf dates.

use rand::{Rng, RngCore};

use crate::error::ConfigError;
use crate::operator::{
    draw_scaler, suggest_scale_factor, suggest_window, tune_scale_factor, tune_window,
    Operator, Tuner, TuningStats,
};
use crate::state::{State, StateNodeId, TreeId};

/// Resolve a taxon subset to leaf indices; an empty subset means all leaves.
fn leaf_subset(
    state: &State,
    id: TreeId,
    taxa: &[&str],
) -> Result<Vec<usize>, ConfigError> {
    let tree = state.tree(id);
    if taxa.is_empty() {
        return Ok((0..tree.leaf_count()).collect());
    }
    taxa.iter()
        .map(|name| {
            tree.taxon_index(name)
                .ok_or_else(|| ConfigError::UnknownTaxon((*name).to_string()))
        })
        .collect()
}

/// Scales the date of one random leaf from a configured taxon subset.
///
/// Ratio `-log(scale)`. A date above the leaf's parent rejects, and so
/// does a scale that leaves the date unchanged (a zero date).
#[derive(Debug, Clone)]
pub struct TipDatesScaler {
    id: TreeId,
    leaves: Vec<usize>,
    scale_factor: f64,
    optimise: bool,
    weight: f64,
    tuner: Tuner,
}

impl TipDatesScaler {
    /// Tip-date scaler over the named taxa; an empty list targets every
    /// leaf.
    pub fn new(
        state: &State,
        id: TreeId,
        scale_factor: f64,
        taxa: &[&str],
    ) -> Result<Self, ConfigError> {
        if !(scale_factor > 0.0 && scale_factor < 1.0) {
            return Err(ConfigError::ScaleFactorOutOfRange(scale_factor));
        }
        Ok(Self {
            id,
            leaves: leaf_subset(state, id, taxa)?,
            scale_factor,
            optimise: true,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Aim adaptation at `target` instead of the 0.234 default acceptance
    /// probability.
    pub fn with_target_acceptance(mut self, target: f64) -> Self {
        self.tuner = self.tuner.with_target(target);
        self
    }

    /// Leave the scale factor untouched for the first `delay` acceptance
    /// decisions.
    pub fn with_tuning_delay(mut self, delay: u64) -> Self {
        self.tuner = self.tuner.with_delay(delay);
        self
    }

    /// Disable auto-tuning of the scale factor.
    pub fn without_optimise(mut self) -> Self {
        self.optimise = false;
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for TipDatesScaler {
    fn name(&self) -> &str {
        "TipDatesScaler"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let tree = state.tree_mut(self.id);
        let leaf = self.leaves[rng.random_range(0..self.leaves.len())];
        let parent = tree
            .parent(leaf)
            .unwrap_or_else(|| unreachable!("leaves are never the root"));
        let scale = draw_scaler(self.scale_factor, rng);
        let old = tree.height(leaf);
        let new = old * scale;
        if new == old || new > tree.height(parent) {
            return f64::NEG_INFINITY;
        }
        tree.set_height(leaf, new);
        -scale.ln()
    }

    fn optimize(&mut self, log_alpha: f64) {
        if self.optimise {
            let delta = self.tuner.calc_delta(log_alpha);
            self.scale_factor = tune_scale_factor(self.scale_factor, delta);
        }
    }

    fn coercable_value(&self) -> f64 {
        self.scale_factor
    }

    fn set_coercable_value(&mut self, value: f64) {
        self.scale_factor = value.clamp(1e-8, 1.0 - 1e-8);
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
        suggest_scale_factor(&self.tuner, self.scale_factor)
    }

    fn tuning_stats(&self) -> Option<TuningStats> {
        Some(self.tuner.stats(self.scale_factor))
    }

    fn set_tuning_stats(&mut self, stats: &TuningStats) {
        self.set_coercable_value(stats.parameter);
        self.tuner.restore(stats);
    }
}

/// Perturbs the date of one random leaf from a configured taxon subset by a
/// symmetric uniform step.
///
/// Ratio 0. A date above the leaf's parent or below zero rejects, and so
/// does a step that leaves the date unchanged.
#[derive(Debug, Clone)]
pub struct TipDatesRandomWalker {
    id: TreeId,
    leaves: Vec<usize>,
    window_size: f64,
    optimise: bool,
    weight: f64,
    tuner: Tuner,
}

impl TipDatesRandomWalker {
    /// Tip-date walker over the named taxa; an empty list targets every
    /// leaf.
    pub fn new(
        state: &State,
        id: TreeId,
        window_size: f64,
        taxa: &[&str],
    ) -> Result<Self, ConfigError> {
        if window_size <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "window_size",
                value: window_size,
            });
        }
        Ok(Self {
            id,
            leaves: leaf_subset(state, id, taxa)?,
            window_size,
            optimise: true,
            weight: 1.0,
            tuner: Tuner::default(),
        })
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
}

impl Operator for TipDatesRandomWalker {
    fn name(&self) -> &str {
        "TipDatesRandomWalker"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let tree = state.tree_mut(self.id);
        let leaf = self.leaves[rng.random_range(0..self.leaves.len())];
        let parent = tree
            .parent(leaf)
            .unwrap_or_else(|| unreachable!("leaves are never the root"));
        let step = (rng.random::<f64>() * 2.0 - 1.0) * self.window_size;
        let old = tree.height(leaf);
        let new = old + step;
        if new == old || new < 0.0 || new > tree.height(parent) {
            return f64::NEG_INFINITY;
        }
        tree.set_height(leaf, new);
        0.0
    }

    fn optimize(&mut self, log_alpha: f64) {
        if self.optimise {
            let delta = self.tuner.calc_delta(log_alpha);
            self.window_size = tune_window(self.window_size, delta);
        }
    }

    fn coercable_value(&self) -> f64 {
        self.window_size
    }

    fn set_coercable_value(&mut self, value: f64) {
        self.window_size = value;
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
        suggest_window(&self.tuner, self.window_size)
    }

    fn tuning_stats(&self) -> Option<TuningStats> {
        Some(self.tuner.stats(self.window_size))
    }

    fn set_tuning_stats(&mut self, stats: &TuningStats) {
        self.window_size = stats.parameter;
        self.tuner.restore(stats);
    }
}
