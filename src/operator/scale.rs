//! Multiplicative scaling of a parameter or of a whole tree.

use rand::{Rng, RngCore};

use crate::error::ConfigError;
use crate::operator::{
    draw_scaler, suggest_scale_factor, tune_scale_factor, Operator, Tuner, TuningStats,
};
use crate::state::{RealId, State, StateNodeId, TreeId};

/// Which dimensions of a parameter a [`ScaleOperator`] touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    /// Scale one randomly chosen dimension; Hastings ratio `-log(scale)`.
    SingleIndex,
    /// Scale every dimension by the same factor; ratio
    /// `(dim - 2) * log(scale)`, or `-dof * log(scale)` when a
    /// degrees-of-freedom override is configured.
    AllSameFactor,
    /// Scale every dimension by an independent factor; ratio accumulated as
    /// `-sum(log(scale_i))`.
    AllIndependent,
}

#[derive(Debug, Clone)]
enum Target {
    Parameter {
        id: RealId,
        mode: ScaleMode,
        degrees_of_freedom: Option<usize>,
    },
    Tree {
        id: TreeId,
        root_only: bool,
    },
}

/// Scales a parameter or all divergence times of a tree.
///
/// A scale is drawn as `s + u * (1/s - s)` with `u ~ Uniform(0,1)` and the
/// tuning scale factor `s` in (0, 1). Bound violations on any touched
/// dimension reject the proposal; so does selecting a zero-valued entry for
/// single-index scaling, since scaling preserves zero.
#[derive(Debug, Clone)]
pub struct ScaleOperator {
    target: Target,
    scale_factor: f64,
    factor_lower: f64,
    factor_upper: f64,
    optimise: bool,
    weight: f64,
    tuner: Tuner,
}

impl ScaleOperator {
    /// Scale operator over a real parameter, in [`ScaleMode::SingleIndex`]
    /// by default.
    pub fn parameter(id: RealId, scale_factor: f64) -> Result<Self, ConfigError> {
        Self::with_target(
            Target::Parameter {
                id,
                mode: ScaleMode::SingleIndex,
                degrees_of_freedom: None,
            },
            scale_factor,
        )
    }

    /// Scale operator over all divergence times of a tree.
    pub fn tree(id: TreeId, scale_factor: f64) -> Result<Self, ConfigError> {
        Self::with_target(Target::Tree { id, root_only: false }, scale_factor)
    }

    fn with_target(target: Target, scale_factor: f64) -> Result<Self, ConfigError> {
        if !(scale_factor > 0.0 && scale_factor < 1.0) {
            return Err(ConfigError::ScaleFactorOutOfRange(scale_factor));
        }
        Ok(Self {
            target,
            scale_factor,
            factor_lower: 1e-8,
            factor_upper: 1.0 - 1e-8,
            optimise: true,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Select the scaling mode (parameter targets only; ignored for trees).
    pub fn with_mode(mut self, mode: ScaleMode) -> Self {
        if let Target::Parameter { mode: m, .. } = &mut self.target {
            *m = mode;
        }
        self
    }

    /// Override the degrees of freedom used in the
    /// [`ScaleMode::AllSameFactor`] Hastings ratio.
    pub fn with_degrees_of_freedom(mut self, dof: usize) -> Self {
        if let Target::Parameter {
            degrees_of_freedom, ..
        } = &mut self.target
        {
            *degrees_of_freedom = Some(dof);
        }
        self
    }

    /// Scale only the root height (tree targets only; ignored for
    /// parameters).
    pub fn root_only(mut self) -> Self {
        if let Target::Tree { root_only, .. } = &mut self.target {
            *root_only = true;
        }
        self
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

    fn propose_tree(&self, state: &mut State, id: TreeId, root_only: bool, scale: f64) -> f64 {
        let tree = state.tree_mut(id);
        if root_only {
            let root = tree.root();
            let (l, r) = tree.children(root);
            let new_height = tree.height(root) * scale;
            if new_height < tree.height(l).max(tree.height(r)) {
                return f64::NEG_INFINITY;
            }
            tree.set_height(root, new_height);
            return -scale.ln();
        }
        match tree.scale(scale) {
            Ok(changed) => all_same_factor_log_hastings(changed, None, scale),
            Err(_) => f64::NEG_INFINITY,
        }
    }

    fn propose_parameter(
        &self,
        state: &mut State,
        rng: &mut dyn RngCore,
        id: RealId,
        mode: ScaleMode,
        dof: Option<usize>,
        scale: f64,
    ) -> f64 {
        match mode {
            ScaleMode::SingleIndex => {
                let p = state.real_mut(id);
                let index = rng.random_range(0..p.dimension());
                let old = p.value(index);
                if old == 0.0 {
                    // scaling preserves zero; the move cannot go anywhere
                    return f64::NEG_INFINITY;
                }
                let new = old * scale;
                if !p.in_bounds(new) {
                    return f64::NEG_INFINITY;
                }
                p.set_value(index, new);
                -scale.ln()
            }
            ScaleMode::AllSameFactor => {
                let dim = state.real(id).dimension();
                match state.real_mut(id).scale(scale) {
                    Ok(_) => all_same_factor_log_hastings(dim, dof, scale),
                    Err(_) => f64::NEG_INFINITY,
                }
            }
            ScaleMode::AllIndependent => {
                let dim = state.real(id).dimension();
                let mut log_hastings = 0.0;
                for i in 0..dim {
                    let scale_one = draw_scaler(self.scale_factor, rng);
                    let p = state.real_mut(id);
                    let new = p.value(i) * scale_one;
                    log_hastings -= scale_one.ln();
                    if !p.in_bounds(new) {
                        return f64::NEG_INFINITY;
                    }
                    p.set_value(i, new);
                }
                log_hastings
            }
        }
    }
}

/// Hastings ratio for scaling `dim` entries by one shared factor:
/// `(dim - 2) * log(scale)`, or `-dof * log(scale)` under a
/// degrees-of-freedom override.
fn all_same_factor_log_hastings(dim: usize, dof: Option<usize>, scale: f64) -> f64 {
    match dof {
        Some(dof) => -(dof as f64) * scale.ln(),
        None => (dim as f64 - 2.0) * scale.ln(),
    }
}

impl Operator for ScaleOperator {
    fn name(&self) -> &str {
        "ScaleOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let scale = draw_scaler(self.scale_factor, rng);
        match self.target.clone() {
            Target::Tree { id, root_only } => self.propose_tree(state, id, root_only, scale),
            Target::Parameter {
                id,
                mode,
                degrees_of_freedom,
            } => self.propose_parameter(state, rng, id, mode, degrees_of_freedom, scale),
        }
    }

    fn optimize(&mut self, log_alpha: f64) {
        if self.optimise {
            let delta = self.tuner.calc_delta(log_alpha);
            let tuned = tune_scale_factor(self.scale_factor, delta);
            self.set_coercable_value(tuned);
        }
    }

    fn coercable_value(&self) -> f64 {
        self.scale_factor
    }

    fn set_coercable_value(&mut self, value: f64) {
        self.scale_factor = value.clamp(self.factor_lower, self.factor_upper);
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        match &self.target {
            Target::Parameter { id, .. } => vec![id.id()],
            Target::Tree { id, .. } => vec![id.id()],
        }
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
