//! Symmetric random-walk moves on one dimension of a parameter.

use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

use crate::error::ConfigError;
use crate::operator::{suggest_window, tune_window, Operator, Tuner, TuningStats};
use crate::state::{IntId, RealId, State, StateNodeId};

/// Perturbs one randomly chosen dimension of a real parameter by a
/// symmetric step.
///
/// The step is `Uniform(-w, w)` by default or `Normal(0, w)` in Gaussian
/// mode. Either way the kernel is symmetric, so the Hastings ratio is 0.
/// A step outside the bounds rejects, and so does a step that leaves the
/// value bit-identical, to spare the driver a wasted posterior evaluation.
#[derive(Debug, Clone)]
pub struct RealRandomWalkOperator {
    id: RealId,
    window_size: f64,
    gaussian: bool,
    auto_optimize: bool,
    weight: f64,
    tuner: Tuner,
}

impl RealRandomWalkOperator {
    /// Uniform-window random walk with the given half-width.
    pub fn new(id: RealId, window_size: f64) -> Result<Self, ConfigError> {
        if window_size <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "window_size",
                value: window_size,
            });
        }
        Ok(Self {
            id,
            window_size,
            gaussian: false,
            auto_optimize: true,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Draw steps from `Normal(0, window_size)` instead of a uniform
    /// window.
    pub fn gaussian(mut self) -> Self {
        self.gaussian = true;
        self
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
        self.auto_optimize = false;
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for RealRandomWalkOperator {
    fn name(&self) -> &str {
        "RealRandomWalkOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let step = if self.gaussian {
            let z: f64 = rng.sample(StandardNormal);
            z * self.window_size
        } else {
            (rng.random::<f64>() * 2.0 - 1.0) * self.window_size
        };
        let p = state.real_mut(self.id);
        let index = rng.random_range(0..p.dimension());
        let old = p.value(index);
        let new = old + step;
        if new == old || !p.in_bounds(new) {
            return f64::NEG_INFINITY;
        }
        p.set_value(index, new);
        0.0
    }

    fn optimize(&mut self, log_alpha: f64) {
        if self.auto_optimize {
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

/// Perturbs one dimension of an integer parameter by a nonzero step in
/// `[-w, w]`.
///
/// Zero steps are excluded so every proposal actually moves; the kernel
/// stays symmetric and the Hastings ratio is 0. The window size is not
/// auto-tuned.
#[derive(Debug, Clone)]
pub struct IntRandomWalkOperator {
    id: IntId,
    window_size: i64,
    weight: f64,
    tuner: Tuner,
}

impl IntRandomWalkOperator {
    /// Integer random walk with the given half-width.
    pub fn new(id: IntId, window_size: i64) -> Result<Self, ConfigError> {
        if window_size <= 0 {
            return Err(ConfigError::NonPositive {
                name: "window_size",
                value: window_size as f64,
            });
        }
        Ok(Self {
            id,
            window_size,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Base the performance suggestion on `target` instead of the 0.234
    /// default acceptance probability. The integer window itself is never
    /// auto-tuned.
    pub fn with_target_acceptance(mut self, target: f64) -> Self {
        self.tuner = self.tuner.with_target(target);
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for IntRandomWalkOperator {
    fn name(&self) -> &str {
        "IntRandomWalkOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let w = self.window_size;
        // draw from [-w, w] \ {0}
        let mut step = rng.random_range(-w..w);
        if step >= 0 {
            step += 1;
        }
        let p = state.int_mut(self.id);
        let index = rng.random_range(0..p.dimension());
        let new = p.value(index) + step;
        if !p.in_bounds(new) {
            return f64::NEG_INFINITY;
        }
        p.set_value(index, new);
        0.0
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
        suggest_window(&self.tuner, self.window_size as f64)
    }
}
