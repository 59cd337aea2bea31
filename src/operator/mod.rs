//! The operator contract and shared auto-tuning machinery.
//!
//! Every move implements [`Operator`]: mutate declared state nodes in
//! place, return the exact log Hastings ratio, and expose one coercable
//! tuning scalar the driver can adapt after each acceptance decision.
//!
//! The tuning update is a Robbins-Monro step on the gap between the
//! realized and target acceptance probability ([`Tuner::calc_delta`]),
//! composed with a log-domain transform that keeps the scalar on its
//! natural domain: scale factors stay in (0, 1) via a logistic transform,
//! window sizes stay positive via exp.

mod bits;
mod delta_exchange;
mod joint;
mod random_walk;
mod sample_density;
mod scale;
mod slice;
mod swap;
mod uniform;
mod up_down;

pub use bits::{BitFlipOperator, BitMoveOperator};
pub use delta_exchange::DeltaExchangeOperator;
pub use joint::JointOperator;
pub use random_walk::{IntRandomWalkOperator, RealRandomWalkOperator};
pub use sample_density::{ProposalDensity, SampleDensityOperator};
pub use scale::{ScaleMode, ScaleOperator};
pub use slice::SliceOperator;
pub use swap::SwapOperator;
pub use uniform::{IntUniformOperator, UniformOperator};
pub use up_down::UpDownOperator;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::state::{State, StateNodeId};

/// Default target acceptance probability for tuned operators.
pub const DEFAULT_TARGET_ACCEPTANCE: f64 = 0.234;

/// A Metropolis-Hastings move over declared state nodes.
///
/// `propose` mutates state in place and returns the log Hastings ratio.
/// `NEG_INFINITY` means "reject outright, ignore the produced state" and is
/// a valid outcome, not an error. `INFINITY` marks a Gibbs-style exact
/// sampler whose proposals are always accepted.
pub trait Operator {
    /// Short human-readable name for diagnostics.
    fn name(&self) -> &str;

    /// Propose a new state, mutating exactly the nodes declared by
    /// [`state_nodes`](Operator::state_nodes), and return the log Hastings
    /// ratio.
    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64;

    /// Adapt the tuning scalar. Called by the driver after every acceptance
    /// decision with `log_alpha` = log posterior ratio + log Hastings
    /// ratio.
    fn optimize(&mut self, _log_alpha: f64) {}

    /// The current value of the tuning scalar, `NaN` if this operator has
    /// none.
    fn coercable_value(&self) -> f64 {
        f64::NAN
    }

    /// Overwrite the tuning scalar, e.g. when resuming a chain.
    fn set_coercable_value(&mut self, _value: f64) {}

    /// Exactly the state nodes a proposal may mutate. The driver
    /// checkpoints these before calling [`propose`](Operator::propose) and
    /// restores them on rejection.
    fn state_nodes(&self) -> Vec<StateNodeId>;

    /// Record that the last proposal was accepted.
    fn accept(&mut self) {}

    /// Record that the last proposal was rejected.
    fn reject(&mut self) {}

    /// Relative weight with which the driver schedules this operator.
    fn weight(&self) -> f64 {
        1.0
    }

    /// Directions on how to set the tuning parameter, if the realized
    /// acceptance rate is far from target.
    fn performance_suggestion(&self) -> Option<String> {
        None
    }

    /// Snapshot of tuning state for chain checkpointing, `None` if this
    /// operator has no tuning state.
    fn tuning_stats(&self) -> Option<TuningStats> {
        None
    }

    /// Restore tuning state from a checkpoint.
    fn set_tuning_stats(&mut self, _stats: &TuningStats) {}
}

/// Serializable tuning state, so a resumed chain picks up adaptation where
/// it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningStats {
    /// The coercable tuning scalar.
    pub parameter: f64,
    /// Accepted proposals.
    pub accepted: u64,
    /// Rejected proposals.
    pub rejected: u64,
    /// Accepted proposals counted toward the tuning correction (after the
    /// adaptation delay).
    pub accepted_for_correction: u64,
    /// Rejected proposals counted toward the tuning correction.
    pub rejected_for_correction: u64,
}

/// Robbins-Monro step-size bookkeeping shared by all tuned operators.
///
/// Counts acceptances and rejections, and turns the driver-supplied
/// `log_alpha` into a diminishing adaptation step. Adaptation can be
/// delayed for a burn-in of proposals so early, unrepresentative acceptance
/// rates do not distort the scalar.
#[derive(Debug, Clone)]
pub struct Tuner {
    target: f64,
    delay: u64,
    delay_count: u64,
    accepted: u64,
    rejected: u64,
    accepted_for_correction: u64,
    rejected_for_correction: u64,
}

impl Default for Tuner {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_ACCEPTANCE)
    }
}

impl Tuner {
    /// A tuner aiming for the given acceptance probability, adapting from
    /// the first proposal.
    pub fn new(target: f64) -> Self {
        Self {
            target,
            delay: 0,
            delay_count: 0,
            accepted: 0,
            rejected: 0,
            accepted_for_correction: 0,
            rejected_for_correction: 0,
        }
    }

    /// Delay adaptation for the first `delay` optimize calls.
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    /// Aim for `target` instead of [`DEFAULT_TARGET_ACCEPTANCE`].
    pub fn with_target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    /// Target acceptance probability.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Record an acceptance.
    pub fn accept(&mut self) {
        self.accepted += 1;
        if self.delay_count >= self.delay {
            self.accepted_for_correction += 1;
        }
    }

    /// Record a rejection.
    pub fn reject(&mut self) {
        self.rejected += 1;
        if self.delay_count >= self.delay {
            self.rejected_for_correction += 1;
        }
    }

    /// The Robbins-Monro adaptation step for this decision.
    ///
    /// `(1/count) * (min(alpha, 1) - target)`, where `count` is the number
    /// of decisions counted so far. Returns 0 while the adaptation delay
    /// has not elapsed or if the step is not finite.
    pub fn calc_delta(&mut self, log_alpha: f64) -> f64 {
        if self.delay_count < self.delay {
            self.delay_count += 1;
            return 0.0;
        }
        let count =
            (self.accepted_for_correction + self.rejected_for_correction + 1) as f64;
        let delta = (1.0 / count) * (log_alpha.min(0.0).exp() - self.target);
        if delta.is_finite() {
            delta
        } else {
            0.0
        }
    }

    /// Realized acceptance probability over all recorded decisions.
    pub fn acceptance_probability(&self) -> f64 {
        self.accepted as f64 / (self.accepted + self.rejected) as f64
    }

    /// Snapshot for checkpointing, with the operator's tuning scalar.
    pub fn stats(&self, parameter: f64) -> TuningStats {
        TuningStats {
            parameter,
            accepted: self.accepted,
            rejected: self.rejected,
            accepted_for_correction: self.accepted_for_correction,
            rejected_for_correction: self.rejected_for_correction,
        }
    }

    /// Restore counters from a checkpoint.
    pub fn restore(&mut self, stats: &TuningStats) {
        self.accepted = stats.accepted;
        self.rejected = stats.rejected;
        self.accepted_for_correction = stats.accepted_for_correction;
        self.rejected_for_correction = stats.rejected_for_correction;
    }
}

/// Draw `count` distinct indices from `0..dim` by a partial Fisher-Yates
/// shuffle. Requires `count <= dim`.
pub(crate) fn sample_distinct(dim: usize, count: usize, rng: &mut dyn RngCore) -> Vec<usize> {
    use rand::Rng;
    let mut indices: Vec<usize> = (0..dim).collect();
    for i in 0..count {
        let j = rng.random_range(i..dim);
        indices.swap(i, j);
    }
    indices.truncate(count);
    indices
}

/// Draw a proposal scale from `s + u * (1/s - s)` with `u ~ Uniform(0,1)`.
///
/// With `s` in (0, 1) the draw lies in `(s, 1/s)`, symmetric in log space
/// around 1.
pub(crate) fn draw_scaler(scale_factor: f64, rng: &mut dyn RngCore) -> f64 {
    use rand::Rng;
    scale_factor + rng.random::<f64>() * (1.0 / scale_factor - scale_factor)
}

/// Logistic-domain update keeping a scale factor inside (0, 1).
pub(crate) fn tune_scale_factor(current: f64, delta: f64) -> f64 {
    let d = delta + (1.0 / current - 1.0).ln();
    1.0 / (d.exp() + 1.0)
}

/// Log-domain update keeping a window size positive.
pub(crate) fn tune_window(current: f64, delta: f64) -> f64 {
    (delta + current.ln()).exp()
}

/// "Try setting X to about Y" suggestion for scale-factor operators, based
/// on the realized acceptance rate. `None` while the rate is in the useful
/// 10-40% band.
pub(crate) fn suggest_scale_factor(tuner: &Tuner, scale_factor: f64) -> Option<String> {
    let prob = tuner.acceptance_probability();
    if !prob.is_finite() || (0.10..=0.40).contains(&prob) {
        return None;
    }
    let ratio = (prob / tuner.target()).clamp(0.5, 2.0);
    let sf = scale_factor.powf(ratio);
    Some(format!("try setting the scale factor to about {sf:.3}"))
}

/// Suggestion for window-size operators: scale the window by the ratio of
/// realized to target acceptance rate.
pub(crate) fn suggest_window(tuner: &Tuner, size: f64) -> Option<String> {
    let prob = tuner.acceptance_probability();
    if !prob.is_finite() || (0.10..=0.40).contains(&prob) {
        return None;
    }
    let ratio = (prob / tuner.target()).clamp(0.5, 2.0);
    let new_size = size * ratio;
    if prob < 0.10 {
        Some(format!("try decreasing the window size to about {new_size:.3}"))
    } else {
        Some(format!("try increasing the window size to about {new_size:.3}"))
    }
}
