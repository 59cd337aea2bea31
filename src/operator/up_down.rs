//! Jointly scale correlated state nodes in opposite directions.

use rand::RngCore;

use crate::error::ConfigError;
use crate::operator::{
    draw_scaler, suggest_scale_factor, tune_scale_factor, Operator, Tuner, TuningStats,
};
use crate::state::{State, StateNodeId};

/// Scales one group of state nodes by a factor and another group by its
/// inverse in a single proposal.
///
/// The classic use is breaking the rate-time ridge: clock rates go up while
/// divergence times go down. With `u` entries scaled up and `d` scaled
/// down, the log Hastings ratio is `(u - d - 2) * log(scale)`. Members may
/// be real parameters or trees; any bound or height-order violation rejects
/// the whole proposal.
#[derive(Debug, Clone)]
pub struct UpDownOperator {
    up: Vec<StateNodeId>,
    down: Vec<StateNodeId>,
    scale_factor: f64,
    optimise: bool,
    weight: f64,
    tuner: Tuner,
}

impl UpDownOperator {
    /// Build from the two groups. Every member must be a real parameter or
    /// a tree, and at least one group must be nonempty.
    pub fn new(
        state: &State,
        up: Vec<StateNodeId>,
        down: Vec<StateNodeId>,
        scale_factor: f64,
    ) -> Result<Self, ConfigError> {
        if !(scale_factor > 0.0 && scale_factor < 1.0) {
            return Err(ConfigError::ScaleFactorOutOfRange(scale_factor));
        }
        if up.is_empty() && down.is_empty() {
            return Err(ConfigError::NoStateNodes);
        }
        for &id in up.iter().chain(&down) {
            let kind = state.kind(id);
            if kind != "real parameter" && kind != "tree" {
                return Err(ConfigError::WrongStateNodeKind {
                    index: id.index(),
                    actual: kind,
                    expected: "real parameter or tree",
                });
            }
        }
        Ok(Self {
            up,
            down,
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

impl Operator for UpDownOperator {
    fn name(&self) -> &str {
        "UpDownOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let scale = draw_scaler(self.scale_factor, rng);
        let mut going_up = 0usize;
        let mut going_down = 0usize;
        for &id in &self.up {
            match state.node_mut(id).scale(scale) {
                Ok(changed) => going_up += changed,
                Err(_) => return f64::NEG_INFINITY,
            }
        }
        for &id in &self.down {
            match state.node_mut(id).scale(1.0 / scale) {
                Ok(changed) => going_down += changed,
                Err(_) => return f64::NEG_INFINITY,
            }
        }
        (going_up as f64 - going_down as f64 - 2.0) * scale.ln()
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
        self.up.iter().chain(&self.down).copied().collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{IntParameter, RealParameter, Tree};
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
    fn ratio_counts_entries_in_both_directions() {
        let mut state = State::new();
        let rate = state.add_real(RealParameter::new(vec![1.0], 0.0, f64::INFINITY).unwrap());
        let tree = state.add_tree(four_taxon_tree());
        let mut op =
            UpDownOperator::new(&state, vec![rate.id()], vec![tree.id()], 0.8).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let hr = op.propose(&mut state, &mut rng);
        assert!(hr.is_finite());
        // 1 entry up, 3 internal heights down: (1 - 3 - 2) * ln(scale)
        let scale = state.real(rate).value(0);
        assert!((hr - (-4.0 * scale.ln())).abs() < 1e-9);
        state.tree(tree).validate().unwrap();
    }

    #[test]
    fn integer_member_is_rejected_at_construction() {
        let mut state = State::new();
        let i = state.add_int(IntParameter::new(vec![1], 0, 10).unwrap());
        assert!(matches!(
            UpDownOperator::new(&state, vec![i.id()], vec![], 0.8),
            Err(ConfigError::WrongStateNodeKind { .. })
        ));
    }

    #[test]
    fn empty_groups_are_rejected_at_construction() {
        let state = State::new();
        assert!(matches!(
            UpDownOperator::new(&state, vec![], vec![], 0.8),
            Err(ConfigError::NoStateNodes)
        ));
    }

    #[test]
    fn bound_violation_rejects() {
        let mut state = State::new();
        let up = state.add_real(RealParameter::new(vec![0.99], 0.0, 1.0).unwrap());
        let mut op = UpDownOperator::new(&state, vec![up.id()], vec![], 0.5).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(19);
        let mut saw_reject = false;
        for _ in 0..64 {
            if op.propose(&mut state, &mut rng) == f64::NEG_INFINITY {
                saw_reject = true;
                assert_eq!(state.real(up).value(0), 0.99);
                break;
            }
            state.real_mut(up).set_value(0, 0.99);
        }
        assert!(saw_reject);
    }
}
