//! Exchange a random amount between two dimensions of a parameter.

use rand::{Rng, RngCore};

use crate::error::ConfigError;
use crate::operator::{suggest_window, tune_window, Operator, Tuner, TuningStats};
use crate::state::{IntId, RealId, State, StateNodeId};

#[derive(Debug, Clone, Copy)]
enum Target {
    Real(RealId),
    Int(IntId),
}

/// Transfers a random amount from one dimension to another so their
/// (optionally weighted) sum is conserved.
///
/// Real mode draws `d ~ Uniform(0, delta)`; integer mode draws an integer
/// in `[1, round(delta)]`. The move is symmetric, so the Hastings ratio is
/// always 0; a result outside either dimension's bounds rejects.
#[derive(Debug, Clone)]
pub struct DeltaExchangeOperator {
    target: Target,
    delta: f64,
    weights: Option<Vec<u32>>,
    auto_optimize: bool,
    weight: f64,
    tuner: Tuner,
}

impl DeltaExchangeOperator {
    /// Delta exchange over a real parameter.
    pub fn real(state: &State, id: RealId, delta: f64) -> Result<Self, ConfigError> {
        if delta <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "delta",
                value: delta,
            });
        }
        if state.real(id).dimension() <= 1 {
            tracing::warn!(
                dim = state.real(id).dimension(),
                "delta exchange over a one-dimensional parameter has no effect"
            );
        }
        Ok(Self {
            target: Target::Real(id),
            delta,
            weights: None,
            auto_optimize: true,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Delta exchange over an integer parameter. `delta` must itself be a
    /// positive integer.
    pub fn int(state: &State, id: IntId, delta: f64) -> Result<Self, ConfigError> {
        if delta < 1.0 || delta.round() != delta {
            return Err(ConfigError::NonIntegerDelta(delta));
        }
        if state.int(id).dimension() <= 1 {
            tracing::warn!(
                dim = state.int(id).dimension(),
                "delta exchange over a one-dimensional parameter has no effect"
            );
        }
        Ok(Self {
            target: Target::Int(id),
            delta,
            weights: None,
            auto_optimize: true,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Re-weight dimensions so `sum(w_i * x_i)` is conserved instead of the
    /// plain sum. Zero-weight dimensions are never selected.
    pub fn with_weight_vector(
        mut self,
        state: &State,
        weights: Vec<u32>,
    ) -> Result<Self, ConfigError> {
        let dim = match self.target {
            Target::Real(id) => state.real(id).dimension(),
            Target::Int(id) => state.int(id).dimension(),
        };
        if weights.len() != dim {
            return Err(ConfigError::WeightDimensionMismatch {
                weights: weights.len(),
                dim,
            });
        }
        if matches!(self.target, Target::Int(_)) {
            // integer transfers cannot be rescaled by a weight ratio
            let nonzero: Vec<u32> =
                weights.iter().copied().filter(|&w| w != 0).collect();
            if nonzero.windows(2).any(|w| w[0] != w[1]) {
                return Err(ConfigError::InvalidParameter(
                    "integer-mode delta exchange requires equal nonzero weights".into(),
                ));
            }
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Aim adaptation at `target` instead of the 0.234 default acceptance
    /// probability.
    pub fn with_target_acceptance(mut self, target: f64) -> Self {
        self.tuner = self.tuner.with_target(target);
        self
    }

    /// Leave `delta` untouched for the first `delay` acceptance decisions.
    pub fn with_tuning_delay(mut self, delay: u64) -> Self {
        self.tuner = self.tuner.with_delay(delay);
        self
    }

    /// Disable auto-tuning of `delta`.
    pub fn without_optimise(mut self) -> Self {
        self.auto_optimize = false;
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Pick two distinct dimensions among those with nonzero weight.
    fn pick_dimensions(&self, dim: usize, rng: &mut dyn RngCore) -> Option<(usize, usize)> {
        let selectable: Vec<usize> = match &self.weights {
            Some(w) => (0..dim).filter(|&i| w[i] != 0).collect(),
            None => (0..dim).collect(),
        };
        if selectable.len() <= 1 {
            return None;
        }
        let a = rng.random_range(0..selectable.len());
        let mut b = rng.random_range(0..selectable.len() - 1);
        if b >= a {
            b += 1;
        }
        Some((selectable[a], selectable[b]))
    }

    fn weight_at(&self, i: usize) -> u32 {
        self.weights.as_ref().map_or(1, |w| w[i])
    }
}

impl Operator for DeltaExchangeOperator {
    fn name(&self) -> &str {
        "DeltaExchangeOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        match self.target {
            Target::Real(id) => {
                let dim = state.real(id).dimension();
                let Some((dim1, dim2)) = self.pick_dimensions(dim, rng) else {
                    // nothing to transfer between; a no-op proposal
                    return 0.0;
                };
                let d = rng.random::<f64>() * self.delta;
                let p = state.real_mut(id);
                let scalar1 = p.value(dim1) - d;
                let (w1, w2) = (self.weight_at(dim1), self.weight_at(dim2));
                let scalar2 = if w1 != w2 {
                    p.value(dim2) + d * w1 as f64 / w2 as f64
                } else {
                    p.value(dim2) + d
                };
                if !p.in_bounds(scalar1) || !p.in_bounds(scalar2) {
                    return f64::NEG_INFINITY;
                }
                p.set_value(dim1, scalar1);
                p.set_value(dim2, scalar2);
                0.0
            }
            Target::Int(id) => {
                let dim = state.int(id).dimension();
                let Some((dim1, dim2)) = self.pick_dimensions(dim, rng) else {
                    return 0.0;
                };
                let d = rng.random_range(0..self.delta.round() as i64) + 1;
                let p = state.int_mut(id);
                let scalar1 = p.value(dim1) - d;
                let scalar2 = p.value(dim2) + d;
                if !p.in_bounds(scalar1) || !p.in_bounds(scalar2) {
                    return f64::NEG_INFINITY;
                }
                p.set_value(dim1, scalar1);
                p.set_value(dim2, scalar2);
                0.0
            }
        }
    }

    fn optimize(&mut self, log_alpha: f64) {
        if self.auto_optimize {
            let delta = self.tuner.calc_delta(log_alpha);
            self.delta = tune_window(self.delta, delta);
            if matches!(self.target, Target::Int(_)) {
                self.delta = self.delta.round().max(1.0);
            }
        }
    }

    fn coercable_value(&self) -> f64 {
        self.delta
    }

    fn set_coercable_value(&mut self, value: f64) {
        self.delta = value;
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        match self.target {
            Target::Real(id) => vec![id.id()],
            Target::Int(id) => vec![id.id()],
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
        suggest_window(&self.tuner, self.delta)
    }

    fn tuning_stats(&self) -> Option<TuningStats> {
        Some(self.tuner.stats(self.delta))
    }

    fn set_tuning_stats(&mut self, stats: &TuningStats) {
        self.delta = stats.parameter;
        self.tuner.restore(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{IntParameter, RealParameter};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn equal_weights_conserve_the_sum() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![2.0, 3.0, 5.0], 0.0, 100.0).unwrap());
        let mut op = DeltaExchangeOperator::real(&state, id, 1.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..200 {
            let hr = op.propose(&mut state, &mut rng);
            assert!(hr == 0.0 || hr == f64::NEG_INFINITY);
            let sum: f64 = state.real(id).values().iter().sum();
            assert!((sum - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn weighted_exchange_conserves_weighted_sum() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![2.0, 3.0], 0.0, 100.0).unwrap());
        let op = DeltaExchangeOperator::real(&state, id, 0.5)
            .unwrap()
            .with_weight_vector(&state, vec![2, 4])
            .unwrap();
        let mut op = op;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let before = 2.0 * state.real(id).value(0) + 4.0 * state.real(id).value(1);
        for _ in 0..100 {
            op.propose(&mut state, &mut rng);
            let after = 2.0 * state.real(id).value(0) + 4.0 * state.real(id).value(1);
            assert!((after - before).abs() < 1e-9);
        }
    }

    #[test]
    fn integer_mode_requires_integer_delta() {
        let mut state = State::new();
        let id = state.add_int(IntParameter::new(vec![5, 5], 0, 10).unwrap());
        assert!(matches!(
            DeltaExchangeOperator::int(&state, id, 1.5),
            Err(ConfigError::NonIntegerDelta(_))
        ));
        let mut op = DeltaExchangeOperator::int(&state, id, 2.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        for _ in 0..100 {
            op.propose(&mut state, &mut rng);
            let sum: i64 = state.int(id).values().iter().sum();
            assert_eq!(sum, 10);
        }
    }

    #[test]
    fn out_of_bounds_transfer_rejects_without_mutation() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![0.05, 0.95], 0.0, 1.0).unwrap());
        let mut op = DeltaExchangeOperator::real(&state, id, 10.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let mut rejected = 0;
        for _ in 0..50 {
            if op.propose(&mut state, &mut rng) == f64::NEG_INFINITY {
                rejected += 1;
                assert_eq!(state.real(id).value(0), 0.05);
                assert_eq!(state.real(id).value(1), 0.95);
            } else {
                state.real_mut(id).set_value(0, 0.05);
                state.real_mut(id).set_value(1, 0.95);
            }
        }
        assert!(rejected > 0);
    }
}
