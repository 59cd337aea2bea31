//! Stepping-out slice sampler for a scalar parameter.

use rand::{Rng, RngCore};
use rand_distr::Exp1;

use crate::error::ConfigError;
use crate::operator::{Operator, ProposalDensity, Tuner, TuningStats};
use crate::state::{RealId, State, StateNodeId};

/// Slice sampler over a one-dimensional real parameter, using a supplied
/// conditional log density.
///
/// A vertical level is drawn under the density at the current value, an
/// interval is grown by stepping out in units of the window size until both
/// ends fall below the level, and a new value is drawn by shrinkage from
/// within that interval. The parameter bounds truncate the interval. Every
/// proposal is an exact draw from the slice, so `propose` returns
/// `INFINITY` and the driver always accepts.
#[derive(Debug, Clone)]
pub struct SliceOperator<D> {
    id: RealId,
    density: D,
    window_size: f64,
    auto_optimize: bool,
    total_delta: f64,
    samples: u64,
    weight: f64,
    tuner: Tuner,
}

impl<D: ProposalDensity> SliceOperator<D> {
    /// Slice sampler with the given stepping-out window. The target
    /// parameter must be one-dimensional.
    pub fn new(
        state: &State,
        id: RealId,
        density: D,
        window_size: f64,
    ) -> Result<Self, ConfigError> {
        if window_size <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "window_size",
                value: window_size,
            });
        }
        let dim = state.real(id).dimension();
        if dim != 1 {
            return Err(ConfigError::DimensionOutOfRange {
                name: "slice sampler dimensions",
                value: 1,
                dim,
            });
        }
        Ok(Self {
            id,
            density,
            window_size,
            auto_optimize: true,
            total_delta: 0.0,
            samples: 0,
            weight: 1.0,
            tuner: Tuner::default(),
        })
    }

    /// Disable window adaptation.
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

impl<D: ProposalDensity> Operator for SliceOperator<D> {
    fn name(&self) -> &str {
        "SliceOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let p = state.real_mut(self.id);
        let (lower, upper) = (p.lower(), p.upper());
        let x0 = p.value(0);
        let g_x0 = self.density.log_density(x0);
        let e: f64 = rng.sample(Exp1);
        let log_y = g_x0 - e;

        // place a window of width w around x0, then step out
        let w = self.window_size;
        let mut left = x0 - w * rng.random::<f64>();
        let mut right = left + w;
        while left > lower && self.density.log_density(left) > log_y {
            left -= w;
        }
        while right < upper && self.density.log_density(right) > log_y {
            right += w;
        }
        left = left.max(lower);
        right = right.min(upper);

        // shrinkage: draw until the slice is hit
        let mut x1 = x0;
        loop {
            if right - left < f64::EPSILON * x0.abs().max(1.0) {
                // interval collapsed onto x0, which is on the slice
                break;
            }
            x1 = left + rng.random::<f64>() * (right - left);
            if self.density.log_density(x1) >= log_y {
                break;
            }
            if x1 < x0 {
                left = x1;
            } else {
                right = x1;
            }
        }
        p.set_value(0, x1);
        self.total_delta += (x1 - x0).abs();
        self.samples += 1;
        f64::INFINITY
    }

    fn optimize(&mut self, _log_alpha: f64) {
        // the sampler always accepts; aim the window at four times the
        // average displacement
        if self.auto_optimize && self.samples > 0 {
            self.window_size = 4.0 * self.total_delta / self.samples as f64;
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

    fn weight(&self) -> f64 {
        self.weight
    }

    fn tuning_stats(&self) -> Option<TuningStats> {
        Some(self.tuner.stats(self.window_size))
    }

    fn set_tuning_stats(&mut self, stats: &TuningStats) {
        self.window_size = stats.parameter;
        self.tuner.restore(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RealParameter;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use statrs::distribution::Normal;

    #[test]
    fn always_returns_infinity_and_stays_in_bounds() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![0.5], -3.0, 3.0).unwrap());
        let density = Normal::new(0.0, 1.0).unwrap();
        let mut op = SliceOperator::new(&state, id, density, 1.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(37);
        for _ in 0..200 {
            assert_eq!(op.propose(&mut state, &mut rng), f64::INFINITY);
            let v = state.real(id).value(0);
            assert!((-3.0..=3.0).contains(&v));
        }
    }

    #[test]
    fn samples_track_the_target_mean() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![0.0], -100.0, 100.0).unwrap());
        let density = Normal::new(2.0, 1.0).unwrap();
        let mut op = SliceOperator::new(&state, id, density, 1.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(41);
        let mut sum = 0.0;
        let n = 4000;
        for _ in 0..n {
            op.propose(&mut state, &mut rng);
            sum += state.real(id).value(0);
        }
        let mean = sum / n as f64;
        assert!((mean - 2.0).abs() < 0.15, "slice sampler mean drifted: {mean}");
    }

    #[test]
    fn multi_dimensional_parameter_is_a_config_error() {
        let mut state = State::new();
        let id =
            state.add_real(RealParameter::new(vec![0.0, 5.0, 5.0], -10.0, 10.0).unwrap());
        let density = Normal::new(0.0, 1.0).unwrap();
        assert!(matches!(
            SliceOperator::new(&state, id, density, 1.0),
            Err(ConfigError::DimensionOutOfRange { .. })
        ));
    }

    #[test]
    fn window_adapts_to_average_displacement() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![0.0], -100.0, 100.0).unwrap());
        let density = Normal::new(0.0, 1.0).unwrap();
        let mut op = SliceOperator::new(&state, id, density, 50.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(43);
        for _ in 0..500 {
            op.propose(&mut state, &mut rng);
            op.optimize(0.0);
        }
        // for a unit normal the tuned window should be far below 50
        assert!(op.coercable_value() < 10.0);
    }
}
