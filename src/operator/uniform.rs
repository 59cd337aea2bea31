//! Independence moves that resample dimensions uniformly over their bounds.

use rand::{Rng, RngCore};

use crate::error::ConfigError;
use crate::operator::{sample_distinct, Operator};
use crate::state::{IntId, RealId, State, StateNodeId};

/// Replaces `how_many` randomly chosen dimensions of a real parameter with
/// fresh draws from `Uniform(lower, upper)`.
///
/// The proposal does not depend on the current values, and the bounds never
/// change, so the kernel is symmetric and the Hastings ratio is 0. Both
/// bounds must be finite.
#[derive(Debug, Clone)]
pub struct UniformOperator {
    id: RealId,
    how_many: usize,
    weight: f64,
}

impl UniformOperator {
    /// Uniform resampler over the parameter's bound interval, touching one
    /// dimension per proposal.
    pub fn new(state: &State, id: RealId) -> Result<Self, ConfigError> {
        let p = state.real(id);
        if !p.lower().is_finite() || !p.upper().is_finite() {
            return Err(ConfigError::UnboundedParameter {
                lower: p.lower(),
                upper: p.upper(),
            });
        }
        Ok(Self {
            id,
            how_many: 1,
            weight: 1.0,
        })
    }

    /// Resample several distinct dimensions per proposal.
    pub fn with_how_many(
        mut self,
        state: &State,
        how_many: usize,
    ) -> Result<Self, ConfigError> {
        let dim = state.real(self.id).dimension();
        if how_many == 0 || how_many > dim {
            return Err(ConfigError::DimensionOutOfRange {
                name: "how_many",
                value: how_many,
                dim,
            });
        }
        self.how_many = how_many;
        Ok(self)
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for UniformOperator {
    fn name(&self) -> &str {
        "UniformOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let dim = state.real(self.id).dimension();
        let indices = sample_distinct(dim, self.how_many, rng);
        let p = state.real_mut(self.id);
        for index in indices {
            let new = p.lower() + rng.random::<f64>() * (p.upper() - p.lower());
            p.set_value(index, new);
        }
        0.0
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        vec![self.id.id()]
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Integer counterpart of [`UniformOperator`]: one dimension is replaced by
/// a uniform draw from the closed bound interval.
#[derive(Debug, Clone)]
pub struct IntUniformOperator {
    id: IntId,
    weight: f64,
}

impl IntUniformOperator {
    /// Uniform resampler over the parameter's bound interval.
    pub fn new(state: &State, id: IntId) -> Result<Self, ConfigError> {
        let p = state.int(id);
        if p.lower() == i64::MIN || p.upper() == i64::MAX {
            return Err(ConfigError::UnboundedParameter {
                lower: p.lower() as f64,
                upper: p.upper() as f64,
            });
        }
        Ok(Self { id, weight: 1.0 })
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for IntUniformOperator {
    fn name(&self) -> &str {
        "IntUniformOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let p = state.int_mut(self.id);
        let index = rng.random_range(0..p.dimension());
        let new = rng.random_range(p.lower()..=p.upper());
        p.set_value(index, new);
        0.0
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        vec![self.id.id()]
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{IntParameter, RealParameter};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn draws_stay_inside_the_bounds() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![0.5; 3], 0.2, 0.8).unwrap());
        let mut op = UniformOperator::new(&state, id)
            .unwrap()
            .with_how_many(&state, 2)
            .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(13);
        for _ in 0..200 {
            assert_eq!(op.propose(&mut state, &mut rng), 0.0);
            for &v in state.real(id).values() {
                assert!((0.2..=0.8).contains(&v));
            }
        }
    }

    #[test]
    fn unbounded_parameter_is_a_config_error() {
        let mut state = State::new();
        let id =
            state.add_real(RealParameter::new(vec![0.0], f64::NEG_INFINITY, 1.0).unwrap());
        assert!(matches!(
            UniformOperator::new(&state, id),
            Err(ConfigError::UnboundedParameter { .. })
        ));
    }

    #[test]
    fn how_many_beyond_the_dimension_is_a_config_error() {
        let mut state = State::new();
        let id = state.add_real(RealParameter::new(vec![0.5; 3], 0.0, 1.0).unwrap());
        assert!(matches!(
            UniformOperator::new(&state, id)
                .unwrap()
                .with_how_many(&state, 4),
            Err(ConfigError::DimensionOutOfRange { .. })
        ));
    }

    #[test]
    fn integer_draws_cover_the_closed_interval() {
        let mut state = State::new();
        let id = state.add_int(IntParameter::new(vec![2], 0, 3).unwrap());
        let mut op = IntUniformOperator::new(&state, id).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(29);
        let mut seen = [false; 4];
        for _ in 0..200 {
            op.propose(&mut state, &mut rng);
            seen[state.int(id).value(0) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
