//! Swap values between randomly chosen dimensions of a parameter.

use rand::RngCore;

use crate::error::ConfigError;
use crate::operator::{sample_distinct, Operator};
use crate::state::{BoolId, IntId, RealId, State, StateNodeId};

#[derive(Debug, Clone, Copy)]
enum Target {
    Real(RealId),
    Int(IntId),
    Bool(BoolId),
}

/// Exchanges the values at `how_many` disjoint random index pairs.
///
/// The pair indices are sampled without replacement, so one proposal never
/// touches the same dimension twice. Swapping is a permutation of the
/// current values, so bounds cannot be violated and the Hastings ratio is
/// always 0.
#[derive(Debug, Clone)]
pub struct SwapOperator {
    target: Target,
    dim: usize,
    how_many: usize,
    weight: f64,
}

impl SwapOperator {
    /// Swap operator over a real parameter.
    pub fn real(state: &State, id: RealId) -> Result<Self, ConfigError> {
        Self::with_target(Target::Real(id), state.real(id).dimension())
    }

    /// Swap operator over an integer parameter.
    pub fn int(state: &State, id: IntId) -> Result<Self, ConfigError> {
        Self::with_target(Target::Int(id), state.int(id).dimension())
    }

    /// Swap operator over a boolean parameter.
    pub fn bool(state: &State, id: BoolId) -> Result<Self, ConfigError> {
        Self::with_target(Target::Bool(id), state.bool(id).dimension())
    }

    fn with_target(target: Target, dim: usize) -> Result<Self, ConfigError> {
        if dim < 2 {
            return Err(ConfigError::InvalidParameter(
                "swap needs a parameter with at least two dimensions".into(),
            ));
        }
        Ok(Self {
            target,
            dim,
            how_many: 1,
            weight: 1.0,
        })
    }

    /// Swap several disjoint pairs per proposal. Bounded by half the
    /// dimension, since the pairs must not share indices.
    pub fn with_how_many(mut self, how_many: usize) -> Result<Self, ConfigError> {
        if how_many == 0 || how_many > self.dim / 2 {
            return Err(ConfigError::DimensionOutOfRange {
                name: "how_many",
                value: how_many,
                dim: self.dim,
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

impl Operator for SwapOperator {
    fn name(&self) -> &str {
        "SwapOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let indices = sample_distinct(self.dim, 2 * self.how_many, rng);
        for pair in indices.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            match self.target {
                Target::Real(id) => state.real_mut(id).swap(a, b),
                Target::Int(id) => state.int_mut(id).swap(a, b),
                Target::Bool(id) => state.bool_mut(id).swap(a, b),
            }
        }
        0.0
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        match self.target {
            Target::Real(id) => vec![id.id()],
            Target::Int(id) => vec![id.id()],
            Target::Bool(id) => vec![id.id()],
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}
