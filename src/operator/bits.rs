//! Moves on boolean indicator parameters.

use rand::{Rng, RngCore};

use crate::error::ConfigError;
use crate::operator::Operator;
use crate::state::{BoolId, State, StateNodeId};

/// Flips one randomly chosen bit of a boolean parameter.
///
/// Plain mode treats the flip as symmetric and reports ratio 0. Uniform
/// mode keeps every number-of-set-bits class equiprobable, which needs a
/// correction: with `s` bits set out of `dim` before the flip, turning a
/// bit on contributes `-log((dim - s) / (s + 1))` and turning one off
/// `-log(s / (dim - s + 1))`.
#[derive(Debug, Clone)]
pub struct BitFlipOperator {
    id: BoolId,
    uniform: bool,
    weight: f64,
}

impl BitFlipOperator {
    /// Plain bit flip, ratio 0.
    pub fn new(id: BoolId) -> Self {
        Self {
            id,
            uniform: false,
            weight: 1.0,
        }
    }

    /// Apply the uniform-over-bit-count Hastings correction.
    pub fn uniform(mut self) -> Self {
        self.uniform = true;
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for BitFlipOperator {
    fn name(&self) -> &str {
        "BitFlipOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let p = state.bool_mut(self.id);
        let dim = p.dimension();
        let sum = p.sum() as f64;
        let pos = rng.random_range(0..dim);
        let was_set = p.value(pos);
        p.set_value(pos, !was_set);
        if !self.uniform {
            return 0.0;
        }
        let dim = dim as f64;
        if was_set {
            -(sum / (dim - sum + 1.0)).ln()
        } else {
            -((dim - sum) / (sum + 1.0)).ln()
        }
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        vec![self.id.id()]
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Relocates `bits_to_move` set bits to randomly chosen clear positions.
///
/// Each move draws one set bit and one clear bit uniformly and exchanges
/// them, so the number of set bits is conserved and the kernel is
/// symmetric. If the parameter is all zeros or all ones there is nothing to
/// move and the proposal rejects.
#[derive(Debug, Clone)]
pub struct BitMoveOperator {
    id: BoolId,
    bits_to_move: usize,
    weight: f64,
}

impl BitMoveOperator {
    /// Bit move over the given boolean parameter, relocating one bit per
    /// proposal.
    pub fn new(state: &State, id: BoolId) -> Result<Self, ConfigError> {
        if state.bool(id).dimension() < 2 {
            return Err(ConfigError::InvalidParameter(
                "bit move needs a parameter with at least two dimensions".into(),
            ));
        }
        Ok(Self {
            id,
            bits_to_move: 1,
            weight: 1.0,
        })
    }

    /// Relocate several bits per proposal.
    pub fn with_bits_to_move(mut self, bits_to_move: usize) -> Self {
        self.bits_to_move = bits_to_move.max(1);
        self
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Operator for BitMoveOperator {
    fn name(&self) -> &str {
        "BitMoveOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let p = state.bool_mut(self.id);
        for _ in 0..self.bits_to_move {
            let set: Vec<usize> = (0..p.dimension()).filter(|&i| p.value(i)).collect();
            let clear: Vec<usize> = (0..p.dimension()).filter(|&i| !p.value(i)).collect();
            if set.is_empty() || clear.is_empty() {
                return f64::NEG_INFINITY;
            }
            let from = set[rng.random_range(0..set.len())];
            let to = clear[rng.random_range(0..clear.len())];
            p.swap(from, to);
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
