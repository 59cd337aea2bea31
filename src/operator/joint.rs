//! Compose several operators into one joint proposal.

use rand::RngCore;

use crate::error::ConfigError;
use crate::operator::Operator;
use crate::state::{State, StateNodeId};

/// Runs a sequence of sub-operators as a single proposal.
///
/// The log Hastings ratios add. A sub-proposal returning `NEG_INFINITY`
/// aborts the whole move; the driver then restores every declared node, so
/// earlier sub-proposals are rolled back too. Between sub-proposals the
/// nodes touched so far are flagged for recalculation, so later
/// sub-operators observe what earlier ones wrote.
pub struct JointOperator {
    operators: Vec<Box<dyn Operator>>,
    weight: f64,
}

impl JointOperator {
    /// Compose the given sub-operators, applied in order.
    pub fn new(operators: Vec<Box<dyn Operator>>) -> Result<Self, ConfigError> {
        if operators.is_empty() {
            return Err(ConfigError::NoStateNodes);
        }
        Ok(Self {
            operators,
            weight: 1.0,
        })
    }

    /// Set the scheduling weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// The composed sub-operators.
    pub fn operators(&self) -> &[Box<dyn Operator>] {
        &self.operators
    }
}

impl Operator for JointOperator {
    fn name(&self) -> &str {
        "JointOperator"
    }

    fn propose(&mut self, state: &mut State, rng: &mut dyn RngCore) -> f64 {
        let mut log_hastings = 0.0;
        let last = self.operators.len() - 1;
        for (i, op) in self.operators.iter_mut().enumerate() {
            let hr = op.propose(state, rng);
            if hr == f64::NEG_INFINITY {
                return f64::NEG_INFINITY;
            }
            log_hastings += hr;
            if i < last {
                state.force_recalculation(&op.state_nodes());
            }
        }
        log_hastings
    }

    fn optimize(&mut self, log_alpha: f64) {
        for op in &mut self.operators {
            op.optimize(log_alpha);
        }
    }

    fn state_nodes(&self) -> Vec<StateNodeId> {
        let mut ids: Vec<StateNodeId> = self
            .operators
            .iter()
            .flat_map(|op| op.state_nodes())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn accept(&mut self) {
        for op in &mut self.operators {
            op.accept();
        }
    }

    fn reject(&mut self) {
        for op in &mut self.operators {
            op.reject();
        }
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{ScaleMode, ScaleOperator};
    use crate::state::RealParameter;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn ratios_add_and_node_sets_union() {
        let mut state = State::new();
        let a = state.add_real(RealParameter::new(vec![1.0], 0.0, f64::INFINITY).unwrap());
        let b = state.add_real(RealParameter::new(vec![2.0], 0.0, f64::INFINITY).unwrap());
        let op_a = ScaleOperator::parameter(a, 0.8)
            .unwrap()
            .with_mode(ScaleMode::AllSameFactor);
        let op_b = ScaleOperator::parameter(b, 0.8)
            .unwrap()
            .with_mode(ScaleMode::AllSameFactor);
        let mut joint = JointOperator::new(vec![Box::new(op_a), Box::new(op_b)]).unwrap();
        assert_eq!(joint.state_nodes(), vec![a.id(), b.id()]);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(51);
        let hr = joint.propose(&mut state, &mut rng);
        // each one-dimensional scale contributes (1 - 2) * ln(scale)
        let scale_a = state.real(a).value(0);
        let scale_b = state.real(b).value(0) / 2.0;
        assert!((hr - (-scale_a.ln() - scale_b.ln())).abs() < 1e-9);
    }

    #[test]
    fn first_rejection_aborts_the_move() {
        let mut state = State::new();
        let a = state.add_real(RealParameter::new(vec![0.0], 0.0, 1.0).unwrap());
        let b = state.add_real(RealParameter::new(vec![0.5], 0.0, 1.0).unwrap());
        // a holds only a zero, so single-index scaling always rejects
        let op_a = ScaleOperator::parameter(a, 0.8).unwrap();
        let op_b = ScaleOperator::parameter(b, 0.8).unwrap();
        let mut joint = JointOperator::new(vec![Box::new(op_a), Box::new(op_b)]).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(53);
        assert_eq!(joint.propose(&mut state, &mut rng), f64::NEG_INFINITY);
        // the second operator never ran
        assert_eq!(state.real(b).value(0), 0.5);
    }

    #[test]
    fn empty_composition_is_a_config_error() {
        assert!(JointOperator::new(vec![]).is_err());
    }
}
