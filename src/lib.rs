//! # phylo-operators
//!
//! Metropolis-Hastings proposal kernels for Bayesian phylogenetic MCMC.
//!
//! This crate provides the operator layer of a phylogenetic sampler: the
//! moves that perturb a [`State`](state::State) of real, integer and
//! boolean parameters and time-calibrated trees, each returning the exact
//! log Hastings ratio the acceptance step needs. The driver loop itself is
//! out of scope; the contract it must follow is documented on
//! [`Operator`](operator::Operator).
//!
//! - Parameter moves live in [`operator`]: scalers, random walks, delta
//!   exchange, bit flips, slice sampling and friends.
//! - Topology and node-height moves live in [`tree_operator`]: exchange,
//!   subtree slide, Wilson-Balding, tip date moves and the gene-tree
//!   constrained reheight.
//!
//! Ratio conventions: `f64::NEG_INFINITY` means the proposal rejects
//! outright and the driver must restore the touched state nodes; this is a
//! routine outcome, not an error. `f64::INFINITY` marks a Gibbs-style
//! exact sampler whose proposals are always accepted.
//!
//! ## Quick start
//!
//! ```
//! use phylo_operators::operator::{Operator, ScaleOperator};
//! use phylo_operators::state::{RealParameter, State};
//! use rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256PlusPlus;
//!
//! let mut state = State::new();
//! let rate = state.add_real(RealParameter::new(vec![1.0], 0.0, f64::INFINITY)?);
//! let mut op = ScaleOperator::parameter(rate, 0.75)?;
//!
//! let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
//! let nodes = op.state_nodes();
//! state.store_nodes(&nodes);
//! let log_hastings = op.propose(&mut state, &mut rng);
//! if log_hastings == f64::NEG_INFINITY {
//!     state.restore_nodes(&nodes);
//! }
//! # Ok::<(), phylo_operators::error::ConfigError>(())
//! ```
//!
//! Operators that carry a tuning scalar adapt it toward a target
//! acceptance rate through [`Operator::optimize`](operator::Operator::optimize);
//! snapshot and restore the adaptation across chain checkpoints with
//! [`Operator::tuning_stats`](operator::Operator::tuning_stats).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod operator;
pub mod state;
pub mod tree_operator;

pub use error::{ConfigError, TopologyError};
pub use operator::{Operator, TuningStats, DEFAULT_TARGET_ACCEPTANCE};
pub use state::{State, StateNodeId};
