//! # Qforge - Q-Learning with Pluggable Neural-Network Backends
//!
//! Qforge is a reinforcement-learning crate built around one idea: the
//! Q-learning agent should not care which numeric engine computes its
//! gradients. A declarative [`LayerSpec`](layers::LayerSpec) describes the
//! network topology once, and interchangeable backends (a hand-rolled
//! `ndarray` engine and a `burn` engine) each turn it into their own
//! computation graph while satisfying a common contract for inference,
//! updates, seeding, and checkpointing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ndarray::array;
//! use qforge::agent::{DqnAgent, DqnConfig};
//!
//! // An agent with 2 actions over 4-dimensional states, backed by the
//! // ndarray engine and the default two-hidden-layer topology.
//! let config = DqnConfig::new("models/saved", "cartpole");
//! let mut agent = DqnAgent::new(2, 4, config).unwrap();
//!
//! let state = array![0.1, -0.2, 0.3, -0.1];
//! let action = agent.choose_action(state.view(), &[]).unwrap();
//!
//! // ... step the environment ...
//! let next_state = array![0.15, -0.25, 0.35, -0.05];
//! agent
//!     .learn(state.view(), action, 1.0, next_state.view(), false, false)
//!     .unwrap();
//!
//! agent.save().unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - The Q-learning agent (epsilon-greedy exploration, Bellman
//!   targets, checkpointing)
//! - [`backend`] - The backend contract, the concrete numeric engines, and
//!   the identifier-based factory
//! - [`error`] - Error types and result handling
//! - [`layers`] - Declarative layer specifications

pub mod agent;
pub mod backend;
pub mod error;
pub mod layers;

#[cfg(test)]
mod tests;
