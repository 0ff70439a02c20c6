//! Simulation core for classic neural networks.
//!
//! Everything lives in a [`core::network::Network`] arena: neurons and synapses are
//! addressed by copyable ids, groups are ordered id lists, and topology networks
//! (Hopfield, SOM, competitive, echo state, feed-forward, SRN, BPTT) wire groups together
//! and define their own `update`. Trainers consume `ndarray` matrices and adjust weights.

pub mod config;
pub mod core;
pub mod error;

pub use error::{Result, SimError};
