//! Error type shared by every module of the crate.

use crate::core::network::{NeuronId, SynapseId};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised while building, configuring or training a network.
///
/// All of these are configuration errors surfaced at the boundary where data or
/// topology is handed over. Numeric edge cases during a run are never errors.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("neuron {0} does not exist")]
    MissingNeuron(NeuronId),

    #[error("synapse {0} does not exist")]
    MissingSynapse(SynapseId),

    #[error("neuron {0} is already a member of this group")]
    DuplicateMember(NeuronId),

    #[error("a synapse from {0} to {1} already exists")]
    DuplicateSynapse(NeuronId, NeuronId),

    #[error("the {0} layer has already been set")]
    LayerAlreadySet(&'static str),

    #[error("{0} data not initialized")]
    DataNotInitialized(&'static str),

    #[error("matrix is singular: {0}")]
    SingularMatrix(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown rule type: {0}")]
    UnknownRule(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Snapshot(String),
}

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        SimError::Config(err.to_string())
    }
}

impl From<bincode::Error> for SimError {
    fn from(err: bincode::Error) -> Self {
        SimError::Snapshot(err.to_string())
    }
}

impl SimError {
    /// Shorthand for a [`SimError::DimensionMismatch`].
    pub fn mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        SimError::DimensionMismatch {
            what,
            expected,
            actual,
        }
    }

    /// Shorthand for a [`SimError::InvalidParameter`].
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SimError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
