//! Plain-data snapshots of a network's dynamic state.
//!
//! A snapshot holds what changes while a network runs: the clock, neuron activations and
//! buffers, spike bookkeeping, synapse strengths and responder state. Structure (which
//! neurons and synapses exist, rules and bounds) is not captured, so a snapshot can only be
//! restored into a network with the same slots.

use super::{
    network::{Network, NeuronId, SynapseId},
    spike_responders::SpikeResponder,
};
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronState {
    pub activation: f64,
    pub buffer: f64,
    pub input: f64,
    pub spiked: bool,
    pub last_spike: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseState {
    pub strength: f64,
    pub psr: f64,
    pub responder: Option<SpikeResponder>,
}

/// State of every slot in a network. Removed slots are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub time: f64,
    pub iteration: u64,
    pub neurons: Vec<Option<NeuronState>>,
    pub synapses: Vec<Option<SynapseState>>,
}

impl NetworkSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}

impl Network {
    pub fn snapshot(&self) -> NetworkSnapshot {
        let neurons = self
            .neuron_slots()
            .iter()
            .map(|slot| {
                slot.as_ref().map(|n| NeuronState {
                    activation: n.activation,
                    buffer: n.buffer(),
                    input: n.input(),
                    spiked: n.spiked(),
                    last_spike: n.last_spike(),
                })
            })
            .collect();
        let synapses = self
            .synapse_slots()
            .iter()
            .map(|slot| {
                slot.as_ref().map(|s| SynapseState {
                    strength: s.strength,
                    psr: s.psr(),
                    responder: s.responder,
                })
            })
            .collect();
        NetworkSnapshot {
            time: self.time(),
            iteration: self.iteration(),
            neurons,
            synapses,
        }
    }

    /// Writes a snapshot back. The network is left untouched if the snapshot does not fit.
    pub fn restore(&mut self, snapshot: &NetworkSnapshot) -> Result<()> {
        let (neuron_slots, synapse_slots) = (self.neuron_slots().len(), self.synapse_slots().len());
        if snapshot.neurons.len() != neuron_slots {
            return Err(SimError::mismatch("snapshot neurons", neuron_slots, snapshot.neurons.len()));
        }
        if snapshot.synapses.len() != synapse_slots {
            return Err(SimError::mismatch(
                "snapshot synapses",
                synapse_slots,
                snapshot.synapses.len(),
            ));
        }
        for (i, (slot, state)) in self.neuron_slots().iter().zip(&snapshot.neurons).enumerate() {
            if slot.is_some() != state.is_some() {
                return Err(SimError::MissingNeuron(NeuronId(i)));
            }
        }
        for (i, (slot, state)) in self.synapse_slots().iter().zip(&snapshot.synapses).enumerate() {
            if slot.is_some() != state.is_some() {
                return Err(SimError::MissingSynapse(SynapseId(i)));
            }
        }

        for (i, state) in snapshot.neurons.iter().enumerate() {
            if let Some(state) = state {
                let neuron = self.neuron_mut(NeuronId(i));
                neuron.activation = state.activation;
                neuron.restore_state(state.buffer, state.input, state.spiked, state.last_spike);
            }
        }
        for (i, state) in snapshot.synapses.iter().enumerate() {
            if let Some(state) = state {
                let synapse = self.synapse_mut(SynapseId(i));
                synapse.strength = state.strength;
                synapse.responder = state.responder;
                synapse.set_psr(state.psr);
            }
        }
        self.set_clock(snapshot.time, snapshot.iteration);
        debug!(
            neurons = snapshot.neurons.len(),
            synapses = snapshot.synapses.len(),
            iteration = snapshot.iteration,
            "restored snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::neuron_rules::NeuronRule;

    fn chain() -> Network {
        let mut net = Network::new();
        let ids = net.add_neurons(3, NeuronRule::linear());
        net.connect(ids[0], ids[1], 0.5).unwrap();
        net.connect(ids[1], ids[2], -0.25).unwrap();
        net.neuron_mut(ids[0]).clamped = true;
        net.neuron_mut(ids[0]).set_activation(1.0);
        net
    }

    #[test]
    fn restore_rewinds_the_run() {
        let mut net = chain();
        net.update();
        let snap = net.snapshot();
        net.update();
        let expected = net.snapshot();

        net.synapse_mut(SynapseId(0)).strength = 3.0;
        net.update();
        net.restore(&snap).unwrap();
        assert_eq!(net.iteration(), 1);
        net.update();
        assert_eq!(net.snapshot(), expected);
    }

    #[test]
    fn bytes_round_trip() {
        let mut net = chain();
        net.update();
        let snap = net.snapshot();
        let decoded = NetworkSnapshot::from_bytes(&snap.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn snapshot_must_match_slots() {
        let mut net = chain();
        let snap = net.snapshot();
        net.add_neurons(1, NeuronRule::linear());
        assert!(matches!(
            net.restore(&snap),
            Err(SimError::DimensionMismatch { .. })
        ));

        let mut net = chain();
        let snap = net.snapshot();
        net.remove_neuron(NeuronId(2));
        assert!(matches!(net.restore(&snap), Err(SimError::MissingNeuron(NeuronId(2)))));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            NetworkSnapshot::from_bytes(&[1, 2, 3]),
            Err(SimError::Snapshot(_))
        ));
    }
}
