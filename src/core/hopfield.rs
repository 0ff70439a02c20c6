//! A discrete Hopfield network: one fully connected group of binary neurons without self
//! loops, trained with the outer-product Hebbian rule.
//!
//! The update strategy is fixed per instance:
//! - `Sequential`: neurons are visited in group order (or by update priority) and each one
//!   commits its new state immediately, so later neurons see earlier results.
//! - `Random`: the same, with the visiting order reshuffled on every tick.
//! - `Synchronous`: every neuron computes its next state from the previous snapshot, then
//!   all states are committed together.

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::Layout,
    network::{Network, NeuronId},
    neuron::Neuron,
    neuron_rules::{BinaryRule, NeuronRule},
    random::Randomizer,
};
use crate::error::{Result, SimError};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Order in which Hopfield neurons are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopfieldUpdate {
    Sequential { by_priority: bool },
    Random,
    Synchronous,
}

impl Default for HopfieldUpdate {
    fn default() -> Self {
        HopfieldUpdate::Sequential { by_priority: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopfieldParams {
    pub num_neurons: usize,
    pub update: HopfieldUpdate,

    /// Range of the symmetric weights drawn by `randomize`.
    pub randomizer: Randomizer,

    pub layout: Layout,
}

impl Default for HopfieldParams {
    fn default() -> Self {
        Self {
            num_neurons: 16,
            update: HopfieldUpdate::default(),
            randomizer: Randomizer::Uniform {
                lower: -1.0,
                upper: 1.0,
            },
            layout: Layout::Grid {
                columns: None,
                h_spacing: 50.0,
                v_spacing: 50.0,
            },
        }
    }
}

pub struct Hopfield {
    pub neurons: NeuronGroup,
    pub synapses: SynapseGroup,
    pub update_mode: HopfieldUpdate,
    pub randomizer: Randomizer,
}

impl Hopfield {
    /// Builds a network of `num_neurons` with default parameters.
    pub fn new(net: &mut Network, num_neurons: usize) -> Result<Self> {
        Self::with_params(
            net,
            &HopfieldParams {
                num_neurons,
                ..HopfieldParams::default()
            },
        )
    }

    /// Builds the group, connects it all-to-all without self loops and zeroes the weights.
    pub fn with_params(net: &mut Network, params: &HopfieldParams) -> Result<Self> {
        if params.num_neurons == 0 {
            return Err(SimError::invalid("num_neurons", "a Hopfield network needs neurons"));
        }
        let neurons = NeuronGroup::create(
            net,
            "Hopfield",
            params.num_neurons,
            NeuronRule::Binary(BinaryRule::default()),
        );
        neurons.set_bounds(net, -1.0, 1.0);
        neurons.apply_layout(net, &params.layout, (0.0, 0.0));

        let connector =
            Connector::new(ConnectionPattern::AllToAll { allow_self: false }).with_strength(0.0);
        let synapses = SynapseGroup::connect(net, "Hopfield weights", &neurons, &neurons, &connector)?;
        debug!(
            neurons = neurons.len(),
            synapses = synapses.len(),
            "built Hopfield network"
        );
        Ok(Self {
            neurons,
            synapses,
            update_mode: params.update,
            randomizer: params.randomizer,
        })
    }

    pub fn size(&self) -> usize {
        self.neurons.len()
    }

    /// Removes a neuron with its synapses from the network and from both groups.
    pub fn remove_neuron(&mut self, net: &mut Network, id: NeuronId) -> Option<Neuron> {
        let neuron = self.neurons.remove_from(net, id)?;
        let dropped = self.synapses.prune(net);
        debug!(neuron = %id, synapses = dropped, "removed Hopfield neuron");
        Some(neuron)
    }

    /// Runs one tick with the configured update strategy.
    pub fn update(&self, net: &mut Network) {
        match self.update_mode {
            HopfieldUpdate::Synchronous => self.neurons.update(net),
            HopfieldUpdate::Sequential { by_priority } => {
                let mut order = self.neurons.ids().to_vec();
                if by_priority {
                    order.sort_by_key(|&id| net.neuron(id).update_priority);
                }
                Self::update_in_order(net, &order);
            }
            HopfieldUpdate::Random => {
                let mut order = self.neurons.ids().to_vec();
                order.shuffle(&mut net.rand);
                Self::update_in_order(net, &order);
            }
        }
    }

    #[inline]
    fn update_in_order(net: &mut Network, order: &[NeuronId]) {
        for &id in order {
            net.update_neuron(id);
            net.neuron_mut(id).commit();
        }
    }

    /// Adds the outer product of the current activations to the weights:
    /// `strength += source * target` on every synapse.
    pub fn train_on_current_pattern(&self, net: &mut Network) {
        for &id in self.synapses.ids() {
            let (source, target) = {
                let synapse = net.synapse(id);
                (synapse.source(), synapse.target())
            };
            let delta = net.neuron(source).activation * net.neuron(target).activation;
            net.synapse_mut(id).strength += delta;
        }
    }

    /// Stores each pattern in turn. The activations are left at the last pattern.
    pub fn train(&self, net: &mut Network, patterns: &[Vec<f64>]) -> Result<()> {
        for pattern in patterns {
            self.neurons.set_activations(net, pattern)?;
            self.train_on_current_pattern(net);
        }
        debug!(patterns = patterns.len(), "stored Hopfield patterns");
        Ok(())
    }

    /// Draws symmetric random weights.
    pub fn randomize(&self, net: &mut Network) {
        self.synapses.randomize_symmetric(net, &self.randomizer);
    }

    pub fn clear_weights(&self, net: &mut Network) {
        self.synapses.clear(net);
    }

    /// Energy `-1/2 * sum w_ij a_i a_j` of the current state. Never increases under
    /// sequential updates with symmetric weights.
    pub fn energy(&self, net: &Network) -> f64 {
        let sum: f64 = self
            .synapses
            .ids()
            .iter()
            .map(|&id| {
                let synapse = net.synapse(id);
                synapse.strength
                    * net.neuron(synapse.source()).activation
                    * net.neuron(synapse.target()).activation
            })
            .sum();
        -0.5 * sum
    }
}
