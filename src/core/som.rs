//! Self-organizing map.
//!
//! A `SomGroup` is a layer of linear neurons laid out on a hexagonal grid. On every tick:
//! - The winner is the neuron whose incoming weight vector has the smallest squared
//!   Euclidean distance to the current source activations. Exact ties go to the lowest
//!   index.
//! - The winner's activation becomes 1 and every other activation 0.
//! - Every neuron whose layout position lies within `neighborhood_size` of the winner moves
//!   its incoming weights towards the input: `w += alpha * (input - w)`.
//! - `alpha` decays exponentially and `neighborhood_size` linearly, floored at 0. A
//!   neighborhood of 0 leaves only the winner learning.
//!
//! `SomNetwork` adds an input layer wired all-to-all into the map, and batch training over
//! a data matrix.

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::{distance, Layout},
    network::{Network, NeuronId},
    neuron_rules::NeuronRule,
};
use crate::error::{Result, SimError};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SomParams {
    /// Size of the map layer.
    pub num_neurons: usize,

    /// Learning rate at the start of training and after a reset.
    pub init_alpha: f64,

    /// Radius, in layout units, of the neighborhood that learns along with the winner.
    pub init_neighborhood_size: f64,

    /// Fraction of `alpha` lost after every tick: `alpha -= alpha * rate`.
    pub alpha_decay_rate: f64,

    /// Subtracted from the neighborhood radius after every tick. The radius never drops
    /// below 0.
    pub neighborhood_decay_amount: f64,

    /// Epochs run by [`SomNetwork::train`].
    pub batch_size: usize,

    pub layout: Layout,
}

impl Default for SomParams {
    fn default() -> Self {
        Self {
            num_neurons: 16,
            init_alpha: 0.06,
            init_neighborhood_size: 100.0,
            alpha_decay_rate: 0.002,
            neighborhood_decay_amount: 0.05,
            batch_size: 100,
            layout: Layout::Hexagonal {
                columns: Some(5),
                spacing: 50.0,
            },
        }
    }
}

/// The map layer of a SOM.
pub struct SomGroup {
    pub neurons: NeuronGroup,

    /// Learning rate restored by `reset`.
    pub init_alpha: f64,

    /// Neighborhood size restored by `reset`.
    pub init_neighborhood_size: f64,

    pub alpha_decay_rate: f64,
    pub neighborhood_decay_amount: f64,
    pub batch_size: usize,

    alpha: f64,
    neighborhood_size: f64,
    winner: Option<usize>,
}

impl SomGroup {
    /// Adds the map neurons to the network and lays them out.
    pub fn new(net: &mut Network, params: &SomParams) -> Self {
        let neurons = NeuronGroup::create(net, "SOM", params.num_neurons, NeuronRule::linear());
        neurons.apply_layout(net, &params.layout, (0.0, 0.0));
        Self {
            neurons,
            init_alpha: params.init_alpha,
            init_neighborhood_size: params.init_neighborhood_size,
            alpha_decay_rate: params.alpha_decay_rate,
            neighborhood_decay_amount: params.neighborhood_decay_amount,
            batch_size: params.batch_size,
            alpha: params.init_alpha,
            neighborhood_size: params.init_neighborhood_size,
            winner: None,
        }
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn neighborhood_size(&self) -> f64 {
        self.neighborhood_size
    }

    /// Sets both the initial and the current learning rate.
    pub fn set_init_alpha(&mut self, alpha: f64) {
        self.init_alpha = alpha;
        self.alpha = alpha;
    }

    /// Sets both the initial and the current neighborhood size.
    pub fn set_init_neighborhood_size(&mut self, size: f64) {
        self.init_neighborhood_size = size;
        self.neighborhood_size = size;
    }

    /// Index within the group of the last winner.
    pub fn winner(&self) -> Option<usize> {
        self.winner
    }

    /// Restores the initial learning rate and neighborhood size.
    pub fn reset(&mut self) {
        self.alpha = self.init_alpha;
        self.neighborhood_size = self.init_neighborhood_size;
    }

    /// Squared distance between a neuron's incoming weights and its sources' activations.
    #[inline]
    fn weight_distance(net: &Network, id: NeuronId) -> f64 {
        net.neuron(id)
            .fan_in()
            .iter()
            .map(|&s| {
                let synapse = net.synapse(s);
                (synapse.strength - net.neuron(synapse.source()).activation).powi(2)
            })
            .sum()
    }

    /// Finds the winner. Lowest index wins exact ties.
    pub fn compute_winner(&self, net: &Network) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (i, &id) in self.neurons.ids().iter().enumerate() {
            let d = Self::weight_distance(net, id);
            if d < best_distance {
                best_distance = d;
                best = i;
            }
        }
        best
    }

    /// One tick: competition, winner-take-all activations, neighborhood learning, decay.
    pub fn update(&mut self, net: &mut Network) {
        if self.neurons.is_empty() {
            return;
        }
        let winner = self.compute_winner(net);
        self.winner = Some(winner);
        for (i, &id) in self.neurons.ids().iter().enumerate() {
            net.neuron_mut(id)
                .set_activation(if i == winner { 1.0 } else { 0.0 });
        }

        let center = net.neuron(self.neurons.get(winner)).position;
        for &id in self.neurons.ids() {
            if distance(net.neuron(id).position, center) > self.neighborhood_size {
                continue;
            }
            for k in 0..net.neuron(id).fan_in().len() {
                let s = net.neuron(id).fan_in()[k];
                let input = net.neuron(net.synapse(s).source()).activation;
                let synapse = net.synapse_mut(s);
                synapse.strength += self.alpha * (input - synapse.strength);
            }
        }

        self.alpha -= self.alpha * self.alpha_decay_rate;
        self.neighborhood_size = (self.neighborhood_size - self.neighborhood_decay_amount).max(0.0);
    }

    /// Sets every incoming weight uniformly in `[0, upper bound)` and raises the lower bound
    /// to 0.
    pub fn randomize_incoming_weights(&self, net: &mut Network) {
        for &id in self.neurons.ids() {
            for k in 0..net.neuron(id).fan_in().len() {
                let s = net.neuron(id).fan_in()[k];
                let upper = net.synapse(s).upper_bound;
                let value = if upper > 0.0 {
                    net.rand.random_range(0.0..upper)
                } else {
                    0.0
                };
                let synapse = net.synapse_mut(s);
                synapse.lower_bound = 0.0;
                synapse.strength = value;
            }
        }
    }

    /// Writes the weight vector of the most active map neuron back into its sources, which
    /// reconstructs the prototype that neuron has learned.
    pub fn recall(&self, net: &mut Network) {
        let mut best: Option<(NeuronId, f64)> = None;
        for &id in self.neurons.ids() {
            let activation = net.neuron(id).activation;
            if activation > 0.0 && best.map_or(true, |(_, a)| activation > a) {
                best = Some((id, activation));
            }
        }
        let Some((id, _)) = best else {
            return;
        };
        for k in 0..net.neuron(id).fan_in().len() {
            let s = net.neuron(id).fan_in()[k];
            let (source, strength) = {
                let synapse = net.synapse(s);
                (synapse.source(), synapse.strength)
            };
            net.neuron_mut(source).set_activation(strength);
        }
    }
}

/// An input layer feeding a SOM layer.
pub struct SomNetwork {
    pub input: NeuronGroup,
    pub som: SomGroup,
    pub weights: SynapseGroup,
}

impl SomNetwork {
    pub fn new(net: &mut Network, num_inputs: usize, params: &SomParams) -> Result<Self> {
        if num_inputs == 0 || params.num_neurons == 0 {
            return Err(SimError::invalid("SOM size", "input and map layers must be non-empty"));
        }
        let som = SomGroup::new(net, params);
        let input = NeuronGroup::create(net, "SOM input", num_inputs, NeuronRule::Clamped);
        input.set_clamped(net, true);
        input.apply_layout(net, &Layout::Line { spacing: 50.0 }, (0.0, -150.0));

        let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: false });
        let weights = SynapseGroup::connect(net, "SOM weights", &input, &som.neurons, &connector)?;
        som.randomize_incoming_weights(net);
        debug!(inputs = num_inputs, map = params.num_neurons, "built SOM network");
        Ok(Self { input, som, weights })
    }

    /// One tick of the map. Input activations are whatever was last set.
    pub fn update(&mut self, net: &mut Network) {
        self.som.update(net);
    }

    /// Presents each row of `data` once per epoch for `batch_size` epochs.
    pub fn train(&mut self, net: &mut Network, data: &Array2<f64>) -> Result<()> {
        if data.ncols() != self.input.len() {
            return Err(SimError::mismatch("SOM training columns", self.input.len(), data.ncols()));
        }
        for epoch in 0..self.som.batch_size {
            for row in data.rows() {
                self.input.set_activations(net, &row.to_vec())?;
                self.som.update(net);
            }
            debug!(
                epoch,
                alpha = self.som.alpha(),
                neighborhood = self.som.neighborhood_size(),
                "SOM epoch"
            );
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.som.reset();
    }

    pub fn randomize(&self, net: &mut Network) {
        self.som.randomize_incoming_weights(net);
    }

    pub fn recall(&self, net: &mut Network) {
        self.som.recall(net);
    }
}
