//! Competitive learning.
//!
//! The group's neurons compute their weighted input as usual; the most active one wins,
//! takes `win_value` and learns, everyone else takes `lose_value`. Two learning rules:
//!
//! - Rumelhart-Zipser: the winner moves its incoming weights towards the (optionally
//!   normalized) input pattern.
//! - Alvarez-Squire: the winner's weights change by `rate * a_winner * (input - mean input)`,
//!   then every incoming synapse of the group decays a little.
//!
//! With leaky learning enabled, losers also drift towards the input at a lower rate, which
//! keeps units that never win from being stranded.

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::Layout,
    network::{Network, NeuronId},
    neuron_rules::NeuronRule,
    synapse::SynapseTemplate,
};
use crate::error::{Result, SimError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompetitiveRule {
    #[default]
    RumelhartZipser,
    AlvarezSquire,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitiveParams {
    pub num_neurons: usize,

    /// Step the winner takes towards the input.
    pub learning_rate: f64,

    /// Activation given to the winner.
    pub win_value: f64,

    /// Activation given to every other neuron.
    pub lose_value: f64,

    /// Divide the input pattern by its sum before moving towards it.
    pub normalize_inputs: bool,

    /// Let losers drift towards the input at `leaky_learning_rate`.
    pub use_leaky_learning: bool,
    pub leaky_learning_rate: f64,

    /// Fraction of every incoming strength removed after an Alvarez-Squire step.
    pub synapse_decay_percent: f64,

    pub rule: CompetitiveRule,
}

impl Default for CompetitiveParams {
    fn default() -> Self {
        Self {
            num_neurons: 5,
            learning_rate: 0.1,
            win_value: 1.0,
            lose_value: 0.0,
            normalize_inputs: true,
            use_leaky_learning: false,
            leaky_learning_rate: 0.1 / 4.0,
            synapse_decay_percent: 0.0008,
            rule: CompetitiveRule::RumelhartZipser,
        }
    }
}

pub struct CompetitiveGroup {
    pub neurons: NeuronGroup,
    pub params: CompetitiveParams,
    winner: usize,
}

impl CompetitiveGroup {
    pub fn new(net: &mut Network, params: &CompetitiveParams) -> Self {
        let neurons = NeuronGroup::create(
            net,
            "Competitive Group",
            params.num_neurons,
            NeuronRule::linear(),
        );
        neurons.apply_layout(net, &Layout::Line { spacing: 50.0 }, (0.0, 0.0));
        Self {
            neurons,
            params: *params,
            winner: 0,
        }
    }

    /// Index within the group of the last winner.
    pub fn winner(&self) -> usize {
        self.winner
    }

    /// One tick: update, pick the winner, learn.
    pub fn update(&mut self, net: &mut Network) {
        if self.neurons.is_empty() {
            return;
        }
        self.neurons.update(net);

        let mut max = 0.0;
        self.winner = 0;
        for (i, &id) in self.neurons.ids().iter().enumerate() {
            let activation = net.neuron(id).activation;
            if activation > max {
                max = activation;
                self.winner = i;
            }
        }

        for (i, &id) in self.neurons.ids().iter().enumerate() {
            if i == self.winner {
                net.neuron_mut(id).set_activation(self.params.win_value);
                match self.params.rule {
                    CompetitiveRule::RumelhartZipser => {
                        self.move_towards_input(net, id, self.params.learning_rate)
                    }
                    CompetitiveRule::AlvarezSquire => {
                        self.alvarez_squire(net, id);
                        self.decay_all_synapses(net);
                    }
                }
            } else {
                net.neuron_mut(id).set_activation(self.params.lose_value);
                if self.params.use_leaky_learning {
                    self.move_towards_input(net, id, self.params.leaky_learning_rate);
                }
            }
        }
    }

    /// Source activations of `id`'s fan-in, normalized to sum 1 when enabled.
    fn inputs(&self, net: &Network, id: NeuronId) -> Vec<f64> {
        let mut inputs: Vec<f64> = net
            .neuron(id)
            .fan_in()
            .iter()
            .map(|&s| net.neuron(net.synapse(s).source()).activation)
            .collect();
        if self.params.normalize_inputs {
            let sum: f64 = inputs.iter().sum();
            if sum != 0.0 {
                inputs.iter_mut().for_each(|x| *x /= sum);
            }
        }
        inputs
    }

    fn move_towards_input(&self, net: &mut Network, id: NeuronId, rate: f64) {
        let inputs = self.inputs(net, id);
        let fan_in = net.neuron(id).fan_in().to_vec();
        for (s, input) in fan_in.into_iter().zip(inputs) {
            let synapse = net.synapse_mut(s);
            let value = synapse.strength + rate * (input - synapse.strength);
            synapse.strength = synapse.clip(value);
        }
    }

    fn alvarez_squire(&self, net: &mut Network, id: NeuronId) {
        let fan_in = net.neuron(id).fan_in().to_vec();
        if fan_in.is_empty() {
            return;
        }
        let sources: Vec<f64> = fan_in
            .iter()
            .map(|&s| net.neuron(net.synapse(s).source()).activation)
            .collect();
        let mean = sources.iter().sum::<f64>() / sources.len() as f64;
        let target = net.neuron(id).activation;
        for (s, source) in fan_in.into_iter().zip(sources) {
            let synapse = net.synapse_mut(s);
            let delta = self.params.learning_rate * target * (source - mean);
            synapse.strength = synapse.clip(synapse.strength + delta);
        }
    }

    fn decay_all_synapses(&self, net: &mut Network) {
        for &id in self.neurons.ids() {
            for s in net.neuron(id).fan_in().to_vec() {
                net.synapse_mut(s).decay(self.params.synapse_decay_percent);
            }
        }
    }

    /// Divides each neuron's incoming weights by their sum.
    pub fn normalize_incoming_weights(&self, net: &mut Network) {
        for &id in self.neurons.ids() {
            let fan_in = net.neuron(id).fan_in().to_vec();
            let sum: f64 = fan_in.iter().map(|&s| net.synapse(s).strength).sum();
            if sum == 0.0 {
                continue;
            }
            for s in fan_in {
                net.synapse_mut(s).strength /= sum;
            }
        }
    }

    /// Divides every incoming weight of the group by the sum over the whole group.
    pub fn normalize_all_incoming_weights(&self, net: &mut Network) {
        let fan_in: Vec<_> = self
            .neurons
            .ids()
            .iter()
            .flat_map(|&id| net.neuron(id).fan_in().to_vec())
            .collect();
        let sum: f64 = fan_in.iter().map(|&s| net.synapse(s).strength).sum();
        if sum == 0.0 {
            return;
        }
        for s in fan_in {
            net.synapse_mut(s).strength /= sum;
        }
    }

    pub fn randomize_incoming_weights(&self, net: &mut Network) {
        for &id in self.neurons.ids() {
            for s in net.neuron(id).fan_in().to_vec() {
                net.randomize_synapse(s);
            }
        }
    }

    /// Random weights, normalized per neuron.
    pub fn randomize(&self, net: &mut Network) {
        self.randomize_incoming_weights(net);
        self.normalize_incoming_weights(net);
    }
}

/// An input layer feeding a competitive group.
pub struct CompetitiveNetwork {
    pub input: NeuronGroup,
    pub competitive: CompetitiveGroup,
    pub weights: SynapseGroup,
}

impl CompetitiveNetwork {
    pub fn new(net: &mut Network, num_inputs: usize, params: &CompetitiveParams) -> Result<Self> {
        if num_inputs == 0 || params.num_neurons == 0 {
            return Err(SimError::invalid(
                "competitive size",
                "input and competitive layers must be non-empty",
            ));
        }
        let competitive = CompetitiveGroup::new(net, params);
        let input = NeuronGroup::create(net, "Competitive input", num_inputs, NeuronRule::Clamped);
        input.set_clamped(net, true);
        input.apply_layout(net, &Layout::Line { spacing: 50.0 }, (0.0, 150.0));
        let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: false })
            .with_template(SynapseTemplate {
                lower_bound: 0.0,
                upper_bound: 1.0,
                ..SynapseTemplate::default()
            });
        let weights =
            SynapseGroup::connect(net, "Competitive weights", &input, &competitive.neurons, &connector)?;
        competitive.randomize(net);
        debug!(inputs = num_inputs, units = params.num_neurons, "built competitive network");
        Ok(Self {
            input,
            competitive,
            weights,
        })
    }

    pub fn update(&mut self, net: &mut Network) {
        self.competitive.update(net);
    }

    /// Presents every row of `data` once per epoch.
    pub fn train(&mut self, net: &mut Network, data: &Array2<f64>, epochs: usize) -> Result<()> {
        if data.ncols() != self.input.len() {
            return Err(SimError::mismatch(
                "competitive training columns",
                self.input.len(),
                data.ncols(),
            ));
        }
        for _ in 0..epochs {
            for row in data.rows() {
                self.input.set_activations(net, &row.to_vec())?;
                self.competitive.update(net);
            }
        }
        Ok(())
    }
}
