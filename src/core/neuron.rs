//! A `Neuron` holds a scalar activation and the rule that updates it.
//!
//! Updating is split in two steps. [`Neuron::update`] runs the rule on the weighted input and
//! stores the result in a buffer; [`Neuron::commit`] copies the buffer into the activation.
//! Groups choose when to commit, which gives synchronous or sequential semantics.
//!
//! Neurons know their incoming and outgoing synapses only by id. The network arena owns
//! the synapses and keeps these lists consistent when synapses are added or removed.

use super::{
    network::SynapseId,
    neuron_rules::{NeuronRule, RuleContext},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Sign constraint of a neuron's outgoing synapses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Excitatory,
    Inhibitory,
    #[default]
    None,
}

impl Polarity {
    /// Forces `strength` to the sign this polarity allows.
    #[inline]
    pub fn apply(self, strength: f64) -> f64 {
        match self {
            Polarity::Excitatory => strength.abs(),
            Polarity::Inhibitory => -strength.abs(),
            Polarity::None => strength,
        }
    }
}

/// A single unit of the network.
#[derive(Debug, Clone)]
pub struct Neuron {
    /// Current output of the neuron.
    pub activation: f64,

    /// Value computed by the last `update`, waiting to be committed.
    buffer: f64,

    /// Weighted input seen by the last `update`.
    input: f64,

    /// Lower bound of the activation. Also the floor of sigmoidal and binary rules.
    pub lower_bound: f64,

    /// Upper bound of the activation. Also the ceiling of sigmoidal and binary rules.
    pub upper_bound: f64,

    /// Step used by `increment_activation` and `decrement_activation`.
    pub increment: f64,

    /// Sign constraint applied to outgoing synapses at connection time.
    pub polarity: Polarity,

    /// Clamped neurons keep their activation through updates.
    pub clamped: bool,

    /// Ordering key used by priority-based sequential updates. Lower goes first.
    pub update_priority: i32,

    /// Position in the 2-D layout plane.
    pub position: (f64, f64),

    /// The update rule.
    pub rule: NeuronRule,

    spiked: bool,
    last_spike: Option<f64>,
    pub(crate) fan_in: Vec<SynapseId>,
    pub(crate) fan_out: Vec<SynapseId>,
}

impl Default for Neuron {
    fn default() -> Self {
        Self::new(NeuronRule::default())
    }
}

impl Neuron {
    /// Creates a neuron with the given rule, zero activation and bounds `[-1, 1]`.
    pub fn new(rule: NeuronRule) -> Self {
        Self {
            activation: 0.0,
            buffer: 0.0,
            input: 0.0,
            lower_bound: -1.0,
            upper_bound: 1.0,
            increment: 0.1,
            polarity: Polarity::None,
            clamped: false,
            update_priority: 0,
            position: (0.0, 0.0),
            rule,
            spiked: false,
            last_spike: None,
            fan_in: Vec::new(),
            fan_out: Vec::new(),
        }
    }

    /// Sets both bounds.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    /// Sets the polarity.
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Runs the rule on `input` and stores the result in the buffer.
    #[inline]
    pub fn update(&mut self, input: f64, time: f64, time_step: f64) {
        self.input = input;
        if self.clamped {
            self.buffer = self.activation;
            self.spiked = false;
            return;
        }
        let out = self.rule.compute(&RuleContext {
            activation: self.activation,
            input,
            lower_bound: self.lower_bound,
            upper_bound: self.upper_bound,
            time_step,
        });
        self.buffer = out.activation;
        self.spiked = out.spiked;
        if out.spiked {
            self.last_spike = Some(time);
        }
    }

    /// Copies the buffer into the activation.
    #[inline]
    pub fn commit(&mut self) {
        self.activation = self.buffer;
    }

    /// Sets the activation directly, regardless of clamping, and syncs the buffer.
    #[inline]
    pub fn set_activation(&mut self, value: f64) {
        self.activation = value;
        self.buffer = value;
    }

    /// The uncommitted result of the last update.
    pub fn buffer(&self) -> f64 {
        self.buffer
    }

    /// Weighted input seen by the last update.
    pub fn input(&self) -> f64 {
        self.input
    }

    /// Whether the last update produced a spike.
    pub fn spiked(&self) -> bool {
        self.spiked
    }

    /// Network time of the most recent spike.
    pub fn last_spike(&self) -> Option<f64> {
        self.last_spike
    }

    pub(crate) fn restore_state(&mut self, buffer: f64, input: f64, spiked: bool, last_spike: Option<f64>) {
        self.buffer = buffer;
        self.input = input;
        self.spiked = spiked;
        self.last_spike = last_spike;
    }

    /// Clamps `value` into `[lower_bound, upper_bound]`.
    #[inline]
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower_bound, self.upper_bound)
    }

    /// Raises the activation by `increment`, stopping at the upper bound.
    pub fn increment_activation(&mut self) {
        let value = self.clip(self.activation + self.increment);
        self.set_activation(value);
    }

    /// Lowers the activation by `increment`, stopping at the lower bound.
    pub fn decrement_activation(&mut self) {
        let value = self.clip(self.activation - self.increment);
        self.set_activation(value);
    }

    /// Draws a new activation uniformly between the bounds.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let value = if self.upper_bound > self.lower_bound {
            rng.random_range(self.lower_bound..self.upper_bound)
        } else {
            self.lower_bound
        };
        self.set_activation(value);
    }

    /// Zeroes activation, buffer and spike state.
    pub fn clear(&mut self) {
        self.set_activation(0.0);
        self.input = 0.0;
        self.spiked = false;
    }

    /// Ids of incoming synapses.
    pub fn fan_in(&self) -> &[SynapseId] {
        &self.fan_in
    }

    /// Ids of outgoing synapses.
    pub fn fan_out(&self) -> &[SynapseId] {
        &self.fan_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_writes_buffer_not_activation() {
        let mut n = Neuron::new(NeuronRule::linear());
        n.update(0.5, 0.0, 0.1);
        assert_eq!(n.activation, 0.0);
        assert_eq!(n.buffer(), 0.5);
        n.commit();
        assert_eq!(n.activation, 0.5);
    }

    #[test]
    fn clamped_neuron_keeps_activation() {
        let mut n = Neuron::new(NeuronRule::linear());
        n.set_activation(0.3);
        n.clamped = true;
        n.update(0.9, 0.0, 0.1);
        n.commit();
        assert_eq!(n.activation, 0.3);
    }

    #[test]
    fn increment_respects_bounds() {
        let mut n = Neuron::new(NeuronRule::linear()).with_bounds(0.0, 0.15);
        n.increment_activation();
        n.increment_activation();
        assert_eq!(n.activation, 0.15);
        n.decrement_activation();
        n.decrement_activation();
        assert_eq!(n.activation, 0.0);
    }

    #[test]
    fn polarity_forces_sign() {
        assert_eq!(Polarity::Excitatory.apply(-0.4), 0.4);
        assert_eq!(Polarity::Inhibitory.apply(0.4), -0.4);
        assert_eq!(Polarity::None.apply(-0.4), -0.4);
    }
}
