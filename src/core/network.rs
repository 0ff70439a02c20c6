//! The `Network` arena owns every neuron and synapse of a simulation.
//!
//! Neurons and synapses live in slot vectors and are addressed by copyable ids. A removed
//! element leaves an empty slot, so ids of the remaining elements stay valid. Back
//! references (synapse to neuron, neuron to its fan-in/fan-out) are ids as well, which keeps
//! ownership a tree: the arena owns everything, nothing else owns anything.
//!
//! A `(source, target)` index makes the weight between two neurons an O(1) lookup and
//! rules out duplicate synapses between the same ordered pair.
//!
//! The arena also carries the simulation clock and a seeded random number generator so
//! that every stochastic operation driven through it is reproducible.
//!
//! The core is single-threaded. Nothing here locks; callers that share a network between
//! threads must serialize access themselves.

use super::{
    neuron::Neuron, neuron_rules::NeuronRule, spike_responders::ResponderContext,
    synapse::Synapse,
};
use crate::error::{Result, SimError};
use fxhash::FxHashMap;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a neuron inside a [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeuronId(pub usize);

/// Handle of a synapse inside a [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SynapseId(pub usize);

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for SynapseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Global parameters of a network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Simulated time that passes per update.
    pub time_step: f64,

    /// Seed of the network's random number generator.
    pub seed: u64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            time_step: 0.1,
            seed: 42,
        }
    }
}

/// Arena of neurons and synapses plus the simulation clock.
pub struct Network {
    neurons: Vec<Option<Neuron>>,
    synapses: Vec<Option<Synapse>>,
    index: FxHashMap<(NeuronId, NeuronId), SynapseId>,

    /// Simulated time that passes per update.
    pub time_step: f64,

    time: f64,
    iteration: u64,

    /// A seeded pseudo-random number generator for reproducible randomness.
    pub rand: StdRng,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Creates an empty network with default parameters.
    pub fn new() -> Self {
        Self::with_params(&NetworkParams::default())
    }

    /// Creates an empty network whose random number generator is seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_params(&NetworkParams {
            seed,
            ..NetworkParams::default()
        })
    }

    /// Creates an empty network from parameters.
    pub fn with_params(params: &NetworkParams) -> Self {
        Self {
            neurons: Vec::new(),
            synapses: Vec::new(),
            index: FxHashMap::default(),
            time_step: params.time_step,
            time: 0.0,
            iteration: 0,
            rand: StdRng::seed_from_u64(params.seed),
        }
    }

    /// Adds a neuron and returns its id.
    pub fn add_neuron(&mut self, mut neuron: Neuron) -> NeuronId {
        let id = NeuronId(self.neurons.len());
        neuron.fan_in.clear();
        neuron.fan_out.clear();
        self.neurons.push(Some(neuron));
        id
    }

    /// Adds `count` neurons with the given rule.
    pub fn add_neurons(&mut self, count: usize, rule: NeuronRule) -> Vec<NeuronId> {
        (0..count)
            .map(|_| self.add_neuron(Neuron::new(rule)))
            .collect()
    }

    /// Removes a neuron together with every synapse attached to it.
    ///
    /// Groups still listing the neuron or its synapses must drop them with `prune`, or the
    /// removal should go through `NeuronGroup::remove_from` in the first place.
    pub fn remove_neuron(&mut self, id: NeuronId) -> Option<Neuron> {
        let neuron = self.neurons.get_mut(id.0)?.take()?;
        for &syn in neuron.fan_in.iter().chain(neuron.fan_out.iter()) {
            self.remove_synapse(syn);
        }
        Some(neuron)
    }

    /// Adds a synapse. Both endpoints must exist and must not already be connected.
    pub fn add_synapse(&mut self, synapse: Synapse) -> Result<SynapseId> {
        let (source, target) = (synapse.source(), synapse.target());
        if self.try_neuron(source).is_none() {
            return Err(SimError::MissingNeuron(source));
        }
        if self.try_neuron(target).is_none() {
            return Err(SimError::MissingNeuron(target));
        }
        if self.index.contains_key(&(source, target)) {
            return Err(SimError::DuplicateSynapse(source, target));
        }
        let id = SynapseId(self.synapses.len());
        self.synapses.push(Some(synapse));
        self.index.insert((source, target), id);
        self.neuron_mut(source).fan_out.push(id);
        self.neuron_mut(target).fan_in.push(id);
        Ok(id)
    }

    /// Connects two neurons with a static synapse of the given strength.
    pub fn connect(&mut self, source: NeuronId, target: NeuronId, strength: f64) -> Result<SynapseId> {
        self.add_synapse(Synapse::new(source, target, strength))
    }

    /// Removes a synapse and unlinks it from both endpoints.
    pub fn remove_synapse(&mut self, id: SynapseId) -> Option<Synapse> {
        let synapse = self.synapses.get_mut(id.0)?.take()?;
        self.index.remove(&(synapse.source(), synapse.target()));
        if let Some(Some(source)) = self.neurons.get_mut(synapse.source().0) {
            source.fan_out.retain(|&s| s != id);
        }
        if let Some(Some(target)) = self.neurons.get_mut(synapse.target().0) {
            target.fan_in.retain(|&s| s != id);
        }
        Some(synapse)
    }

    /// The neuron with the given id, if it still exists.
    #[inline]
    pub fn try_neuron(&self, id: NeuronId) -> Option<&Neuron> {
        self.neurons.get(id.0).and_then(Option::as_ref)
    }

    /// The synapse with the given id, if it still exists.
    #[inline]
    pub fn try_synapse(&self, id: SynapseId) -> Option<&Synapse> {
        self.synapses.get(id.0).and_then(Option::as_ref)
    }

    /// The neuron with the given id.
    ///
    /// Panics if the neuron was removed: holding a stale id is a programming error.
    #[inline]
    pub fn neuron(&self, id: NeuronId) -> &Neuron {
        match self.try_neuron(id) {
            Some(neuron) => neuron,
            None => panic!("neuron {id} does not exist"),
        }
    }

    /// Mutable access to the neuron with the given id. Panics like [`Network::neuron`].
    #[inline]
    pub fn neuron_mut(&mut self, id: NeuronId) -> &mut Neuron {
        match self.neurons.get_mut(id.0).and_then(Option::as_mut) {
            Some(neuron) => neuron,
            None => panic!("neuron {id} does not exist"),
        }
    }

    /// The synapse with the given id. Panics if it was removed.
    #[inline]
    pub fn synapse(&self, id: SynapseId) -> &Synapse {
        match self.try_synapse(id) {
            Some(synapse) => synapse,
            None => panic!("synapse {id} does not exist"),
        }
    }

    /// Mutable access to the synapse with the given id. Panics if it was removed.
    #[inline]
    pub fn synapse_mut(&mut self, id: SynapseId) -> &mut Synapse {
        match self.synapses.get_mut(id.0).and_then(Option::as_mut) {
            Some(synapse) => synapse,
            None => panic!("synapse {id} does not exist"),
        }
    }

    /// The synapse from `source` to `target`, if there is one.
    #[inline]
    pub fn find_synapse(&self, source: NeuronId, target: NeuronId) -> Option<SynapseId> {
        self.index.get(&(source, target)).copied()
    }

    /// Sets the strength from `source` to `target`, creating the synapse if needed.
    pub fn set_weight(&mut self, source: NeuronId, target: NeuronId, strength: f64) -> Result<SynapseId> {
        match self.find_synapse(source, target) {
            Some(id) => {
                self.synapse_mut(id).strength = strength;
                Ok(id)
            }
            None => self.connect(source, target, strength),
        }
    }

    /// Ids of all live neurons, in creation order.
    pub fn neuron_ids(&self) -> impl Iterator<Item = NeuronId> + '_ {
        self.neurons
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NeuronId(i))
    }

    /// Ids of all live synapses, in creation order.
    pub fn synapse_ids(&self) -> impl Iterator<Item = SynapseId> + '_ {
        self.synapses
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| SynapseId(i))
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.iter().filter(|n| n.is_some()).count()
    }

    pub fn synapse_count(&self) -> usize {
        self.synapses.iter().filter(|s| s.is_some()).count()
    }

    /// Sum of what every incoming synapse contributes to `id`.
    #[inline]
    pub fn weighted_input(&self, id: NeuronId) -> f64 {
        self.neuron(id)
            .fan_in
            .iter()
            .map(|&s| {
                let synapse = self.synapse(s);
                synapse.output(self.neuron(synapse.source()).activation)
            })
            .sum()
    }

    /// Computes the buffer of one neuron from its current weighted input.
    #[inline]
    pub fn update_neuron(&mut self, id: NeuronId) {
        let input = self.weighted_input(id);
        let (time, time_step) = (self.time, self.time_step);
        self.neuron_mut(id).update(input, time, time_step);
    }

    /// Buffered update of a set of neurons: every buffer is computed from the current
    /// activations before any is committed.
    pub fn update_neurons(&mut self, ids: &[NeuronId]) {
        for &id in ids {
            self.update_neuron(id);
        }
        for &id in ids {
            self.neuron_mut(id).commit();
        }
    }

    /// Advances the responder of every spiking synapse from its source's spike flag.
    pub fn update_synapses(&mut self) {
        let Network {
            neurons,
            synapses,
            rand,
            time,
            time_step,
            ..
        } = self;
        for synapse in synapses.iter_mut().flatten() {
            respond(synapse, neurons, rand, *time, *time_step);
        }
    }

    /// Advances the responder of a single synapse.
    pub fn update_synapse(&mut self, id: SynapseId) {
        let Network {
            neurons,
            synapses,
            rand,
            time,
            time_step,
            ..
        } = self;
        if let Some(Some(synapse)) = synapses.get_mut(id.0) {
            respond(synapse, neurons, rand, *time, *time_step);
        }
    }

    /// Generic whole-network update: synapse responders, then a buffered update of every
    /// neuron, then the clock advances.
    ///
    /// Topology networks define their own `update`; this one is for free-form networks.
    pub fn update(&mut self) {
        self.update_synapses();
        let ids: Vec<NeuronId> = self.neuron_ids().collect();
        self.update_neurons(&ids);
        self.advance_clock();
    }

    /// Moves the clock forward one time step.
    pub fn advance_clock(&mut self) {
        self.time += self.time_step;
        self.iteration += 1;
    }

    /// Current simulated time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed clock ticks.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Resets the clock to zero without touching state.
    pub fn reset_clock(&mut self) {
        self.time = 0.0;
        self.iteration = 0;
    }

    pub(crate) fn set_clock(&mut self, time: f64, iteration: u64) {
        self.time = time;
        self.iteration = iteration;
    }

    /// Zeroes every neuron's activation.
    pub fn clear_activations(&mut self) {
        for neuron in self.neurons.iter_mut().flatten() {
            neuron.clear();
        }
    }

    /// Draws one neuron's activation uniformly between its bounds.
    pub fn randomize_neuron(&mut self, id: NeuronId) {
        if let Some(Some(neuron)) = self.neurons.get_mut(id.0) {
            neuron.randomize(&mut self.rand);
        }
    }

    /// Draws one synapse's strength uniformly between its bounds.
    pub fn randomize_synapse(&mut self, id: SynapseId) {
        if let Some(Some(synapse)) = self.synapses.get_mut(id.0) {
            synapse.randomize(&mut self.rand);
        }
    }

    /// Draws every synapse strength uniformly between its bounds.
    pub fn randomize_weights(&mut self) {
        let Network { synapses, rand, .. } = self;
        for synapse in synapses.iter_mut().flatten() {
            synapse.randomize(rand);
        }
    }

    /// Draws every neuron's bias uniformly in `[lower, upper)`.
    pub fn randomize_biases(&mut self, lower: f64, upper: f64) {
        use rand::Rng;
        let Network { neurons, rand, .. } = self;
        for neuron in neurons.iter_mut().flatten() {
            if let Some(bias) = neuron.rule.bias_mut() {
                *bias = if upper > lower {
                    rand.random_range(lower..upper)
                } else {
                    lower
                };
            }
        }
    }

    pub(crate) fn neuron_slots(&self) -> &[Option<Neuron>] {
        &self.neurons
    }

    pub(crate) fn synapse_slots(&self) -> &[Option<Synapse>] {
        &self.synapses
    }
}

fn respond(
    synapse: &mut Synapse,
    neurons: &[Option<Neuron>],
    rng: &mut StdRng,
    time: f64,
    time_step: f64,
) {
    if synapse.responder.is_none() {
        return;
    }
    let (Some(Some(source)), Some(Some(target))) = (
        neurons.get(synapse.source().0),
        neurons.get(synapse.target().0),
    ) else {
        return;
    };
    let ctx = ResponderContext {
        spiked: source.spiked(),
        strength: synapse.strength,
        time,
        time_step,
        source_polarity: source.polarity,
        target_polarity: target.polarity,
    };
    synapse.update_response(&ctx, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        neuron_rules::IntegrateAndFireRule,
        spike_responders::{JumpAndDecay, SpikeResponder},
    };

    #[test]
    fn connect_links_fan_in_and_fan_out() {
        let mut net = Network::new();
        let a = net.add_neuron(Neuron::default());
        let b = net.add_neuron(Neuron::default());
        let s = net.connect(a, b, 0.5).unwrap();
        assert_eq!(net.neuron(a).fan_out(), &[s]);
        assert_eq!(net.neuron(b).fan_in(), &[s]);
        assert_eq!(net.find_synapse(a, b), Some(s));
        assert_eq!(net.find_synapse(b, a), None);
    }

    #[test]
    fn connect_rejects_missing_endpoint_and_duplicates() {
        let mut net = Network::new();
        let a = net.add_neuron(Neuron::default());
        assert!(matches!(
            net.connect(a, NeuronId(9), 1.0),
            Err(SimError::MissingNeuron(NeuronId(9)))
        ));
        let b = net.add_neuron(Neuron::default());
        net.connect(a, b, 1.0).unwrap();
        assert!(matches!(
            net.connect(a, b, 1.0),
            Err(SimError::DuplicateSynapse(_, _))
        ));
    }

    #[test]
    fn removing_a_neuron_removes_its_synapses() {
        let mut net = Network::new();
        let ids = net.add_neurons(3, NeuronRule::linear());
        net.connect(ids[0], ids[1], 1.0).unwrap();
        net.connect(ids[1], ids[2], 1.0).unwrap();
        net.connect(ids[0], ids[2], 1.0).unwrap();
        net.remove_neuron(ids[1]);
        assert_eq!(net.neuron_count(), 2);
        assert_eq!(net.synapse_count(), 1);
        assert_eq!(net.neuron(ids[2]).fan_in().len(), 1);
        assert_eq!(net.neuron(ids[0]).fan_out().len(), 1);
        assert!(net.find_synapse(ids[0], ids[1]).is_none());
    }

    #[test]
    fn buffered_update_uses_previous_activations() {
        let mut net = Network::new();
        let ids = net.add_neurons(2, NeuronRule::linear());
        net.connect(ids[0], ids[1], 1.0).unwrap();
        net.connect(ids[1], ids[0], 1.0).unwrap();
        net.neuron_mut(ids[0]).set_activation(0.5);
        net.update();
        // Swap, not chain: both read the pre-update snapshot.
        assert_eq!(net.neuron(ids[0]).activation, 0.0);
        assert_eq!(net.neuron(ids[1]).activation, 0.5);
        assert_eq!(net.iteration(), 1);
        assert!((net.time() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn spikes_drive_responders() {
        let mut net = Network::new();
        net.time_step = 1.0;
        let mut source = Neuron::new(NeuronRule::IntegrateAndFire(IntegrateAndFireRule {
            time_constant: 1.0,
            background_current: 5.0,
            ..IntegrateAndFireRule::default()
        }));
        source.lower_bound = -100.0;
        let a = net.add_neuron(source);
        let b = net.add_neuron(Neuron::new(NeuronRule::linear()));
        let syn = Synapse::new(a, b, 0.5)
            .with_responder(SpikeResponder::JumpAndDecay(JumpAndDecay::default()));
        let s = net.add_synapse(syn).unwrap();

        net.update();
        assert!(net.neuron(a).spiked());
        net.update();
        assert_eq!(net.synapse(s).psr(), 0.5);
        assert_eq!(net.weighted_input(b), 0.5);
    }

    #[test]
    fn set_weight_creates_or_updates() {
        let mut net = Network::new();
        let ids = net.add_neurons(2, NeuronRule::linear());
        let s = net.set_weight(ids[0], ids[1], 0.2).unwrap();
        let again = net.set_weight(ids[0], ids[1], 0.7).unwrap();
        assert_eq!(s, again);
        assert_eq!(net.synapse(s).strength, 0.7);
    }
}
