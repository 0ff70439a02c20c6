//! Neuron and synapse groups.
//!
//! A group is an ordered list of ids into the network arena with no duplicate membership.
//! Groups hold no numeric state of their own: activations, strengths and rules stay on the
//! neurons and synapses, and group operations read and write them through the arena.
//!
//! Ids in a group must stay live. Remove members through [`NeuronGroup::remove_from`] and
//! [`SynapseGroup::remove_from`], or call `prune` on every group that may reference an id
//! removed from the network directly.

use super::{
    connections::Connector,
    layout::Layout,
    network::{Network, NeuronId, SynapseId},
    neuron::{Neuron, Polarity},
    neuron_rules::NeuronRule,
    random::Randomizer,
    synapse::Synapse,
};
use crate::error::{Result, SimError};
use fxhash::{FxHashMap, FxHashSet};
use ndarray::{Array1, Array2};

/// An ordered set of neurons.
#[derive(Debug, Clone, Default)]
pub struct NeuronGroup {
    pub label: String,
    ids: Vec<NeuronId>,
    members: FxHashSet<NeuronId>,
}

impl NeuronGroup {
    /// Creates an empty group.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Adds `count` fresh neurons with `rule` to the network and groups them.
    pub fn create(net: &mut Network, label: impl Into<String>, count: usize, rule: NeuronRule) -> Self {
        let ids = net.add_neurons(count, rule);
        Self {
            label: label.into(),
            members: ids.iter().copied().collect(),
            ids,
        }
    }

    /// Groups existing neurons, rejecting duplicates.
    pub fn from_ids(label: impl Into<String>, ids: &[NeuronId]) -> Result<Self> {
        let mut group = Self::new(label);
        for &id in ids {
            group.add(id)?;
        }
        Ok(group)
    }

    /// Appends a neuron. Fails if it is already a member.
    pub fn add(&mut self, id: NeuronId) -> Result<()> {
        if !self.members.insert(id) {
            return Err(SimError::DuplicateMember(id));
        }
        self.ids.push(id);
        Ok(())
    }

    /// Drops a neuron from the group without touching the network.
    pub fn remove(&mut self, id: NeuronId) -> bool {
        if self.members.remove(&id) {
            self.ids.retain(|&n| n != id);
            true
        } else {
            false
        }
    }

    /// Removes a member from the group and from the network, together with its synapses.
    /// Returns `None` if `id` is not a member.
    pub fn remove_from(&mut self, net: &mut Network, id: NeuronId) -> Option<Neuron> {
        if self.remove(id) {
            net.remove_neuron(id)
        } else {
            None
        }
    }

    /// Drops members that no longer exist in the network. Returns how many were dropped.
    pub fn prune(&mut self, net: &Network) -> usize {
        let before = self.ids.len();
        self.ids.retain(|&id| net.try_neuron(id).is_some());
        self.members.retain(|&id| net.try_neuron(id).is_some());
        before - self.ids.len()
    }

    #[inline]
    pub fn ids(&self) -> &[NeuronId] {
        &self.ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: NeuronId) -> bool {
        self.members.contains(&id)
    }

    /// Id of the `index`-th member.
    #[inline]
    pub fn get(&self, index: usize) -> NeuronId {
        self.ids[index]
    }

    /// Position of `id` in the group.
    pub fn index_of(&self, id: NeuronId) -> Option<usize> {
        self.ids.iter().position(|&n| n == id)
    }

    /// Map from member id to its position in the group.
    pub fn index_map(&self) -> FxHashMap<NeuronId, usize> {
        self.ids.iter().enumerate().map(|(i, &id)| (id, i)).collect()
    }

    /// Current activations, in member order.
    pub fn activations(&self, net: &Network) -> Vec<f64> {
        self.ids.iter().map(|&id| net.neuron(id).activation).collect()
    }

    /// Current activations as an `ndarray` vector.
    pub fn activation_array(&self, net: &Network) -> Array1<f64> {
        Array1::from(self.activations(net))
    }

    /// Sets every member's activation. The slice must match the group size.
    pub fn set_activations(&self, net: &mut Network, values: &[f64]) -> Result<()> {
        if values.len() != self.len() {
            return Err(SimError::mismatch("activation vector", self.len(), values.len()));
        }
        for (&id, &value) in self.ids.iter().zip(values) {
            net.neuron_mut(id).set_activation(value);
        }
        Ok(())
    }

    /// Sets every member's activation to the same value.
    pub fn fill_activations(&self, net: &mut Network, value: f64) {
        for &id in &self.ids {
            net.neuron_mut(id).set_activation(value);
        }
    }

    /// Buffered update: every member computes its buffer from the current activations, then
    /// all buffers are committed.
    #[inline]
    pub fn update(&self, net: &mut Network) {
        net.update_neurons(&self.ids);
    }

    pub fn set_clamped(&self, net: &mut Network, clamped: bool) {
        for &id in &self.ids {
            net.neuron_mut(id).clamped = clamped;
        }
    }

    /// Replaces every member's rule.
    pub fn set_rule(&self, net: &mut Network, rule: NeuronRule) {
        for &id in &self.ids {
            net.neuron_mut(id).rule = rule;
        }
    }

    pub fn set_bounds(&self, net: &mut Network, lower: f64, upper: f64) {
        for &id in &self.ids {
            let neuron = net.neuron_mut(id);
            neuron.lower_bound = lower;
            neuron.upper_bound = upper;
        }
    }

    pub fn set_polarity(&self, net: &mut Network, polarity: Polarity) {
        for &id in &self.ids {
            net.neuron_mut(id).polarity = polarity;
        }
    }

    pub fn set_increment(&self, net: &mut Network, increment: f64) {
        for &id in &self.ids {
            net.neuron_mut(id).increment = increment;
        }
    }

    /// Draws every member's activation uniformly between its bounds.
    pub fn randomize(&self, net: &mut Network) {
        for &id in &self.ids {
            net.randomize_neuron(id);
        }
    }

    /// Zeroes activations.
    pub fn clear(&self, net: &mut Network) {
        for &id in &self.ids {
            net.neuron_mut(id).clear();
        }
    }

    /// Biases of the members' rules. Rules without a bias report 0.
    pub fn biases(&self, net: &Network) -> Vec<f64> {
        self.ids
            .iter()
            .map(|&id| net.neuron(id).rule.bias().unwrap_or(0.0))
            .collect()
    }

    /// Positions the members with `layout`, starting at `origin`.
    pub fn apply_layout(&self, net: &mut Network, layout: &Layout, origin: (f64, f64)) {
        let positions = layout.positions(self.len(), origin);
        for (&id, position) in self.ids.iter().zip(positions) {
            net.neuron_mut(id).position = position;
        }
    }

    pub fn positions(&self, net: &Network) -> Vec<(f64, f64)> {
        self.ids.iter().map(|&id| net.neuron(id).position).collect()
    }
}

/// An ordered set of synapses.
#[derive(Debug, Clone, Default)]
pub struct SynapseGroup {
    pub label: String,
    ids: Vec<SynapseId>,
    members: FxHashSet<SynapseId>,
}

impl SynapseGroup {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Wires `sources` to `targets` with `connector` and groups the new synapses.
    pub fn connect(
        net: &mut Network,
        label: impl Into<String>,
        sources: &NeuronGroup,
        targets: &NeuronGroup,
        connector: &Connector,
    ) -> Result<Self> {
        let ids = connector.connect(net, sources.ids(), targets.ids())?;
        Ok(Self {
            label: label.into(),
            members: ids.iter().copied().collect(),
            ids,
        })
    }

    /// Groups existing synapses, rejecting duplicates.
    pub fn from_ids(label: impl Into<String>, ids: &[SynapseId]) -> Result<Self> {
        let mut group = Self::new(label);
        for &id in ids {
            group.add(id)?;
        }
        Ok(group)
    }

    pub fn add(&mut self, id: SynapseId) -> Result<()> {
        if !self.members.insert(id) {
            return Err(SimError::invalid(
                "synapse group",
                format!("synapse {id} is already a member"),
            ));
        }
        self.ids.push(id);
        Ok(())
    }

    /// Drops a synapse from the group without touching the network.
    pub fn remove(&mut self, id: SynapseId) -> bool {
        if self.members.remove(&id) {
            self.ids.retain(|&s| s != id);
            true
        } else {
            false
        }
    }

    /// Removes a member from the group and from the network.
    pub fn remove_from(&mut self, net: &mut Network, id: SynapseId) -> Option<Synapse> {
        if self.remove(id) {
            net.remove_synapse(id)
        } else {
            None
        }
    }

    /// Drops members that no longer exist in the network, such as synapses removed along
    /// with one of their neurons. Returns how many were dropped.
    pub fn prune(&mut self, net: &Network) -> usize {
        let before = self.ids.len();
        self.ids.retain(|&id| net.try_synapse(id).is_some());
        self.members.retain(|&id| net.try_synapse(id).is_some());
        before - self.ids.len()
    }

    #[inline]
    pub fn ids(&self) -> &[SynapseId] {
        &self.ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: SynapseId) -> bool {
        self.members.contains(&id)
    }

    pub fn strengths(&self, net: &Network) -> Vec<f64> {
        self.ids.iter().map(|&id| net.synapse(id).strength).collect()
    }

    pub fn set_strengths(&self, net: &mut Network, values: &[f64]) -> Result<()> {
        if values.len() != self.len() {
            return Err(SimError::mismatch("strength vector", self.len(), values.len()));
        }
        for (&id, &value) in self.ids.iter().zip(values) {
            net.synapse_mut(id).strength = value;
        }
        Ok(())
    }

    /// Weight matrix with one row per source and one column per target. Pairs without a
    /// synapse in this group read as 0.
    pub fn weight_matrix(&self, net: &Network, sources: &NeuronGroup, targets: &NeuronGroup) -> Array2<f64> {
        let rows = sources.index_map();
        let cols = targets.index_map();
        let mut matrix = Array2::zeros((sources.len(), targets.len()));
        for &id in &self.ids {
            let synapse = net.synapse(id);
            if let (Some(&row), Some(&col)) = (rows.get(&synapse.source()), cols.get(&synapse.target())) {
                matrix[[row, col]] = synapse.strength;
            }
        }
        matrix
    }

    /// Writes a `sources x targets` weight matrix back. Missing synapses are created for
    /// non-zero entries and added to the group.
    pub fn set_weight_matrix(
        &mut self,
        net: &mut Network,
        sources: &NeuronGroup,
        targets: &NeuronGroup,
        weights: &Array2<f64>,
    ) -> Result<()> {
        if weights.nrows() != sources.len() {
            return Err(SimError::mismatch("weight matrix rows", sources.len(), weights.nrows()));
        }
        if weights.ncols() != targets.len() {
            return Err(SimError::mismatch("weight matrix columns", targets.len(), weights.ncols()));
        }
        for ((row, col), &value) in weights.indexed_iter() {
            let (source, target) = (sources.get(row), targets.get(col));
            match net.find_synapse(source, target) {
                Some(id) => net.synapse_mut(id).strength = value,
                None if value != 0.0 => {
                    let id = net.connect(source, target, value)?;
                    self.add(id)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Draws every strength uniformly between the synapse's bounds.
    pub fn randomize(&self, net: &mut Network) {
        for &id in &self.ids {
            net.randomize_synapse(id);
        }
    }

    /// Draws every strength from `randomizer`.
    pub fn randomize_with(&self, net: &mut Network, randomizer: &Randomizer) {
        for &id in &self.ids {
            let value = randomizer.sample(&mut net.rand);
            net.synapse_mut(id).strength = value;
        }
    }

    /// Randomizes so that the synapse `a -> b` and its reverse `b -> a` carry the same
    /// strength. Synapses without a reverse partner are randomized on their own.
    pub fn randomize_symmetric(&self, net: &mut Network, randomizer: &Randomizer) {
        for &id in &self.ids {
            let (source, target) = {
                let synapse = net.synapse(id);
                (synapse.source(), synapse.target())
            };
            let reverse = net.find_synapse(target, source).filter(|r| self.contains(*r));
            match reverse {
                Some(_) if target < source => {}
                Some(reverse) => {
                    let value = randomizer.sample(&mut net.rand);
                    net.synapse_mut(id).strength = value;
                    net.synapse_mut(reverse).strength = value;
                }
                None => {
                    let value = randomizer.sample(&mut net.rand);
                    net.synapse_mut(id).strength = value;
                }
            }
        }
    }

    /// Sets every strength to 0.
    pub fn clear(&self, net: &mut Network) {
        for &id in &self.ids {
            net.synapse_mut(id).strength = 0.0;
        }
    }

    /// Multiplies every strength by `factor`.
    pub fn scale(&self, net: &mut Network, factor: f64) {
        for &id in &self.ids {
            net.synapse_mut(id).strength *= factor;
        }
    }

    /// Advances the spike responders of the members.
    pub fn update(&self, net: &mut Network) {
        for &id in &self.ids {
            net.update_synapse(id);
        }
    }
}
