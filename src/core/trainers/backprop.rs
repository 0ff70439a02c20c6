//! Error backpropagation through a stack of layers.
//!
//! Layers are ordered from input to output. For each row the input layer is set, the
//! remaining layers are updated in order, and deltas flow back:
//! - output neuron: `delta = (target - activation) * f'(net input)`
//! - hidden neuron: `delta = f'(net input) * sum(delta_next * w)` over its outgoing synapses
//!
//! Every incoming weight of a neuron with a delta then moves by
//! `learning_rate * delta * presynaptic activation`, plus `momentum` times its previous
//! change. Biases move by `learning_rate * delta`. All deltas of a row are computed before
//! any weight changes.
//!
//! Rules without a derivative (binary, integrate-and-fire) cannot be trained and fail with
//! [`SimError::NotImplemented`].

use super::{rms, IterableTrainer, TrainingData, TrainingSet};
use crate::core::{
    groups::NeuronGroup,
    network::{Network, NeuronId, SynapseId},
    random::Randomizer,
};
use crate::error::{Result, SimError};
use fxhash::FxHashMap;
use ndarray::Array2;

pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

pub struct BackpropTrainer {
    layers: Vec<NeuronGroup>,
    pub learning_rate: f64,
    pub momentum: f64,

    /// Whether biases are trained along with weights.
    pub update_biases: bool,

    data: TrainingData,
    deltas: FxHashMap<NeuronId, f64>,
    last_changes: FxHashMap<SynapseId, f64>,
    error: f64,
    iteration: usize,
}

impl BackpropTrainer {
    /// Creates a trainer over `layers`, ordered from input to output. At least two layers
    /// are needed.
    pub fn new(layers: Vec<NeuronGroup>) -> Result<Self> {
        if layers.len() < 2 {
            return Err(SimError::invalid(
                "layers",
                format!("backprop needs at least 2 layers, got {}", layers.len()),
            ));
        }
        Ok(Self {
            layers,
            learning_rate: DEFAULT_LEARNING_RATE,
            momentum: 0.0,
            update_biases: true,
            data: TrainingData::default(),
            deltas: FxHashMap::default(),
            last_changes: FxHashMap::default(),
            error: 0.0,
            iteration: 0,
        })
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn layers(&self) -> &[NeuronGroup] {
        &self.layers
    }

    #[inline]
    pub fn input_layer(&self) -> &NeuronGroup {
        &self.layers[0]
    }

    #[inline]
    pub fn output_layer(&self) -> &NeuronGroup {
        &self.layers[self.layers.len() - 1]
    }

    /// Hands over the training data after checking it against the outer layers.
    pub fn set_training_set(&mut self, data: TrainingSet) -> Result<()> {
        let (input_len, output_len) = (self.input_layer().len(), self.output_layer().len());
        self.data.set(data, input_len, output_len)
    }

    /// Replaces the input rows. Needs one column per input-layer neuron.
    pub fn set_input_data(&mut self, input: Array2<f64>) -> Result<()> {
        let input_len = self.input_layer().len();
        self.data.set_input(input, input_len)
    }

    /// Replaces the target rows. Needs one column per output-layer neuron.
    pub fn set_training_data(&mut self, target: Array2<f64>) -> Result<()> {
        let output_len = self.output_layer().len();
        self.data.set_target(target, output_len)
    }

    pub fn training_set(&self) -> Option<&TrainingSet> {
        self.data.training_set()
    }

    /// Draws the incoming weights and the bias of every non-input neuron from `randomizer`.
    pub fn randomize(&self, net: &mut Network, randomizer: &Randomizer) {
        for layer in &self.layers[1..] {
            for &id in layer.ids() {
                let fan_in = net.neuron(id).fan_in().to_vec();
                for syn in fan_in {
                    let value = randomizer.sample(&mut net.rand);
                    net.synapse_mut(syn).strength = value;
                }
                let bias = randomizer.sample(&mut net.rand);
                if let Some(b) = net.neuron_mut(id).rule.bias_mut() {
                    *b = bias;
                }
            }
        }
    }

    /// Sets the input layer and updates the other layers in order.
    pub fn forward(&self, net: &mut Network, inputs: &[f64]) -> Result<()> {
        self.input_layer().set_activations(net, inputs)?;
        for layer in &self.layers[1..] {
            layer.update(net);
        }
        Ok(())
    }

    /// Clears the error, the epoch counter and the momentum memory.
    pub fn reset(&mut self) {
        self.error = 0.0;
        self.iteration = 0;
        self.last_changes.clear();
    }

    /// Computes deltas for every non-input layer from the targets of one row. Returns the
    /// summed squared output error.
    fn compute_deltas(&mut self, net: &Network, targets: &[f64]) -> Result<f64> {
        self.deltas.clear();
        let mut sum_squared = 0.0;

        let last = self.layers.len() - 1;
        for (&id, &target) in self.layers[last].ids().iter().zip(targets) {
            let neuron = net.neuron(id);
            let error = target - neuron.activation;
            sum_squared += error * error;
            let slope = neuron
                .rule
                .derivative(neuron.input(), neuron.lower_bound, neuron.upper_bound)?;
            self.deltas.insert(id, error * slope);
        }

        for layer in self.layers[1..last].iter().rev() {
            for &id in layer.ids() {
                let neuron = net.neuron(id);
                let downstream: f64 = neuron
                    .fan_out()
                    .iter()
                    .filter_map(|&syn| {
                        let synapse = net.synapse(syn);
                        self.deltas
                            .get(&synapse.target())
                            .map(|delta| delta * synapse.strength)
                    })
                    .sum();
                let slope = neuron
                    .rule
                    .derivative(neuron.input(), neuron.lower_bound, neuron.upper_bound)?;
                self.deltas.insert(id, downstream * slope);
            }
        }
        Ok(sum_squared)
    }

    fn run_epoch(&mut self, net: &mut Network, data: &TrainingSet) -> Result<f64> {
        let mut sum_squared = 0.0;
        for row in 0..data.rows() {
            self.forward(net, &data.input_row(row).to_vec())?;
            sum_squared += self.compute_deltas(net, &data.target_row(row).to_vec())?;
            self.apply_deltas(net);
        }
        Ok(sum_squared)
    }

    fn apply_deltas(&mut self, net: &mut Network) {
        for layer in &self.layers[1..] {
            for &id in layer.ids() {
                let Some(&delta) = self.deltas.get(&id) else {
                    continue;
                };
                let fan_in = net.neuron(id).fan_in().to_vec();
                for syn in fan_in {
                    let pre = net.neuron(net.synapse(syn).source()).activation;
                    let previous = self.last_changes.get(&syn).copied().unwrap_or(0.0);
                    let change = self.learning_rate * delta * pre + self.momentum * previous;
                    net.synapse_mut(syn).strength += change;
                    self.last_changes.insert(syn, change);
                }
                if self.update_biases {
                    if let Some(bias) = net.neuron_mut(id).rule.bias_mut() {
                        *bias += self.learning_rate * delta;
                    }
                }
            }
        }
    }
}

impl IterableTrainer for BackpropTrainer {
    fn iterate(&mut self, net: &mut Network) -> Result<()> {
        let data = std::mem::take(&mut self.data);
        let result = data
            .ready()
            .and_then(|set| Ok((self.run_epoch(net, set)?, set.rows())));
        self.data = data;

        let (sum_squared, rows) = result?;
        self.error = rms(sum_squared, rows, self.output_layer().len());
        self.iteration += 1;
        Ok(())
    }

    fn error(&self) -> f64 {
        self.error
    }

    fn iteration(&self) -> usize {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        connections::{ConnectionPattern, Connector},
        groups::SynapseGroup,
        neuron_rules::{NeuronRule, SquashingFunction},
    };
    use ndarray::array;

    fn layered(net: &mut Network, sizes: &[usize]) -> Vec<NeuronGroup> {
        let mut layers: Vec<NeuronGroup> = Vec::new();
        for (i, &size) in sizes.iter().enumerate() {
            let rule = if i == 0 {
                NeuronRule::Clamped
            } else {
                NeuronRule::sigmoidal(SquashingFunction::Logistic)
            };
            let layer = NeuronGroup::create(net, format!("layer {i}"), size, rule);
            layer.set_bounds(net, 0.0, 1.0);
            if let Some(previous) = layers.last() {
                let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: true })
                    .with_strength(0.0);
                SynapseGroup::connect(net, "w", previous, &layer, &connector).unwrap();
            }
            layers.push(layer);
        }
        layers
    }

    #[test]
    fn learns_xor() {
        let mut net = Network::with_seed(7);
        let layers = layered(&mut net, &[2, 4, 1]);
        let mut trainer = BackpropTrainer::new(layers)
            .unwrap()
            .with_learning_rate(0.2)
            .with_momentum(0.3);
        trainer.randomize(&mut net, &Randomizer::default());
        assert!(net.synapse_ids().any(|s| net.synapse(s).strength != 0.0));
        trainer
            .set_training_set(
                TrainingSet::new(
                    array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
                    array![[0.0], [1.0], [1.0], [0.0]],
                )
                .unwrap(),
            )
            .unwrap();
        trainer.iterate(&mut net).unwrap();
        let first = trainer.error();
        let last = trainer.train(&mut net, 3000).unwrap();
        assert!(last < first, "{last} >= {first}");
    }

    #[test]
    fn output_weights_move_toward_target() {
        let mut net = Network::new();
        let layers = layered(&mut net, &[1, 1]);
        let (input, output) = (layers[0].get(0), layers[1].get(0));
        let syn = net.find_synapse(input, output).unwrap();
        net.synapse_mut(syn).strength = 0.0;

        let mut trainer = BackpropTrainer::new(layers).unwrap();
        trainer
            .set_training_set(TrainingSet::new(array![[1.0]], array![[1.0]]).unwrap())
            .unwrap();
        trainer.iterate(&mut net).unwrap();
        // Output 0.5, error 0.5, slope 1 at the midpoint.
        assert!((net.synapse(syn).strength - 0.1 * 0.5).abs() < 1e-12);
        assert!((trainer.error() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rules_without_derivative_fail() {
        let mut net = Network::new();
        let input = NeuronGroup::create(&mut net, "in", 1, NeuronRule::Clamped);
        let output = NeuronGroup::create(&mut net, "out", 1, NeuronRule::Binary(Default::default()));
        net.connect(input.get(0), output.get(0), 1.0).unwrap();
        let mut trainer = BackpropTrainer::new(vec![input, output]).unwrap();
        trainer
            .set_training_set(TrainingSet::new(array![[1.0]], array![[1.0]]).unwrap())
            .unwrap();
        assert!(matches!(
            trainer.iterate(&mut net),
            Err(SimError::NotImplemented(_))
        ));
        // The data survives a failed epoch.
        assert!(trainer.training_set().is_some());
    }

    #[test]
    fn separate_matrices_are_checked_when_assigned() {
        let mut net = Network::new();
        let layers = layered(&mut net, &[2, 3, 1]);
        let mut trainer = BackpropTrainer::new(layers).unwrap();
        assert!(matches!(
            trainer.set_input_data(array![[1.0, 0.0, 1.0]]),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            trainer.set_training_data(array![[1.0, 0.0]]),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            trainer.iterate(&mut net),
            Err(SimError::DataNotInitialized(_))
        ));

        trainer.set_input_data(array![[1.0, 0.0], [0.0, 1.0]]).unwrap();
        trainer.set_training_data(array![[1.0], [0.0]]).unwrap();
        trainer.iterate(&mut net).unwrap();
        assert_eq!(trainer.iteration(), 1);
    }

    #[test]
    fn a_single_layer_is_rejected() {
        let mut net = Network::new();
        let layer = NeuronGroup::create(&mut net, "only", 2, NeuronRule::linear());
        assert!(BackpropTrainer::new(vec![layer]).is_err());
    }
}
