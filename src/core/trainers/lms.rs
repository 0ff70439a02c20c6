//! Online least-mean-squares (delta rule) training of a single layer of weights.
//!
//! For every row of the training set:
//! - the input layer is set to the row,
//! - the output layer is updated once,
//! - each output neuron computes `error = target - activation`,
//! - every incoming weight moves by `learning_rate * error * presynaptic activation`,
//! - the bias, if the rule has one, moves by `learning_rate * error`.
//!
//! The reported error is the root mean squared error over every output of every row of the
//! epoch, computed once after the epoch completes.

use super::{rms, IterableTrainer, TrainingData, TrainingSet};
use crate::core::{groups::NeuronGroup, network::Network};
use crate::error::Result;
use ndarray::Array2;

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

pub struct LmsIterative {
    pub input_layer: NeuronGroup,
    pub output_layer: NeuronGroup,
    pub learning_rate: f64,

    /// Whether biases are adapted along with weights.
    pub update_biases: bool,

    data: TrainingData,
    error: f64,
    iteration: usize,
}

impl LmsIterative {
    pub fn new(input_layer: NeuronGroup, output_layer: NeuronGroup) -> Self {
        Self {
            input_layer,
            output_layer,
            learning_rate: DEFAULT_LEARNING_RATE,
            update_biases: true,
            data: TrainingData::default(),
            error: 0.0,
            iteration: 0,
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Hands over the training data after checking it against the layer sizes.
    pub fn set_training_set(&mut self, data: TrainingSet) -> Result<()> {
        self.data
            .set(data, self.input_layer.len(), self.output_layer.len())
    }

    /// Replaces the input rows. Needs one column per input neuron.
    pub fn set_input_data(&mut self, input: Array2<f64>) -> Result<()> {
        self.data.set_input(input, self.input_layer.len())
    }

    /// Replaces the target rows. Needs one column per output neuron.
    pub fn set_training_data(&mut self, target: Array2<f64>) -> Result<()> {
        self.data.set_target(target, self.output_layer.len())
    }

    pub fn training_set(&self) -> Option<&TrainingSet> {
        self.data.training_set()
    }

    /// Resets the error and the epoch counter.
    pub fn reset(&mut self) {
        self.error = 0.0;
        self.iteration = 0;
    }
}

impl IterableTrainer for LmsIterative {
    fn iterate(&mut self, net: &mut Network) -> Result<()> {
        let data = self.data.ready()?;

        let mut sum_squared = 0.0;
        for row in 0..data.rows() {
            let inputs = data.input_row(row).to_vec();
            self.input_layer.set_activations(net, &inputs)?;
            self.output_layer.update(net);

            for (&id, &target) in self.output_layer.ids().iter().zip(data.target_row(row)) {
                let error = target - net.neuron(id).activation;
                sum_squared += error * error;

                let fan_in = net.neuron(id).fan_in().to_vec();
                for syn in fan_in {
                    let pre = net.neuron(net.synapse(syn).source()).activation;
                    net.synapse_mut(syn).strength += self.learning_rate * error * pre;
                }
                if self.update_biases {
                    if let Some(bias) = net.neuron_mut(id).rule.bias_mut() {
                        *bias += self.learning_rate * error;
                    }
                }
            }
        }

        self.error = rms(sum_squared, data.rows(), self.output_layer.len());
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
        neuron_rules::NeuronRule,
    };
    use crate::error::SimError;
    use ndarray::array;

    fn two_by_two(net: &mut Network) -> (NeuronGroup, NeuronGroup) {
        let input = NeuronGroup::create(net, "in", 2, NeuronRule::linear());
        let output = NeuronGroup::create(net, "out", 2, NeuronRule::linear());
        let connector =
            Connector::new(ConnectionPattern::AllToAll { allow_self: true }).with_strength(0.5);
        SynapseGroup::connect(net, "w", &input, &output, &connector).unwrap();
        (input, output)
    }

    #[test]
    fn weights_follow_the_error_sign() {
        let mut net = Network::new();
        let (input, output) = two_by_two(&mut net);
        let (in1, in2) = (input.get(0), input.get(1));
        let (out1, out2) = (output.get(0), output.get(1));

        let mut lms = LmsIterative::new(input, output);
        lms.set_training_set(TrainingSet::new(array![[1.0, 0.0]], array![[1.0, 0.0]]).unwrap())
            .unwrap();
        lms.iterate(&mut net).unwrap();

        let weight = |s, t| net.synapse(net.find_synapse(s, t).unwrap()).strength;
        assert!((weight(in1, out1) - 0.505).abs() < 1e-12);
        assert!((weight(in1, out2) - 0.495).abs() < 1e-12);
        assert_eq!(weight(in2, out1), 0.5);
        assert_eq!(weight(in2, out2), 0.5);
        assert!((lms.error() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn error_shrinks_with_training() {
        let mut net = Network::new();
        let (input, output) = two_by_two(&mut net);
        let mut lms = LmsIterative::new(input, output).with_learning_rate(0.1);
        lms.set_training_set(
            TrainingSet::new(
                array![[1.0, 0.0], [0.0, 1.0]],
                array![[0.2, 0.8], [0.9, 0.1]],
            )
            .unwrap(),
        )
        .unwrap();
        lms.iterate(&mut net).unwrap();
        let first = lms.error();
        let last = lms.train(&mut net, 200).unwrap();
        assert!(last < first);
        assert!(last < 0.01);
        assert_eq!(lms.iteration(), 201);
    }

    #[test]
    fn missing_data_and_bad_shapes_are_errors() {
        let mut net = Network::new();
        let (input, output) = two_by_two(&mut net);
        let mut lms = LmsIterative::new(input, output);
        assert!(matches!(
            lms.iterate(&mut net),
            Err(SimError::DataNotInitialized(_))
        ));
        let bad = TrainingSet::new(array![[1.0, 0.0, 0.0]], array![[1.0, 0.0]]).unwrap();
        assert!(lms.set_training_set(bad).is_err());
    }

    #[test]
    fn separate_matrices_are_checked_when_assigned() {
        let mut net = Network::new();
        let (input, output) = two_by_two(&mut net);
        let mut lms = LmsIterative::new(input, output);
        assert!(matches!(
            lms.set_input_data(array![[1.0, 0.0, 0.0]]),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            lms.set_training_data(array![[1.0]]),
            Err(SimError::DimensionMismatch { .. })
        ));

        lms.set_input_data(array![[1.0, 0.0]]).unwrap();
        assert!(lms.training_set().is_none());
        lms.set_training_data(array![[1.0, 0.0]]).unwrap();
        lms.iterate(&mut net).unwrap();
        assert!((lms.error() - 0.5).abs() < 1e-12);
    }
}
