//! Backpropagation through time for a network with one recurrent hidden layer.
//!
//! The rows of the training set are one sequence. Each epoch resets the hidden layer to 0,
//! runs the sequence forward while recording every step, then walks the steps backwards.
//! The hidden delta at step `t` collects the output error of step `t` and the hidden delta
//! of step `t + 1` through the recurrent weights. Gradients are summed over the whole
//! sequence and applied once per epoch.

use super::{rms, IterableTrainer, TrainingData, TrainingSet};
use crate::core::{groups::NeuronGroup, network::Network};
use crate::error::Result;
use ndarray::{Array1, Array2, Axis};

pub const DEFAULT_LEARNING_RATE: f64 = 0.05;

/// Summed gradients of one pass over a sequence. Matrices have one row per source and one
/// column per target. Every entry points downhill.
#[derive(Debug, Clone)]
pub struct BpttGradients {
    pub input_hidden: Array2<f64>,
    pub hidden_hidden: Array2<f64>,
    pub hidden_output: Array2<f64>,
    pub hidden_bias: Array1<f64>,
    pub output_bias: Array1<f64>,

    /// Sum of squared output errors over the sequence.
    pub sum_squared: f64,
}

/// What the forward pass saw at one step.
struct Step {
    input: Array1<f64>,
    previous_hidden: Array1<f64>,
    hidden: Array1<f64>,
    hidden_slope: Array1<f64>,
    output: Array1<f64>,
    output_slope: Array1<f64>,
}

pub struct BpttTrainer {
    pub input: NeuronGroup,
    pub hidden: NeuronGroup,
    pub output: NeuronGroup,
    pub learning_rate: f64,

    data: TrainingData,
    error: f64,
    iteration: usize,
}

impl BpttTrainer {
    pub fn new(input: NeuronGroup, hidden: NeuronGroup, output: NeuronGroup) -> Self {
        Self {
            input,
            hidden,
            output,
            learning_rate: DEFAULT_LEARNING_RATE,
            data: TrainingData::default(),
            error: 0.0,
            iteration: 0,
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn set_training_set(&mut self, data: TrainingSet) -> Result<()> {
        self.data.set(data, self.input.len(), self.output.len())
    }

    /// Replaces the input sequence. Needs one column per input neuron.
    pub fn set_input_data(&mut self, input: Array2<f64>) -> Result<()> {
        self.data.set_input(input, self.input.len())
    }

    /// Replaces the target sequence. Needs one column per output neuron.
    pub fn set_training_data(&mut self, target: Array2<f64>) -> Result<()> {
        self.data.set_target(target, self.output.len())
    }

    pub fn training_set(&self) -> Option<&TrainingSet> {
        self.data.training_set()
    }

    /// Runs `data` forward from a zero hidden state and returns the summed gradients.
    /// Weights are not changed.
    pub fn gradients(&self, net: &mut Network, data: &TrainingSet) -> Result<BpttGradients> {
        let steps = self.forward(net, data)?;

        let w_hh = matrix(net, &self.hidden, &self.hidden);
        let w_ho = matrix(net, &self.hidden, &self.output);
        let (n_in, n_hidden, n_out) = (self.input.len(), self.hidden.len(), self.output.len());

        let mut grads = BpttGradients {
            input_hidden: Array2::zeros((n_in, n_hidden)),
            hidden_hidden: Array2::zeros((n_hidden, n_hidden)),
            hidden_output: Array2::zeros((n_hidden, n_out)),
            hidden_bias: Array1::zeros(n_hidden),
            output_bias: Array1::zeros(n_out),
            sum_squared: 0.0,
        };

        let mut next_delta: Array1<f64> = Array1::zeros(n_hidden);
        for (row, step) in steps.iter().enumerate().rev() {
            let error = &data.target_row(row) - &step.output;
            grads.sum_squared += error.mapv(|e| e * e).sum();

            let output_delta = &error * &step.output_slope;
            grads.hidden_output += &outer(&step.hidden, &output_delta);
            grads.output_bias += &output_delta;

            let back = w_ho.dot(&output_delta) + w_hh.dot(&next_delta);
            let hidden_delta = back * &step.hidden_slope;
            grads.input_hidden += &outer(&step.input, &hidden_delta);
            grads.hidden_hidden += &outer(&step.previous_hidden, &hidden_delta);
            grads.hidden_bias += &hidden_delta;

            next_delta = hidden_delta;
        }
        Ok(grads)
    }

    fn forward(&self, net: &mut Network, data: &TrainingSet) -> Result<Vec<Step>> {
        data.validate(self.input.len(), self.output.len())?;
        self.hidden.fill_activations(net, 0.0);

        let mut steps = Vec::with_capacity(data.rows());
        for row in 0..data.rows() {
            let input = data.input_row(row).to_owned();
            self.input.set_activations(net, &input.to_vec())?;
            let previous_hidden = self.hidden.activation_array(net);
            self.hidden.update(net);
            let hidden_slope = slopes(net, &self.hidden)?;
            self.output.update(net);
            let output_slope = slopes(net, &self.output)?;
            steps.push(Step {
                input,
                previous_hidden,
                hidden: self.hidden.activation_array(net),
                hidden_slope,
                output: self.output.activation_array(net),
                output_slope,
            });
        }
        Ok(steps)
    }

    fn apply(&self, net: &mut Network, grads: &BpttGradients) {
        let rate = self.learning_rate;
        apply_matrix(net, &self.input, &self.hidden, &grads.input_hidden, rate);
        apply_matrix(net, &self.hidden, &self.hidden, &grads.hidden_hidden, rate);
        apply_matrix(net, &self.hidden, &self.output, &grads.hidden_output, rate);
        apply_bias(net, &self.hidden, &grads.hidden_bias, rate);
        apply_bias(net, &self.output, &grads.output_bias, rate);
    }
}

impl IterableTrainer for BpttTrainer {
    fn iterate(&mut self, net: &mut Network) -> Result<()> {
        let set = self.data.ready()?;
        let grads = self.gradients(net, set)?;
        let rows = set.rows();
        self.apply(net, &grads);
        self.error = rms(grads.sum_squared, rows, self.output.len());
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

/// Derivative of each member's rule at its last weighted input.
fn slopes(net: &Network, group: &NeuronGroup) -> Result<Array1<f64>> {
    group
        .ids()
        .iter()
        .map(|&id| {
            let n = net.neuron(id);
            n.rule.derivative(n.input(), n.lower_bound, n.upper_bound)
        })
        .collect()
}

/// Weights between two groups, read through the synapse index. Missing synapses read as 0.
fn matrix(net: &Network, sources: &NeuronGroup, targets: &NeuronGroup) -> Array2<f64> {
    Array2::from_shape_fn((sources.len(), targets.len()), |(i, j)| {
        net.find_synapse(sources.get(i), targets.get(j))
            .map_or(0.0, |s| net.synapse(s).strength)
    })
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let column = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    column.dot(&row)
}

/// Adds `rate * grads` to the synapses that exist. Absent connections stay absent.
fn apply_matrix(
    net: &mut Network,
    sources: &NeuronGroup,
    targets: &NeuronGroup,
    grads: &Array2<f64>,
    rate: f64,
) {
    for ((i, j), &g) in grads.indexed_iter() {
        if let Some(s) = net.find_synapse(sources.get(i), targets.get(j)) {
            net.synapse_mut(s).strength += rate * g;
        }
    }
}

fn apply_bias(net: &mut Network, group: &NeuronGroup, grads: &Array1<f64>, rate: f64) {
    for (&id, &g) in group.ids().iter().zip(grads) {
        if let Some(bias) = net.neuron_mut(id).rule.bias_mut() {
            *bias += rate * g;
        }
    }
}
