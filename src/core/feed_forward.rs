//! Layered feed-forward network.
//!
//! The first layer takes input and never computes. Every other layer shares one update
//! rule and is fed all-to-all from the layer below. An update runs the layers bottom to top,
//! so one tick carries the input through the whole stack.

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::Layout,
    network::Network,
    neuron_rules::NeuronRule,
    random::Randomizer,
    trainers::BackpropTrainer,
};
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedForwardParams {
    /// Sizes from input to output. At least two layers.
    pub layer_sizes: Vec<usize>,

    /// Rule of every non-input layer.
    pub rule: NeuronRule,

    /// Initial weights.
    pub weights: Randomizer,

    /// Vertical distance between layers in the layout plane.
    pub layer_spacing: f64,
}

impl Default for FeedForwardParams {
    fn default() -> Self {
        Self {
            layer_sizes: vec![2, 3, 1],
            rule: NeuronRule::sigmoidal(Default::default()),
            weights: Randomizer::default(),
            layer_spacing: 150.0,
        }
    }
}

pub struct FeedForward {
    pub layers: Vec<NeuronGroup>,

    /// `weights[i]` connects `layers[i]` to `layers[i + 1]`.
    pub weights: Vec<SynapseGroup>,
}

impl FeedForward {
    /// Builds a network with the given layer sizes and default parameters.
    pub fn new(net: &mut Network, layer_sizes: &[usize]) -> Result<Self> {
        Self::with_params(
            net,
            &FeedForwardParams {
                layer_sizes: layer_sizes.to_vec(),
                ..FeedForwardParams::default()
            },
        )
    }

    pub fn with_params(net: &mut Network, params: &FeedForwardParams) -> Result<Self> {
        if params.layer_sizes.len() < 2 {
            return Err(SimError::invalid(
                "layer_sizes",
                "a feed-forward network needs an input and an output layer",
            ));
        }
        if params.layer_sizes.contains(&0) {
            return Err(SimError::invalid("layer_sizes", "layers must be non-empty"));
        }

        let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: false })
            .with_ratio(1.0)
            .with_randomizers(params.weights, params.weights);
        let mut layers: Vec<NeuronGroup> = Vec::with_capacity(params.layer_sizes.len());
        let mut weights = Vec::with_capacity(params.layer_sizes.len() - 1);
        for (i, &size) in params.layer_sizes.iter().enumerate() {
            let layer = if i == 0 {
                let layer = NeuronGroup::create(net, "Input layer", size, NeuronRule::Clamped);
                layer.set_bounds(net, 0.0, 1.0);
                layer
            } else {
                let label = if i == params.layer_sizes.len() - 1 {
                    "Output layer".to_string()
                } else {
                    format!("Hidden layer {i}")
                };
                let layer = NeuronGroup::create(net, label, size, params.rule);
                if let NeuronRule::Sigmoidal(rule) = params.rule {
                    let (lower, upper) = rule.function.default_bounds();
                    layer.set_bounds(net, lower, upper);
                }
                layer
            };
            let y = -(i as f64) * params.layer_spacing;
            layer.apply_layout(net, &Layout::Line { spacing: 50.0 }, (0.0, y));

            if let Some(below) = layers.last() {
                let label = format!("{} to {}", below.label, layer.label);
                weights.push(SynapseGroup::connect(net, label, below, &layer, &connector)?);
            }
            layers.push(layer);
        }
        debug!(sizes = ?params.layer_sizes, "built feed-forward network");
        Ok(Self { layers, weights })
    }

    #[inline]
    pub fn input_layer(&self) -> &NeuronGroup {
        &self.layers[0]
    }

    #[inline]
    pub fn output_layer(&self) -> &NeuronGroup {
        &self.layers[self.layers.len() - 1]
    }

    pub fn set_input(&self, net: &mut Network, values: &[f64]) -> Result<()> {
        self.input_layer().set_activations(net, values)
    }

    pub fn outputs(&self, net: &Network) -> Vec<f64> {
        self.output_layer().activations(net)
    }

    /// Updates the layers above the input, bottom to top.
    pub fn update(&self, net: &mut Network) {
        for layer in &self.layers[1..] {
            layer.update(net);
        }
    }

    /// Sets the input and runs one update. Returns the output activations.
    pub fn predict(&self, net: &mut Network, input: &[f64]) -> Result<Vec<f64>> {
        self.set_input(net, input)?;
        self.update(net);
        Ok(self.outputs(net))
    }

    /// Redraws every weight from `randomizer`.
    pub fn randomize(&self, net: &mut Network, randomizer: &Randomizer) {
        for group in &self.weights {
            group.randomize_with(net, randomizer);
        }
    }

    /// A backprop trainer over all layers.
    pub fn trainer(&self) -> Result<BackpropTrainer> {
        BackpropTrainer::new(self.layers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trainers::{IterableTrainer, TrainingSet};
    use ndarray::array;

    #[test]
    fn layers_are_fully_connected_in_sequence() {
        let mut net = Network::new();
        let ff = FeedForward::new(&mut net, &[3, 4, 2]).unwrap();
        assert_eq!(ff.layers.len(), 3);
        assert_eq!(ff.weights[0].len(), 12);
        assert_eq!(ff.weights[1].len(), 8);
        assert!(net.find_synapse(ff.layers[0].get(0), ff.layers[2].get(0)).is_none());
    }

    #[test]
    fn one_update_reaches_the_output() {
        let mut net = Network::new();
        let params = FeedForwardParams {
            layer_sizes: vec![2, 2, 1],
            rule: NeuronRule::linear(),
            weights: Randomizer::Constant(0.5),
            ..FeedForwardParams::default()
        };
        let ff = FeedForward::with_params(&mut net, &params).unwrap();
        let out = ff.predict(&mut net, &[1.0, 1.0]).unwrap();
        // Hidden: 0.5 + 0.5 = 1. Output: 0.5 + 0.5 = 1.
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn too_few_layers() {
        let mut net = Network::new();
        assert!(FeedForward::new(&mut net, &[3]).is_err());
        assert!(FeedForward::new(&mut net, &[3, 0, 1]).is_err());
    }

    #[test]
    fn backprop_fits_and() {
        let mut net = Network::with_seed(2);
        let ff = FeedForward::new(&mut net, &[2, 1]).unwrap();
        let mut trainer = ff.trainer().unwrap().with_learning_rate(0.5);
        trainer
            .set_training_set(
                TrainingSet::new(
                    array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
                    array![[0.0], [0.0], [0.0], [1.0]],
                )
                .unwrap(),
            )
            .unwrap();
        let error = trainer.train(&mut net, 2000).unwrap();
        assert!(error < 0.2, "{error}");
        assert!(ff.predict(&mut net, &[1.0, 1.0]).unwrap()[0] > 0.5);
        assert!(ff.predict(&mut net, &[0.0, 1.0]).unwrap()[0] < 0.5);
    }
}
