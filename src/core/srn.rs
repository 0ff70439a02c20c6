//! Simple recurrent (Elman) network.
//!
//! Four layers: input, hidden, context and output. The context layer is a copy of the
//! hidden layer from the previous tick and feeds back into the hidden layer next to the
//! input, which gives the network a one-step memory.
//!
//! Training unrolls nothing: the network is run freely over the input rows to record what
//! the context layer held at each step, and a backprop trainer then treats input plus
//! context as one logical input layer.

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::Layout,
    network::Network,
    neuron_rules::{NeuronRule, SquashingFunction},
    synapse::SynapseTemplate,
    trainers::{BackpropTrainer, TrainingData, TrainingSet},
};
use crate::error::{Result, SimError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrnParams {
    pub num_inputs: usize,
    pub num_hidden: usize,
    pub num_outputs: usize,
    pub hidden_rule: NeuronRule,
    pub output_rule: NeuronRule,

    /// Context activation at the start of a sequence.
    pub context_init: f64,
}

impl Default for SrnParams {
    fn default() -> Self {
        Self {
            num_inputs: 3,
            num_hidden: 5,
            num_outputs: 3,
            hidden_rule: NeuronRule::sigmoidal(SquashingFunction::Logistic),
            output_rule: NeuronRule::sigmoidal(SquashingFunction::Logistic),
            context_init: 0.5,
        }
    }
}

pub struct SimpleRecurrentNetwork {
    pub input: NeuronGroup,
    pub hidden: NeuronGroup,
    pub context: NeuronGroup,
    pub output: NeuronGroup,

    pub input_hidden: SynapseGroup,
    pub context_hidden: SynapseGroup,
    pub hidden_output: SynapseGroup,

    pub context_init: f64,
    data: TrainingData,
}

impl SimpleRecurrentNetwork {
    pub fn new(net: &mut Network, params: &SrnParams) -> Result<Self> {
        if params.num_inputs == 0 || params.num_hidden == 0 || params.num_outputs == 0 {
            return Err(SimError::invalid("SRN size", "every layer must be non-empty"));
        }
        let layer = |net: &mut Network, label: &str, size: usize, rule: NeuronRule, lower: f64| {
            let group = NeuronGroup::create(net, label, size, rule);
            group.set_bounds(net, lower, 1.0);
            group.set_increment(net, 1.0);
            group
        };
        let input = layer(net, "Inputs", params.num_inputs, NeuronRule::Clamped, 0.0);
        let hidden = layer(net, "Hidden layer", params.num_hidden, params.hidden_rule, -1.0);
        let context = layer(net, "Context nodes", params.num_hidden, NeuronRule::Clamped, -1.0);
        let output = layer(net, "Output layer", params.num_outputs, params.output_rule, 0.0);
        context.fill_activations(net, params.context_init);

        let line = Layout::Line { spacing: 50.0 };
        input.apply_layout(net, &line, (0.0, 0.0));
        context.apply_layout(net, &line, (50.0 * params.num_inputs as f64 + 150.0, 0.0));
        hidden.apply_layout(net, &line, (0.0, -150.0));
        output.apply_layout(net, &line, (0.0, -300.0));

        let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: false })
            .with_template(SynapseTemplate {
                lower_bound: -1.0,
                upper_bound: 1.0,
                ..SynapseTemplate::default()
            });
        let input_hidden = SynapseGroup::connect(net, "input to hidden", &input, &hidden, &connector)?;
        let context_hidden =
            SynapseGroup::connect(net, "context to hidden", &context, &hidden, &connector)?;
        let hidden_output =
            SynapseGroup::connect(net, "hidden to output", &hidden, &output, &connector)?;
        debug!(
            inputs = params.num_inputs,
            hidden = params.num_hidden,
            outputs = params.num_outputs,
            "built simple recurrent network"
        );
        Ok(Self {
            input,
            hidden,
            context,
            output,
            input_hidden,
            context_hidden,
            hidden_output,
            context_init: params.context_init,
            data: TrainingData::default(),
        })
    }

    /// Hidden layer, then the context copy, then the output layer.
    pub fn update(&self, net: &mut Network) {
        self.hidden.update(net);
        let copy = self.hidden.activations(net);
        for (&id, value) in self.context.ids().iter().zip(copy) {
            net.neuron_mut(id).set_activation(value);
        }
        self.output.update(net);
    }

    /// Puts the context layer back to its initial activation.
    pub fn reset_context(&self, net: &mut Network) {
        self.context.fill_activations(net, self.context_init);
    }

    pub fn set_training_set(&mut self, data: TrainingSet) -> Result<()> {
        self.data.set(data, self.input.len(), self.output.len())
    }

    /// Replaces the input rows. Needs one column per input neuron.
    pub fn set_input_data(&mut self, input: Array2<f64>) -> Result<()> {
        self.data.set_input(input, self.input.len())
    }

    /// Replaces the target rows. Needs one column per output neuron.
    pub fn set_training_data(&mut self, target: Array2<f64>) -> Result<()> {
        self.data.set_target(target, self.output.len())
    }

    pub fn training_set(&self) -> Option<&TrainingSet> {
        self.data.training_set()
    }

    /// Runs the input rows through the network from a reset context and returns one row
    /// per step: the input followed by the context the hidden layer saw at that step.
    pub fn logical_input_data(&self, net: &mut Network) -> Result<Array2<f64>> {
        let input = self
            .data
            .input()
            .ok_or(SimError::DataNotInitialized("input"))?;
        let (n_in, n_context) = (self.input.len(), self.context.len());
        let mut logical = Array2::zeros((input.nrows(), n_in + n_context));

        self.reset_context(net);
        for (row, values) in input.rows().into_iter().enumerate() {
            let context = self.context.activations(net);
            self.input.set_activations(net, &values.to_vec())?;
            self.update(net);
            for (i, &value) in values.iter().enumerate() {
                logical[[row, i]] = value;
            }
            for (i, value) in context.into_iter().enumerate() {
                logical[[row, n_in + i]] = value;
            }
        }
        Ok(logical)
    }

    /// A backprop trainer over `[input + context, hidden, output]`, loaded with the logical
    /// input data and the targets.
    pub fn trainer(&self, net: &mut Network) -> Result<BackpropTrainer> {
        let target = self.data.ready()?.target().clone();
        let logical = self.logical_input_data(net)?;

        let mut ids = self.input.ids().to_vec();
        ids.extend_from_slice(self.context.ids());
        let logical_layer = NeuronGroup::from_ids("Inputs and context", &ids)?;

        let mut trainer =
            BackpropTrainer::new(vec![logical_layer, self.hidden.clone(), self.output.clone()])?;
        trainer.set_training_set(TrainingSet::new(logical, target)?)?;
        Ok(trainer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trainers::IterableTrainer;
    use ndarray::array;

    fn small(net: &mut Network) -> SimpleRecurrentNetwork {
        SimpleRecurrentNetwork::new(
            net,
            &SrnParams {
                num_inputs: 2,
                num_hidden: 3,
                num_outputs: 2,
                ..SrnParams::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn wiring() {
        let mut net = Network::new();
        let srn = small(&mut net);
        assert_eq!(srn.input_hidden.len(), 6);
        assert_eq!(srn.context_hidden.len(), 9);
        assert_eq!(srn.hidden_output.len(), 6);
        assert_eq!(srn.context.activations(&net), vec![0.5; 3]);
    }

    #[test]
    fn context_copies_hidden() {
        let mut net = Network::with_seed(4);
        let srn = small(&mut net);
        srn.input.set_activations(&mut net, &[1.0, 0.0]).unwrap();
        srn.update(&mut net);
        assert_eq!(srn.context.activations(&net), srn.hidden.activations(&net));
    }

    #[test]
    fn logical_rows_hold_the_context_seen_by_the_hidden_layer() {
        let mut net = Network::with_seed(4);
        let mut srn = small(&mut net);
        srn.set_training_set(
            TrainingSet::new(
                array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
                array![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0]],
            )
            .unwrap(),
        )
        .unwrap();
        let logical = srn.logical_input_data(&mut net).unwrap();
        assert_eq!(logical.dim(), (3, 5));
        assert_eq!(logical.row(0).to_vec(), vec![1.0, 0.0, 0.5, 0.5, 0.5]);
        assert_eq!(logical[[1, 0]], 0.0);
        assert_eq!(logical[[1, 1]], 1.0);
        assert_ne!(logical[[1, 2]], 0.5);
    }

    #[test]
    fn trainer_reduces_error() {
        let mut net = Network::with_seed(9);
        let mut srn = small(&mut net);
        srn.set_training_set(
            TrainingSet::new(
                array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
                array![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0], [1.0, 0.0]],
            )
            .unwrap(),
        )
        .unwrap();
        let mut trainer = srn.trainer(&mut net).unwrap();
        trainer.iterate(&mut net).unwrap();
        let first = trainer.error();
        let last = trainer.train(&mut net, 300).unwrap();
        assert!(last < first, "{last} >= {first}");
    }

    #[test]
    fn logical_data_needs_only_the_inputs() {
        let mut net = Network::with_seed(4);
        let mut srn = small(&mut net);
        assert!(matches!(
            srn.set_input_data(array![[1.0, 0.0, 0.0]]),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            srn.set_training_data(array![[1.0]]),
            Err(SimError::DimensionMismatch { .. })
        ));
        srn.set_input_data(array![[1.0, 0.0], [0.0, 1.0]]).unwrap();
        assert_eq!(srn.logical_input_data(&mut net).unwrap().dim(), (2, 5));
        assert!(matches!(
            srn.trainer(&mut net),
            Err(SimError::DataNotInitialized(_))
        ));
        srn.set_training_data(array![[0.0, 1.0], [1.0, 0.0]]).unwrap();
        assert!(srn.trainer(&mut net).is_ok());
    }

    #[test]
    fn trainer_without_data_fails() {
        let mut net = Network::new();
        let srn = small(&mut net);
        assert!(matches!(
            srn.trainer(&mut net),
            Err(SimError::DataNotInitialized(_))
        ));
    }
}
