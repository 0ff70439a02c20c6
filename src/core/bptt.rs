//! A recurrent network trained with backpropagation through time.
//!
//! Input feeds a hidden layer that is fully connected to itself (self loops included);
//! the hidden layer feeds the output. Each tick updates the hidden layer from the input and
//! its own previous state, then the output.

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::Layout,
    network::Network,
    neuron_rules::{LinearRule, NeuronRule, SquashingFunction},
    random::Randomizer,
    trainers::BpttTrainer,
};
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BpttParams {
    pub num_inputs: usize,
    pub num_hidden: usize,
    pub num_outputs: usize,
    pub hidden_rule: NeuronRule,
    pub output_rule: NeuronRule,
    pub weights: Randomizer,
}

impl Default for BpttParams {
    fn default() -> Self {
        Self {
            num_inputs: 1,
            num_hidden: 8,
            num_outputs: 1,
            hidden_rule: NeuronRule::sigmoidal(SquashingFunction::Tanh),
            output_rule: NeuronRule::Linear(LinearRule {
                clipping: false,
                ..LinearRule::default()
            }),
            weights: Randomizer::Uniform {
                lower: -0.5,
                upper: 0.5,
            },
        }
    }
}

pub struct Bptt {
    pub input: NeuronGroup,
    pub hidden: NeuronGroup,
    pub output: NeuronGroup,

    pub input_hidden: SynapseGroup,
    pub recurrent: SynapseGroup,
    pub hidden_output: SynapseGroup,
}

impl Bptt {
    pub fn new(net: &mut Network, params: &BpttParams) -> Result<Self> {
        if params.num_inputs == 0 || params.num_hidden == 0 || params.num_outputs == 0 {
            return Err(SimError::invalid("BPTT size", "every layer must be non-empty"));
        }
        let input = NeuronGroup::create(net, "Inputs", params.num_inputs, NeuronRule::Clamped);
        let hidden = NeuronGroup::create(net, "Hidden", params.num_hidden, params.hidden_rule);
        let output = NeuronGroup::create(net, "Outputs", params.num_outputs, params.output_rule);
        let line = Layout::Line { spacing: 50.0 };
        input.apply_layout(net, &line, (0.0, 0.0));
        hidden.apply_layout(net, &line, (0.0, -150.0));
        output.apply_layout(net, &line, (0.0, -300.0));

        let connector = |allow_self| {
            Connector::new(ConnectionPattern::AllToAll { allow_self })
                .with_ratio(1.0)
                .with_randomizers(params.weights, params.weights)
        };
        let input_hidden = SynapseGroup::connect(net, "input to hidden", &input, &hidden, &connector(false))?;
        let recurrent = SynapseGroup::connect(net, "hidden recurrent", &hidden, &hidden, &connector(true))?;
        let hidden_output =
            SynapseGroup::connect(net, "hidden to output", &hidden, &output, &connector(false))?;
        debug!(
            inputs = params.num_inputs,
            hidden = params.num_hidden,
            outputs = params.num_outputs,
            "built BPTT network"
        );
        Ok(Self {
            input,
            hidden,
            output,
            input_hidden,
            recurrent,
            hidden_output,
        })
    }

    pub fn update(&self, net: &mut Network) {
        self.hidden.update(net);
        self.output.update(net);
    }

    /// Zeroes the hidden state.
    pub fn reset(&self, net: &mut Network) {
        self.hidden.fill_activations(net, 0.0);
    }

    pub fn trainer(&self) -> BpttTrainer {
        BpttTrainer::new(self.input.clone(), self.hidden.clone(), self.output.clone())
    }
}
