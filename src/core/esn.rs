//! Echo state network.
//!
//! An input layer drives a large, sparsely and randomly connected reservoir of tanh neurons;
//! a linear output layer reads the reservoir out. Only the readout is trained, in one shot,
//! by regressing targets on harvested reservoir states.
//!
//! Wiring:
//! - input to reservoir, sparse
//! - reservoir to reservoir, sparse, rescaled to the target spectral radius
//! - output to reservoir, sparse ("back weights", on by default)
//! - reservoir to output, all-to-all, zero until trained
//! - output to output and input to output, all-to-all at zero, only when enabled
//!
//! The reservoir's spectral radius controls how long it remembers: below 1, old input fades
//! out (the echo state property).

use super::{
    connections::{ConnectionPattern, Connector},
    groups::{NeuronGroup, SynapseGroup},
    layout::Layout,
    linalg::{scale_to_spectral_radius, spectral_radius},
    network::Network,
    neuron_rules::{LinearRule, NeuronRule, SquashingFunction},
    random::Randomizer,
    reservoir::StateHarvester,
    trainers::{LmsOffline, TrainingSet},
};
use crate::error::{Result, SimError};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsnParams {
    pub num_inputs: usize,
    pub num_reservoir: usize,
    pub num_outputs: usize,

    /// Largest eigenvalue magnitude the reservoir weights are scaled to. Values below 1
    /// give the echo state property.
    pub spectral_radius: f64,

    /// Fraction of reservoir neurons each input neuron connects to.
    pub input_density: f64,

    /// Fraction of reservoir neurons each reservoir neuron connects to.
    pub reservoir_density: f64,

    /// Fraction of reservoir neurons each output neuron feeds back to.
    pub back_density: f64,

    /// Probability that a new sparse synapse is excitatory.
    pub excitatory_ratio: f64,

    /// Feed the outputs back into the reservoir.
    pub back_weights: bool,

    /// Connect the output layer to itself.
    pub recurrent_outputs: bool,

    /// Connect inputs straight to outputs. These weights are trained with the readout.
    pub direct_in_out: bool,

    pub reservoir_rule: NeuronRule,

    /// Rule of the readout layer. Sigmoidal rules have their targets inverse-mapped before
    /// the readout solve.
    pub output_rule: NeuronRule,

    /// Noise added to reservoir activations while harvesting.
    pub noise: Option<Randomizer>,
}

impl Default for EsnParams {
    fn default() -> Self {
        Self {
            num_inputs: 1,
            num_reservoir: 50,
            num_outputs: 1,
            spectral_radius: 0.98,
            input_density: 0.1,
            reservoir_density: 0.1,
            back_density: 0.1,
            excitatory_ratio: 0.5,
            back_weights: true,
            recurrent_outputs: false,
            direct_in_out: false,
            reservoir_rule: NeuronRule::sigmoidal(SquashingFunction::Tanh),
            output_rule: NeuronRule::Linear(LinearRule {
                clipping: false,
                ..LinearRule::default()
            }),
            noise: None,
        }
    }
}

/// Assembles an [`EchoStateNetwork`] from supplied or freshly created layers.
///
/// Each layer can be handed in at most once. Layers not handed in are created from the
/// parameters when the network is built.
pub struct EsnBuilder {
    params: EsnParams,
    input: Option<NeuronGroup>,
    reservoir: Option<(NeuronGroup, SynapseGroup)>,
    output: Option<NeuronGroup>,
}

impl EsnBuilder {
    pub fn new(params: EsnParams) -> Self {
        Self {
            params,
            input: None,
            reservoir: None,
            output: None,
        }
    }

    pub fn input_layer(&mut self, mut group: NeuronGroup) -> Result<&mut Self> {
        if self.input.is_some() {
            return Err(SimError::LayerAlreadySet("input"));
        }
        group.label = "Inputs".into();
        self.params.num_inputs = group.len();
        self.input = Some(group);
        Ok(self)
    }

    /// Uses an existing reservoir with its recurrent synapses. They are still rescaled to
    /// the spectral radius.
    pub fn reservoir(&mut self, mut neurons: NeuronGroup, synapses: SynapseGroup) -> Result<&mut Self> {
        if self.reservoir.is_some() {
            return Err(SimError::LayerAlreadySet("reservoir"));
        }
        neurons.label = "Reservoir".into();
        self.params.num_reservoir = neurons.len();
        self.reservoir = Some((neurons, synapses));
        Ok(self)
    }

    pub fn output_layer(&mut self, mut group: NeuronGroup) -> Result<&mut Self> {
        if self.output.is_some() {
            return Err(SimError::LayerAlreadySet("output"));
        }
        group.label = "Outputs".into();
        self.params.num_outputs = group.len();
        self.output = Some(group);
        Ok(self)
    }

    pub fn build(self, net: &mut Network) -> Result<EchoStateNetwork> {
        let p = self.params;
        if p.num_inputs == 0 || p.num_reservoir == 0 || p.num_outputs == 0 {
            return Err(SimError::invalid("ESN size", "every layer must be non-empty"));
        }
        let line = Layout::Line { spacing: 50.0 };

        let input = self.input.unwrap_or_else(|| {
            let group = NeuronGroup::create(net, "Inputs", p.num_inputs, NeuronRule::Clamped);
            group.apply_layout(net, &line, (0.0, 0.0));
            group
        });
        let sparse = |density| {
            Connector::new(ConnectionPattern::Sparse {
                density,
                allow_self: false,
            })
            .with_ratio(p.excitatory_ratio)
        };
        let (reservoir, mut recurrent) = match self.reservoir {
            Some(supplied) => supplied,
            None => {
                let neurons = NeuronGroup::create(net, "Reservoir", p.num_reservoir, p.reservoir_rule);
                neurons.apply_layout(
                    net,
                    &Layout::Grid {
                        columns: None,
                        h_spacing: 50.0,
                        v_spacing: 50.0,
                    },
                    (0.0, -300.0),
                );
                let synapses = SynapseGroup::connect(
                    net,
                    "Reservoir recurrent",
                    &neurons,
                    &neurons,
                    &sparse(p.reservoir_density),
                )?;
                (neurons, synapses)
            }
        };
        let output = self.output.unwrap_or_else(|| {
            let group = NeuronGroup::create(net, "Outputs", p.num_outputs, p.output_rule);
            group.apply_layout(net, &line, (0.0, -600.0));
            group
        });

        let input_reservoir =
            SynapseGroup::connect(net, "Inputs to reservoir", &input, &reservoir, &sparse(p.input_density))?;
        let back = if p.back_weights {
            Some(SynapseGroup::connect(
                net,
                "Outputs to reservoir",
                &output,
                &reservoir,
                &sparse(p.back_density),
            )?)
        } else {
            None
        };
        let zero = |allow_self| {
            Connector::new(ConnectionPattern::AllToAll { allow_self }).with_strength(0.0)
        };
        let readout = SynapseGroup::connect(net, "Readout", &reservoir, &output, &zero(false))?;
        let output_recurrent = if p.recurrent_outputs {
            Some(SynapseGroup::connect(net, "Outputs recurrent", &output, &output, &zero(true))?)
        } else {
            None
        };
        let direct = if p.direct_in_out {
            Some(SynapseGroup::connect(net, "Inputs to outputs", &input, &output, &zero(false))?)
        } else {
            None
        };

        rescale(net, &reservoir, &mut recurrent, p.spectral_radius)?;
        let esn = EchoStateNetwork {
            input,
            reservoir,
            output,
            input_reservoir,
            recurrent,
            back,
            readout,
            output_recurrent,
            direct,
            spectral_radius: p.spectral_radius,
            noise: p.noise,
        };
        info!(
            inputs = esn.input.len(),
            reservoir = esn.reservoir.len(),
            outputs = esn.output.len(),
            synapses = esn.recurrent.len(),
            "built echo state network"
        );
        Ok(esn)
    }
}

pub struct EchoStateNetwork {
    pub input: NeuronGroup,
    pub reservoir: NeuronGroup,
    pub output: NeuronGroup,

    pub input_reservoir: SynapseGroup,
    pub recurrent: SynapseGroup,
    pub back: Option<SynapseGroup>,
    pub readout: SynapseGroup,
    pub output_recurrent: Option<SynapseGroup>,
    pub direct: Option<SynapseGroup>,

    pub spectral_radius: f64,
    pub noise: Option<Randomizer>,
}

impl EchoStateNetwork {
    pub fn new(net: &mut Network, params: &EsnParams) -> Result<Self> {
        EsnBuilder::new(*params).build(net)
    }

    /// Rescales the reservoir weights to `radius`.
    pub fn set_spectral_radius(&mut self, net: &mut Network, radius: f64) -> Result<()> {
        self.spectral_radius = radius;
        rescale(net, &self.reservoir, &mut self.recurrent, radius)
    }

    /// Spectral radius of the reservoir weights as they stand.
    pub fn reservoir_spectral_radius(&self, net: &Network) -> Result<f64> {
        spectral_radius(&self.recurrent.weight_matrix(net, &self.reservoir, &self.reservoir))
    }

    /// One tick: reservoir, then output. The input layer holds whatever was last set.
    pub fn update(&self, net: &mut Network) {
        self.reservoir.update(net);
        self.output.update(net);
    }

    /// Sets the input and runs one tick. Returns the output activations.
    pub fn step(&self, net: &mut Network, input: &[f64]) -> Result<Vec<f64>> {
        self.input.set_activations(net, input)?;
        self.update(net);
        Ok(self.output.activations(net))
    }

    /// The harvester matching this network's wiring.
    pub fn harvester(&self) -> StateHarvester {
        StateHarvester {
            settle_passes: 1,
            include_inputs: self.direct.is_some(),
            include_outputs: self.output_recurrent.is_some(),
            teacher_forcing: self.back.is_some(),
            noise: self.noise,
        }
    }

    /// Two passes over the data; the second is recorded. Columns are the inputs (with
    /// direct weights), the reservoir, and the teacher-forced outputs (with recurrent
    /// output weights).
    pub fn harvest_data(&self, net: &mut Network, data: &TrainingSet) -> Result<Array2<f64>> {
        self.harvester()
            .harvest(net, &self.input, &self.reservoir, &self.output, data)
    }

    /// Harvests states, fits the readout with `trainer` and writes the weights into every
    /// synapse group that feeds the output layer.
    pub fn train(&mut self, net: &mut Network, data: &TrainingSet, trainer: &LmsOffline) -> Result<()> {
        let states = self.harvest_data(net, data)?;
        let targets = LmsOffline::inverse_targets(net, &self.output, data.target())?;
        let weights = trainer.solve(&states, &targets, &mut net.rand)?;

        let mut row = 0;
        if let Some(direct) = &mut self.direct {
            let rows = self.input.len();
            let block = weights.slice(s![row..row + rows, ..]).to_owned();
            direct.set_weight_matrix(net, &self.input, &self.output, &block)?;
            row += rows;
        }
        let rows = self.reservoir.len();
        let block = weights.slice(s![row..row + rows, ..]).to_owned();
        self.readout
            .set_weight_matrix(net, &self.reservoir, &self.output, &block)?;
        row += rows;
        if let Some(recurrent) = &mut self.output_recurrent {
            let rows = self.output.len();
            let block = weights.slice(s![row..row + rows, ..]).to_owned();
            recurrent.set_weight_matrix(net, &self.output, &self.output, &block)?;
        }
        info!(rows = data.rows(), states = states.ncols(), "trained ESN readout");
        Ok(())
    }

    /// Zeroes reservoir and output activations.
    pub fn clear(&self, net: &mut Network) {
        self.reservoir.clear(net);
        self.output.clear(net);
    }
}

/// Scales the recurrent reservoir weights so that their spectral radius becomes `radius`.
fn rescale(
    net: &mut Network,
    reservoir: &NeuronGroup,
    recurrent: &mut SynapseGroup,
    radius: f64,
) -> Result<()> {
    let mut weights = recurrent.weight_matrix(net, reservoir, reservoir);
    let before = scale_to_spectral_radius(&mut weights, radius)?;
    recurrent.set_weight_matrix(net, reservoir, reservoir, &weights)?;
    debug!(before, after = radius, "rescaled reservoir");
    Ok(())
}
