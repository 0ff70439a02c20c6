//! State harvesting for reservoir networks.
//!
//! A harvester drives an input layer through the rows of a training set, lets a reservoir
//! layer respond, and records the reservoir activations row by row into a state matrix that
//! a linear readout can be fit to. The recorded columns are, in order:
//! - the input activations, if `include_inputs` is set,
//! - the reservoir activations,
//! - the output activations, if `include_outputs` is set.
//!
//! With teacher forcing the output layer is not computed while harvesting. Its activations
//! are set to the target row before the current one (0.5 on the first row), so the
//! reservoir hears the output it will eventually be trained to produce.
//!
//! The data is run `settle_passes` times unrecorded before the recorded pass, which lets
//! the reservoir forget its initial state.

use super::{
    groups::NeuronGroup,
    network::{NeuronId, Network},
    random::Randomizer,
    trainers::TrainingSet,
};
use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Forced output activation on the first row, where no previous target exists.
pub const TEACHER_FORCING_START: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateHarvester {
    pub settle_passes: usize,
    pub include_inputs: bool,
    pub include_outputs: bool,
    pub teacher_forcing: bool,

    /// Noise added to each reservoir activation after every update.
    pub noise: Option<Randomizer>,
}

impl Default for StateHarvester {
    fn default() -> Self {
        Self {
            settle_passes: 1,
            include_inputs: false,
            include_outputs: false,
            teacher_forcing: true,
            noise: None,
        }
    }
}

impl StateHarvester {
    /// Width of the state matrix.
    pub fn columns(&self, inputs: usize, reservoir: usize, outputs: usize) -> usize {
        let mut columns = reservoir;
        if self.include_inputs {
            columns += inputs;
        }
        if self.include_outputs {
            columns += outputs;
        }
        columns
    }

    /// The neurons behind each state column, in column order.
    pub fn column_neurons(
        &self,
        input: &NeuronGroup,
        reservoir: &NeuronGroup,
        output: &NeuronGroup,
    ) -> Vec<NeuronId> {
        let mut ids = Vec::with_capacity(self.columns(input.len(), reservoir.len(), output.len()));
        if self.include_inputs {
            ids.extend_from_slice(input.ids());
        }
        ids.extend_from_slice(reservoir.ids());
        if self.include_outputs {
            ids.extend_from_slice(output.ids());
        }
        ids
    }

    /// Forced output activations for `row`: the previous target row, or
    /// [`TEACHER_FORCING_START`] on the first row.
    pub fn forced_outputs(data: &TrainingSet, row: usize) -> Vec<f64> {
        if row == 0 {
            vec![TEACHER_FORCING_START; data.target().ncols()]
        } else {
            data.target_row(row - 1).to_vec()
        }
    }

    /// Runs the rows and returns the recorded state matrix, one row per training row.
    pub fn harvest(
        &self,
        net: &mut Network,
        input: &NeuronGroup,
        reservoir: &NeuronGroup,
        output: &NeuronGroup,
        data: &TrainingSet,
    ) -> Result<Array2<f64>> {
        data.validate(input.len(), output.len())?;
        let columns = self.column_neurons(input, reservoir, output);
        let mut states = Array2::zeros((data.rows(), columns.len()));
        let force = self.teacher_forcing || self.include_outputs;

        for pass in 0..=self.settle_passes {
            let record = pass == self.settle_passes;
            for row in 0..data.rows() {
                input.set_activations(net, &data.input_row(row).to_vec())?;
                if force {
                    output.set_activations(net, &Self::forced_outputs(data, row))?;
                }
                reservoir.update(net);
                if let Some(noise) = &self.noise {
                    for &id in reservoir.ids() {
                        let value = net.neuron(id).activation + noise.sample(&mut net.rand);
                        net.neuron_mut(id).set_activation(value);
                    }
                }
                if record {
                    for (col, &id) in columns.iter().enumerate() {
                        states[[row, col]] = net.neuron(id).activation;
                    }
                }
            }
        }
        debug!(
            rows = data.rows(),
            columns = columns.len(),
            passes = self.settle_passes + 1,
            "harvested reservoir states"
        );
        Ok(states)
    }
}
