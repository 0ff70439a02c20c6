//! Closed-form least-mean-squares fit.
//!
//! Given a state matrix `S` (one row per example, one column per presynaptic neuron) and a
//! target matrix `D` (one column per output neuron), finds the weights `W` that minimize
//! `|S W - D|^2`:
//! - Wiener-Hopf: `W = (S'S + alpha^2 I)^-1 S'D`. The ridge term is optional.
//! - Moore-Penrose: `W = pinv(S) D`.
//!
//! Outputs with a sigmoidal rule are fit in the rule's input space: their targets are mapped
//! back through the inverse of the squashing function before the solve.

use super::TrainingSet;
use crate::core::{
    groups::{NeuronGroup, SynapseGroup},
    linalg::{invert, pseudo_inverse},
    network::Network,
    random::Randomizer,
};
use crate::error::{Result, SimError};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionType {
    WienerHopf,
    #[default]
    MoorePenrose,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmsOffline {
    pub solution: SolutionType,

    /// Adds `alpha^2` to the diagonal of the correlation matrix. Wiener-Hopf only.
    pub ridge_regression: bool,
    pub alpha: f64,

    /// Noise added to every state entry before solving.
    pub noise: Option<Randomizer>,
}

impl LmsOffline {
    pub fn new(solution: SolutionType) -> Self {
        Self {
            solution,
            ..Self::default()
        }
    }

    pub fn with_ridge(mut self, alpha: f64) -> Self {
        self.ridge_regression = true;
        self.alpha = alpha;
        self
    }

    pub fn with_noise(mut self, noise: Randomizer) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Solves for the `states.ncols() x targets.ncols()` weight matrix.
    pub fn solve<R: Rng + ?Sized>(
        &self,
        states: &Array2<f64>,
        targets: &Array2<f64>,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        if states.nrows() != targets.nrows() {
            return Err(SimError::mismatch(
                "target rows",
                states.nrows(),
                targets.nrows(),
            ));
        }
        if states.nrows() == 0 {
            return Err(SimError::DataNotInitialized("state"));
        }
        if let Some(bad) = targets.iter().find(|v| !v.is_finite()) {
            return Err(SimError::invalid("targets", format!("non-finite value {bad}")));
        }
        if let Some(bad) = states.iter().find(|v| !v.is_finite()) {
            return Err(SimError::invalid("states", format!("non-finite value {bad}")));
        }

        let mut states = states.clone();
        if let Some(noise) = &self.noise {
            states.mapv_inplace(|s| s + noise.sample(rng));
        }

        let weights = match self.solution {
            SolutionType::WienerHopf => {
                let mut correlation = states.t().dot(&states);
                let cross = states.t().dot(targets);
                if self.ridge_regression {
                    let ridge = self.alpha * self.alpha;
                    correlation.diag_mut().mapv_inplace(|d| d + ridge);
                }
                invert(&correlation)?.dot(&cross)
            }
            SolutionType::MoorePenrose => pseudo_inverse(&states).dot(targets),
        };
        debug!(
            solution = ?self.solution,
            rows = states.nrows(),
            weights = ?weights.dim(),
            "least squares solve"
        );
        Ok(weights)
    }

    /// Maps every target through the inverse of its output neuron's rule, where the rule
    /// has one. Other columns are copied.
    pub fn inverse_targets(
        net: &Network,
        outputs: &NeuronGroup,
        targets: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        if targets.ncols() != outputs.len() {
            return Err(SimError::mismatch(
                "target columns",
                outputs.len(),
                targets.ncols(),
            ));
        }
        let mut mapped = targets.clone();
        for (col, &id) in outputs.ids().iter().enumerate() {
            let neuron = net.neuron(id);
            let (lower, upper) = (neuron.lower_bound, neuron.upper_bound);
            for value in mapped.column_mut(col) {
                if let Some(input) = neuron.rule.inverse(*value, lower, upper) {
                    *value = input;
                }
            }
        }
        Ok(mapped)
    }

    /// Fits the weights from `inputs` to `outputs` in one shot and writes them into
    /// `weights`. Missing synapses are created.
    pub fn train(
        &self,
        net: &mut Network,
        inputs: &NeuronGroup,
        outputs: &NeuronGroup,
        weights: &mut SynapseGroup,
        data: &TrainingSet,
    ) -> Result<()> {
        data.validate(inputs.len(), outputs.len())?;
        let targets = Self::inverse_targets(net, outputs, data.target())?;
        let solved = self.solve(data.input(), &targets, &mut net.rand)?;
        weights.set_weight_matrix(net, inputs, outputs, &solved)?;
        info!(
            rows = data.rows(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "offline LMS training complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        connections::{ConnectionPattern, Connector},
        neuron_rules::{NeuronRule, SquashingFunction},
    };
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn line_data() -> (Array2<f64>, Array2<f64>) {
        // y = 2 x1 - x2
        let states = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]];
        let targets = array![[2.0], [-1.0], [1.0], [3.0]];
        (states, targets)
    }

    #[test]
    fn both_solutions_recover_exact_weights() {
        let (states, targets) = line_data();
        let mut rng = StdRng::seed_from_u64(0);
        for solution in [SolutionType::WienerHopf, SolutionType::MoorePenrose] {
            let w = LmsOffline::new(solution)
                .solve(&states, &targets, &mut rng)
                .unwrap();
            assert!((w[[0, 0]] - 2.0).abs() < 1e-9, "{solution:?}");
            assert!((w[[1, 0]] + 1.0).abs() < 1e-9, "{solution:?}");
        }
    }

    #[test]
    fn collinear_states_are_singular_without_ridge() {
        let states = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let targets = array![[1.0], [2.0], [3.0]];
        let mut rng = StdRng::seed_from_u64(0);
        let plain = LmsOffline::new(SolutionType::WienerHopf);
        assert!(matches!(
            plain.solve(&states, &targets, &mut rng),
            Err(SimError::SingularMatrix(_))
        ));
        let ridge = plain.with_ridge(0.1);
        assert!(ridge.solve(&states, &targets, &mut rng).is_ok());
        let pinv = LmsOffline::new(SolutionType::MoorePenrose)
            .solve(&states, &targets, &mut rng)
            .unwrap();
        assert!((pinv[[0, 0]] - 0.5).abs() < 1e-9);
        assert!((pinv[[1, 0]] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn non_finite_targets_are_rejected() {
        let (states, mut targets) = line_data();
        targets[[1, 0]] = f64::NAN;
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            LmsOffline::default().solve(&states, &targets, &mut rng),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn sigmoidal_outputs_reproduce_targets() {
        let mut net = Network::new();
        let inputs = NeuronGroup::create(&mut net, "in", 2, NeuronRule::linear());
        let outputs = NeuronGroup::create(
            &mut net,
            "out",
            1,
            NeuronRule::sigmoidal(SquashingFunction::Logistic),
        );
        outputs.set_bounds(&mut net, 0.0, 1.0);
        let mut weights = SynapseGroup::connect(
            &mut net,
            "w",
            &inputs,
            &outputs,
            &Connector::new(ConnectionPattern::AllToAll { allow_self: true }).with_strength(0.0),
        )
        .unwrap();
        let data = TrainingSet::new(array![[1.0, 0.0], [0.0, 1.0]], array![[0.7], [0.2]]).unwrap();
        LmsOffline::default()
            .train(&mut net, &inputs, &outputs, &mut weights, &data)
            .unwrap();

        for (row, expected) in [(0, 0.7), (1, 0.2)] {
            let values = data.input_row(row).to_vec();
            inputs.set_activations(&mut net, &values).unwrap();
            outputs.update(&mut net);
            let got = net.neuron(outputs.get(0)).activation;
            assert!((got - expected).abs() < 1e-9, "{got} != {expected}");
        }
    }
}
