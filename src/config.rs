//! Simulation configuration loaded from TOML.
//!
//! Every section is optional and every field falls back to its default, so a config file
//! only needs to name what it changes:
//!
//! ```toml
//! [network]
//! seed = 7
//!
//! [esn]
//! num_reservoir = 100
//! spectral_radius = 0.9
//! reservoir_rule = { Sigmoidal = { function = "Tanh" } }
//! ```
//!
//! `SIMNET_SEED` and `SIMNET_TIME_STEP` in the environment override the network section
//! when loading from a file.

use crate::core::{
    bptt::BpttParams, competitive::CompetitiveParams, esn::EsnParams,
    feed_forward::FeedForwardParams, hopfield::HopfieldParams, network::NetworkParams,
    reservoir::StateHarvester, som::SomParams, srn::SrnParams, trainers::LmsOffline,
};
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub network: NetworkParams,
    pub hopfield: Option<HopfieldParams>,
    pub som: Option<SomParams>,
    pub competitive: Option<CompetitiveParams>,
    pub esn: Option<EsnParams>,
    pub feed_forward: Option<FeedForwardParams>,
    pub srn: Option<SrnParams>,
    pub bptt: Option<BpttParams>,
    pub harvester: Option<StateHarvester>,
    pub lms_offline: Option<LmsOffline>,
}

impl SimConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config: SimConfig = toml::from_str(&content)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| SimError::Config(err.to_string()))
    }

    /// Overrides network settings from `lookup`, which maps a variable name to its value.
    /// Values that do not parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("SIMNET_SEED") {
            match value.parse() {
                Ok(seed) => self.network.seed = seed,
                Err(_) => warn!(%value, "ignoring unparsable SIMNET_SEED"),
            }
        }
        if let Some(value) = lookup("SIMNET_TIME_STEP") {
            match value.parse() {
                Ok(step) => self.network.time_step = step,
                Err(_) => warn!(%value, "ignoring unparsable SIMNET_TIME_STEP"),
            }
        }
    }

    /// Rejects values no network can be built from.
    pub fn validate(&self) -> Result<()> {
        if !(self.network.time_step > 0.0) {
            return Err(SimError::invalid("network.time_step", "must be positive"));
        }
        if let Some(esn) = &self.esn {
            if !(esn.spectral_radius > 0.0) {
                return Err(SimError::invalid("esn.spectral_radius", "must be positive"));
            }
            for (name, density) in [
                ("esn.input_density", esn.input_density),
                ("esn.reservoir_density", esn.reservoir_density),
                ("esn.back_density", esn.back_density),
                ("esn.excitatory_ratio", esn.excitatory_ratio),
            ] {
                if !(0.0..=1.0).contains(&density) {
                    return Err(SimError::invalid(name, "must lie in [0, 1]"));
                }
            }
        }
        if let Some(ff) = &self.feed_forward {
            if ff.layer_sizes.len() < 2 {
                return Err(SimError::invalid(
                    "feed_forward.layer_sizes",
                    "needs at least two layers",
                ));
            }
        }
        if let Some(som) = &self.som {
            if som.num_neurons == 0 {
                return Err(SimError::invalid("som.num_neurons", "must be non-zero"));
            }
        }
        if let Some(lms) = &self.lms_offline {
            if lms.alpha < 0.0 {
                return Err(SimError::invalid("lms_offline.alpha", "must not be negative"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        hopfield::HopfieldUpdate,
        neuron_rules::{NeuronRule, SquashingFunction},
        random::Randomizer,
        trainers::SolutionType,
    };

    #[test]
    fn empty_document_gives_defaults() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(config.network.seed, 42);
        assert!(config.esn.is_none());
    }

    #[test]
    fn sections_override_only_what_they_name() {
        let config = SimConfig::from_toml_str(
            r#"
            [network]
            seed = 7

            [hopfield]
            num_neurons = 4
            update = "Random"

            [esn]
            num_reservoir = 20
            spectral_radius = 0.9
            reservoir_rule = { Sigmoidal = { function = "Arctan" } }
            noise = { Normal = { mean = 0.0, std_dev = 0.01 } }

            [lms_offline]
            solution = "WienerHopf"
            ridge_regression = true
            alpha = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(config.network.seed, 7);
        assert_eq!(config.network.time_step, 0.1);

        let hopfield = config.hopfield.unwrap();
        assert_eq!(hopfield.num_neurons, 4);
        assert_eq!(hopfield.update, HopfieldUpdate::Random);

        let esn = config.esn.unwrap();
        assert_eq!(esn.num_reservoir, 20);
        assert_eq!(esn.num_inputs, 1);
        assert_eq!(
            esn.reservoir_rule,
            NeuronRule::sigmoidal(SquashingFunction::Arctan)
        );
        assert_eq!(
            esn.noise,
            Some(Randomizer::Normal {
                mean: 0.0,
                std_dev: 0.01
            })
        );

        let lms = config.lms_offline.unwrap();
        assert_eq!(lms.solution, SolutionType::WienerHopf);
        assert!(lms.ridge_regression);
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(
            SimConfig::from_toml_str("[network]\nseed = \"x\""),
            Err(SimError::Config(_))
        ));
        assert!(matches!(
            SimConfig::from_toml_str("[esn]\nreservoir_density = 1.5"),
            Err(SimError::InvalidParameter { .. })
        ));
        assert!(matches!(
            SimConfig::from_toml_str("[feed_forward]\nlayer_sizes = [3]"),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn overrides_replace_network_settings() {
        let mut config = SimConfig::default();
        config.apply_overrides(|key| match key {
            "SIMNET_SEED" => Some("99".to_string()),
            "SIMNET_TIME_STEP" => Some("fast".to_string()),
            _ => None,
        });
        assert_eq!(config.network.seed, 99);
        assert_eq!(config.network.time_step, 0.1);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            SimConfig::load("/nonexistent/simnet.toml"),
            Err(SimError::Io(_))
        ));
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = SimConfig {
            network: NetworkParams {
                seed: 3,
                time_step: 0.5,
            },
            lms_offline: Some(LmsOffline::new(SolutionType::WienerHopf).with_ridge(0.25)),
            ..SimConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(SimConfig::from_toml_str(&text).unwrap(), config);
    }
}
