//! Spike responders turn presynaptic spikes into a post-synaptic response (psr).
//!
//! A synapse without a responder transmits `strength * source activation` directly. A
//! synapse with a responder instead reports whatever value its responder holds, and the
//! responder is advanced once per network tick from the source neuron's spike flag.
//!
//! Variants:
//! - `JumpAndDecay`: jumps by `jump_height * strength` on a spike, otherwise relaxes
//!   exponentially towards a baseline.
//! - `ConvolvedJumpAndDecay`: the same kinetics on an unweighted trace, scaled by the
//!   current strength on output.
//! - `Step`: a rectangular pulse of fixed height and duration.
//! - `Probabilistic`: transmits a spike with a fixed probability.
//! - `Udf`: short-term facilitation and depression driving a convolved kernel.

use super::{neuron::Polarity, random::standard_normal};
use crate::error::{Result, SimError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest value a drawn UDF parameter may take.
const UDF_MIN_PARAMETER: f64 = 1e-3;

/// Inputs available to a responder on each tick.
#[derive(Debug, Clone, Copy)]
pub struct ResponderContext {
    pub spiked: bool,
    pub strength: f64,
    pub time: f64,
    pub time_step: f64,
    pub source_polarity: Polarity,
    pub target_polarity: Polarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpAndDecay {
    pub jump_height: f64,
    pub base_line: f64,
    pub time_constant: f64,
    #[serde(skip)]
    value: f64,
}

impl Default for JumpAndDecay {
    fn default() -> Self {
        Self {
            jump_height: 1.0,
            base_line: 0.0,
            time_constant: 3.0,
            value: 0.0,
        }
    }
}

impl JumpAndDecay {
    #[inline]
    fn update(&mut self, ctx: &ResponderContext) -> f64 {
        if ctx.spiked {
            self.value += self.jump_height * ctx.strength;
        } else {
            self.value += ctx.time_step * (self.base_line - self.value) / self.time_constant;
        }
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolvedJumpAndDecay {
    pub jump_height: f64,
    pub time_constant: f64,
    #[serde(skip)]
    trace: f64,
}

impl Default for ConvolvedJumpAndDecay {
    fn default() -> Self {
        Self {
            jump_height: 1.0,
            time_constant: 3.0,
            trace: 0.0,
        }
    }
}

impl ConvolvedJumpAndDecay {
    #[inline]
    fn update(&mut self, ctx: &ResponderContext) -> f64 {
        if ctx.spiked {
            self.trace += self.jump_height;
        } else {
            self.trace -= ctx.time_step * self.trace / self.time_constant;
        }
        self.trace * ctx.strength
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub response_height: f64,
    pub response_duration: f64,
    #[serde(skip)]
    value: f64,
    #[serde(skip)]
    remaining: f64,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            response_height: 1.0,
            response_duration: 1.0,
            value: 0.0,
            remaining: 0.0,
        }
    }
}

impl Step {
    #[inline]
    fn update(&mut self, ctx: &ResponderContext) -> f64 {
        if ctx.spiked {
            self.value = self.response_height * ctx.strength;
            self.remaining = self.response_duration;
        } else {
            self.remaining -= ctx.time_step;
            if self.remaining <= 0.0 {
                self.remaining = 0.0;
                self.value = 0.0;
            }
        }
        self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probabilistic {
    pub activation_probability: f64,
    pub response_value: f64,
    #[serde(skip)]
    value: f64,
}

impl Default for Probabilistic {
    fn default() -> Self {
        Self {
            activation_probability: 0.5,
            response_value: 1.0,
            value: 0.0,
        }
    }
}

impl Probabilistic {
    #[inline]
    fn update<R: Rng + ?Sized>(&mut self, ctx: &ResponderContext, rng: &mut R) -> f64 {
        self.value = if ctx.spiked && rng.random::<f64>() < self.activation_probability {
            self.response_value * ctx.strength
        } else {
            0.0
        };
        self.value
    }
}

/// Mean values of the use (`U`), depression (`D`) and facilitation (`F`) parameters for
/// one polarity pairing. Standard deviations are half the means. Time constants are in
/// network time units (ms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UdfRegime {
    pub use_mean: f64,
    pub depression_mean: f64,
    pub facilitation_mean: f64,
}

impl UdfRegime {
    const fn new(use_mean: f64, depression_mean: f64, facilitation_mean: f64) -> Self {
        Self {
            use_mean,
            depression_mean,
            facilitation_mean,
        }
    }
}

/// Parameter regimes keyed by `(source, target)` polarity.
const UDF_TABLE: [((Polarity, Polarity), UdfRegime); 4] = [
    (
        (Polarity::Excitatory, Polarity::Excitatory),
        UdfRegime::new(0.5, 1100.0, 50.0),
    ),
    (
        (Polarity::Excitatory, Polarity::Inhibitory),
        UdfRegime::new(0.05, 125.0, 1200.0),
    ),
    (
        (Polarity::Inhibitory, Polarity::Excitatory),
        UdfRegime::new(0.25, 700.0, 20.0),
    ),
    (
        (Polarity::Inhibitory, Polarity::Inhibitory),
        UdfRegime::new(0.32, 144.0, 60.0),
    ),
];

/// Used when either side has no polarity.
const UDF_FALLBACK: UdfRegime = UdfRegime::new(0.3, 500.0, 500.0);

/// Looks up the parameter regime for a polarity pairing.
pub fn udf_regime(source: Polarity, target: Polarity) -> UdfRegime {
    UDF_TABLE
        .iter()
        .find(|(key, _)| *key == (source, target))
        .map(|(_, regime)| *regime)
        .unwrap_or(UDF_FALLBACK)
}

/// Concrete `U`, `D`, `F` values of one synapse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UdfParameters {
    pub use_fraction: f64,
    pub depression: f64,
    pub facilitation: f64,
}

impl UdfParameters {
    /// Draws parameters from the regime's normal distributions.
    pub fn draw<R: Rng + ?Sized>(regime: &UdfRegime, rng: &mut R) -> Self {
        let mut sample = |mean: f64| (mean + 0.5 * mean * standard_normal(rng)).abs();
        Self {
            use_fraction: sample(regime.use_mean).clamp(UDF_MIN_PARAMETER, 1.0),
            depression: sample(regime.depression_mean).max(UDF_MIN_PARAMETER),
            facilitation: sample(regime.facilitation_mean).max(UDF_MIN_PARAMETER),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Udf {
    /// Drawn on the first update unless set explicitly.
    pub parameters: Option<UdfParameters>,
    pub kernel: ConvolvedJumpAndDecay,
    #[serde(skip)]
    facilitation: f64,
    #[serde(skip)]
    depression: f64,
    #[serde(skip)]
    last_spike: Option<f64>,
}

impl Udf {
    #[inline]
    fn update<R: Rng + ?Sized>(&mut self, ctx: &ResponderContext, rng: &mut R) -> f64 {
        let params = *self.parameters.get_or_insert_with(|| {
            UdfParameters::draw(&udf_regime(ctx.source_polarity, ctx.target_polarity), rng)
        });
        if ctx.spiked {
            match self.last_spike {
                None => {
                    self.facilitation = params.use_fraction;
                    self.depression = 1.0;
                }
                Some(previous) => {
                    let isi = ctx.time - previous;
                    let u = self.facilitation;
                    let r = self.depression;
                    self.facilitation = params.use_fraction
                        + u * (1.0 - params.use_fraction) * (-isi / params.facilitation).exp();
                    self.depression = 1.0 + (r - u * r - 1.0) * (-isi / params.depression).exp();
                }
            }
            self.last_spike = Some(ctx.time);
            self.kernel.jump_height = self.facilitation * self.depression;
        }
        self.kernel.update(ctx)
    }

    /// Current facilitation variable `u`.
    pub fn facilitation(&self) -> f64 {
        self.facilitation
    }

    /// Current depression variable `R`.
    pub fn depression(&self) -> f64 {
        self.depression
    }
}

/// The closed set of spike responders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpikeResponder {
    JumpAndDecay(JumpAndDecay),
    ConvolvedJumpAndDecay(ConvolvedJumpAndDecay),
    Step(Step),
    Probabilistic(Probabilistic),
    Udf(Udf),
}

impl SpikeResponder {
    /// Names of every responder, in registry order.
    pub const NAMES: [&'static str; 5] = [
        "JumpAndDecay",
        "ConvolvedJumpAndDecay",
        "Step",
        "Probabilistic",
        "Udf",
    ];

    /// Builds a responder with default parameters from its registry name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "JumpAndDecay" => Ok(SpikeResponder::JumpAndDecay(JumpAndDecay::default())),
            "ConvolvedJumpAndDecay" => Ok(SpikeResponder::ConvolvedJumpAndDecay(
                ConvolvedJumpAndDecay::default(),
            )),
            "Step" => Ok(SpikeResponder::Step(Step::default())),
            "Probabilistic" => Ok(SpikeResponder::Probabilistic(Probabilistic::default())),
            "Udf" => Ok(SpikeResponder::Udf(Udf::default())),
            other => Err(SimError::UnknownRule(other.to_string())),
        }
    }

    /// The registry name of this responder.
    pub fn name(&self) -> &'static str {
        match self {
            SpikeResponder::JumpAndDecay(_) => "JumpAndDecay",
            SpikeResponder::ConvolvedJumpAndDecay(_) => "ConvolvedJumpAndDecay",
            SpikeResponder::Step(_) => "Step",
            SpikeResponder::Probabilistic(_) => "Probabilistic",
            SpikeResponder::Udf(_) => "Udf",
        }
    }

    /// Advances the responder one tick and returns the new psr.
    #[inline]
    pub fn update<R: Rng + ?Sized>(&mut self, ctx: &ResponderContext, rng: &mut R) -> f64 {
        match self {
            SpikeResponder::JumpAndDecay(r) => r.update(ctx),
            SpikeResponder::ConvolvedJumpAndDecay(r) => r.update(ctx),
            SpikeResponder::Step(r) => r.update(ctx),
            SpikeResponder::Probabilistic(r) => r.update(ctx, rng),
            SpikeResponder::Udf(r) => r.update(ctx, rng),
        }
    }
}
