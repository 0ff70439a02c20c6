//! Neuron update rules.
//!
//! A rule maps the neuron's previous state and its weighted input to a new activation.
//! Rules never write the activation directly: the neuron stores the result in its buffer
//! and the owning group decides when to commit it. That split is what makes synchronous
//! (compute everything, then commit) and sequential (compute and commit one at a time)
//! update orders possible.
//!
//! The set of rules is closed. Each variant carries its own parameter struct, and the
//! static [`NeuronRule::NAMES`] table plus [`NeuronRule::from_name`] act as the registry
//! that property editors and config files use to pick a rule by name.

use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};

/// Keeps inverse functions away from their poles.
const INVERSE_MARGIN: f64 = 1e-9;

/// The squashing function used by [`SigmoidalRule`].
///
/// Each function maps the real line onto `(lower, upper)` with the given slope at the
/// midpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SquashingFunction {
    #[default]
    Logistic,
    Tanh,
    Arctan,
}

impl SquashingFunction {
    /// Evaluates the function at `x`.
    #[inline]
    pub fn value(self, x: f64, lower: f64, upper: f64, slope: f64) -> f64 {
        let diff = upper - lower;
        let mid = (upper + lower) / 2.0;
        match self {
            SquashingFunction::Logistic => {
                diff * logistic((4.0 * slope * x) / diff) + lower
            }
            SquashingFunction::Tanh => {
                let a = (2.0 * slope) / diff;
                (diff / 2.0) * (a * x).tanh() + mid
            }
            SquashingFunction::Arctan => {
                let a = (std::f64::consts::PI * slope) / diff;
                (diff / std::f64::consts::PI) * (a * x).atan() + mid
            }
        }
    }

    /// Maps a desired output back to the input that produces it.
    ///
    /// Outputs at or beyond the bounds are pulled just inside them so the result stays finite.
    #[inline]
    pub fn inverse(self, y: f64, lower: f64, upper: f64, slope: f64) -> f64 {
        let diff = upper - lower;
        let mid = (upper + lower) / 2.0;
        match self {
            SquashingFunction::Logistic => {
                let p = ((y - lower) / diff).clamp(INVERSE_MARGIN, 1.0 - INVERSE_MARGIN);
                diff / (4.0 * slope) * (p / (1.0 - p)).ln()
            }
            SquashingFunction::Tanh => {
                let a = (2.0 * slope) / diff;
                let z = ((y - mid) * 2.0 / diff).clamp(-1.0 + INVERSE_MARGIN, 1.0 - INVERSE_MARGIN);
                z.atanh() / a
            }
            SquashingFunction::Arctan => {
                let half_pi = std::f64::consts::FRAC_PI_2;
                let a = (std::f64::consts::PI * slope) / diff;
                let z = ((y - mid) * std::f64::consts::PI / diff)
                    .clamp(-half_pi + INVERSE_MARGIN, half_pi - INVERSE_MARGIN);
                z.tan() / a
            }
        }
    }

    /// Derivative of the function with respect to its input, evaluated at `x`.
    #[inline]
    pub fn derivative(self, x: f64, lower: f64, upper: f64, slope: f64) -> f64 {
        let diff = upper - lower;
        match self {
            SquashingFunction::Logistic => {
                let s = logistic((4.0 * slope * x) / diff);
                4.0 * slope * s * (1.0 - s)
            }
            SquashingFunction::Tanh => {
                let a = (2.0 * slope) / diff;
                let sech = 1.0 / (a * x).cosh();
                slope * sech * sech
            }
            SquashingFunction::Arctan => {
                let a = (std::f64::consts::PI * slope) / diff;
                slope / (1.0 + (a * x).powi(2))
            }
        }
    }

    /// The natural `(lower, upper)` range of the function.
    pub fn default_bounds(self) -> (f64, f64) {
        match self {
            SquashingFunction::Logistic => (0.0, 1.0),
            SquashingFunction::Tanh => (-1.0, 1.0),
            SquashingFunction::Arctan => {
                (-std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_2)
            }
        }
    }
}

#[inline]
fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `slope * input + bias`, optionally clipped to the neuron's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRule {
    pub slope: f64,
    pub bias: f64,
    pub clipping: bool,
}

impl Default for LinearRule {
    fn default() -> Self {
        Self {
            slope: 1.0,
            bias: 0.0,
            clipping: true,
        }
    }
}

/// A squashing nonlinearity between the neuron's lower and upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidalRule {
    pub function: SquashingFunction,
    pub slope: f64,
    pub bias: f64,
}

impl Default for SigmoidalRule {
    fn default() -> Self {
        Self {
            function: SquashingFunction::Logistic,
            slope: 1.0,
            bias: 0.0,
        }
    }
}

/// Upper bound when `input + bias > threshold`, lower bound otherwise.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryRule {
    pub threshold: f64,
    pub bias: f64,
}

/// Leaky integrate-and-fire. The activation is the membrane potential.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrateAndFireRule {
    pub threshold: f64,
    pub resting_potential: f64,
    pub reset_potential: f64,
    pub time_constant: f64,
    pub resistance: f64,
    pub background_current: f64,
}

impl Default for IntegrateAndFireRule {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            resting_potential: 0.0,
            reset_potential: 0.0,
            time_constant: 10.0,
            resistance: 1.0,
            background_current: 0.0,
        }
    }
}

/// Everything a rule may read when computing the next activation.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
    pub activation: f64,
    pub input: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub time_step: f64,
}

/// Result of applying a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleOutput {
    pub activation: f64,
    pub spiked: bool,
}

impl RuleOutput {
    fn value(activation: f64) -> Self {
        Self {
            activation,
            spiked: false,
        }
    }
}

/// The closed set of neuron update rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NeuronRule {
    Linear(LinearRule),
    Sigmoidal(SigmoidalRule),
    Binary(BinaryRule),
    /// Keeps whatever activation was last set. Used for input layers.
    Clamped,
    IntegrateAndFire(IntegrateAndFireRule),
}

impl Default for NeuronRule {
    fn default() -> Self {
        NeuronRule::Linear(LinearRule::default())
    }
}

impl NeuronRule {
    /// Names of every rule, in registry order.
    pub const NAMES: [&'static str; 5] = [
        "Linear",
        "Sigmoidal",
        "Binary",
        "Clamped",
        "IntegrateAndFire",
    ];

    /// Builds a rule with default parameters from its registry name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Linear" => Ok(NeuronRule::Linear(LinearRule::default())),
            "Sigmoidal" => Ok(NeuronRule::Sigmoidal(SigmoidalRule::default())),
            "Binary" => Ok(NeuronRule::Binary(BinaryRule::default())),
            "Clamped" => Ok(NeuronRule::Clamped),
            "IntegrateAndFire" => Ok(NeuronRule::IntegrateAndFire(
                IntegrateAndFireRule::default(),
            )),
            other => Err(SimError::UnknownRule(other.to_string())),
        }
    }

    /// The registry name of this rule.
    pub fn name(&self) -> &'static str {
        match self {
            NeuronRule::Linear(_) => "Linear",
            NeuronRule::Sigmoidal(_) => "Sigmoidal",
            NeuronRule::Binary(_) => "Binary",
            NeuronRule::Clamped => "Clamped",
            NeuronRule::IntegrateAndFire(_) => "IntegrateAndFire",
        }
    }

    /// Shorthand for a sigmoidal rule with the given function and default slope.
    pub fn sigmoidal(function: SquashingFunction) -> Self {
        NeuronRule::Sigmoidal(SigmoidalRule {
            function,
            ..SigmoidalRule::default()
        })
    }

    /// Shorthand for a linear rule with default parameters.
    pub fn linear() -> Self {
        NeuronRule::Linear(LinearRule::default())
    }

    /// Computes the next activation from the context.
    #[inline]
    pub fn compute(&self, ctx: &RuleContext) -> RuleOutput {
        match self {
            NeuronRule::Linear(rule) => {
                let value = rule.slope * ctx.input + rule.bias;
                if rule.clipping {
                    RuleOutput::value(value.clamp(ctx.lower_bound, ctx.upper_bound))
                } else {
                    RuleOutput::value(value)
                }
            }
            NeuronRule::Sigmoidal(rule) => RuleOutput::value(rule.function.value(
                ctx.input + rule.bias,
                ctx.lower_bound,
                ctx.upper_bound,
                rule.slope,
            )),
            NeuronRule::Binary(rule) => {
                if ctx.input + rule.bias > rule.threshold {
                    RuleOutput::value(ctx.upper_bound)
                } else {
                    RuleOutput::value(ctx.lower_bound)
                }
            }
            NeuronRule::Clamped => RuleOutput::value(ctx.activation),
            NeuronRule::IntegrateAndFire(rule) => {
                let drive = rule.resistance * (ctx.input + rule.background_current);
                let potential = ctx.activation
                    + ctx.time_step / rule.time_constant
                        * (rule.resting_potential - ctx.activation + drive);
                if potential >= rule.threshold {
                    RuleOutput {
                        activation: rule.reset_potential,
                        spiked: true,
                    }
                } else {
                    RuleOutput::value(potential)
                }
            }
        }
    }

    /// The input that would make this rule output `value`, for rules that can be inverted.
    ///
    /// Only sigmoidal rules need this: it is how desired outputs are mapped back through
    /// the nonlinearity before a linear solve.
    pub fn inverse(&self, value: f64, lower: f64, upper: f64) -> Option<f64> {
        match self {
            NeuronRule::Sigmoidal(rule) => {
                Some(rule.function.inverse(value, lower, upper, rule.slope) - rule.bias)
            }
            _ => None,
        }
    }

    /// Derivative of the output with respect to the weighted input.
    pub fn derivative(&self, input: f64, lower: f64, upper: f64) -> Result<f64> {
        match self {
            NeuronRule::Linear(rule) => {
                // A clipped output is flat.
                let value = rule.slope * input + rule.bias;
                if rule.clipping && (value < lower || value > upper) {
                    Ok(0.0)
                } else {
                    Ok(rule.slope)
                }
            }
            NeuronRule::Sigmoidal(rule) => Ok(rule.function.derivative(
                input + rule.bias,
                lower,
                upper,
                rule.slope,
            )),
            other => Err(SimError::NotImplemented(format!(
                "derivative of the {} rule",
                other.name()
            ))),
        }
    }

    /// The bias of rules that have one.
    pub fn bias(&self) -> Option<f64> {
        match self {
            NeuronRule::Linear(rule) => Some(rule.bias),
            NeuronRule::Sigmoidal(rule) => Some(rule.bias),
            NeuronRule::Binary(rule) => Some(rule.bias),
            _ => None,
        }
    }

    /// Mutable access to the bias of rules that have one.
    pub fn bias_mut(&mut self) -> Option<&mut f64> {
        match self {
            NeuronRule::Linear(rule) => Some(&mut rule.bias),
            NeuronRule::Sigmoidal(rule) => Some(&mut rule.bias),
            NeuronRule::Binary(rule) => Some(&mut rule.bias),
            _ => None,
        }
    }

    /// Whether the rule emits spikes.
    pub fn is_spiking(&self) -> bool {
        matches!(self, NeuronRule::IntegrateAndFire(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(input: f64) -> RuleContext {
        RuleContext {
            activation: 0.0,
            input,
            lower_bound: -1.0,
            upper_bound: 1.0,
            time_step: 0.1,
        }
    }

    #[test]
    fn inverse_undoes_each_squashing_function() {
        for function in [
            SquashingFunction::Logistic,
            SquashingFunction::Tanh,
            SquashingFunction::Arctan,
        ] {
            for &x in &[-2.0, -0.3, 0.0, 0.7, 1.9] {
                let y = function.value(x, -1.0, 1.0, 1.5);
                let back = function.inverse(y, -1.0, 1.0, 1.5);
                assert!((back - x).abs() < 1e-9, "{function:?}: {x} -> {y} -> {back}");
            }
        }
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let h = 1e-6;
        for function in [
            SquashingFunction::Logistic,
            SquashingFunction::Tanh,
            SquashingFunction::Arctan,
        ] {
            let x = 0.4;
            let numeric = (function.value(x + h, 0.0, 1.0, 2.0)
                - function.value(x - h, 0.0, 1.0, 2.0))
                / (2.0 * h);
            let analytic = function.derivative(x, 0.0, 1.0, 2.0);
            assert!((numeric - analytic).abs() < 1e-6, "{function:?}");
        }
    }

    #[test]
    fn slope_is_the_midpoint_derivative() {
        let d = SquashingFunction::Logistic.derivative(0.0, 0.0, 1.0, 1.0);
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn linear_clips_to_bounds() {
        let out = NeuronRule::linear().compute(&ctx(3.0));
        assert_eq!(out.activation, 1.0);
        let unclipped = NeuronRule::Linear(LinearRule {
            clipping: false,
            ..LinearRule::default()
        })
        .compute(&ctx(3.0));
        assert_eq!(unclipped.activation, 3.0);
    }

    #[test]
    fn binary_uses_strict_threshold() {
        let rule = NeuronRule::Binary(BinaryRule::default());
        assert_eq!(rule.compute(&ctx(0.0)).activation, -1.0);
        assert_eq!(rule.compute(&ctx(0.01)).activation, 1.0);
    }

    #[test]
    fn integrate_and_fire_spikes_and_resets() {
        let rule = NeuronRule::IntegrateAndFire(IntegrateAndFireRule {
            time_constant: 1.0,
            ..IntegrateAndFireRule::default()
        });
        let mut c = ctx(20.0);
        c.time_step = 1.0;
        let out = rule.compute(&c);
        assert!(out.spiked);
        assert_eq!(out.activation, 0.0);
    }

    #[test]
    fn registry_round_trips_names() {
        for name in NeuronRule::NAMES {
            assert_eq!(NeuronRule::from_name(name).unwrap().name(), name);
        }
        assert!(matches!(
            NeuronRule::from_name("Nope"),
            Err(SimError::UnknownRule(_))
        ));
    }

    #[test]
    fn clipped_linear_has_no_slope_past_its_bounds() {
        let clipped = NeuronRule::Linear(LinearRule {
            slope: 2.0,
            ..LinearRule::default()
        });
        assert_eq!(clipped.derivative(0.25, -1.0, 1.0).unwrap(), 2.0);
        assert_eq!(clipped.derivative(1.0, -1.0, 1.0).unwrap(), 0.0);
        assert_eq!(clipped.derivative(-3.0, -1.0, 1.0).unwrap(), 0.0);

        let free = NeuronRule::Linear(LinearRule {
            slope: 2.0,
            clipping: false,
            ..LinearRule::default()
        });
        assert_eq!(free.derivative(5.0, -1.0, 1.0).unwrap(), 2.0);
    }

    #[test]
    fn binary_has_no_derivative() {
        let rule = NeuronRule::Binary(BinaryRule::default());
        assert!(matches!(
            rule.derivative(0.0, -1.0, 1.0),
            Err(SimError::NotImplemented(_))
        ));
    }
}
