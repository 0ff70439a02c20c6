//! Sampling helpers used for weight initialization, noise and stochastic synapse parameters.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A distribution from which strengths, activations or noise values are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Randomizer {
    /// Uniform over `[lower, upper)`.
    Uniform { lower: f64, upper: f64 },
    /// Gaussian with the given mean and standard deviation.
    Normal { mean: f64, std_dev: f64 },
    /// Always returns the same value.
    Constant(f64),
}

impl Default for Randomizer {
    fn default() -> Self {
        Randomizer::Uniform {
            lower: -1.0,
            upper: 1.0,
        }
    }
}

impl Randomizer {
    /// Draws one value from the distribution.
    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Randomizer::Uniform { lower, upper } => {
                if upper > lower {
                    rng.random_range(lower..upper)
                } else {
                    lower
                }
            }
            Randomizer::Normal { mean, std_dev } => mean + std_dev * standard_normal(rng),
            Randomizer::Constant(value) => value,
        }
    }
}

/// Draws from N(0, 1) with the Box-Muller transform.
#[inline]
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - u keeps the argument of ln in (0, 1].
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
