//! A `Synapse` is a weighted, directed connection from a source neuron to a target neuron.
//!
//! Endpoints are stored as ids, so a synapse never keeps a neuron alive. The network arena
//! removes a synapse whenever either endpoint is removed.
//!
//! Strength is not clipped on assignment. Learning rules that need bounded weights call
//! [`Synapse::clip`] explicitly, matching how bounds are used elsewhere (randomization range
//! and explicit clipping) rather than as a hard invariant.

use super::{
    network::NeuronId,
    spike_responders::{ResponderContext, SpikeResponder},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounds and responder copied onto every synapse a connector creates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynapseTemplate {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub increment: f64,
    pub responder: Option<SpikeResponder>,
}

impl Default for SynapseTemplate {
    fn default() -> Self {
        Self {
            lower_bound: -10.0,
            upper_bound: 10.0,
            increment: 1.0,
            responder: None,
        }
    }
}

/// A connection between two neurons.
#[derive(Debug, Clone)]
pub struct Synapse {
    source: NeuronId,
    target: NeuronId,

    /// Weight of the connection.
    pub strength: f64,

    /// Lower bound used by clipping and randomization.
    pub lower_bound: f64,

    /// Upper bound used by clipping and randomization.
    pub upper_bound: f64,

    /// Step used by `increment_strength` and `decrement_strength`.
    pub increment: f64,

    /// Optional spiking dynamics. `None` means the synapse transmits activations directly.
    pub responder: Option<SpikeResponder>,

    psr: f64,
}

impl Synapse {
    /// Creates a static synapse with default bounds.
    pub fn new(source: NeuronId, target: NeuronId, strength: f64) -> Self {
        Self::from_template(source, target, strength, &SynapseTemplate::default())
    }

    /// Creates a synapse with the bounds and responder of `template`.
    pub fn from_template(
        source: NeuronId,
        target: NeuronId,
        strength: f64,
        template: &SynapseTemplate,
    ) -> Self {
        Self {
            source,
            target,
            strength,
            lower_bound: template.lower_bound,
            upper_bound: template.upper_bound,
            increment: template.increment,
            responder: template.responder,
            psr: 0.0,
        }
    }

    /// Attaches a spike responder.
    pub fn with_responder(mut self, responder: SpikeResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Sets both bounds.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower_bound = lower;
        self.upper_bound = upper;
        self
    }

    pub fn source(&self) -> NeuronId {
        self.source
    }

    pub fn target(&self) -> NeuronId {
        self.target
    }

    /// Post-synaptic response produced by the responder on the last tick.
    pub fn psr(&self) -> f64 {
        self.psr
    }

    pub(crate) fn set_psr(&mut self, psr: f64) {
        self.psr = psr;
    }

    /// What this synapse contributes to its target's weighted input.
    #[inline]
    pub fn output(&self, source_activation: f64) -> f64 {
        match self.responder {
            Some(_) => self.psr,
            None => self.strength * source_activation,
        }
    }

    /// Advances the responder, if any.
    #[inline]
    pub(crate) fn update_response<R: Rng + ?Sized>(
        &mut self,
        ctx: &ResponderContext,
        rng: &mut R,
    ) {
        if let Some(responder) = self.responder.as_mut() {
            self.psr = responder.update(ctx, rng);
        }
    }

    /// Clamps `value` into the synapse's bounds.
    #[inline]
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower_bound, self.upper_bound)
    }

    /// Shrinks the strength towards zero by `percent` of its magnitude.
    pub fn decay(&mut self, percent: f64) {
        self.strength -= self.strength * percent;
    }

    /// Raises the strength by `increment`, stopping at the upper bound.
    pub fn increment_strength(&mut self) {
        self.strength = self.clip(self.strength + self.increment);
    }

    /// Lowers the strength by `increment`, stopping at the lower bound.
    pub fn decrement_strength(&mut self) {
        self.strength = self.clip(self.strength - self.increment);
    }

    /// Draws a new strength uniformly between the bounds.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.strength = if self.upper_bound > self.lower_bound {
            rng.random_range(self.lower_bound..self.upper_bound)
        } else {
            self.lower_bound
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spike_responders::JumpAndDecay;

    #[test]
    fn static_synapse_scales_source_activation() {
        let s = Synapse::new(NeuronId(0), NeuronId(1), 0.5);
        assert_eq!(s.output(0.8), 0.4);
    }

    #[test]
    fn spiking_synapse_reports_psr() {
        let s = Synapse::new(NeuronId(0), NeuronId(1), 0.5)
            .with_responder(SpikeResponder::JumpAndDecay(JumpAndDecay::default()));
        assert_eq!(s.output(0.8), 0.0);
    }

    #[test]
    fn decay_and_clip() {
        let mut s = Synapse::new(NeuronId(0), NeuronId(1), 2.0).with_bounds(-1.0, 1.0);
        s.decay(0.25);
        assert_eq!(s.strength, 1.5);
        assert_eq!(s.clip(s.strength), 1.0);
        s.strength = 0.5;
        s.increment_strength();
        assert_eq!(s.strength, 1.0);
    }
}
