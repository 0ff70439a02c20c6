//! Connectors decide which neuron pairs get a synapse and what strength it starts with.
//!
//! The pattern picks the pairs. Initial strengths come from two randomizers: a synapse out
//! of an excitatory neuron draws from `excitatory`, one out of an inhibitory neuron draws
//! from `inhibitory`, and one out of a neuron without polarity picks between them with
//! probability `excitatory_ratio`. The source's polarity then forces the sign.
//!
//! The radial patterns read neuron positions, so lay the groups out before connecting them.

use super::{
    layout::distance,
    network::{Network, NeuronId, SynapseId},
    neuron::Polarity,
    random::Randomizer,
    synapse::{Synapse, SynapseTemplate},
};
use crate::error::{Result, SimError};
use rand::{seq::IteratorRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which `(source, target)` pairs to connect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConnectionPattern {
    /// Every source to every target.
    AllToAll { allow_self: bool },

    /// The `i`-th source to the `i`-th target. Both sides must have the same size.
    OneToOne,

    /// Each source to a random `density` fraction of the targets.
    Sparse { density: f64, allow_self: bool },

    /// Each source to the targets within its radius, each with a fixed probability.
    Radial(RadialParams),

    /// Each pair with a probability that falls off with distance as a Gaussian.
    RadialGaussian(GaussianParams),
}

/// Reach of a radial connector, chosen by the polarity of the source. Sources without
/// polarity use the excitatory values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialParams {
    /// Farthest target an excitatory source connects to.
    pub excitatory_radius: f64,

    /// Farthest target an inhibitory source connects to.
    pub inhibitory_radius: f64,

    /// Chance that an excitatory source connects to a target within reach.
    pub excitatory_probability: f64,

    /// Chance that an inhibitory source connects to a target within reach.
    pub inhibitory_probability: f64,

    pub allow_self: bool,
}

impl Default for RadialParams {
    fn default() -> Self {
        Self {
            excitatory_radius: 100.0,
            inhibitory_radius: 80.0,
            excitatory_probability: 0.8,
            inhibitory_probability: 0.8,
            allow_self: false,
        }
    }
}

impl RadialParams {
    /// Radius and probability for a source with `polarity`.
    #[inline]
    pub fn reach(&self, polarity: Polarity) -> (f64, f64) {
        match polarity {
            Polarity::Inhibitory => (self.inhibitory_radius, self.inhibitory_probability),
            Polarity::Excitatory | Polarity::None => {
                (self.excitatory_radius, self.excitatory_probability)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, radius) in [
            ("excitatory_radius", self.excitatory_radius),
            ("inhibitory_radius", self.inhibitory_radius),
        ] {
            if radius < 0.0 || radius.is_nan() {
                return Err(SimError::invalid(name, format!("{radius} must be non-negative")));
            }
        }
        for (name, p) in [
            ("excitatory_probability", self.excitatory_probability),
            ("inhibitory_probability", self.inhibitory_probability),
        ] {
            check_probability(name, p)?;
        }
        Ok(())
    }
}

/// Distance-dependent connection probability `constant * exp(-d^2 / lambda^2)`. The
/// constant depends on the polarities of source and target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianParams {
    /// Excitatory to excitatory.
    pub ee: f64,
    /// Excitatory to inhibitory.
    pub ei: f64,
    /// Inhibitory to excitatory.
    pub ie: f64,
    /// Inhibitory to inhibitory.
    pub ii: f64,

    /// Used when either side has no polarity.
    pub unpolarized: f64,

    /// Distance drop-off. Larger values reach farther.
    pub lambda: f64,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            ee: 0.2,
            ei: 0.3,
            ie: 0.4,
            ii: 0.1,
            unpolarized: 0.25,
            lambda: 200.0,
        }
    }
}

impl GaussianParams {
    /// Probability of connecting two neurons `dist` apart. Co-located neurons never connect.
    #[inline]
    pub fn probability(&self, source: Polarity, target: Polarity, dist: f64) -> f64 {
        if dist == 0.0 {
            return 0.0;
        }
        let constant = match (source, target) {
            (Polarity::Excitatory, Polarity::Excitatory) => self.ee,
            (Polarity::Excitatory, Polarity::Inhibitory) => self.ei,
            (Polarity::Inhibitory, Polarity::Excitatory) => self.ie,
            (Polarity::Inhibitory, Polarity::Inhibitory) => self.ii,
            _ => self.unpolarized,
        };
        constant * (-(dist * dist) / (self.lambda * self.lambda)).exp()
    }

    fn validate(&self) -> Result<()> {
        if self.lambda.is_nan() || self.lambda <= 0.0 {
            return Err(SimError::invalid(
                "lambda",
                format!("{} must be positive", self.lambda),
            ));
        }
        for (name, c) in [
            ("ee", self.ee),
            ("ei", self.ei),
            ("ie", self.ie),
            ("ii", self.ii),
            ("unpolarized", self.unpolarized),
        ] {
            check_probability(name, c)?;
        }
        Ok(())
    }
}

fn check_probability(name: &'static str, p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(SimError::invalid(name, format!("{p} is outside [0, 1]")))
    }
}

/// Where a neuron sits and which sign it sends.
#[derive(Debug, Clone, Copy)]
struct Site {
    id: NeuronId,
    position: (f64, f64),
    polarity: Polarity,
}

fn sites(net: &Network, ids: &[NeuronId]) -> Result<Vec<Site>> {
    ids.iter()
        .map(|&id| {
            let neuron = net.try_neuron(id).ok_or(SimError::MissingNeuron(id))?;
            Ok(Site {
                id,
                position: neuron.position,
                polarity: neuron.polarity,
            })
        })
        .collect()
}

impl Default for ConnectionPattern {
    fn default() -> Self {
        ConnectionPattern::AllToAll { allow_self: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connector {
    pub pattern: ConnectionPattern,

    /// Probability that a synapse out of a neuron without polarity is excitatory.
    pub excitatory_ratio: f64,

    pub excitatory: Randomizer,
    pub inhibitory: Randomizer,

    /// Bounds and responder given to every new synapse.
    pub template: SynapseTemplate,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(ConnectionPattern::default())
    }
}

impl Connector {
    pub fn new(pattern: ConnectionPattern) -> Self {
        Self {
            pattern,
            excitatory_ratio: 0.5,
            excitatory: Randomizer::Uniform {
                lower: 0.0,
                upper: 1.0,
            },
            inhibitory: Randomizer::Uniform {
                lower: -1.0,
                upper: 0.0,
            },
            template: SynapseTemplate::default(),
        }
    }

    /// Every new synapse starts at `strength`, with the sign its source's polarity allows.
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.excitatory_ratio = 1.0;
        self.excitatory = Randomizer::Constant(strength);
        self.inhibitory = Randomizer::Constant(strength);
        self
    }

    pub fn with_ratio(mut self, excitatory_ratio: f64) -> Self {
        self.excitatory_ratio = excitatory_ratio;
        self
    }

    pub fn with_randomizers(mut self, excitatory: Randomizer, inhibitory: Randomizer) -> Self {
        self.excitatory = excitatory;
        self.inhibitory = inhibitory;
        self
    }

    pub fn with_template(mut self, template: SynapseTemplate) -> Self {
        self.template = template;
        self
    }

    /// Picks the pairs to connect, drawing from the network's random source.
    pub fn pairs(
        &self,
        net: &mut Network,
        sources: &[NeuronId],
        targets: &[NeuronId],
    ) -> Result<Vec<(NeuronId, NeuronId)>> {
        match self.pattern {
            ConnectionPattern::AllToAll { allow_self } => Ok(sources
                .iter()
                .flat_map(|&s| targets.iter().map(move |&t| (s, t)))
                .filter(|(s, t)| allow_self || s != t)
                .collect()),
            ConnectionPattern::OneToOne => {
                if sources.len() != targets.len() {
                    return Err(SimError::mismatch(
                        "one-to-one target count",
                        sources.len(),
                        targets.len(),
                    ));
                }
                Ok(sources.iter().copied().zip(targets.iter().copied()).collect())
            }
            ConnectionPattern::Sparse {
                density,
                allow_self,
            } => {
                if !(0.0..=1.0).contains(&density) {
                    return Err(SimError::invalid(
                        "density",
                        format!("{density} is outside [0, 1]"),
                    ));
                }
                let mut pairs = Vec::new();
                for &s in sources {
                    let candidates = targets.iter().filter(|&&t| allow_self || s != t);
                    let available = candidates.clone().count();
                    let count = ((available as f64 * density) + 0.5) as usize;
                    let mut chosen = candidates.copied().choose_multiple(&mut net.rand, count);
                    chosen.sort_unstable();
                    pairs.extend(chosen.into_iter().map(|t| (s, t)));
                }
                Ok(pairs)
            }
            ConnectionPattern::Radial(radial) => {
                radial.validate()?;
                let targets = sites(net, targets)?;
                let mut pairs = Vec::new();
                for source in sites(net, sources)? {
                    let (radius, probability) = radial.reach(source.polarity);
                    for target in &targets {
                        if !radial.allow_self && source.id == target.id {
                            continue;
                        }
                        if distance(source.position, target.position) > radius {
                            continue;
                        }
                        if net.rand.random::<f64>() < probability {
                            pairs.push((source.id, target.id));
                        }
                    }
                }
                Ok(pairs)
            }
            ConnectionPattern::RadialGaussian(gaussian) => {
                gaussian.validate()?;
                let targets = sites(net, targets)?;
                let mut pairs = Vec::new();
                for source in sites(net, sources)? {
                    for target in &targets {
                        let dist = distance(source.position, target.position);
                        let probability = gaussian.probability(source.polarity, target.polarity, dist);
                        if net.rand.random::<f64>() < probability {
                            pairs.push((source.id, target.id));
                        }
                    }
                }
                Ok(pairs)
            }
        }
    }

    /// Draws the initial strength of a synapse out of a neuron with `polarity`.
    #[inline]
    pub fn initial_strength<R: Rng + ?Sized>(&self, polarity: Polarity, rng: &mut R) -> f64 {
        let value = match polarity {
            Polarity::Excitatory => self.excitatory.sample(rng),
            Polarity::Inhibitory => self.inhibitory.sample(rng),
            Polarity::None => {
                if rng.random::<f64>() < self.excitatory_ratio {
                    self.excitatory.sample(rng)
                } else {
                    self.inhibitory.sample(rng)
                }
            }
        };
        polarity.apply(value)
    }

    /// Connects `sources` to `targets` and returns the new synapse ids in creation order.
    pub fn connect(
        &self,
        net: &mut Network,
        sources: &[NeuronId],
        targets: &[NeuronId],
    ) -> Result<Vec<SynapseId>> {
        let pairs = self.pairs(net, sources, targets)?;
        let mut ids = Vec::with_capacity(pairs.len());
        for (source, target) in pairs {
            let polarity = net
                .try_neuron(source)
                .ok_or(SimError::MissingNeuron(source))?
                .polarity;
            let strength = self.initial_strength(polarity, &mut net.rand);
            let synapse = Synapse::from_template(source, target, strength, &self.template);
            ids.push(net.add_synapse(synapse)?);
        }
        debug!(
            synapses = ids.len(),
            sources = sources.len(),
            targets = targets.len(),
            "connected"
        );
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{layout::Layout, neuron::Neuron, neuron_rules::NeuronRule};

    /// `count` neurons on a line, 50 apart.
    fn line(net: &mut Network, count: usize) -> Vec<NeuronId> {
        let ids = net.add_neurons(count, NeuronRule::linear());
        let positions = Layout::Line { spacing: 50.0 }.positions(count, (0.0, 0.0));
        for (&id, position) in ids.iter().zip(positions) {
            net.neuron_mut(id).position = position;
        }
        ids
    }

    fn targets_of(net: &Network, source: NeuronId) -> Vec<NeuronId> {
        let mut targets: Vec<_> = net
            .neuron(source)
            .fan_out()
            .iter()
            .map(|&s| net.synapse(s).target())
            .collect();
        targets.sort_unstable();
        targets
    }

    #[test]
    fn all_to_all_skips_self_loops() {
        let mut net = Network::new();
        let ids = net.add_neurons(4, NeuronRule::linear());
        let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: false });
        let syns = connector.connect(&mut net, &ids, &ids).unwrap();
        assert_eq!(syns.len(), 12);
        for &id in &ids {
            assert!(net.find_synapse(id, id).is_none());
        }
    }

    #[test]
    fn sparse_connects_a_fixed_fraction_per_source() {
        let mut net = Network::new();
        let sources = net.add_neurons(5, NeuronRule::linear());
        let targets = net.add_neurons(10, NeuronRule::linear());
        let connector = Connector::new(ConnectionPattern::Sparse {
            density: 0.3,
            allow_self: false,
        });
        connector.connect(&mut net, &sources, &targets).unwrap();
        for &s in &sources {
            assert_eq!(net.neuron(s).fan_out().len(), 3);
        }
    }

    #[test]
    fn source_polarity_forces_sign() {
        let mut net = Network::new();
        let inhibitory = net.add_neuron(Neuron::default().with_polarity(Polarity::Inhibitory));
        let targets = net.add_neurons(20, NeuronRule::linear());
        let connector = Connector::new(ConnectionPattern::AllToAll { allow_self: false })
            .with_randomizers(Randomizer::default(), Randomizer::default());
        let syns = connector.connect(&mut net, &[inhibitory], &targets).unwrap();
        assert!(syns.iter().all(|&s| net.synapse(s).strength <= 0.0));
    }

    #[test]
    fn one_to_one_requires_equal_sizes() {
        let mut net = Network::new();
        let a = net.add_neurons(2, NeuronRule::linear());
        let b = net.add_neurons(3, NeuronRule::linear());
        let connector = Connector::new(ConnectionPattern::OneToOne);
        assert!(matches!(
            connector.connect(&mut net, &a, &b),
            Err(SimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn constant_strength_ignores_the_inhibitory_randomizer() {
        let mut net = Network::new();
        let inhibitory = net.add_neuron(Neuron::default().with_polarity(Polarity::Inhibitory));
        let targets = net.add_neurons(10, NeuronRule::linear());

        let zero = Connector::new(ConnectionPattern::AllToAll { allow_self: false }).with_strength(0.0);
        let syns = zero.connect(&mut net, &[inhibitory], &targets).unwrap();
        assert!(syns.iter().all(|&s| net.synapse(s).strength == 0.0));

        let others = net.add_neurons(10, NeuronRule::linear());
        let half = Connector::new(ConnectionPattern::AllToAll { allow_self: false }).with_strength(0.5);
        let syns = half.connect(&mut net, &[inhibitory], &others).unwrap();
        assert!(syns.iter().all(|&s| net.synapse(s).strength == -0.5));
    }

    #[test]
    fn radial_reach_follows_source_polarity() {
        let mut net = Network::with_seed(2);
        let ids = line(&mut net, 5);
        net.neuron_mut(ids[0]).polarity = Polarity::Excitatory;
        net.neuron_mut(ids[4]).polarity = Polarity::Inhibitory;
        let connector = Connector::new(ConnectionPattern::Radial(RadialParams {
            excitatory_radius: 100.0,
            inhibitory_radius: 60.0,
            excitatory_probability: 1.0,
            inhibitory_probability: 1.0,
            allow_self: false,
        }));
        connector.connect(&mut net, &ids, &ids).unwrap();

        assert_eq!(targets_of(&net, ids[0]), vec![ids[1], ids[2]]);
        assert_eq!(targets_of(&net, ids[4]), vec![ids[3]]);
        // Without polarity the excitatory reach applies.
        assert_eq!(targets_of(&net, ids[2]), vec![ids[0], ids[1], ids[3], ids[4]]);
        assert!(net
            .neuron(ids[4])
            .fan_out()
            .iter()
            .all(|&s| net.synapse(s).strength <= 0.0));
    }

    #[test]
    fn radial_probability_zero_connects_nothing() {
        let mut net = Network::new();
        let ids = line(&mut net, 4);
        let connector = Connector::new(ConnectionPattern::Radial(RadialParams {
            excitatory_probability: 0.0,
            ..RadialParams::default()
        }));
        assert!(connector.connect(&mut net, &ids, &ids).unwrap().is_empty());

        let bad = Connector::new(ConnectionPattern::Radial(RadialParams {
            inhibitory_probability: 1.5,
            ..RadialParams::default()
        }));
        assert!(bad.connect(&mut net, &ids, &ids).is_err());
    }

    #[test]
    fn gaussian_probability_depends_on_both_polarities() {
        let params = GaussianParams::default();
        let (e, i) = (Polarity::Excitatory, Polarity::Inhibitory);
        let falloff = (-1.0f64).exp();
        assert!((params.probability(e, e, 200.0) - 0.2 * falloff).abs() < 1e-12);
        assert!((params.probability(e, i, 200.0) - 0.3 * falloff).abs() < 1e-12);
        assert!((params.probability(i, e, 200.0) - 0.4 * falloff).abs() < 1e-12);
        assert!((params.probability(i, i, 200.0) - 0.1 * falloff).abs() < 1e-12);
        assert!((params.probability(Polarity::None, i, 200.0) - 0.25 * falloff).abs() < 1e-12);
        assert_eq!(params.probability(e, e, 0.0), 0.0);
        assert!(params.probability(e, e, 50.0) > params.probability(e, e, 400.0));
    }

    #[test]
    fn gaussian_wiring_stays_local() {
        let mut net = Network::with_seed(11);
        let near = line(&mut net, 6);
        let far = line(&mut net, 6);
        for &id in &far {
            net.neuron_mut(id).position.1 = 100_000.0;
        }
        let mut all = near.clone();
        all.extend_from_slice(&far);
        let connector = Connector::new(ConnectionPattern::RadialGaussian(GaussianParams {
            ee: 1.0,
            ei: 1.0,
            ie: 1.0,
            ii: 1.0,
            unpolarized: 1.0,
            lambda: 1000.0,
        }));
        let syns = connector.connect(&mut net, &all, &all).unwrap();
        assert!(!syns.is_empty());
        for &s in &syns {
            let synapse = net.synapse(s);
            let (source, target) = (synapse.source(), synapse.target());
            assert_ne!(source, target);
            assert_eq!(near.contains(&source), near.contains(&target));
        }
    }

    #[test]
    fn constant_strength() {
        let mut net = Network::new();
        let ids = net.add_neurons(3, NeuronRule::linear());
        let connector =
            Connector::new(ConnectionPattern::AllToAll { allow_self: true }).with_strength(0.5);
        let syns = connector.connect(&mut net, &ids, &ids).unwrap();
        assert!(syns.iter().all(|&s| net.synapse(s).strength == 0.5));
    }
}
