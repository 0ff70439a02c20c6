use ndarray::array;
use rand::{rngs::StdRng, Rng, SeedableRng};
use simnet::core::{
    connections::{ConnectionPattern, Connector},
    esn::{EchoStateNetwork, EsnParams},
    groups::{NeuronGroup, SynapseGroup},
    hopfield::{Hopfield, HopfieldParams, HopfieldUpdate},
    network::Network,
    neuron_rules::NeuronRule,
    som::{SomNetwork, SomParams},
    trainers::{IterableTrainer, LmsIterative, TrainingSet},
};

const PATTERN: [f64; 4] = [1.0, -1.0, 1.0, -1.0];

fn hopfield(net: &mut Network, update: HopfieldUpdate) -> Hopfield {
    let hopfield = Hopfield::with_params(
        net,
        &HopfieldParams {
            num_neurons: 4,
            update,
            ..HopfieldParams::default()
        },
    )
    .unwrap();
    hopfield.train(net, &[PATTERN.to_vec()]).unwrap();
    hopfield
}

#[test]
fn hopfield_sequential_recall_repairs_a_flipped_bit() {
    let mut net = Network::new();
    let hopfield = hopfield(&mut net, HopfieldUpdate::Sequential { by_priority: false });
    hopfield
        .neurons
        .set_activations(&mut net, &[1.0, -1.0, 1.0, 1.0])
        .unwrap();
    let before = hopfield.energy(&net);
    hopfield.update(&mut net);
    assert_eq!(hopfield.neurons.activations(&net), PATTERN.to_vec());
    assert!(hopfield.energy(&net) < before);
}

#[test]
fn hopfield_stored_pattern_is_a_synchronous_fixed_point() {
    let mut net = Network::new();
    let hopfield = hopfield(&mut net, HopfieldUpdate::Synchronous);
    hopfield.neurons.set_activations(&mut net, &PATTERN).unwrap();
    for _ in 0..5 {
        hopfield.update(&mut net);
        assert_eq!(hopfield.neurons.activations(&net), PATTERN.to_vec());
    }
}

#[test]
fn hopfield_random_order_is_reproducible_from_the_seed() {
    let run = || {
        let mut net = Network::with_seed(11);
        let hopfield = Hopfield::with_params(
            &mut net,
            &HopfieldParams {
                num_neurons: 9,
                update: HopfieldUpdate::Random,
                ..HopfieldParams::default()
            },
        )
        .unwrap();
        hopfield.randomize(&mut net);
        hopfield.neurons.randomize(&mut net);
        let mut trace = Vec::new();
        for _ in 0..10 {
            hopfield.update(&mut net);
            trace.push(hopfield.neurons.activations(&net));
        }
        trace
    };
    assert_eq!(run(), run());
}

#[test]
fn som_is_winner_take_all_with_shrinking_neighborhood() {
    let mut net = Network::with_seed(5);
    let mut som = SomNetwork::new(
        &mut net,
        3,
        &SomParams {
            num_neurons: 9,
            init_neighborhood_size: 2.0,
            neighborhood_decay_amount: 0.3,
            ..SomParams::default()
        },
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(8);
    let mut last_size = som.som.neighborhood_size();
    let mut last_alpha = som.som.alpha();
    for _ in 0..50 {
        let input: Vec<f64> = (0..3).map(|_| rng.random_range(0.0..1.0)).collect();
        som.input.set_activations(&mut net, &input).unwrap();
        som.update(&mut net);

        let activations = som.som.neurons.activations(&net);
        assert_eq!(activations.iter().filter(|&&a| a == 1.0).count(), 1);
        assert_eq!(activations.iter().filter(|&&a| a == 0.0).count(), 8);

        let size = som.som.neighborhood_size();
        assert!(size <= last_size && size >= 0.0);
        assert!(som.som.alpha() <= last_alpha);
        last_size = size;
        last_alpha = som.som.alpha();
    }
    assert_eq!(last_size, 0.0);
}

#[test]
fn esn_reservoir_matches_the_requested_spectral_radius() {
    for seed in [1, 2, 3] {
        let mut net = Network::with_seed(seed);
        let mut esn = EchoStateNetwork::new(
            &mut net,
            &EsnParams {
                num_reservoir: 40,
                reservoir_density: 0.5,
                spectral_radius: 0.9,
                ..EsnParams::default()
            },
        )
        .unwrap();
        let radius = esn.reservoir_spectral_radius(&net).unwrap();
        assert!((radius - 0.9).abs() < 1e-6, "seed {seed}: {radius}");

        esn.set_spectral_radius(&mut net, 1.2).unwrap();
        let radius = esn.reservoir_spectral_radius(&net).unwrap();
        assert!((radius - 1.2).abs() < 1e-6, "seed {seed}: {radius}");
    }
}

#[test]
fn replay_from_a_snapshot_is_bit_identical() {
    let mut net = Network::with_seed(17);
    let esn = EchoStateNetwork::new(
        &mut net,
        &EsnParams {
            num_reservoir: 20,
            reservoir_density: 0.3,
            ..EsnParams::default()
        },
    )
    .unwrap();
    esn.readout.randomize(&mut net);

    let inputs: Vec<f64> = (0..12).map(|t| (t as f64 * 0.4).sin()).collect();
    let run = |net: &mut Network| {
        inputs
            .iter()
            .map(|&x| {
                let out = esn.step(net, &[x]).unwrap();
                net.advance_clock();
                (out, esn.reservoir.activations(net))
            })
            .collect::<Vec<_>>()
    };

    run(&mut net);
    let start = net.snapshot();
    let first = run(&mut net);
    let end = net.snapshot();

    net.restore(&start).unwrap();
    let second = run(&mut net);
    assert_eq!(first, second);
    assert_eq!(net.snapshot(), end);
}

#[test]
fn lms_weights_move_with_the_error_sign() {
    let mut net = Network::new();
    let input = NeuronGroup::create(&mut net, "in", 2, NeuronRule::Clamped);
    let output = NeuronGroup::create(&mut net, "out", 2, NeuronRule::linear());
    let connector =
        Connector::new(ConnectionPattern::AllToAll { allow_self: false }).with_strength(0.5);
    SynapseGroup::connect(&mut net, "weights", &input, &output, &connector).unwrap();
    let weight = |net: &Network, s, t| net.synapse(net.find_synapse(s, t).unwrap()).strength;
    let (in1, out1, out2) = (input.get(0), output.get(0), output.get(1));

    let mut lms = LmsIterative::new(input, output);
    assert_eq!(lms.learning_rate, 0.01);
    lms.set_training_set(TrainingSet::new(array![[1.0, 0.0]], array![[1.0, 0.0]]).unwrap())
        .unwrap();
    lms.iterate(&mut net).unwrap();

    assert!(weight(&net, in1, out1) > 0.5);
    assert!(weight(&net, in1, out2) < 0.5);
}
