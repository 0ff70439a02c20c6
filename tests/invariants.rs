use proptest::prelude::*;
use simnet::core::{
    esn::{EchoStateNetwork, EsnParams},
    hopfield::{Hopfield, HopfieldParams, HopfieldUpdate},
    network::Network,
    som::{SomNetwork, SomParams},
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn stored_hopfield_pattern_is_a_synchronous_fixed_point(
        bits in prop::collection::vec(any::<bool>(), 2..24),
    ) {
        let pattern: Vec<f64> = bits.iter().map(|&b| if b { 1.0 } else { -1.0 }).collect();
        let mut net = Network::new();
        let hopfield = Hopfield::with_params(
            &mut net,
            &HopfieldParams {
                num_neurons: pattern.len(),
                update: HopfieldUpdate::Synchronous,
                ..HopfieldParams::default()
            },
        )
        .unwrap();
        hopfield.train(&mut net, &[pattern.clone()]).unwrap();

        for _ in 0..3 {
            hopfield.update(&mut net);
            prop_assert_eq!(hopfield.neurons.activations(&net), pattern.clone());
        }
    }

    #[test]
    fn som_output_is_one_hot_and_neighborhood_only_shrinks(
        seed in any::<u64>(),
        num_neurons in 1usize..20,
        num_inputs in 1usize..5,
        init_neighborhood_size in 0.0f64..200.0,
        neighborhood_decay_amount in 0.0f64..50.0,
        alpha_decay_rate in 0.0f64..0.5,
        values in prop::collection::vec(0.0f64..1.0, 80),
    ) {
        let mut net = Network::with_seed(seed);
        let mut som = SomNetwork::new(
            &mut net,
            num_inputs,
            &SomParams {
                num_neurons,
                init_neighborhood_size,
                neighborhood_decay_amount,
                alpha_decay_rate,
                ..SomParams::default()
            },
        )
        .unwrap();

        let mut last_size = som.som.neighborhood_size();
        let mut last_alpha = som.som.alpha();
        for input in values.chunks_exact(num_inputs) {
            som.input.set_activations(&mut net, input).unwrap();
            som.update(&mut net);

            let activations = som.som.neurons.activations(&net);
            prop_assert_eq!(activations.iter().filter(|&&a| a == 1.0).count(), 1);
            prop_assert_eq!(
                activations.iter().filter(|&&a| a == 0.0).count(),
                num_neurons - 1
            );

            let size = som.som.neighborhood_size();
            prop_assert!(size >= 0.0);
            prop_assert!(size <= last_size);
            prop_assert!(som.som.alpha() <= last_alpha);
            last_size = size;
            last_alpha = som.som.alpha();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn esn_reservoir_is_scaled_to_the_requested_radius(
        seed in any::<u64>(),
        num_reservoir in 8usize..40,
        target in 0.2f64..1.5,
    ) {
        let mut net = Network::with_seed(seed);
        let esn = EchoStateNetwork::new(
            &mut net,
            &EsnParams {
                num_reservoir,
                reservoir_density: 0.5,
                spectral_radius: target,
                ..EsnParams::default()
            },
        )
        .unwrap();
        let radius = esn.reservoir_spectral_radius(&net).unwrap();
        prop_assert!((radius - target).abs() < 1e-6, "{} vs {}", radius, target);
    }
}
