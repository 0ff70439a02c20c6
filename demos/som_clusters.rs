//! Trains a self-organizing map on three clusters of 2-D points and prints which map
//! neuron wins for each cluster center.

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use simnet::core::{
    network::Network,
    som::{SomNetwork, SomParams},
};
use tracing_subscriber::EnvFilter;

const CENTERS: [[f64; 2]; 3] = [[0.1, 0.1], [0.9, 0.2], [0.5, 0.9]];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut rng = StdRng::seed_from_u64(4);
    let samples = 90;
    let data = Array2::from_shape_fn((samples, 2), |(row, col)| {
        CENTERS[row % CENTERS.len()][col] + rng.random_range(-0.05..0.05)
    });

    let mut net = Network::with_seed(4);
    let params = SomParams {
        num_neurons: 25,
        init_alpha: 0.3,
        init_neighborhood_size: 120.0,
        neighborhood_decay_amount: 0.05,
        batch_size: 40,
        ..SomParams::default()
    };
    let mut som = SomNetwork::new(&mut net, 2, &params)?;
    som.train(&mut net, &data)?;
    println!(
        "Trained: alpha {:.4}, neighborhood {:.2}",
        som.som.alpha(),
        som.som.neighborhood_size()
    );

    for center in CENTERS {
        som.input.set_activations(&mut net, &center)?;
        let winner = som.som.compute_winner(&net);
        let weights: Vec<f64> = net
            .neuron(som.som.neurons.get(winner))
            .fan_in()
            .iter()
            .map(|&s| net.synapse(s).strength)
            .collect();
        println!("center {center:?} -> neuron {winner:2}, prototype {weights:.3?}");
    }
    Ok(())
}
