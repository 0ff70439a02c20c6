//! Stores two patterns in a 16-neuron Hopfield network, corrupts one of them and lets
//! sequential updates pull the state back.
//!
//! Run with `RUST_LOG=debug` to see the build and training logs.

use simnet::core::{
    hopfield::{Hopfield, HopfieldParams, HopfieldUpdate},
    network::Network,
};
use tracing_subscriber::EnvFilter;

fn render(activations: &[f64]) -> String {
    activations
        .chunks(4)
        .map(|row| {
            row.iter()
                .map(|&a| if a > 0.0 { '#' } else { '.' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut net = Network::with_seed(1);
    let hopfield = Hopfield::with_params(
        &mut net,
        &HopfieldParams {
            num_neurons: 16,
            update: HopfieldUpdate::Sequential { by_priority: false },
            ..HopfieldParams::default()
        },
    )?;

    let cross = vec![
        -1.0, 1.0, 1.0, -1.0, //
        1.0, 1.0, 1.0, 1.0, //
        1.0, 1.0, 1.0, 1.0, //
        -1.0, 1.0, 1.0, -1.0,
    ];
    let frame = vec![
        1.0, 1.0, 1.0, 1.0, //
        1.0, -1.0, -1.0, 1.0, //
        1.0, -1.0, -1.0, 1.0, //
        1.0, 1.0, 1.0, 1.0,
    ];
    hopfield.train(&mut net, &[cross.clone(), frame])?;

    let mut noisy = cross.clone();
    for i in [0, 5, 10] {
        noisy[i] = -noisy[i];
    }
    hopfield.neurons.set_activations(&mut net, &noisy)?;
    println!("Corrupted:\n{}\n", render(&noisy));

    for tick in 1..=5 {
        hopfield.update(&mut net);
        println!(
            "Tick {tick} (energy {:.1}):\n{}\n",
            hopfield.energy(&net),
            render(&hopfield.neurons.activations(&net))
        );
    }

    let recalled = hopfield.neurons.activations(&net) == cross;
    println!("Recalled the stored pattern: {recalled}");
    Ok(())
}
