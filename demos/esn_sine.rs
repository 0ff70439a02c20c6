//! Trains an echo state network to generate a sine wave from a constant input, then lets
//! it run freely on its own feedback.
//!
//! An optional TOML file given as the first argument overrides the network and ESN
//! parameters, e.g.
//!
//! ```toml
//! [network]
//! seed = 3
//!
//! [esn]
//! num_reservoir = 80
//! spectral_radius = 0.8
//! ```

use ndarray::Array2;
use simnet::{
    config::SimConfig,
    core::{
        esn::{EchoStateNetwork, EsnParams},
        network::Network,
        trainers::{rms, LmsOffline, SolutionType, TrainingSet},
    },
};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TRAIN_STEPS: usize = 300;
const TEST_STEPS: usize = 50;

fn sine(t: usize) -> f64 {
    0.5 * (t as f64 / 4.0).sin()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    let params = config.esn.unwrap_or(EsnParams {
        num_reservoir: 100,
        reservoir_density: 0.1,
        spectral_radius: 0.8,
        ..EsnParams::default()
    });

    let mut net = Network::with_params(&config.network);
    let mut esn = EchoStateNetwork::new(&mut net, &params)?;
    info!(
        radius = esn.reservoir_spectral_radius(&net)?,
        "reservoir ready"
    );

    let inputs = Array2::from_elem((TRAIN_STEPS, params.num_inputs), 0.2);
    let targets = Array2::from_shape_fn((TRAIN_STEPS, params.num_outputs), |(t, _)| sine(t));
    let data = TrainingSet::new(inputs, targets)?;
    let trainer = config
        .lms_offline
        .unwrap_or_else(|| LmsOffline::new(SolutionType::WienerHopf).with_ridge(1e-4));
    esn.train(&mut net, &data, &trainer)?;

    // Continue from where the harvest left off, now driven by the network's own output.
    let input = vec![0.2; params.num_inputs];
    let mut sum_squared = 0.0;
    for t in TRAIN_STEPS..TRAIN_STEPS + TEST_STEPS {
        let out = esn.step(&mut net, &input)?;
        net.advance_clock();
        let err = sine(t) - out[0];
        sum_squared += err * err;
        if t % 5 == 0 {
            println!("t={t:4}  target={:+.3}  output={:+.3}", sine(t), out[0]);
        }
    }
    println!(
        "Free-running RMS error over {TEST_STEPS} steps: {:.4}",
        rms(sum_squared, TEST_STEPS, 1)
    );
    Ok(())
}
