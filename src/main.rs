use std::error::Error;
use std::io::IsTerminal;
use std::time::Instant;

use cnn_infer::architecture::load_architecture;
use cnn_infer::{Layer, Network, NetworkConfig, Tensor};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const USAGE: &str = "usage: cnn-infer [ARCHITECTURE.json] [PARAMETERS[.gz]] [CONFIG.json]";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}

// LeNet-5 style classifier for 1x28x28 inputs.
fn lenet(config: NetworkConfig) -> cnn_infer::Result<Network> {
    let mut network = Network::new(config)?;
    network.add(Layer::conv2d(1, 6, 5, 1, 2)?);
    network.add(Layer::relu());
    network.add(Layer::max_pool2d(2, 2, 0)?);
    network.add(Layer::conv2d(6, 16, 5, 1, 0)?);
    network.add(Layer::relu());
    network.add(Layer::max_pool2d(2, 2, 0)?);
    network.add(Layer::flatten());
    network.add(Layer::linear(16 * 5 * 5, 120)?);
    network.add(Layer::relu());
    network.add(Layer::linear(120, 84)?);
    network.add(Layer::relu());
    network.add(Layer::linear(84, 10)?);
    network.add(Layer::softmax());
    Ok(network)
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }
    if args.len() > 3 {
        return Err(format!("expected at most 3 arguments, got {}\n{}", args.len(), USAGE).into());
    }

    let config = match args.get(2) {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::default(),
    };

    let mut network = match args.get(0) {
        Some(path) => load_architecture(path)?.build(config)?,
        None => lenet(config)?,
    };

    match args.get(1) {
        Some(path) => network.load(path)?,
        None => network.randomize(42)?,
    }

    let input = Tensor::random([1, 1, 28, 28], 42);
    let expected = network.output_shape(input.shape())?;
    info!(layers = network.len(), input = ?input.shape(), output = ?expected, "network ready");

    let start = Instant::now();
    let output = network.predict(input)?;
    info!(elapsed = ?start.elapsed(), "inference complete");

    if network.config().debug {
        network.print();
    }

    output.print();
    match output.argmax() {
        Some(class) => println!("predicted class: {}", class),
        None => println!("empty output"),
    }

    Ok(())
}
