//! Model inspection tool.
//!
//! Builds a segmentation network, optionally applies a weight-init scheme,
//! runs one forward pass on a random batch and reports the result.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin inspect -- --model U_Net --depth 4 --height 128 --width 128
//! cargo run --bin inspect -- --model ResAttU_Net --init orthogonal --json
//! cargo run --bin inspect -- --depth 3 --base-channels 16 --save unet_d3
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    tensor::{activation::sigmoid, Distribution, ElementConversion},
};
use clap::Parser;
use serde::Serialize;
use unet_burn::{weights::save_model, InitWeights, WeightInitializer};
use unet_demos::{
    create_device, get_backend_name, init_tracing, ModelArgs, SelectedBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    model: ModelArgs,

    /// Weight-init scheme (`normal`, `xavier`, `kaiming`, `orthogonal`)
    #[arg(short, long)]
    init: Option<String>,

    /// Gain of the weight-init scheme
    #[arg(long, default_value_t = 0.02)]
    gain: f64,

    /// Seed of the weight-init scheme
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Batch size of the random input
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Height of the random input
    #[arg(long, default_value_t = 64)]
    height: usize,

    /// Width of the random input
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Write the model record to this path (`.mpk` is appended)
    #[arg(long)]
    save: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize, Debug)]
struct Report {
    model: &'static str,
    backend: &'static str,
    depth: usize,
    stage_channels: Vec<usize>,
    num_params: usize,
    input_shape: [usize; 4],
    output_shape: [usize; 4],
    logits_min: f32,
    logits_max: f32,
    foreground_fraction: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let device = create_device();
    let config = args.model.model_config()?;
    tracing::info!(backend = get_backend_name(), model = config.kind.name(), "building model");

    let mut model = config
        .init::<SelectedBackend>(&device)
        .context("Failed to build model")?;

    if let Some(init) = &args.init {
        let mut initializer = WeightInitializer::from_name(init, args.gain, args.seed)
            .context("Failed to create weight initializer")?;
        model = model.init_weights(&mut initializer);
    }

    let input_shape = [args.batch, config.network.img_ch, args.height, args.width];
    let input = Tensor::<SelectedBackend, 4>::random(
        input_shape,
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    let output = model.forward(input).context("Forward pass failed")?;
    let output_shape = output.dims();
    let foreground = sigmoid(output.clone()).greater_elem(0.5).float().mean();

    let report = Report {
        model: config.kind.name(),
        backend: get_backend_name(),
        depth: config.network.depth,
        stage_channels: config.network.stage_channels(),
        num_params: model.num_params(),
        input_shape,
        output_shape,
        logits_min: output.clone().min().into_scalar().elem(),
        logits_max: output.max().into_scalar().elem(),
        foreground_fraction: foreground.into_scalar().elem(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Model:        {}", report.model);
        println!("Backend:      {}", report.backend);
        println!("Depth:        {}", report.depth);
        println!("Channels:     {:?}", report.stage_channels);
        println!("Parameters:   {}", report.num_params);
        println!("Input:        {:?}", report.input_shape);
        println!("Output:       {:?}", report.output_shape);
        println!(
            "Logits:       [{:.4}, {:.4}]",
            report.logits_min, report.logits_max
        );
        println!("Foreground:   {:.2}%", report.foreground_fraction * 100.0);
    }

    if let Some(path) = &args.save {
        save_model(model, path).context("Failed to save model")?;
        config
            .save(path.with_extension("json"))
            .with_context(|| format!("Failed to save config next to {}", path.display()))?;
        tracing::info!(path = %path.display(), "model saved");
    }

    Ok(())
}
