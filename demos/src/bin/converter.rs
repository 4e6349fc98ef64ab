//! Model Converter
//!
//! Converts a PyTorch `U_Net` / `ResAttU_Net` checkpoint into a Burn record.
//! The network configuration must match the one the checkpoint was trained with.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --features pretrained --bin converter -- model.pth model --model ResAttU_Net --depth 4
//! cargo run --features pretrained --bin converter -- model.pth model --config model.json --validate
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    tensor::{Distribution, ElementConversion},
};
use clap::Parser;
use unet_burn::weights::{load_model, load_pytorch_weights, save_model};
use unet_demos::{create_device, get_backend_name, init_tracing, ModelArgs, SelectedBackend};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PyTorch model path (.pth file)
    input: PathBuf,

    /// Output Burn record path (`.mpk` is appended)
    output: PathBuf,

    #[command(flatten)]
    model: ModelArgs,

    /// Reload the written record and compare outputs
    #[arg(long)]
    validate: bool,

    /// Force overwrite output file
    #[arg(long)]
    force: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.input.exists() {
        anyhow::bail!("Input model file does not exist: {}", args.input.display());
    }

    let record_path = args.output.with_extension("mpk");
    if record_path.exists() && !args.force {
        anyhow::bail!(
            "Output file already exists: {}. Use --force to overwrite.",
            record_path.display()
        );
    }

    let device = create_device();
    let config = args.model.model_config()?;
    tracing::info!(
        backend = get_backend_name(),
        model = config.kind.name(),
        depth = config.network.depth,
        input = %args.input.display(),
        "converting checkpoint"
    );

    let model = config
        .init::<SelectedBackend>(&device)
        .context("Failed to build model")?;
    let model = load_pytorch_weights(model, &args.input, &device)
        .context("Failed to load PyTorch weights")?;

    let probe = args.validate.then(|| {
        let input = Tensor::<SelectedBackend, 4>::random(
            [1, config.network.img_ch, 64, 64],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        (input.clone(), model.forward(input))
    });

    save_model(model, &args.output).context("Failed to save Burn record")?;
    config
        .save(args.output.with_extension("json"))
        .context("Failed to save model config")?;

    if let Some((input, expected)) = probe {
        let expected = expected.context("Forward pass on converted model failed")?;
        let reloaded = load_model(config.init::<SelectedBackend>(&device)?, &args.output, &device)
            .context("Failed to reload Burn record")?;
        let actual = reloaded
            .forward(input)
            .context("Forward pass on reloaded model failed")?;

        let max_diff: f32 = (actual - expected).abs().max().into_scalar().elem();
        tracing::info!(max_diff, "validated reloaded record");
        if max_diff > 1e-4 {
            anyhow::bail!("Reloaded model output differs by {max_diff}");
        }
    }

    println!("Converted {} -> {}", args.input.display(), record_path.display());
    Ok(())
}
