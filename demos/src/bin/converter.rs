//! Converts a PyTorch-Encoding checkpoint into the model store.
//!
//! ```bash
//! cargo run --release --bin converter -- up_psp_resnet50_ade.pth --model up_psp_resnet50_ade
//! cargo run --release --bin converter -- --config converter.json --force
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use segnet_burn::{get_segmentation_model, ModelName};
use segnet_demos::{
    create_device, ensure_convertible, import_pytorch, init_tracing, ConverterConfig,
    SelectedBackend, BACKEND_NAME,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the PyTorch checkpoint (.pth)
    input: Option<PathBuf>,

    /// JSON converter configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model-store name the checkpoint belongs to, e.g. up_psp_resnet50_ade
    #[arg(short, long)]
    model: Option<String>,

    /// Model store directory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Overwrite an existing stored model
    #[arg(short, long)]
    force: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<ConverterConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        ConverterConfig::default()
    };

    if let Some(input) = args.input {
        config.input_path = input;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(store) = args.store {
        config.store_root = Some(store);
    }
    config.force |= args.force;

    if config.input_path.as_os_str().is_empty() {
        bail!("No input checkpoint given");
    }
    if !config.input_path.exists() {
        bail!("Input file does not exist: {}", config.input_path.display());
    }

    let name = ModelName::parse(&config.model)
        .with_context(|| format!("Invalid model name: {}", config.model))?;
    ensure_convertible(&name)?;
    let store = config.store();
    let output_path = store.model_path(&name);

    if output_path.exists() && !config.force {
        bail!(
            "Output file already exists: {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    let device = create_device();
    tracing::info!(
        backend = BACKEND_NAME,
        input = %config.input_path.display(),
        model = %name,
        "converting checkpoint"
    );

    let model = get_segmentation_model::<SelectedBackend>(&config.model, false, &store, &device)
        .with_context(|| format!("Failed to build model {name}"))?;
    let model = import_pytorch(model, &config.input_path, &device)
        .with_context(|| format!("Failed to import {}", config.input_path.display()))?;

    let saved = store
        .save(model, &name)
        .with_context(|| format!("Failed to save {name}"))?;

    println!("Converted {} -> {}", config.input_path.display(), saved.display());
    Ok(())
}
