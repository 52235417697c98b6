//! Forward pass on a synthetic batch.
//!
//! ```bash
//! cargo run --bin forward -- --model dpcan_resnet50_voc --height 321 --width 321
//! cargo run --bin forward -- --config forward.json --pretrained
//! ```

use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    tensor::{Distribution, ElementConversion},
};
use clap::Parser;
use segnet_burn::get_segmentation_model;
use segnet_demos::{create_device, init_tracing, ForwardConfig, SelectedBackend, BACKEND_NAME};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model-store name, e.g. up_psp_resnet50_ade
    #[arg(short, long)]
    model: Option<String>,

    /// Load stored parameters
    #[arg(long)]
    pretrained: bool,

    /// Model store directory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Image height
    #[arg(long)]
    height: Option<usize>,

    /// Image width
    #[arg(long)]
    width: Option<usize>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<ForwardConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        ForwardConfig::default()
    };

    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(store) = args.store {
        config.store_root = Some(store);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(height) = args.height {
        config.image_size[0] = height;
    }
    if let Some(width) = args.width {
        config.image_size[1] = width;
    }
    config.pretrained |= args.pretrained;

    let device = create_device();
    tracing::info!(backend = BACKEND_NAME, model = %config.model, "building model");

    let model = get_segmentation_model::<SelectedBackend>(
        &config.model,
        config.pretrained,
        &config.store(),
        &device,
    )
    .with_context(|| format!("Failed to build model {}", config.model))?;

    let [height, width] = config.image_size;
    let image = Tensor::<SelectedBackend, 4>::random(
        [config.batch_size, 3, height, width],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    let start = Instant::now();
    let output = model.forward(image).context("Forward pass failed")?;
    let elapsed = start.elapsed();

    println!("Model: {} ({:?})", config.model, model.architecture());
    println!("Backend: {BACKEND_NAME}");
    println!("Backbone channels: {:?}", model.feature_channels());

    println!("  prediction    {:?}", output.prediction.dims());
    if let Some(context_free) = &output.context_free {
        println!("  context-free  {:?}", context_free.dims());
    }
    if let Some(auxiliary) = &output.auxiliary {
        println!("  auxiliary     {:?}", auxiliary.dims());
    }

    let prediction = output.prediction;
    let [_, num_classes, _, _] = prediction.dims();
    let labels = prediction.argmax(1).flatten::<1>(0, 3);
    let counts = (0..num_classes)
        .map(|class| {
            let count: i64 = labels
                .clone()
                .equal_elem(class as i64)
                .int()
                .sum()
                .into_scalar()
                .elem();
            (class, count)
        })
        .filter(|&(_, count)| count > 0)
        .collect::<Vec<_>>();

    println!("Predicted classes (class: pixels): {counts:?}");
    println!("Forward pass took {elapsed:.2?}");

    Ok(())
}
