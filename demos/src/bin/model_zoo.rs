//! Model zoo browser.
//!
//! ```bash
//! cargo run --bin model_zoo -- list
//! cargo run --bin model_zoo -- info up_psp_resnet50_ade
//! cargo run --bin model_zoo -- config dpcan_resnet101_pcontext
//! ```

use std::path::PathBuf;

use anyhow::Result;
use burn::config::Config;
use clap::{Parser, Subcommand};
use segnet_burn::{
    Architecture, BackboneConfig, BackboneKind, Dataset, DpcanConfig, ModelName, ModelStore,
    UpPspConfig,
};
use segnet_demos::init_tracing;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model store directory (default: ~/.encoding/models)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List datasets and every model name with its store status
    List {
        /// Only show models present in the store
        #[arg(long)]
        available: bool,
    },
    /// Show details of one model name
    Info {
        /// Model-store name, e.g. up_psp_resnet50_ade
        name: String,
    },
    /// Print the model configuration as JSON
    Config {
        /// Model-store name, e.g. up_psp_resnet50_ade
        name: String,
    },
}

const ARCHITECTURES: [Architecture; 2] = [Architecture::Dpcan, Architecture::UpPsp];
const BACKBONES: [BackboneKind; 5] = [
    BackboneKind::Resnet18,
    BackboneKind::Resnet34,
    BackboneKind::Resnet50,
    BackboneKind::Resnet101,
    BackboneKind::Resnet152,
];

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = cli.store.map_or_else(ModelStore::default, ModelStore::new);

    match cli.command {
        Commands::List { available } => list(&store, available),
        Commands::Info { name } => info(&store, &name),
        Commands::Config { name } => {
            println!("{}", model_config(&ModelName::parse(&name)?));
            Ok(())
        }
    }
}

fn list(store: &ModelStore, only_available: bool) -> Result<()> {
    println!("Datasets:");
    for dataset in Dataset::ALL {
        println!(
            "  {:<12} {:>4} classes  (acronym: {})",
            dataset.name(),
            dataset.num_classes(),
            dataset.acronym()
        );
    }

    println!("\nModels in {}:", store.root().display());
    // `voc` is shared by two datasets, so names repeat without this filter.
    let datasets = Dataset::ALL
        .into_iter()
        .filter(|dataset| Dataset::from_acronym(dataset.acronym()).ok() == Some(*dataset));

    for dataset in datasets {
        for architecture in &ARCHITECTURES {
            for backbone in &BACKBONES {
                let name = ModelName::new(architecture.clone(), backbone.clone(), dataset);
                let status = match (architecture, store.model_file(&name)) {
                    (Architecture::Dpcan, _) => "no published weights",
                    (_, Ok(_)) => "available",
                    (_, Err(_)) => "not downloaded",
                };
                if !only_available || status == "available" {
                    println!("  {:<28} {status}", name.to_string());
                }
            }
        }
    }

    Ok(())
}

fn info(store: &ModelStore, name: &str) -> Result<()> {
    let model_name = ModelName::parse(name)?;

    println!("Model: {model_name}");
    println!("  Architecture: {:?}", model_name.architecture);
    println!("  Backbone:     {}", model_name.backbone.name());
    println!(
        "  Dataset:      {} ({} classes)",
        model_name.dataset,
        model_name.dataset.num_classes()
    );
    println!("  Path:         {}", store.model_path(&model_name).display());

    match store.model_file(&model_name) {
        Ok(_) => println!("  Status:       available"),
        Err(e) => {
            tracing::debug!(error = %e, "stored weights not found");
            println!("  Status:       not in store");
        }
    }

    Ok(())
}

fn model_config(name: &ModelName) -> String {
    let backbone = BackboneConfig::new().with_backbone(name.backbone.clone());
    let num_classes = name.dataset.num_classes();

    match name.architecture {
        Architecture::Dpcan => DpcanConfig::new(num_classes)
            .with_backbone(backbone)
            .to_string(),
        Architecture::UpPsp => UpPspConfig::new(num_classes)
            .with_backbone(backbone)
            .to_string(),
    }
}
