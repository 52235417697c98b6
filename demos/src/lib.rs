//! Command line tools for the segmentation heads.
//!
//! ## Available tools
//!
//! - `forward`: runs a model on a synthetic batch and reports output shapes
//! - `model_zoo`: lists datasets, model names and what the local store holds
//! - `converter`: imports a PyTorch-Encoding checkpoint into the model store
//!
//! ## Usage
//!
//! ```bash
//! # Forward pass with random weights
//! cargo run --bin forward -- --model up_psp_resnet50_ade
//!
//! # List known models
//! cargo run --bin model_zoo -- list
//!
//! # Import a PyTorch checkpoint
//! cargo run --bin converter -- up_psp_resnet50_ade.pth --model up_psp_resnet50_ade
//! ```
//!
//! Backends are chosen with cargo features: `ndarray` (default), `wgpu`, `cuda`.

pub mod common;
pub mod config;

pub use common::{
    create_device, ensure_convertible, import_pytorch, init_tracing, pytorch_key_remaps,
    SelectedBackend, SelectedDevice, BACKEND_NAME,
};
pub use config::{ConverterConfig, ForwardConfig};
