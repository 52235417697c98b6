//! # Model Architectures
//!
//! - `modules`: building blocks (ASPP, pyramid pooling, local attention upsampling,
//!   auxiliary FCN head, conv blocks).
//! - `dpcan`: the dual-path class-attention network.
//! - `up_psp`: the pyramid pooling network with local attention upsampling.
//! - `zoo`: constructors keyed by dataset, backbone and store name.

pub mod dpcan;
pub mod modules;
mod output;
pub mod up_psp;
pub mod zoo;

pub use dpcan::{
    gate_prediction, Dpcan, DpcanConfig, DpcanRecord, DualPathHead, DualPathHeadConfig,
    DualPathOutput,
};
pub use output::SegmentationOutput;
pub use up_psp::{UpPsp, UpPspConfig, UpPspHead, UpPspHeadConfig, UpPspRecord};
pub use zoo::{
    get_dpcan, get_segmentation_model, get_up_psp, get_up_psp_resnet50_ade, SegmentationModel,
};
