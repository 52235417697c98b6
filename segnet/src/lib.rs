//! Semantic segmentation heads on Burn.
//!
//! Two architectures share a dilated ResNet trunk:
//!
//! - [`Dpcan`]: two ASPP paths combined by a per-class attention gate.
//! - [`UpPsp`]: local attention upsampling followed by pyramid pooling.
//!
//! The [`Dataset`] registry supplies class counts and the [`ModelStore`] holds named
//! parameter sets.

mod config;
mod datasets;
mod error;
mod model_store;
mod models;

pub use config::{Architecture, BackboneConfig, BackboneKind, UpsampleConfig, UpsampleMode};
pub use datasets::Dataset;
pub use error::{SegNetError, SegNetResult};
pub use model_store::{ModelName, ModelStore};
pub use models::{
    gate_prediction, get_dpcan, get_segmentation_model, get_up_psp, get_up_psp_resnet50_ade,
    modules, Dpcan, DpcanConfig, DpcanRecord, DualPathHead, DualPathHeadConfig, DualPathOutput,
    SegmentationModel, SegmentationOutput, UpPsp, UpPspConfig, UpPspHead, UpPspHeadConfig,
    UpPspRecord,
};
