//! Core configuration structures shared by every component.

use burn::prelude::*;

use super::enums::{BackboneKind, UpsampleMode};
use crate::error::{SegNetError, SegNetResult};

/// Interpolation policy applied by every resampling step.
///
/// One value is handed to each component at construction and to the full models for
/// the final resize, so training and inference resample identically.
#[derive(Config, Debug, PartialEq, Eq)]
pub struct UpsampleConfig {
    /// Resampling kernel.
    #[config(default = "UpsampleMode::Bilinear")]
    pub mode: UpsampleMode,
    /// Whether corner pixels of input and output grids are aligned.
    #[config(default = "true")]
    pub align_corners: bool,
}

impl UpsampleConfig {
    /// Checks that the backend can honour this policy.
    ///
    /// Burn's bilinear kernel always aligns corners, and corner alignment has no meaning
    /// for nearest sampling.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::UnsupportedInterpolation` for the other two combinations.
    pub fn validate(&self) -> SegNetResult<()> {
        match (&self.mode, self.align_corners) {
            (UpsampleMode::Bilinear, true) | (UpsampleMode::Nearest, false) => Ok(()),
            (UpsampleMode::Bilinear, false) => Err(SegNetError::UnsupportedInterpolation {
                reason: "bilinear resampling requires align_corners = true".to_string(),
            }),
            (UpsampleMode::Nearest, true) => Err(SegNetError::UnsupportedInterpolation {
                reason: "align_corners only applies to bilinear resampling".to_string(),
            }),
        }
    }
}

/// Backbone network configuration.
#[derive(Config, Debug)]
pub struct BackboneConfig {
    /// The chosen backbone architecture.
    #[config(default = "BackboneKind::Resnet50")]
    pub backbone: BackboneKind,
    /// Run the last two stages dilated instead of strided (output stride 8).
    #[config(default = "true")]
    pub dilated: bool,
}
