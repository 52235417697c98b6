//! Enumeration types for model configuration.

use backbones::{BackboneType, ResNetVariant};
use burn::prelude::*;

use crate::error::{SegNetError, SegNetResult};

/// Resampling kernel used whenever a feature map changes spatial size.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum UpsampleMode {
    /// Nearest-neighbour sampling.
    Nearest,
    /// Bilinear sampling.
    Bilinear,
}

/// The segmentation head architectures provided by this crate.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Architecture {
    /// Dual-path class-attention network.
    Dpcan,
    /// Pyramid pooling head fed by local attention upsampling.
    UpPsp,
}

impl Architecture {
    /// Name used in model-store file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dpcan => "dpcan",
            Self::UpPsp => "up_psp",
        }
    }

    /// Looks up an architecture by its model-store name.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::UnknownArchitecture` for any other name.
    pub fn from_name(name: &str) -> SegNetResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "dpcan" => Ok(Self::Dpcan),
            "up_psp" => Ok(Self::UpPsp),
            _ => Err(SegNetError::UnknownArchitecture {
                name: name.to_string(),
            }),
        }
    }
}

/// Defines the backbone architecture.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum BackboneKind {
    /// ResNet-18.
    Resnet18,
    /// ResNet-34.
    Resnet34,
    /// ResNet-50.
    Resnet50,
    /// ResNet-101.
    Resnet101,
    /// ResNet-152.
    Resnet152,
}

impl BackboneKind {
    /// Name used in model-store file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Resnet18 => "resnet18",
            Self::Resnet34 => "resnet34",
            Self::Resnet50 => "resnet50",
            Self::Resnet101 => "resnet101",
            Self::Resnet152 => "resnet152",
        }
    }

    /// Looks up a backbone by its model-store name.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::UnsupportedBackbone` for any other name.
    pub fn from_name(name: &str) -> SegNetResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "resnet18" => Ok(Self::Resnet18),
            "resnet34" => Ok(Self::Resnet34),
            "resnet50" => Ok(Self::Resnet50),
            "resnet101" => Ok(Self::Resnet101),
            "resnet152" => Ok(Self::Resnet152),
            _ => Err(SegNetError::UnsupportedBackbone {
                backbone: name.to_string(),
            }),
        }
    }

    pub(crate) const fn backbone_type(&self) -> BackboneType {
        let variant = match self {
            Self::Resnet18 => ResNetVariant::ResNet18,
            Self::Resnet34 => ResNetVariant::ResNet34,
            Self::Resnet50 => ResNetVariant::ResNet50,
            Self::Resnet101 => ResNetVariant::ResNet101,
            Self::Resnet152 => ResNetVariant::ResNet152,
        };
        BackboneType::ResNet(variant)
    }
}
