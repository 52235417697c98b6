//! Dataset registry.
//!
//! Maps a dataset key to the number of classes a head must predict and to the short
//! acronym used in model-store names. Lookup never falls back to a default class count.

use std::fmt;

use crate::error::{SegNetError, SegNetResult};

/// Segmentation datasets with a known label space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// PASCAL VOC 2012.
    PascalVoc,
    /// PASCAL VOC 2012 with the SBD augmented training set.
    PascalAug,
    /// PASCAL Context.
    PContext,
    /// ADE20K scene parsing.
    Ade20k,
    /// Cityscapes.
    Citys,
    /// MS COCO restricted to the VOC categories.
    Coco,
    /// Materials in Context.
    Minc,
}

impl Dataset {
    /// Every registered dataset.
    pub const ALL: [Self; 7] = [
        Self::PascalVoc,
        Self::PascalAug,
        Self::PContext,
        Self::Ade20k,
        Self::Citys,
        Self::Coco,
        Self::Minc,
    ];

    /// Looks up a dataset by key, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::UnknownDataset` when the key is not registered.
    pub fn from_name(name: &str) -> SegNetResult<Self> {
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| SegNetError::UnknownDataset {
                name: name.to_string(),
            })
    }

    /// Resolves a model-store acronym back to its dataset.
    ///
    /// `voc` is shared by the two PASCAL VOC variants and resolves to `pascal_voc`.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::UnknownDataset` when no dataset uses the acronym.
    pub fn from_acronym(acronym: &str) -> SegNetResult<Self> {
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.acronym().eq_ignore_ascii_case(acronym))
            .ok_or_else(|| SegNetError::UnknownDataset {
                name: acronym.to_string(),
            })
    }

    /// Registry key.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PascalVoc => "pascal_voc",
            Self::PascalAug => "pascal_aug",
            Self::PContext => "pcontext",
            Self::Ade20k => "ade20k",
            Self::Citys => "citys",
            Self::Coco => "coco",
            Self::Minc => "minc",
        }
    }

    /// Number of output classes.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        match self {
            Self::PascalVoc | Self::PascalAug | Self::Coco => 21,
            Self::PContext => 59,
            Self::Ade20k => 150,
            Self::Citys => 19,
            Self::Minc => 23,
        }
    }

    /// Short name used in model-store file names.
    #[must_use]
    pub const fn acronym(&self) -> &'static str {
        match self {
            Self::PascalVoc | Self::PascalAug => "voc",
            Self::Ade20k => "ade",
            other => other.name(),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
