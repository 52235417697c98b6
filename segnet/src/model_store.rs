//! Named parameter sets on disk.
//!
//! A stored model is identified by `{architecture}_{backbone}_{dataset acronym}`, for
//! example `up_psp_resnet50_ade`, and lives at `{root}/{name}.mpk` in Burn's named
//! MessagePack format.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::{
    config::{Architecture, BackboneKind},
    datasets::Dataset,
    error::{SegNetError, SegNetResult},
};

/// Key of a stored parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    pub architecture: Architecture,
    pub backbone: BackboneKind,
    pub dataset: Dataset,
}

impl ModelName {
    pub const fn new(architecture: Architecture, backbone: BackboneKind, dataset: Dataset) -> Self {
        Self {
            architecture,
            backbone,
            dataset,
        }
    }

    /// Parses a name such as `up_psp_resnet50_ade`.
    ///
    /// Architecture names may contain `_`, so the string is split from the right.
    ///
    /// # Errors
    ///
    /// Returns the lookup error of the first component that is not recognized, or
    /// `SegNetError::InvalidConfiguration` if the name has fewer than three parts.
    pub fn parse(name: &str) -> SegNetResult<Self> {
        let mut parts = name.rsplitn(3, '_');
        let (Some(acronym), Some(backbone), Some(architecture)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "model name '{name}' is not of the form <architecture>_<backbone>_<dataset>"
                ),
            });
        };

        Ok(Self {
            architecture: Architecture::from_name(architecture)?,
            backbone: BackboneKind::from_name(backbone)?,
            dataset: Dataset::from_acronym(acronym)?,
        })
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.architecture.name(),
            self.backbone.name(),
            self.dataset.acronym()
        )
    }
}

/// Directory of stored parameter sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStore {
    root: PathBuf,
}

impl Default for ModelStore {
    /// `~/.encoding/models`.
    fn default() -> Self {
        Self {
            root: store_root(dirs::home_dir()),
        }
    }
}

/// `{home}/.encoding/models`, relative to the working directory without a home.
fn store_root(home: Option<PathBuf>) -> PathBuf {
    let home = home.unwrap_or_else(|| {
        tracing::warn!(
            "no home directory found, using a model store relative to the working directory"
        );
        PathBuf::new()
    });
    home.join(".encoding").join("models")
}

impl ModelStore {
    /// File extension of stored parameter sets.
    pub const EXTENSION: &'static str = "mpk";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the parameters of `name` live, whether or not the file exists.
    pub fn model_path(&self, name: &ModelName) -> PathBuf {
        self.root.join(format!("{name}.{}", Self::EXTENSION))
    }

    /// Path of an existing parameter file.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::PretrainedNotFound` if the store has no file for `name`.
    pub fn model_file(&self, name: &ModelName) -> SegNetResult<PathBuf> {
        let path = self.model_path(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SegNetError::PretrainedNotFound {
                name: name.to_string(),
                path,
            })
        }
    }

    /// Loads the parameters stored for `name` into `model`.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::PretrainedNotFound` if there is no file and
    /// `SegNetError::WeightLoadingFailed` if the record does not fit `model`.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model: M,
        name: &ModelName,
        device: &B::Device,
    ) -> SegNetResult<M> {
        let path = self.model_file(name)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        let model = model
            .load_file(path.clone(), &recorder, device)
            .map_err(|e| SegNetError::WeightLoadingFailed {
                reason: format!("{}: {e}", path.display()),
            })?;

        tracing::info!(model = %name, path = %path.display(), "loaded pretrained weights");
        Ok(model)
    }

    /// Stores the parameters of `model` under `name`, creating the root if needed.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::WeightSavingFailed` if the directory or file cannot be
    /// written.
    pub fn save<B: Backend, M: Module<B>>(&self, model: M, name: &ModelName) -> SegNetResult<PathBuf> {
        std::fs::create_dir_all(&self.root).map_err(|e| SegNetError::WeightSavingFailed {
            reason: format!("{}: {e}", self.root.display()),
        })?;

        let path = self.model_path(name);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .save_file(path.clone(), &recorder)
            .map_err(|e| SegNetError::WeightSavingFailed {
                reason: format!("{}: {e}", path.display()),
            })?;

        tracing::info!(model = %name, path = %path.display(), "saved weights");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in [
            "up_psp_resnet50_ade",
            "dpcan_resnet101_voc",
            "up_psp_resnet18_pcontext",
        ] {
            assert_eq!(ModelName::parse(name).unwrap().to_string(), name);
        }

        let name = ModelName::new(Architecture::UpPsp, BackboneKind::Resnet50, Dataset::PascalAug);
        assert_eq!(name.to_string(), "up_psp_resnet50_voc");
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert!(matches!(
            ModelName::parse("resnet50"),
            Err(SegNetError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            ModelName::parse("fcn_resnet50_ade"),
            Err(SegNetError::UnknownArchitecture { .. })
        ));
        assert!(matches!(
            ModelName::parse("up_psp_vgg16_ade"),
            Err(SegNetError::UnsupportedBackbone { .. })
        ));
        assert!(matches!(
            ModelName::parse("up_psp_resnet50_imagenet"),
            Err(SegNetError::UnknownDataset { .. })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let store = ModelStore::new(std::env::temp_dir().join("segnet-burn-empty-store"));
        let name = ModelName::parse("up_psp_resnet50_ade").unwrap();

        match store.model_file(&name) {
            Err(SegNetError::PretrainedNotFound { name, path }) => {
                assert_eq!(name, "up_psp_resnet50_ade");
                assert!(path.ends_with("up_psp_resnet50_ade.mpk"));
            }
            other => panic!("Expected PretrainedNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn default_root() {
        let store = ModelStore::default();
        assert!(store.root().ends_with(".encoding/models"));
    }

    #[test]
    fn store_root_without_home_is_relative() {
        let root = store_root(None);
        assert_eq!(root, Path::new(".encoding").join("models"));
        assert!(root.is_relative());

        assert_eq!(
            store_root(Some(PathBuf::from("/home/user"))),
            Path::new("/home/user/.encoding/models")
        );
    }
}
