//! Model constructors keyed by dataset and backbone.
//!
//! The class count always comes from the [`Dataset`] registry. Pretrained parameters are
//! read from a [`ModelStore`]; `dpcan` has no published parameter set.

use burn::prelude::*;

use super::{Dpcan, DpcanConfig, SegmentationOutput, UpPsp, UpPspConfig};
use crate::{
    config::{Architecture, BackboneConfig, BackboneKind},
    datasets::Dataset,
    error::{SegNetError, SegNetResult},
    model_store::{ModelName, ModelStore},
};

/// Either segmentation architecture, for callers that pick one at runtime.
#[derive(Module, Debug)]
pub enum SegmentationModel<B: Backend> {
    Dpcan(Dpcan<B>),
    UpPsp(UpPsp<B>),
}

impl<B: Backend> SegmentationModel<B> {
    pub fn architecture(&self) -> Architecture {
        match self {
            Self::Dpcan(_) => Architecture::Dpcan,
            Self::UpPsp(_) => Architecture::UpPsp,
        }
    }

    /// See [`Dpcan::forward`] and [`UpPsp::forward`].
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if the input is not a 3-channel image batch.
    pub fn forward(&self, image: Tensor<B, 4>) -> SegNetResult<SegmentationOutput<B>> {
        match self {
            Self::Dpcan(model) => model.forward(image),
            Self::UpPsp(model) => model.forward(image),
        }
    }

    /// See [`Dpcan::forward_features`] and [`UpPsp::forward_features`].
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if the features do not match the backbone.
    pub fn forward_features(
        &self,
        features: [Tensor<B, 4>; 4],
        size: [usize; 2],
    ) -> SegNetResult<SegmentationOutput<B>> {
        match self {
            Self::Dpcan(model) => model.forward_features(features, size),
            Self::UpPsp(model) => model.forward_features(features, size),
        }
    }

    pub fn feature_channels(&self) -> [usize; 4] {
        match self {
            Self::Dpcan(model) => model.feature_channels(),
            Self::UpPsp(model) => model.feature_channels(),
        }
    }
}

/// Builds a `dpcan` model for `dataset`.
///
/// # Errors
///
/// Returns `SegNetError::UnknownDataset` for an unregistered dataset and
/// `SegNetError::NotImplemented` when `pretrained` is requested.
pub fn get_dpcan<B: Backend>(
    dataset: &str,
    backbone: BackboneKind,
    pretrained: bool,
    device: &Device<B>,
) -> SegNetResult<Dpcan<B>> {
    let dataset = Dataset::from_name(dataset)?;
    if pretrained {
        return Err(SegNetError::NotImplemented {
            feature: format!(
                "pretrained weights for {}",
                ModelName::new(Architecture::Dpcan, backbone, dataset)
            ),
        });
    }

    DpcanConfig::new(dataset.num_classes())
        .with_backbone(BackboneConfig::new().with_backbone(backbone))
        .init(device)
}

/// Builds an `up_psp` model for `dataset`, optionally with stored parameters.
///
/// # Errors
///
/// Returns `SegNetError::UnknownDataset` for an unregistered dataset and the store's
/// errors when `pretrained` is requested.
pub fn get_up_psp<B: Backend>(
    dataset: &str,
    backbone: BackboneKind,
    pretrained: bool,
    store: &ModelStore,
    device: &Device<B>,
) -> SegNetResult<UpPsp<B>> {
    let dataset = Dataset::from_name(dataset)?;
    let name = ModelName::new(Architecture::UpPsp, backbone.clone(), dataset);
    if pretrained {
        store.model_file(&name)?;
    }

    let model = UpPspConfig::new(dataset.num_classes())
        .with_backbone(BackboneConfig::new().with_backbone(backbone))
        .init(device)?;

    if pretrained {
        store.load(model, &name, device)
    } else {
        Ok(model)
    }
}

/// `up_psp` with a ResNet-50 backbone for ADE20K.
///
/// # Errors
///
/// See [`get_up_psp`].
pub fn get_up_psp_resnet50_ade<B: Backend>(
    pretrained: bool,
    store: &ModelStore,
    device: &Device<B>,
) -> SegNetResult<UpPsp<B>> {
    get_up_psp("ade20k", BackboneKind::Resnet50, pretrained, store, device)
}

/// Builds the model a store name such as `up_psp_resnet50_ade` refers to.
///
/// # Errors
///
/// Returns the parse error for malformed names, and the errors of [`get_dpcan`] and
/// [`get_up_psp`].
pub fn get_segmentation_model<B: Backend>(
    name: &str,
    pretrained: bool,
    store: &ModelStore,
    device: &Device<B>,
) -> SegNetResult<SegmentationModel<B>> {
    let ModelName {
        architecture,
        backbone,
        dataset,
    } = ModelName::parse(name)?;

    match architecture {
        Architecture::Dpcan => {
            get_dpcan(dataset.name(), backbone, pretrained, device).map(SegmentationModel::Dpcan)
        }
        Architecture::UpPsp => get_up_psp(dataset.name(), backbone, pretrained, store, device)
            .map(SegmentationModel::UpPsp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn pretrained_dpcan_is_not_implemented() {
        let device = Default::default();
        let result = get_dpcan::<TestBackend>("pascal_voc", BackboneKind::Resnet18, true, &device);

        match result {
            Err(SegNetError::NotImplemented { feature }) => {
                assert!(feature.contains("dpcan_resnet18_voc"));
            }
            other => panic!("Expected NotImplemented error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dataset_fails_before_construction() {
        let device = Default::default();
        let store = ModelStore::default();

        assert!(matches!(
            get_up_psp::<TestBackend>("imagenet", BackboneKind::Resnet18, false, &store, &device),
            Err(SegNetError::UnknownDataset { .. })
        ));
    }

    #[test]
    fn missing_pretrained_up_psp_is_reported() {
        let device = Default::default();
        let store = ModelStore::new(std::env::temp_dir().join("segnet-burn-no-weights"));

        let result = get_segmentation_model::<TestBackend>(
            "up_psp_resnet18_citys",
            true,
            &store,
            &device,
        );

        assert!(matches!(
            result,
            Err(SegNetError::PretrainedNotFound { .. })
        ));
    }

    #[test]
    fn missing_weights_fail_before_backbone_init() {
        let device = Default::default();
        let store = ModelStore::new(std::env::temp_dir().join("segnet-burn-no-weights"));

        let result =
            get_up_psp::<TestBackend>("ade20k", BackboneKind::Resnet152, true, &store, &device);

        match result {
            Err(SegNetError::PretrainedNotFound { name, .. }) => {
                assert_eq!(name, "up_psp_resnet152_ade");
            }
            other => panic!("Expected PretrainedNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn model_from_name() {
        let device = Default::default();
        let store = ModelStore::default();

        let model =
            get_segmentation_model::<TestBackend>("dpcan_resnet18_minc", false, &store, &device)
                .unwrap();

        assert_eq!(model.architecture(), Architecture::Dpcan);
        assert_eq!(model.feature_channels(), [64, 128, 256, 512]);

        let image = Tensor::zeros([1, 3, 32, 32], &device);
        let output = model.forward(image).unwrap();
        assert_eq!(output.prediction.dims(), [1, 23, 32, 32]);
    }
}
