//! # Dual-Path Class-Attention Network
//!
//! Two independently parametrized ASPP modules run over the deepest backbone feature.
//! The first path feeds two classifiers (a coarse and a gated prediction), the
//! concatenation of both paths feeds a per-class sigmoid attention and an ungated
//! "context-free" classifier. The main prediction is
//!
//! ```text
//! prediction = class_att * pred + coarse
//! ```
//!
//! so a saturated-off attention falls back to the coarse stream.

use backbones::{create_backbone, Backbone, BackboneWrapper};
use burn::{module::Ignored, prelude::*, tensor::activation::sigmoid};

use super::{
    modules::{
        utils::{check_batch, check_channels, resize},
        AsppConfig, AsppModule, Classifier, ClassifierConfig, FcnHead, FcnHeadConfig,
    },
    SegmentationOutput,
};
use crate::{
    config::{BackboneConfig, UpsampleConfig},
    error::{SegNetError, SegNetResult},
};

/// Combines the two prediction streams of the dual-path head.
///
/// `class_att * pred + coarse`, elementwise.
///
/// # Errors
///
/// Returns `SegNetError::ShapeMismatch` unless all three tensors share one shape; no
/// broadcasting takes place.
pub fn gate_prediction<B: Backend>(
    class_att: Tensor<B, 4>,
    pred: Tensor<B, 4>,
    coarse: Tensor<B, 4>,
) -> SegNetResult<Tensor<B, 4>> {
    let expected = coarse.dims();
    for actual in [class_att.dims(), pred.dims()] {
        if actual != expected {
            return Err(SegNetError::ShapeMismatch {
                operation: "gate_prediction",
                expected: format!("{expected:?}"),
                actual: format!("{actual:?}"),
            });
        }
    }

    Ok(class_att.mul(pred).add(coarse))
}

/// Configuration for the [`DualPathHead`].
#[derive(Config, Debug)]
pub struct DualPathHeadConfig {
    num_classes: usize,
    /// Channels of the deep feature map.
    #[config(default = "2048")]
    in_channels: usize,
    #[config(default = "[12, 24, 36]")]
    atrous_rates: [usize; 3],
    /// Dropout in front of every classifier.
    #[config(default = "0.1")]
    dropout: f64,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl DualPathHeadConfig {
    /// Initializes a new [`DualPathHead`].
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::InvalidConfiguration` for a zero class count or an invalid
    /// ASPP configuration.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<DualPathHead<B>> {
        if self.num_classes == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: "dual-path head needs at least one class".to_string(),
            });
        }

        let aspp = AsppConfig::new(self.in_channels)
            .with_atrous_rates(self.atrous_rates)
            .with_upsample(self.upsample.clone());
        let inter_channels = aspp.inter_channels();
        let classifier = |in_channels: usize| {
            ClassifierConfig::new([in_channels, self.num_classes])
                .with_dropout(self.dropout)
                .init(device)
        };

        Ok(DualPathHead {
            aspp1: aspp.init(device)?,
            aspp2: aspp.init(device)?,
            block1: classifier(inter_channels),
            block2: classifier(inter_channels),
            block3: classifier(2 * inter_channels),
            block4: classifier(2 * inter_channels),
        })
    }
}

/// Predictions of the [`DualPathHead`] at the resolution of the deep input.
#[derive(Debug, Clone)]
pub struct DualPathOutput<B: Backend> {
    /// Gated prediction, `class_att * pred + coarse`.
    pub prediction: Tensor<B, 4>,
    /// Ungated prediction from both paths.
    pub context_free: Tensor<B, 4>,
}

/// Dual-path class-attention head.
///
/// # Shapes
///   - x: `[batch_size, in_channels, height, width]`
///   - output: two maps of `[batch_size, num_classes, height, width]`
#[derive(Module, Debug)]
pub struct DualPathHead<B: Backend> {
    aspp1: AsppModule<B>,
    aspp2: AsppModule<B>,
    /// Coarse classifier on the first path.
    block1: Classifier<B>,
    /// Gated classifier on the first path.
    block2: Classifier<B>,
    /// Class attention on both paths.
    block3: Classifier<B>,
    /// Context-free classifier on both paths.
    block4: Classifier<B>,
}

impl<B: Backend> DualPathHead<B> {
    /// Runs both paths over `x`.
    ///
    /// `xl` is the shallow backbone feature. Only its batch size is checked, it does not
    /// contribute to the result.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if `x` has the wrong channel count or the
    /// batch sizes disagree.
    pub fn forward(&self, x: Tensor<B, 4>, xl: &Tensor<B, 4>) -> SegNetResult<DualPathOutput<B>> {
        check_batch("DualPathHead", &[&x, xl])?;

        let aspp1 = self.aspp1.forward(x.clone())?;
        let aspp2 = self.aspp2.forward(x)?;

        let concat = Tensor::cat(vec![aspp1.clone(), aspp2], 1);
        let class_att = sigmoid(self.block3.forward(concat.clone()));

        let coarse = self.block1.forward(aspp1.clone());
        let pred = self.block2.forward(aspp1);
        let prediction = gate_prediction(class_att, pred, coarse)?;

        let context_free = self.block4.forward(concat);

        Ok(DualPathOutput {
            prediction,
            context_free,
        })
    }
}

/// Configuration for the [`Dpcan`] model.
#[derive(Config, Debug)]
pub struct DpcanConfig {
    num_classes: usize,
    #[config(default = "BackboneConfig::new()")]
    backbone: BackboneConfig,
    /// Attach the auxiliary FCN head to the third backbone stage.
    #[config(default = "true")]
    aux: bool,
    #[config(default = "[12, 24, 36]")]
    atrous_rates: [usize; 3],
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl DpcanConfig {
    /// Initializes a `Dpcan` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any component rejects its configuration.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<Dpcan<B>> {
        self.upsample.validate()?;

        let backbone = create_backbone(
            self.backbone.backbone.backbone_type(),
            self.backbone.dilated,
            device,
        );
        let [_, _, c3, c4] = backbone.output_channels();

        let head = DualPathHeadConfig::new(self.num_classes)
            .with_in_channels(c4)
            .with_atrous_rates(self.atrous_rates)
            .with_upsample(self.upsample.clone())
            .init(device)?;
        let auxlayer = if self.aux {
            Some(FcnHeadConfig::new(c3, self.num_classes).init(device)?)
        } else {
            None
        };

        tracing::debug!(
            backbone = self.backbone.backbone.name(),
            dilated = self.backbone.dilated,
            num_classes = self.num_classes,
            aux = self.aux,
            "initialized dpcan"
        );

        Ok(Dpcan {
            backbone,
            head,
            auxlayer,
            upsample: Ignored(self.upsample.clone()),
        })
    }
}

/// Dual-path class-attention segmentation network.
#[derive(Module, Debug)]
pub struct Dpcan<B: Backend> {
    backbone: BackboneWrapper<B>,
    head: DualPathHead<B>,
    auxlayer: Option<FcnHead<B>>,
    upsample: Ignored<UpsampleConfig>,
}

impl<B: Backend> Dpcan<B> {
    /// Segments an RGB batch of shape `[batch_size, 3, height, width]`.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if the input is not a 3-channel image batch.
    pub fn forward(&self, image: Tensor<B, 4>) -> SegNetResult<SegmentationOutput<B>> {
        check_channels("Dpcan", &image, 3)?;
        let [_, _, h, w] = image.dims();

        let features = self.backbone.extract_features(image);
        self.forward_features(features, [h, w])
    }

    /// Runs the heads on precomputed backbone features and resizes every prediction to
    /// `size`.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if the features do not match the backbone.
    pub fn forward_features(
        &self,
        features: [Tensor<B, 4>; 4],
        size: [usize; 2],
    ) -> SegNetResult<SegmentationOutput<B>> {
        let [c1, _, c3, c4] = features;
        let upsample = &self.upsample.0;

        let DualPathOutput {
            prediction,
            context_free,
        } = self.head.forward(c4, &c1)?;

        let auxiliary = match &self.auxlayer {
            Some(auxlayer) => Some(resize(auxlayer.forward(c3)?, size, upsample)),
            None => None,
        };

        Ok(SegmentationOutput {
            prediction: resize(prediction, size, upsample),
            context_free: Some(resize(context_free, size, upsample)),
            auxiliary,
        })
    }

    /// Channel counts of the backbone features this model expects.
    pub fn feature_channels(&self) -> [usize; 4] {
        self.backbone.output_channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::BackboneKind, tests::TestBackend};
    use burn::tensor::Distribution;

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn zero_attention_yields_coarse_exactly() {
        let coarse = random([2, 5, 4, 4]);
        let pred = random([2, 5, 4, 4]);
        let class_att = Tensor::zeros([2, 5, 4, 4], &Default::default());

        let final_pred = gate_prediction(class_att, pred, coarse.clone()).unwrap();

        let diff: f32 = (final_pred - coarse).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn full_attention_adds_both_streams() {
        let coarse = random([1, 3, 2, 2]);
        let pred = random([1, 3, 2, 2]);
        let class_att = Tensor::ones([1, 3, 2, 2], &Default::default());

        let final_pred = gate_prediction(class_att, pred.clone(), coarse.clone()).unwrap();

        let diff: f32 = (final_pred - (pred + coarse)).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn gating_does_not_broadcast() {
        let coarse = random([2, 5, 4, 4]);
        let pred = random([2, 5, 4, 4]);

        let result = gate_prediction(random([2, 1, 4, 4]), pred, coarse.clone());
        assert!(matches!(result, Err(SegNetError::ShapeMismatch { .. })));

        let result = gate_prediction(random([2, 5, 4, 4]), random([2, 5, 1, 1]), coarse);
        assert!(matches!(result, Err(SegNetError::ShapeMismatch { .. })));
    }

    #[test]
    fn head_streams_are_wired_per_path() {
        let device = Default::default();
        let head = DualPathHeadConfig::new(4)
            .with_in_channels(32)
            .with_atrous_rates([1, 2, 3])
            .init::<TestBackend>(&device)
            .unwrap();

        let x = random([2, 32, 5, 6]);
        let output = head.forward(x.clone(), &random([2, 8, 20, 24])).unwrap();

        let aspp1 = head.aspp1.forward(x.clone()).unwrap();
        let aspp2 = head.aspp2.forward(x).unwrap();
        let aspp2_only = aspp2.clone();
        let concat = Tensor::cat(vec![aspp1.clone(), aspp2], 1);

        let class_att = sigmoid(head.block3.forward(concat.clone()));
        let coarse = head.block1.forward(aspp1.clone());
        let pred = head.block2.forward(aspp1);
        let expected = class_att * pred + coarse.clone();

        let error: f32 = (output.prediction - expected).abs().max().into_scalar();
        assert!(error < 1e-6);

        let error: f32 = (output.context_free - head.block4.forward(concat))
            .abs()
            .max()
            .into_scalar();
        assert!(error < 1e-6);

        // The paths are initialized independently, so reading the coarse stream off the
        // second path would be visible.
        let from_second = head.block1.forward(aspp2_only);
        let gap: f32 = (from_second - coarse).abs().max().into_scalar();
        assert!(gap > 1e-4);
    }

    #[test]
    fn head_predicts_at_deep_resolution() {
        let device = Default::default();
        let head = DualPathHeadConfig::new(6)
            .with_in_channels(64)
            .init::<TestBackend>(&device)
            .unwrap();

        let xl = random([2, 8, 24, 24]);
        let output = head.forward(random([2, 64, 6, 5]), &xl).unwrap();

        assert_eq!(output.prediction.dims(), [2, 6, 6, 5]);
        assert_eq!(output.context_free.dims(), [2, 6, 6, 5]);
    }

    #[test]
    fn head_rejects_mismatched_batches() {
        let device = Default::default();
        let head = DualPathHeadConfig::new(6)
            .with_in_channels(64)
            .init::<TestBackend>(&device)
            .unwrap();

        let result = head.forward(random([2, 64, 4, 4]), &random([1, 8, 16, 16]));
        assert!(matches!(result, Err(SegNetError::ShapeMismatch { .. })));

        let result = head.forward(random([1, 32, 4, 4]), &random([1, 8, 16, 16]));
        assert!(matches!(result, Err(SegNetError::ShapeMismatch { .. })));
    }

    #[test]
    fn model_outputs_match_image_size() {
        let device = Default::default();
        let model = DpcanConfig::new(4)
            .with_backbone(BackboneConfig::new().with_backbone(BackboneKind::Resnet18))
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(random([1, 3, 48, 40])).unwrap();

        assert_eq!(output.prediction.dims(), [1, 4, 48, 40]);
        assert_eq!(output.context_free.as_ref().map(Tensor::dims), Some([1, 4, 48, 40]));
        assert_eq!(output.auxiliary.as_ref().map(Tensor::dims), Some([1, 4, 48, 40]));
        assert_eq!(output.into_vec().len(), 3);
    }

    #[test]
    fn model_without_aux() {
        let device = Default::default();
        let model = DpcanConfig::new(3)
            .with_backbone(BackboneConfig::new().with_backbone(BackboneKind::Resnet18))
            .with_aux(false)
            .init::<TestBackend>(&device)
            .unwrap();

        let features = [
            random([1, 64, 8, 8]),
            random([1, 128, 4, 4]),
            random([1, 256, 4, 4]),
            random([1, 512, 4, 4]),
        ];
        let output = model.forward_features(features, [32, 32]).unwrap();

        assert!(output.auxiliary.is_none());
        assert_eq!(output.prediction.dims(), [1, 3, 32, 32]);
        assert_eq!(model.feature_channels(), [64, 128, 256, 512]);
    }
}
