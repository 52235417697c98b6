//! # Pyramid pooling with local attention upsampling
//!
//! The deepest feature is reduced by a 3x3 conv and then lifted stage by stage onto the
//! grids of shallower backbone features with [`LocalUp`]. Each stage uses the
//! shallower feature as query and the next-deeper feature as key. The refined map goes
//! through a pyramid pooling module, a 3x3 fusion conv and a pixelwise classifier.

use backbones::{create_backbone, Backbone, BackboneWrapper};
use burn::{module::Ignored, prelude::*};

use super::{
    modules::{
        utils::{check_batch, check_channels, resize},
        Classifier, ClassifierConfig, ConvBnConfig, ConvBnRelu, FcnHead, FcnHeadConfig, LocalUp,
        LocalUpConfig, PyramidPooling, PyramidPoolingConfig,
    },
    SegmentationOutput,
};
use crate::{
    config::{BackboneConfig, UpsampleConfig},
    error::{SegNetError, SegNetResult},
};

/// Configuration for the [`UpPspHead`].
#[derive(Config, Debug)]
pub struct UpPspHeadConfig {
    num_classes: usize,
    /// Channels of `[c1, c2, c3, c4]`.
    #[config(default = "[256, 512, 1024, 2048]")]
    in_channels: [usize; 4],
    /// Also lift the output onto the grid of `c1`.
    #[config(default = "false")]
    refine_shallowest: bool,
    #[config(default = "vec![1, 2, 3, 6]")]
    bins: Vec<usize>,
    #[config(default = "0.1")]
    dropout: f64,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl UpPspHeadConfig {
    /// Initializes a new [`UpPspHead`].
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::InvalidConfiguration` for a zero class count, a deep feature
    /// narrower than 4 channels, or an invalid component configuration.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<UpPspHead<B>> {
        let [c1, c2, c3, c4] = self.in_channels;
        let inter_channels = c4 / 4;
        if inter_channels == 0 || self.num_classes == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "up_psp head needs a deep feature of at least 4 channels and one class, got {c4} and {}",
                    self.num_classes
                ),
            });
        }

        let local_up = |shallow: usize, coarse: usize| {
            LocalUpConfig::new(shallow, coarse)
                .with_upsample(self.upsample.clone())
                .init(device)
        };
        let psp_config = PyramidPoolingConfig::new(inter_channels, inter_channels)
            .with_bins(self.bins.clone())
            .with_upsample(self.upsample.clone());

        Ok(UpPspHead {
            conv5: ConvBnConfig::new([c4, inter_channels])
                .with_kernel_size(3)
                .with_padding(1)
                .init_relu(device),
            local_up4: local_up(c3, c4)?,
            local_up3: local_up(c2, c3)?,
            local_up2: if self.refine_shallowest {
                Some(local_up(c1, c2)?)
            } else {
                None
            },
            psp: psp_config.init(device)?,
            fuse: ConvBnConfig::new([psp_config.output_channels(), inter_channels])
                .with_kernel_size(3)
                .with_padding(1)
                .init_relu(device),
            conv6: ClassifierConfig::new([inter_channels, self.num_classes])
                .with_dropout(self.dropout)
                .init(device),
            in_channels: self.in_channels,
        })
    }
}

/// Local-attention upsampling head with pyramid pooling.
///
/// # Shapes
///   - features: `[c1, c2, c3, c4]` as produced by the backbone
///   - output: `[batch_size, num_classes, h2, w2]`, or `[.., h1, w1]` when the
///     shallowest refinement is enabled
#[derive(Module, Debug)]
pub struct UpPspHead<B: Backend> {
    conv5: ConvBnRelu<B>,
    local_up4: LocalUp<B>,
    local_up3: LocalUp<B>,
    local_up2: Option<LocalUp<B>>,
    psp: PyramidPooling<B>,
    fuse: ConvBnRelu<B>,
    conv6: Classifier<B>,
    in_channels: [usize; 4],
}

impl<B: Backend> UpPspHead<B> {
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if a feature has an unexpected channel count or
    /// the batch sizes disagree.
    pub fn forward(&self, features: [Tensor<B, 4>; 4]) -> SegNetResult<Tensor<B, 4>> {
        let [c1, c2, c3, c4] = features;
        check_batch("UpPspHead", &[&c1, &c2, &c3, &c4])?;
        check_channels("UpPspHead", &c4, self.in_channels[3])?;

        let out = self.conv5.forward(c4.clone());
        let out = self.local_up4.forward(c3.clone(), c4, out)?;
        let mut out = self.local_up3.forward(c2.clone(), c3, out)?;
        if let Some(local_up2) = &self.local_up2 {
            out = local_up2.forward(c1, c2, out)?;
        }

        let out = self.psp.forward(out)?;
        let out = self.fuse.forward(out);

        Ok(self.conv6.forward(out))
    }
}

/// Configuration for the [`UpPsp`] model.
#[derive(Config, Debug)]
pub struct UpPspConfig {
    num_classes: usize,
    #[config(default = "BackboneConfig::new()")]
    backbone: BackboneConfig,
    #[config(default = "true")]
    aux: bool,
    #[config(default = "false")]
    refine_shallowest: bool,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl UpPspConfig {
    /// Initializes an `UpPsp` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any component rejects its configuration.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<UpPsp<B>> {
        self.upsample.validate()?;

        let backbone = create_backbone(
            self.backbone.backbone.backbone_type(),
            self.backbone.dilated,
            device,
        );
        let channels = backbone.output_channels();

        let head = UpPspHeadConfig::new(self.num_classes)
            .with_in_channels(channels)
            .with_refine_shallowest(self.refine_shallowest)
            .with_upsample(self.upsample.clone())
            .init(device)?;
        let auxlayer = if self.aux {
            Some(FcnHeadConfig::new(channels[2], self.num_classes).init(device)?)
        } else {
            None
        };

        tracing::debug!(
            backbone = self.backbone.backbone.name(),
            dilated = self.backbone.dilated,
            num_classes = self.num_classes,
            aux = self.aux,
            refine_shallowest = self.refine_shallowest,
            "initialized up_psp"
        );

        Ok(UpPsp {
            backbone,
            head,
            auxlayer,
            upsample: Ignored(self.upsample.clone()),
        })
    }
}

/// Pyramid pooling network with local attention upsampling.
#[derive(Module, Debug)]
pub struct UpPsp<B: Backend> {
    backbone: BackboneWrapper<B>,
    head: UpPspHead<B>,
    auxlayer: Option<FcnHead<B>>,
    upsample: Ignored<UpsampleConfig>,
}

impl<B: Backend> UpPsp<B> {
    /// Segments an RGB batch of shape `[batch_size, 3, height, width]`.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if the input is not a 3-channel image batch.
    pub fn forward(&self, image: Tensor<B, 4>) -> SegNetResult<SegmentationOutput<B>> {
        check_channels("UpPsp", &image, 3)?;
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
        let upsample = &self.upsample.0;
        let c3 = features[2].clone();

        let prediction = resize(self.head.forward(features)?, size, upsample);
        let auxiliary = match &self.auxlayer {
            Some(auxlayer) => Some(resize(auxlayer.forward(c3)?, size, upsample)),
            None => None,
        };

        Ok(SegmentationOutput {
            prediction,
            context_free: None,
            auxiliary,
        })
    }

    /// Channel counts of the backbone features this model expects.
    pub fn feature_channels(&self) -> [usize; 4] {
        self.backbone.output_channels()
    }
}
