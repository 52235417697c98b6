//! Atrous Spatial Pyramid Pooling (ASPP).
//!
//! Five parallel branches look at the same feature map at different scales: a 1x1
//! projection, three bottlenecked dilated 3x3 convolutions and a global pooling branch.
//! Their concatenation is fused back to `inter_channels` by a 1x1 projection.

use burn::{
    module::Ignored,
    nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    prelude::*,
};

use super::{
    conv::{ConvBnConfig, ConvBnRelu},
    utils::{check_channels, resize},
};
use crate::{
    config::UpsampleConfig,
    error::{SegNetError, SegNetResult},
};

/// Dilated branch: 1x1 bottleneck projection, then a 3x3 atrous convolution.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, out_channels, height, width]`
#[derive(Module, Debug)]
pub struct AsppConv<B: Backend> {
    reduce: ConvBnRelu<B>,
    atrous: ConvBnRelu<B>,
}

impl<B: Backend> AsppConv<B> {
    fn new(
        in_channels: usize,
        bottleneck_channels: usize,
        out_channels: usize,
        rate: usize,
        device: &Device<B>,
    ) -> Self {
        let reduce = ConvBnConfig::new([in_channels, bottleneck_channels]).init_relu(device);
        let atrous = ConvBnConfig::new([bottleneck_channels, out_channels])
            .with_kernel_size(3)
            .with_padding(rate)
            .with_dilation(rate)
            .init_relu(device);

        Self { reduce, atrous }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.reduce.forward(x);
        self.atrous.forward(x)
    }
}

/// Global average pooling branch. The caller broadcasts the `1x1` result back.
#[derive(Module, Debug)]
pub struct AsppPooling<B: Backend> {
    pool: AdaptiveAvgPool2d,
    block: ConvBnRelu<B>,
}

impl<B: Backend> AsppPooling<B> {
    fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            block: ConvBnConfig::new([in_channels, out_channels]).init_relu(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.pool.forward(x);
        self.block.forward(x)
    }
}

/// Configuration for the [`AsppModule`].
#[derive(Config, Debug)]
pub struct AsppConfig {
    /// Number of input channels.
    in_channels: usize,
    /// Width of every branch and of the output. Defaults to `in_channels / 4`.
    #[config(default = "None")]
    inter_channels: Option<usize>,
    /// Dilation rates of the three atrous branches.
    #[config(default = "[12, 24, 36]")]
    atrous_rates: [usize; 3],
    /// Width of the 1x1 projection in front of each atrous convolution.
    #[config(default = "512")]
    bottleneck_channels: usize,
    /// Interpolation policy for broadcasting the pooled branch.
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl AsppConfig {
    /// Output channel count of the module.
    #[must_use]
    pub fn inter_channels(&self) -> usize {
        self.inter_channels.unwrap_or(self.in_channels / 4)
    }

    fn validate(&self) -> SegNetResult<()> {
        self.upsample.validate()?;

        if self.inter_channels() == 0 || self.bottleneck_channels == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "ASPP needs non-zero widths, got inter {} and bottleneck {} for {} input channels",
                    self.inter_channels(),
                    self.bottleneck_channels,
                    self.in_channels
                ),
            });
        }

        let [r1, r2, r3] = self.atrous_rates;
        if r1 == 0 || r2 == 0 || r3 == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!("atrous rates must be positive, got {:?}", self.atrous_rates),
            });
        }
        if r1 == r2 || r2 == r3 || r1 == r3 {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!("atrous rates must be distinct, got {:?}", self.atrous_rates),
            });
        }

        Ok(())
    }

    /// Initializes a new [`AsppModule`].
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::InvalidConfiguration` for zero widths or repeated/zero rates,
    /// and `SegNetError::UnsupportedInterpolation` for an unusable upsampling policy.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<AsppModule<B>> {
        self.validate()?;

        let inter_channels = self.inter_channels();

        let b0 = ConvBnConfig::new([self.in_channels, inter_channels]).init_relu(device);
        let [b1, b2, b3] = self.atrous_rates.map(|rate| {
            AsppConv::new(
                self.in_channels,
                self.bottleneck_channels,
                inter_channels,
                rate,
                device,
            )
        });
        let b4 = AsppPooling::new(self.in_channels, inter_channels, device);
        let project = ConvBnConfig::new([5 * inter_channels, inter_channels]).init_relu(device);

        Ok(AsppModule {
            b0,
            b1,
            b2,
            b3,
            b4,
            project,
            in_channels: self.in_channels,
            upsample: Ignored(self.upsample.clone()),
        })
    }
}

/// Atrous Spatial Pyramid Pooling module.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, inter_channels, height, width]`
#[derive(Module, Debug)]
pub struct AsppModule<B: Backend> {
    b0: ConvBnRelu<B>,
    b1: AsppConv<B>,
    b2: AsppConv<B>,
    b3: AsppConv<B>,
    b4: AsppPooling<B>,
    project: ConvBnRelu<B>,
    in_channels: usize,
    upsample: Ignored<UpsampleConfig>,
}

impl<B: Backend> AsppModule<B> {
    /// Forward pass through the five branches and the fusion projection.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if `x` does not have `in_channels` channels.
    pub fn forward(&self, x: Tensor<B, 4>) -> SegNetResult<Tensor<B, 4>> {
        check_channels("ASPP", &x, self.in_channels)?;
        let [_, _, h, w] = x.dims();

        let feat0 = self.b0.forward(x.clone());
        let feat1 = self.b1.forward(x.clone());
        let feat2 = self.b2.forward(x.clone());
        let feat3 = self.b3.forward(x.clone());
        let feat4 = resize(self.b4.forward(x), [h, w], &self.upsample.0);

        let y = Tensor::cat(vec![feat0, feat1, feat2, feat3, feat4], 1);

        Ok(self.project.forward(y))
    }
}
