//! Pyramid Pooling Module (PSPNet).
//!
//! Each branch average-pools the input onto a fixed grid, projects it with a 1x1 conv
//! and resamples it back. The branches are concatenated after the untouched input.

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

/// Configuration for [`PyramidPooling`].
#[derive(Config, Debug)]
pub struct PyramidPoolingConfig {
    in_channels: usize,
    /// Width of each pooled branch.
    out_channels: usize,
    /// Side length of the pooling grid of each branch.
    #[config(default = "vec![1, 2, 3, 6]")]
    bins: Vec<usize>,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl PyramidPoolingConfig {
    /// Channel count of the concatenated output.
    #[must_use]
    pub fn output_channels(&self) -> usize {
        self.in_channels + self.bins.len() * self.out_channels
    }

    /// Initializes a new [`PyramidPooling`] module.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::InvalidConfiguration` for empty or zero bins and a zero
    /// branch width.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<PyramidPooling<B>> {
        self.upsample.validate()?;

        if self.bins.is_empty() || self.bins.contains(&0) {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "pyramid pooling bins must be non-empty and positive, got {:?}",
                    self.bins
                ),
            });
        }
        if self.out_channels == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: "pyramid pooling branches need at least one channel".to_string(),
            });
        }

        let branches = self
            .bins
            .iter()
            .map(|&bin| PoolBranch {
                pool: AdaptiveAvgPool2dConfig::new([bin, bin]).init(),
                block: ConvBnConfig::new([self.in_channels, self.out_channels]).init_relu(device),
            })
            .collect();

        Ok(PyramidPooling {
            branches,
            in_channels: self.in_channels,
            upsample: Ignored(self.upsample.clone()),
        })
    }
}

#[derive(Module, Debug)]
pub struct PoolBranch<B: Backend> {
    pool: AdaptiveAvgPool2d,
    block: ConvBnRelu<B>,
}

impl<B: Backend> PoolBranch<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.pool.forward(x);
        self.block.forward(x)
    }
}

/// Pyramid Pooling Module.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, in_channels + bins * out_channels, height, width]`
#[derive(Module, Debug)]
pub struct PyramidPooling<B: Backend> {
    branches: Vec<PoolBranch<B>>,
    in_channels: usize,
    upsample: Ignored<UpsampleConfig>,
}

impl<B: Backend> PyramidPooling<B> {
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if `x` does not have `in_channels` channels.
    pub fn forward(&self, x: Tensor<B, 4>) -> SegNetResult<Tensor<B, 4>> {
        check_channels("PyramidPooling", &x, self.in_channels)?;
        let [_, _, h, w] = x.dims();

        let mut features = Vec::with_capacity(self.branches.len() + 1);
        for branch in &self.branches {
            features.push(resize(branch.forward(x.clone()), [h, w], &self.upsample.0));
        }
        features.insert(0, x);

        Ok(Tensor::cat(features, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn concatenates_after_input() {
        let device = Default::default();
        let config = PyramidPoolingConfig::new(16, 4);
        let ppm = config.init::<TestBackend>(&device).unwrap();
        let x = Tensor::random([1, 16, 20, 20], Distribution::Normal(0.0, 1.0), &device);

        let y = ppm.forward(x.clone()).unwrap();
        assert_eq!(y.dims(), [1, 16 + 4 * 4, 20, 20]);
        assert_eq!(config.output_channels(), 32);

        let passthrough = y.slice([0..1, 0..16, 0..20, 0..20]);
        let diff: f32 = (passthrough - x).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn small_input_below_largest_bin() {
        let device = Default::default();
        let ppm = PyramidPoolingConfig::new(8, 2)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::random([2, 8, 4, 5], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(ppm.forward(x).unwrap().dims(), [2, 16, 4, 5]);
    }

    #[test]
    fn invalid_bins_are_rejected() {
        let device = Default::default();
        let empty = PyramidPoolingConfig::new(8, 2)
            .with_bins(vec![])
            .init::<TestBackend>(&device);
        assert!(matches!(
            empty,
            Err(SegNetError::InvalidConfiguration { .. })
        ));

        let zero = PyramidPoolingConfig::new(8, 2)
            .with_bins(vec![1, 0])
            .init::<TestBackend>(&device);
        assert!(zero.is_err());
    }

    #[test]
    fn custom_bins_change_width() {
        let device = Default::default();
        let ppm = PyramidPoolingConfig::new(8, 3)
            .with_bins(vec![1, 4])
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::random([1, 8, 8, 8], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(ppm.forward(x).unwrap().dims(), [1, 14, 8, 8]);
    }
}
