//! Local attention upsampling.
//!
//! A coarse prediction is lifted onto the grid of a shallower backbone feature. Every
//! shallow pixel attends over a small dilated window of the (upsampled) coarse feature,
//! and the same attention weights mix the corresponding window of the running output.

use burn::{module::Ignored, prelude::*, tensor::activation::softmax};
use burn_extra_ops::{NeighborhoodConfig, NeighborhoodExt};

use super::{
    conv::{ConvBn, ConvBnConfig},
    utils::{check_batch, check_channels, resize},
};
use crate::{
    config::UpsampleConfig,
    error::{SegNetError, SegNetResult},
};

/// Configuration for [`LocalUp`].
#[derive(Config, Debug)]
pub struct LocalUpConfig {
    /// Channels of the shallow (high resolution) feature.
    shallow_channels: usize,
    /// Channels of the coarse (low resolution) feature.
    coarse_channels: usize,
    /// The shared key width is `shallow_channels / key_reduction`.
    #[config(default = "8")]
    key_reduction: usize,
    /// Attention window around each pixel.
    #[config(default = "NeighborhoodConfig::new().with_dilation(2).with_padding(2)")]
    window: NeighborhoodConfig,
    #[config(default = "UpsampleConfig::new()")]
    upsample: UpsampleConfig,
}

impl LocalUpConfig {
    fn key_channels(&self) -> usize {
        self.shallow_channels
            .checked_div(self.key_reduction)
            .unwrap_or(0)
    }

    /// Initializes a new [`LocalUp`] module.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::InvalidConfiguration` if the key width would be zero or the
    /// window does not yield one position per pixel.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<LocalUp<B>> {
        self.upsample.validate()?;

        let key_channels = self.key_channels();
        if key_channels == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "key width is zero for {} shallow channels and reduction {}",
                    self.shallow_channels, self.key_reduction
                ),
            });
        }
        if !self.window.preserves_grid() {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "attention window must keep the grid (stride 1, 2 * padding == dilation * (kernel - 1)), got {:?}",
                    self.window
                ),
            });
        }

        Ok(LocalUp {
            shallow_key: ConvBnConfig::new([self.shallow_channels, key_channels]).init(device),
            coarse_key: ConvBnConfig::new([self.coarse_channels, key_channels]).init(device),
            shallow_channels: self.shallow_channels,
            coarse_channels: self.coarse_channels,
            window: Ignored(self.window.clone()),
            upsample: Ignored(self.upsample.clone()),
        })
    }
}

/// Local attention upsampling.
///
/// # Shapes
///   - shallow: `[batch_size, shallow_channels, height, width]`
///   - coarse: `[batch_size, coarse_channels, h2, w2]`
///   - out: `[batch_size, channels, h3, w3]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct LocalUp<B: Backend> {
    shallow_key: ConvBn<B>,
    coarse_key: ConvBn<B>,
    shallow_channels: usize,
    coarse_channels: usize,
    window: Ignored<NeighborhoodConfig>,
    upsample: Ignored<UpsampleConfig>,
}

impl<B: Backend> LocalUp<B> {
    /// Attention of each shallow pixel over its coarse neighborhood.
    ///
    /// Returns `[batch_size, height * width, 1, taps]`, normalized over the last axis.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` on unexpected channel counts or batch sizes.
    pub fn attention(
        &self,
        shallow: Tensor<B, 4>,
        coarse: Tensor<B, 4>,
    ) -> SegNetResult<Tensor<B, 4>> {
        check_channels("LocalUp (shallow)", &shallow, self.shallow_channels)?;
        check_channels("LocalUp (coarse)", &coarse, self.coarse_channels)?;
        check_batch("LocalUp", &[&shallow, &coarse])?;

        let [n, _, h, w] = shallow.dims();

        let query = self.shallow_key.forward(shallow);
        let coarse = resize(coarse, [h, w], &self.upsample.0);
        let key = self.coarse_key.forward(coarse);
        let [_, d, _, _] = key.dims();

        let key_patches = key.neighborhoods(&self.window.0); // n, d, k*k, h*w
        let query = query.reshape([n, d, 1, h * w]).permute([0, 3, 2, 1]);

        let energy = query.matmul(key_patches.permute([0, 3, 1, 2])); // n, h*w, 1, k*k

        Ok(softmax(energy, 3))
    }

    /// Lifts `out` onto the grid of `shallow`.
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` on unexpected channel counts or batch sizes.
    pub fn forward(
        &self,
        shallow: Tensor<B, 4>,
        coarse: Tensor<B, 4>,
        out: Tensor<B, 4>,
    ) -> SegNetResult<Tensor<B, 4>> {
        check_batch("LocalUp", &[&shallow, &out])?;
        let [n, _, h, w] = shallow.dims();
        let [_, c, _, _] = out.dims();

        let att = self.attention(shallow, coarse)?;

        let out = resize(out, [h, w], &self.upsample.0);
        let out_patches = out.neighborhoods(&self.window.0); // n, c, k*k, h*w

        let refined = att
            .matmul(out_patches.permute([0, 3, 2, 1])) // n, h*w, 1, c
            .permute([0, 3, 2, 1])
            .reshape([n, c, h, w]);

        Ok(refined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::Distribution;

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn output_follows_shallow_grid() {
        let device = Default::default();
        let local_up = LocalUpConfig::new(16, 32)
            .init::<TestBackend>(&device)
            .unwrap();

        for (coarse, out) in [([4, 4], [4, 4]), ([7, 5], [2, 3]), ([12, 9], [12, 9])] {
            let y = local_up
                .forward(
                    random([2, 16, 12, 9]),
                    random([2, 32, coarse[0], coarse[1]]),
                    random([2, 5, out[0], out[1]]),
                )
                .unwrap();

            assert_eq!(y.dims(), [2, 5, 12, 9]);
        }
    }

    #[test]
    fn attention_is_normalized() {
        let device = Default::default();
        let local_up = LocalUpConfig::new(16, 8)
            .init::<TestBackend>(&device)
            .unwrap();

        let att = local_up
            .attention(random([2, 16, 6, 7]), random([2, 8, 3, 4]))
            .unwrap();
        assert_eq!(att.dims(), [2, 42, 1, 9]);

        let error: f32 = (att.sum_dim(3) - 1.0).abs().max().into_scalar();
        assert!(error < 1e-5);
    }

    #[test]
    fn constant_output_is_preserved_inside() {
        let device = Default::default();
        let local_up = LocalUpConfig::new(8, 8)
            .init::<TestBackend>(&device)
            .unwrap();

        let out = Tensor::<TestBackend, 4>::ones([1, 3, 9, 9], &device);
        let y = local_up
            .forward(random([1, 8, 9, 9]), random([1, 8, 9, 9]), out)
            .unwrap();

        // Away from the zero-padded border every tap reads 1.
        let center = y.slice([0..1, 0..3, 2..7, 2..7]);
        let error: f32 = (center - 1.0).abs().max().into_scalar();
        assert!(error < 1e-5);
    }

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn matches_explicit_window_sum() {
        let device = Default::default();
        let (n, c, h, w) = (2, 3, 5, 6);
        let local_up = LocalUpConfig::new(16, 8)
            .init::<TestBackend>(&device)
            .unwrap();

        let shallow = random([n, 16, h, w]);
        let coarse = random([n, 8, h, w]);
        let out = random([n, c, h, w]);

        let actual = values(
            local_up
                .forward(shallow.clone(), coarse.clone(), out.clone())
                .unwrap(),
        );

        let query = values(local_up.shallow_key.forward(shallow));
        let key = values(local_up.coarse_key.forward(coarse));
        let out = values(out);
        let d = 16 / 8;
        let at = |channels: usize, b: usize, ch: usize, y: usize, x: usize| {
            ((b * channels + ch) * h + y) * w + x
        };

        let mut max_error = 0.0f32;
        for b in 0..n {
            for y in 0..h {
                for x in 0..w {
                    // 3x3 window with dilation 2; taps outside the grid read zero.
                    let taps: Vec<Option<(usize, usize)>> = (0..9)
                        .map(|tap| {
                            let sy = y as isize + 2 * (tap / 3) as isize - 2;
                            let sx = x as isize + 2 * (tap % 3) as isize - 2;
                            ((0..h as isize).contains(&sy) && (0..w as isize).contains(&sx))
                                .then(|| (sy as usize, sx as usize))
                        })
                        .collect();

                    let energy: Vec<f32> = taps
                        .iter()
                        .map(|tap| match tap {
                            Some((sy, sx)) => (0..d)
                                .map(|k| query[at(d, b, k, y, x)] * key[at(d, b, k, *sy, *sx)])
                                .sum(),
                            None => 0.0,
                        })
                        .collect();
                    let peak = energy.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    let exp: Vec<f32> = energy.iter().map(|e| (e - peak).exp()).collect();
                    let total: f32 = exp.iter().sum();

                    for ch in 0..c {
                        let expected: f32 = taps
                            .iter()
                            .zip(&exp)
                            .map(|(tap, weight)| match tap {
                                Some((sy, sx)) => weight / total * out[at(c, b, ch, *sy, *sx)],
                                None => 0.0,
                            })
                            .sum();
                        let error = (actual[at(c, b, ch, y, x)] - expected).abs();
                        max_error = max_error.max(error);
                    }
                }
            }
        }

        assert!(max_error < 1e-4, "max error {max_error}");
    }

    #[test]
    fn window_must_keep_grid() {
        let device = Default::default();
        let result = LocalUpConfig::new(16, 32)
            .with_window(NeighborhoodConfig::new().with_dilation(2).with_padding(1))
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(SegNetError::InvalidConfiguration { .. })
        ));

        let no_key = LocalUpConfig::new(4, 32).init::<TestBackend>(&device);
        assert!(no_key.is_err());
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let device = Default::default();
        let local_up = LocalUpConfig::new(16, 32)
            .init::<TestBackend>(&device)
            .unwrap();

        let wrong_channels =
            local_up.forward(random([1, 16, 8, 8]), random([1, 16, 4, 4]), random([1, 2, 4, 4]));
        assert!(matches!(
            wrong_channels,
            Err(SegNetError::ShapeMismatch { .. })
        ));

        let wrong_batch =
            local_up.forward(random([1, 16, 8, 8]), random([1, 32, 4, 4]), random([2, 2, 4, 4]));
        assert!(matches!(
            wrong_batch,
            Err(SegNetError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn reference_scale() {
        let device = Default::default();
        let local_up = LocalUpConfig::new(256, 512)
            .init::<TestBackend>(&device)
            .unwrap();

        let y = local_up
            .forward(
                random([1, 256, 65, 65]),
                random([1, 512, 33, 33]),
                random([1, 4, 33, 33]),
            )
            .unwrap();

        assert_eq!(y.dims(), [1, 4, 65, 65]);
    }
}
