//! Sliding-window neighborhood extraction.
//!
//! Burn exposes `unfold4d`, which flattens every sliding window into a column. This
//! module wraps it so callers get one `k * k` neighborhood per output position, laid out
//! as `[batch, channels, k * k, positions]`. Tap order follows PyTorch's `unfold`:
//! row-major inside the window, positions row-major over the output grid.

use burn::{
    prelude::*,
    tensor::{module::unfold4d, ops::UnfoldOptions},
};

/// Geometry of a square sliding window.
#[derive(Config, Debug)]
pub struct NeighborhoodConfig {
    /// Side length of the window.
    #[config(default = "3")]
    pub kernel_size: usize,
    /// Spacing between window taps.
    #[config(default = "1")]
    pub dilation: usize,
    /// Zero padding added on every side.
    #[config(default = "0")]
    pub padding: usize,
    /// Step between window centers.
    #[config(default = "1")]
    pub stride: usize,
}

impl NeighborhoodConfig {
    /// Number of taps in one window.
    #[must_use]
    pub const fn taps(&self) -> usize {
        self.kernel_size * self.kernel_size
    }

    /// Spatial size of the grid of window positions for an input of `size`.
    #[must_use]
    pub fn output_size(&self, size: [usize; 2]) -> [usize; 2] {
        let span = self.dilation * (self.kernel_size.saturating_sub(1)) + 1;
        size.map(|extent| {
            let padded = extent + 2 * self.padding;
            if padded < span || self.stride == 0 {
                0
            } else {
                (padded - span) / self.stride + 1
            }
        })
    }

    /// Whether the window yields exactly one position per input pixel.
    #[must_use]
    pub const fn preserves_grid(&self) -> bool {
        self.kernel_size > 0
            && self.stride == 1
            && 2 * self.padding == self.dilation * (self.kernel_size - 1)
    }

    /// Extracts every window of `x`.
    ///
    /// # Shapes
    ///   - input: `[batch_size, channels, height, width]`
    ///   - output: `[batch_size, channels, kernel_size * kernel_size, out_h * out_w]`
    pub fn extract<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = x.dims();
        let [out_h, out_w] = self.output_size([h, w]);
        let k = self.kernel_size;

        let options = UnfoldOptions::new(
            [self.stride, self.stride],
            [self.padding, self.padding],
            [self.dilation, self.dilation],
        );

        unfold4d(x, [k, k], options).reshape([n, c, k * k, out_h * out_w])
    }
}

/// Neighborhood extraction as a tensor method.
pub trait NeighborhoodExt<B: Backend> {
    /// See [`NeighborhoodConfig::extract`].
    fn neighborhoods(self, config: &NeighborhoodConfig) -> Tensor<B, 4>;
}

impl<B: Backend> NeighborhoodExt<B> for Tensor<B, 4> {
    fn neighborhoods(self, config: &NeighborhoodConfig) -> Tensor<B, 4> {
        config.extract(self)
    }
}
