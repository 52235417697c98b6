use burn::{
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::{
    config::{UpsampleConfig, UpsampleMode},
    error::{SegNetError, SegNetResult},
};

/// Resamples `tensor` to `size` under the given interpolation policy.
///
/// Tensors that already have the target size are returned untouched.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, size[0], size[1]]`
pub fn resize<B: Backend>(
    tensor: Tensor<B, 4>,
    size: [usize; 2],
    config: &UpsampleConfig,
) -> Tensor<B, 4> {
    let [_, _, h, w] = tensor.dims();
    if [h, w] == size {
        return tensor;
    }

    let mode = match config.mode {
        UpsampleMode::Bilinear => InterpolateMode::Bilinear,
        UpsampleMode::Nearest => InterpolateMode::Nearest,
    };

    interpolate(tensor, size, InterpolateOptions::new(mode))
}

/// Resamples `tensor` to the spatial size of `target`.
pub fn resize_like<B: Backend>(
    tensor: Tensor<B, 4>,
    target: &Tensor<B, 4>,
    config: &UpsampleConfig,
) -> Tensor<B, 4> {
    let [_, _, h, w] = target.dims();
    resize(tensor, [h, w], config)
}

pub(crate) fn check_channels<B: Backend>(
    operation: &'static str,
    tensor: &Tensor<B, 4>,
    expected: usize,
) -> SegNetResult<()> {
    let dims = tensor.dims();
    if dims[1] == expected {
        Ok(())
    } else {
        Err(SegNetError::ShapeMismatch {
            operation,
            expected: format!("{expected} channels"),
            actual: format!("{dims:?}"),
        })
    }
}

pub(crate) fn check_batch<B: Backend>(
    operation: &'static str,
    tensors: &[&Tensor<B, 4>],
) -> SegNetResult<()> {
    let Some((first, rest)) = tensors.split_first() else {
        return Ok(());
    };
    let batch = first.dims()[0];

    match rest.iter().find(|tensor| tensor.dims()[0] != batch) {
        None => Ok(()),
        Some(tensor) => Err(SegNetError::ShapeMismatch {
            operation,
            expected: format!("batch size {batch}"),
            actual: format!("{:?}", tensor.dims()),
        }),
    }
}
