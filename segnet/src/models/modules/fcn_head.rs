//! Auxiliary FCN head.

use burn::prelude::*;

use super::{
    conv::{Classifier, ClassifierConfig, ConvBnConfig, ConvBnRelu},
    utils::check_channels,
};
use crate::error::{SegNetError, SegNetResult};

/// Configuration for [`FcnHead`].
#[derive(Config, Debug)]
pub struct FcnHeadConfig {
    in_channels: usize,
    num_classes: usize,
    #[config(default = "0.1")]
    dropout: f64,
}

impl FcnHeadConfig {
    /// Initializes a new [`FcnHead`].
    ///
    /// # Errors
    ///
    /// Returns `SegNetError::InvalidConfiguration` if the hidden width `in_channels / 4`
    /// or the class count is zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SegNetResult<FcnHead<B>> {
        let inter_channels = self.in_channels / 4;
        if inter_channels == 0 || self.num_classes == 0 {
            return Err(SegNetError::InvalidConfiguration {
                reason: format!(
                    "FCN head needs at least 4 input channels and one class, got {} and {}",
                    self.in_channels, self.num_classes
                ),
            });
        }

        Ok(FcnHead {
            block: ConvBnConfig::new([self.in_channels, inter_channels])
                .with_kernel_size(3)
                .with_padding(1)
                .init_relu(device),
            classifier: ClassifierConfig::new([inter_channels, self.num_classes])
                .with_dropout(self.dropout)
                .init(device),
            in_channels: self.in_channels,
        })
    }
}

/// `3x3 conv → BN → ReLU → Dropout → 1x1 conv`, used as an auxiliary classifier.
#[derive(Module, Debug)]
pub struct FcnHead<B: Backend> {
    block: ConvBnRelu<B>,
    classifier: Classifier<B>,
    in_channels: usize,
}

impl<B: Backend> FcnHead<B> {
    /// # Errors
    ///
    /// Returns `SegNetError::ShapeMismatch` if `x` does not have `in_channels` channels.
    pub fn forward(&self, x: Tensor<B, 4>) -> SegNetResult<Tensor<B, 4>> {
        check_channels("FcnHead", &x, self.in_channels)?;
        let x = self.block.forward(x);
        Ok(self.classifier.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn predicts_classes_at_input_resolution() {
        let device = Default::default();
        let head = FcnHeadConfig::new(32, 7)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::random([2, 32, 5, 6], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(head.forward(x).unwrap().dims(), [2, 7, 5, 6]);
    }

    #[test]
    fn too_narrow_input_is_rejected() {
        let device = Default::default();
        assert!(FcnHeadConfig::new(3, 7).init::<TestBackend>(&device).is_err());
    }
}
