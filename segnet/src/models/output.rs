use burn::prelude::*;

/// Full-resolution maps produced by a segmentation model.
///
/// Every map has shape `[batch_size, num_classes, height, width]` where `height` and
/// `width` are those of the input image.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// Main prediction.
    pub prediction: Tensor<B, 4>,
    /// Ungated prediction of the dual-path head, used as an extra training target.
    pub context_free: Option<Tensor<B, 4>>,
    /// Auxiliary FCN prediction on the third backbone stage.
    pub auxiliary: Option<Tensor<B, 4>>,
}

impl<B: Backend> SegmentationOutput<B> {
    /// Flattens the output in loss order: main, context-free, auxiliary.
    pub fn into_vec(self) -> Vec<Tensor<B, 4>> {
        let mut outputs = vec![self.prediction];
        outputs.extend(self.context_free);
        outputs.extend(self.auxiliary);
        outputs
    }
}
