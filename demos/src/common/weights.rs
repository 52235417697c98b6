//! Import of PyTorch-Encoding checkpoints.
//!
//! PyTorch state dicts name parameters after `nn.Sequential` indices
//! (`head.aspp1.b1.3.weight`); the Burn modules name them after their fields
//! (`head.aspp1.b1.atrous.conv.weight`). The tables below translate one into the other.
//! BatchNorm `weight`/`bias` become `gamma`/`beta` inside the PyTorch recorder.

use std::path::Path;

use anyhow::{bail, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder, RecorderError},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use segnet_burn::{Architecture, ModelName, SegmentationModel};

const BACKBONE_REMAPS: &[(&str, &str)] = &[
    (r"^pretrained\.conv1\.(.+)", "backbone.conv1_block.conv1.$1"),
    (r"^pretrained\.bn1\.(.+)", "backbone.conv1_block.bn1.$1"),
    (
        r"^pretrained\.layer([1-4])\.([0-9]+)\.downsample\.0\.(.+)",
        "backbone.layer$1.blocks.$2.downsample.conv.$3",
    ),
    (
        r"^pretrained\.layer([1-4])\.([0-9]+)\.downsample\.1\.(.+)",
        "backbone.layer$1.blocks.$2.downsample.bn.$3",
    ),
    (
        r"^pretrained\.layer([1-4])\.([0-9]+)\.(.+)",
        "backbone.layer$1.blocks.$2.$3",
    ),
];

const AUX_REMAPS: &[(&str, &str)] = &[
    (r"^auxlayer\.conv5\.0\.(.+)", "auxlayer.block.conv.$1"),
    (r"^auxlayer\.conv5\.1\.(.+)", "auxlayer.block.bn.$1"),
    (r"^auxlayer\.conv5\.4\.(.+)", "auxlayer.classifier.conv.$1"),
];

const DPCAN_REMAPS: &[(&str, &str)] = &[
    (
        r"^head\.(aspp[12])\.(b0|project)\.0\.(.+)",
        "head.$1.$2.conv.$3",
    ),
    (r"^head\.(aspp[12])\.(b0|project)\.1\.(.+)", "head.$1.$2.bn.$3"),
    (
        r"^head\.(aspp[12])\.(b[1-3])\.0\.(.+)",
        "head.$1.$2.reduce.conv.$3",
    ),
    (
        r"^head\.(aspp[12])\.(b[1-3])\.1\.(.+)",
        "head.$1.$2.reduce.bn.$3",
    ),
    (
        r"^head\.(aspp[12])\.(b[1-3])\.3\.(.+)",
        "head.$1.$2.atrous.conv.$3",
    ),
    (
        r"^head\.(aspp[12])\.(b[1-3])\.4\.(.+)",
        "head.$1.$2.atrous.bn.$3",
    ),
    (r"^head\.(aspp[12])\.b4\.gap\.1\.(.+)", "head.$1.b4.block.conv.$2"),
    (r"^head\.(aspp[12])\.b4\.gap\.2\.(.+)", "head.$1.b4.block.bn.$2"),
    (r"^head\.(block[1-4])\.1\.(.+)", "head.$1.conv.$2"),
];

const UP_PSP_REMAPS: &[(&str, &str)] = &[
    (r"^head\.conv5\.0\.(.+)", "head.conv5.conv.$1"),
    (r"^head\.conv5\.1\.(.+)", "head.conv5.bn.$1"),
    (
        r"^head\.localUp([2-4])\.refine\.0\.(.+)",
        "head.local_up$1.shallow_key.conv.$2",
    ),
    (
        r"^head\.localUp([2-4])\.refine\.1\.(.+)",
        "head.local_up$1.shallow_key.bn.$2",
    ),
    (
        r"^head\.localUp([2-4])\.refine2\.0\.(.+)",
        "head.local_up$1.coarse_key.conv.$2",
    ),
    (
        r"^head\.localUp([2-4])\.refine2\.1\.(.+)",
        "head.local_up$1.coarse_key.bn.$2",
    ),
    (r"^head\.psp\.0\.conv1\.0\.(.+)", "head.psp.branches.0.block.conv.$1"),
    (r"^head\.psp\.0\.conv1\.1\.(.+)", "head.psp.branches.0.block.bn.$1"),
    (r"^head\.psp\.0\.conv2\.0\.(.+)", "head.psp.branches.1.block.conv.$1"),
    (r"^head\.psp\.0\.conv2\.1\.(.+)", "head.psp.branches.1.block.bn.$1"),
    (r"^head\.psp\.0\.conv3\.0\.(.+)", "head.psp.branches.2.block.conv.$1"),
    (r"^head\.psp\.0\.conv3\.1\.(.+)", "head.psp.branches.2.block.bn.$1"),
    (r"^head\.psp\.0\.conv4\.0\.(.+)", "head.psp.branches.3.block.conv.$1"),
    (r"^head\.psp\.0\.conv4\.1\.(.+)", "head.psp.branches.3.block.bn.$1"),
    (r"^head\.psp\.1\.(.+)", "head.fuse.conv.$1"),
    (r"^head\.psp\.2\.(.+)", "head.fuse.bn.$1"),
    (r"^head\.conv6\.1\.(.+)", "head.conv6.conv.$1"),
];

/// Key remaps for a checkpoint of the given architecture, in application order.
pub fn pytorch_key_remaps(architecture: &Architecture) -> Vec<(&'static str, &'static str)> {
    let head = match architecture {
        Architecture::Dpcan => DPCAN_REMAPS,
        Architecture::UpPsp => UP_PSP_REMAPS,
    };

    [BACKBONE_REMAPS, AUX_REMAPS, head].concat()
}

/// Checks that a converted `name` could later be loaded with `pretrained = true`.
///
/// # Errors
///
/// `dpcan` has no published parameter set and its factory never reads the store, so
/// converting one is refused.
pub fn ensure_convertible(name: &ModelName) -> Result<()> {
    if name.architecture == Architecture::Dpcan {
        bail!("{name}: dpcan weights are never loaded from the model store");
    }
    Ok(())
}

/// Loads a PyTorch checkpoint (`.pth`) into `model`.
///
/// Keys without a counterpart in the Burn module, such as the classifier of the
/// ImageNet backbone, are ignored.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a tensor does not fit the model.
pub fn import_pytorch<B: Backend>(
    model: SegmentationModel<B>,
    path: &Path,
    device: &B::Device,
) -> Result<SegmentationModel<B>> {
    let args = pytorch_key_remaps(&model.architecture())
        .into_iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });
    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    let load_error = |e: RecorderError| anyhow::anyhow!("PyTorch record loading failed: {e}");

    let model = match model {
        SegmentationModel::Dpcan(model) => {
            let record = recorder.load(args, device).map_err(load_error)?;
            SegmentationModel::Dpcan(model.load_record(record))
        }
        SegmentationModel::UpPsp(model) => {
            let record = recorder.load(args, device).map_err(load_error)?;
            SegmentationModel::UpPsp(model.load_record(record))
        }
    };

    tracing::info!(path = %path.display(), "imported PyTorch checkpoint");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn remap(architecture: &Architecture, key: &str) -> String {
        pytorch_key_remaps(architecture)
            .into_iter()
            .fold(key.to_string(), |name, (pattern, replacement)| {
                Regex::new(pattern)
                    .unwrap()
                    .replace_all(&name, replacement)
                    .into_owned()
            })
    }

    #[test]
    fn only_loadable_architectures_convert() {
        let up_psp = ModelName::parse("up_psp_resnet50_ade").unwrap();
        assert!(ensure_convertible(&up_psp).is_ok());

        let dpcan = ModelName::parse("dpcan_resnet101_pcontext").unwrap();
        let error = ensure_convertible(&dpcan).unwrap_err();
        assert!(error.to_string().contains("dpcan_resnet101_pcontext"));
    }

    #[test]
    fn backbone_keys() {
        let arch = Architecture::UpPsp;
        assert_eq!(
            remap(&arch, "pretrained.conv1.weight"),
            "backbone.conv1_block.conv1.weight"
        );
        assert_eq!(
            remap(&arch, "pretrained.layer3.12.downsample.1.running_var"),
            "backbone.layer3.blocks.12.downsample.bn.running_var"
        );
        assert_eq!(
            remap(&arch, "pretrained.layer4.2.conv3.weight"),
            "backbone.layer4.blocks.2.conv3.weight"
        );
    }

    #[test]
    fn dpcan_head_keys() {
        let arch = Architecture::Dpcan;
        assert_eq!(
            remap(&arch, "head.aspp2.b3.3.weight"),
            "head.aspp2.b3.atrous.conv.weight"
        );
        assert_eq!(
            remap(&arch, "head.aspp1.b4.gap.2.running_mean"),
            "head.aspp1.b4.block.bn.running_mean"
        );
        assert_eq!(
            remap(&arch, "head.aspp1.project.1.bias"),
            "head.aspp1.project.bn.bias"
        );
        assert_eq!(remap(&arch, "head.block3.1.bias"), "head.block3.conv.bias");
        assert_eq!(
            remap(&arch, "auxlayer.conv5.4.weight"),
            "auxlayer.classifier.conv.weight"
        );
    }

    #[test]
    fn up_psp_head_keys() {
        let arch = Architecture::UpPsp;
        assert_eq!(
            remap(&arch, "head.localUp4.refine2.1.weight"),
            "head.local_up4.coarse_key.bn.weight"
        );
        assert_eq!(
            remap(&arch, "head.localUp3.refine.0.weight"),
            "head.local_up3.shallow_key.conv.weight"
        );
        assert_eq!(
            remap(&arch, "head.psp.0.conv4.0.weight"),
            "head.psp.branches.3.block.conv.weight"
        );
        assert_eq!(remap(&arch, "head.psp.2.running_mean"), "head.fuse.bn.running_mean");
        assert_eq!(remap(&arch, "head.conv6.1.weight"), "head.conv6.conv.weight");
    }
}
