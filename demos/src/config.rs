//! JSON run configurations for the command line tools.
//!
//! Every field has a default, so a config file only needs the keys it changes.

use std::path::PathBuf;

use segnet_burn::ModelStore;
use serde::{Deserialize, Serialize};

/// Where stored models live. `None` means `~/.encoding/models`.
fn store_from(root: Option<&PathBuf>) -> ModelStore {
    root.map_or_else(ModelStore::default, ModelStore::new)
}

/// Configuration for the `forward` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Model-store name, e.g. `up_psp_resnet50_ade`.
    pub model: String,
    /// Load the stored parameters instead of random initialization.
    pub pretrained: bool,
    /// Root of the model store.
    pub store_root: Option<PathBuf>,
    /// Number of images in the synthetic batch.
    pub batch_size: usize,
    /// `[height, width]` of the synthetic batch.
    pub image_size: [usize; 2],
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            model: "up_psp_resnet50_ade".to_string(),
            pretrained: false,
            store_root: None,
            batch_size: 1,
            image_size: [480, 480],
        }
    }
}

impl ForwardConfig {
    pub fn store(&self) -> ModelStore {
        store_from(self.store_root.as_ref())
    }
}

/// Configuration for the `converter` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// PyTorch checkpoint (`.pth`).
    pub input_path: PathBuf,
    /// Model-store name the checkpoint belongs to.
    pub model: String,
    /// Root of the model store the converted parameters are written to.
    pub store_root: Option<PathBuf>,
    /// Overwrite an existing stored model.
    pub force: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("up_psp_resnet50_ade.pth"),
            model: "up_psp_resnet50_ade".to_string(),
            store_root: None,
            force: false,
        }
    }
}

impl ConverterConfig {
    pub fn store(&self) -> ModelStore {
        store_from(self.store_root.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config: ForwardConfig =
            serde_json::from_str(r#"{ "model": "dpcan_resnet101_voc", "batch_size": 2 }"#).unwrap();

        assert_eq!(config.model, "dpcan_resnet101_voc");
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.image_size, [480, 480]);
        assert!(!config.pretrained);
    }

    #[test]
    fn store_root_override() {
        let config: ConverterConfig =
            serde_json::from_str(r#"{ "store_root": "/tmp/models" }"#).unwrap();

        assert_eq!(config.store().root(), std::path::Path::new("/tmp/models"));
        assert_eq!(ConverterConfig::default().store(), ModelStore::default());
    }
}
