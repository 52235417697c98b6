//! Shared plumbing for the command line tools.

pub mod backend;
pub mod weights;

pub use backend::{create_device, SelectedBackend, SelectedDevice, BACKEND_NAME};
pub use weights::{ensure_convertible, import_pytorch, pytorch_key_remaps};

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
