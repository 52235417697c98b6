//! Configuration module.
//!
//! - `core`: configuration structures shared by every component
//! - `enums`: enumeration types used in configurations

pub mod core;
pub mod enums;

pub use core::{BackboneConfig, UpsampleConfig};
pub use enums::{Architecture, BackboneKind, UpsampleMode};
