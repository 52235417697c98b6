//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used in deep learning but are not
//! yet available in the core Burn framework.

mod neighborhood;

pub use neighborhood::{NeighborhoodConfig, NeighborhoodExt};
