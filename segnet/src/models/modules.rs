//! Building blocks shared by the segmentation heads.

mod aspp;
mod conv;
mod fcn_head;
mod local_up;
mod pyramid_pooling;
pub mod utils;

pub use aspp::*;
pub use conv::*;
pub use fcn_head::*;
pub use local_up::*;
pub use pyramid_pooling::*;
