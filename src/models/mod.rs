//! Wire models

pub mod analyze;

pub use analyze::*;
