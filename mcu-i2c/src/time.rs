//! # Time units

/// Hertz
pub type Hertz = fugit::HertzU32;
