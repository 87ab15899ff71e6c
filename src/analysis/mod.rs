//! Analysis Layer
//!
//! Turns recognized text into structured results. Currently the only
//! analyzer is the tire-size code extractor.

pub mod tire_size;

pub use tire_size::{extract, TireDimensions, TireSize};
