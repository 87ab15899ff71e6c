//! Scan Pipeline
//!
//! Coordinates camera session, capture, recognition and extraction.
//! [`state`] holds the pure state machine; [`driver`] runs it against the
//! real collaborators.

pub mod driver;
pub mod state;

pub use driver::PipelineDriver;
pub use state::{ErrorKind, PipelineSnapshot, PipelineState};
