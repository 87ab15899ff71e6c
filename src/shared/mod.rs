//! Shared state and messaging between dashboard and pipeline driver
//!
//! This module provides thread-safe shared state and the command type
//! the dashboard uses to drive the scan pipeline.

pub mod messages;
pub mod state;

pub use messages::UiCommand;
pub use state::SharedAppState;
