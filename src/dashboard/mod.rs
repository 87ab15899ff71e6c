//! Dashboard UI Module
//!
//! A single-window egui front end for the scan pipeline: camera controls,
//! the live preview or captured picture, and the detected tire size.

pub mod app;
pub mod components;
pub mod state;
pub mod theme;
pub mod views;

pub use app::run_dashboard;
