//! Dashboard views

pub mod scanner;

pub use scanner::render_scanner_view;
