//! Reusable UI components for the dashboard

pub mod status_card;

pub use status_card::StatusCard;
