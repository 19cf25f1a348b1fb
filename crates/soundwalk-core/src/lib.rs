//! Soundwalk Core - real-time block-based audio mixing engine

pub mod config;
pub mod engine;
pub mod error;
pub mod types;

pub use types::*;
