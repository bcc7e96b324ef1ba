// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod execution;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{Exchange, ExchangeError};
pub use engine::{CycleOutcome, EngineState, VolumeEngine};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
