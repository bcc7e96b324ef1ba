// Pacing orchestrator: control loop, statistics and pacing window
pub mod orchestrator;
pub mod pacing;
pub mod stats;

pub use orchestrator::{CycleOutcome, SkipReason, VolumeEngine};
pub use pacing::PacingWindow;
pub use stats::RunStats;

use crate::api::ExchangeError;
use std::fmt;
use thiserror::Error;

/// Lifecycle of a `VolumeEngine`; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Market data could not be read; the cycle is skipped
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MarketDataError {
    #[error("snapshot unavailable: {0}")]
    Snapshot(ExchangeError),

    #[error("balance unavailable: {0}")]
    Balance(ExchangeError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is {actual}, expected {expected}")]
    InvalidState {
        expected: EngineState,
        actual: EngineState,
    },

    #[error("startup failed: {0}")]
    Startup(String),
}
