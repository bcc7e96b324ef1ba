// Market health checks gating every trading cycle
pub mod safety;

pub use safety::{SafetyGate, SafetyTrip};
