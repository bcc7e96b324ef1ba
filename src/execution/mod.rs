// Order sizing and order lifecycle
pub mod order_manager;
pub mod sizer;

pub use order_manager::{CancelReport, OrderError, OrderManager, OrderPolicy, PolicyOutcome};
pub use sizer::{OrderSizer, SizeDecision};
