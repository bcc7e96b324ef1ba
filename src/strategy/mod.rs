// Price strategy module
pub mod price;

pub use price::{PriceDecision, PriceStrategy};
