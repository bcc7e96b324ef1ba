// Exchange collaborators
pub mod binance;
pub mod simulated;

pub use binance::BinanceClient;
pub use simulated::{SimulatedExchange, SimulatedExchangeConfig};

use crate::models::{Balance, MarketSnapshot, OrderStatus, Side, SymbolRules};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExchangeError {
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ExchangeError {
    /// Worth retrying on a later cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Network(_) | ExchangeError::RateLimited(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExchangeError::InvalidResponse(e.to_string())
        } else {
            ExchangeError::Network(e.to_string())
        }
    }
}

/// Order-entry and market-data interface of a spot exchange.
///
/// `symbol` is always the `BASE/QUOTE` pair; adapters translate it to
/// their own notation.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Venue name for logs
    fn name(&self) -> &str;

    /// Best bid/ask and last trade price
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ExchangeError>;

    /// Free balance of both legs of the pair
    async fn balance(&self, symbol: &str) -> Result<Balance, ExchangeError>;

    /// Lot size, tick size and minimum notional
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError>;

    /// Place a limit order, returning the exchange-assigned id
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<String, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError>;

    /// Ids of orders still resting on the book
    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<String>, ExchangeError>;

    async fn order_status(&self, symbol: &str, order_id: &str)
        -> Result<OrderStatus, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Network("timeout".into()).is_transient());
        assert!(ExchangeError::RateLimited("429".into()).is_transient());
        assert!(!ExchangeError::Rejected("bad price".into()).is_transient());
        assert!(!ExchangeError::InsufficientBalance("no funds".into()).is_transient());
        assert!(!ExchangeError::OrderNotFound("42".into()).is_transient());
    }
}
