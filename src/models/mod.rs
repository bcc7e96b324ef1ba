use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trajectory the target price follows across cycles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WalkDirection {
    Up,
    Down,
    Sideways,
    Random,
}

impl WalkDirection {
    pub const ALL: [WalkDirection; 4] = [
        WalkDirection::Up,
        WalkDirection::Down,
        WalkDirection::Sideways,
        WalkDirection::Random,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Some(WalkDirection::Up),
            "down" => Some(WalkDirection::Down),
            "sideways" => Some(WalkDirection::Sideways),
            "random" => Some(WalkDirection::Random),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WalkDirection::Up => "up",
            WalkDirection::Down => "down",
            WalkDirection::Sideways => "sideways",
            WalkDirection::Random => "random",
        }
    }
}

impl fmt::Display for WalkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top of book plus last trade, stamped when it was fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub bid: f64,
    pub ask: f64,
    pub bid_qty: f64,
    pub ask_qty: f64,
    pub last_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Relative spread: (ask - bid) / mid
    pub fn spread(&self) -> f64 {
        let mid = self.mid();
        if mid <= 0.0 {
            return f64::INFINITY;
        }
        (self.ask - self.bid) / mid
    }

    pub fn is_inverted(&self) -> bool {
        self.bid > self.ask
    }

    /// Liquidity resting at the thinner side of the top of book
    pub fn top_liquidity(&self) -> f64 {
        self.bid_qty.min(self.ask_qty)
    }
}

/// Free balances for the traded pair
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub base: f64,
    pub quote: f64,
}

impl Balance {
    /// Both legs valued in quote units at `price`
    pub fn total_in_quote(&self, price: f64) -> f64 {
        self.quote + self.base * price
    }
}

/// Exchange trading rules for a symbol
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SymbolRules {
    pub min_qty: f64,
    pub qty_step: f64,
    pub tick_size: f64,
    pub min_notional: f64,
}

impl SymbolRules {
    /// Round a quantity down to the lot step
    pub fn floor_qty(&self, qty: f64) -> f64 {
        floor_to_step(qty, self.qty_step)
    }

    /// Round a price to the nearest tick
    pub fn round_price(&self, price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        (price / self.tick_size).round() * self.tick_size
    }
}

fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    // Nudge by a tiny epsilon so 0.3 / 0.1 does not floor to 2
    ((value / step) + 1e-9).floor() * step
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Unknown,
}

impl OrderStatus {
    /// Still able to trade on the book
    pub fn is_live(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }
}

/// An order placed by this process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub key: u64,
    pub id: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub simulated: bool,
}

impl TrackedOrder {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}
