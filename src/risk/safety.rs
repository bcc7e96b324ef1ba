use crate::config::VolumeConfig;
use crate::models::MarketSnapshot;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// A snapshot older than this is not traded on
pub const DEFAULT_MAX_SNAPSHOT_AGE_SECS: i64 = 30;

/// Safety gate that keeps the bot from trading into an unhealthy book
#[derive(Debug, Clone)]
pub struct SafetyGate {
    pub max_spread: f64,
    pub max_snapshot_age: Duration,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self {
            max_spread: crate::config::MAX_SPREAD_CEILING,
            max_snapshot_age: Duration::seconds(DEFAULT_MAX_SNAPSHOT_AGE_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SafetyTrip {
    #[error("invalid prices: bid={bid} ask={ask}")]
    InvalidPrices { bid: f64, ask: f64 },

    #[error("inverted book: bid {bid} > ask {ask}")]
    InvertedBook { bid: f64, ask: f64 },

    #[error("spread {:.2}% exceeds ceiling {:.2}%", .spread * 100.0, .ceiling * 100.0)]
    SpreadTooWide { spread: f64, ceiling: f64 },

    #[error("snapshot is {age_secs}s old")]
    StaleSnapshot { age_secs: i64 },

    #[error("price tick {tick} leaves no valid price in [{lower}, {upper}]")]
    TickWiderThanBand { tick: f64, lower: f64, upper: f64 },
}

impl SafetyGate {
    pub fn from_config(config: &VolumeConfig) -> Self {
        Self {
            max_spread: config.spread_ceiling(),
            ..Default::default()
        }
    }

    /// Book-shape checks only: prices sane, not inverted, spread within ceiling
    pub fn check_book(&self, snapshot: &MarketSnapshot) -> Result<(), SafetyTrip> {
        let (bid, ask) = (snapshot.bid, snapshot.ask);

        if !bid.is_finite() || !ask.is_finite() || bid <= 0.0 || ask <= 0.0 {
            return Err(SafetyTrip::InvalidPrices { bid, ask });
        }

        if snapshot.is_inverted() {
            return Err(SafetyTrip::InvertedBook { bid, ask });
        }

        let spread = snapshot.spread();
        if spread > self.max_spread {
            return Err(SafetyTrip::SpreadTooWide {
                spread,
                ceiling: self.max_spread,
            });
        }

        Ok(())
    }

    /// Full gate: book shape plus freshness relative to `now`
    pub fn check(&self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Result<(), SafetyTrip> {
        self.check_book(snapshot)?;

        let age = now - snapshot.timestamp;
        if age > self.max_snapshot_age {
            return Err(SafetyTrip::StaleSnapshot {
                age_secs: age.num_seconds(),
            });
        }

        Ok(())
    }
}
