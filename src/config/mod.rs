// Configuration loading and validation
pub mod validator;

pub use validator::{validate, ConfigurationError, Settings};

use crate::models::WalkDirection;
use serde::Deserialize;
use std::path::Path;

// Defaults carried over from the original bot
pub const DEFAULT_TARGET_VOLUME_PER_HOUR: f64 = 100.0;
pub const DEFAULT_MAX_PRICE_DEVIATION: f64 = 0.01;
pub const DEFAULT_ORDER_FREQUENCY_SECS: f64 = 60.0;
pub const DEFAULT_MIN_ORDER_RATIO: f64 = 0.001;
pub const DEFAULT_MAX_ORDER_RATIO: f64 = 0.005;
pub const DEFAULT_SIZE_RANDOMIZATION: f64 = 0.3;
pub const DEFAULT_TIMING_RANDOMIZATION: f64 = 0.5;
pub const DEFAULT_BURST_PROBABILITY: f64 = 0.05;
pub const DEFAULT_QUIET_PROBABILITY: f64 = 0.15;
pub const DEFAULT_MIN_ORDER_VALUE: f64 = 5.0;
pub const DEFAULT_MAX_SPREAD_THRESHOLD: f64 = 0.05;
pub const DEFAULT_PACING_WINDOW_SECS: u64 = 3600;
pub const DEFAULT_MAX_OPEN_ORDERS: usize = 1;

pub const DEFAULT_BASE_ASSET: &str = "ETH";
pub const DEFAULT_QUOTE_ASSET: &str = "USDT";

/// Hard ceilings no configuration can raise
pub const MAX_PRICE_DEVIATION_CEILING: f64 = 0.2;
pub const MAX_SPREAD_CEILING: f64 = 0.05;
pub const MAX_ORDER_FREQUENCY_SECS: f64 = 86_400.0;
pub const MIN_PACING_WINDOW_SECS: u64 = 60;
pub const MAX_PACING_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Raw key/value bundle as read from the environment or a config file.
///
/// Every field is an optional string so that validation can report every
/// malformed value at once instead of failing on the first parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub exchange: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub trading_pair: Option<String>,
    pub base_asset: Option<String>,
    pub quote_asset: Option<String>,
    pub sandbox_mode: Option<String>,
    pub dry_run: Option<String>,
    pub cancel_previous_orders: Option<String>,
    #[serde(alias = "target_volume_usdt_per_hour")]
    pub target_volume_per_hour: Option<String>,
    pub price_walk_direction: Option<String>,
    pub max_price_deviation: Option<String>,
    pub order_frequency: Option<String>,
    pub min_order_ratio: Option<String>,
    pub max_order_ratio: Option<String>,
    pub size_randomization: Option<String>,
    pub timing_randomization: Option<String>,
    pub burst_probability: Option<String>,
    pub quiet_probability: Option<String>,
    #[serde(alias = "min_order_value_usdt")]
    pub min_order_value: Option<String>,
    pub max_spread_threshold: Option<String>,
    pub pacing_window_secs: Option<String>,
    pub max_open_orders: Option<String>,
    pub rng_seed: Option<String>,
}

impl RawConfig {
    /// Read the bundle from an optional file, overridden by process environment.
    ///
    /// `.env` should already be loaded (dotenvy) by the caller.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| ConfigurationError::single(format!("failed to read configuration: {}", e)))?;

        settings
            .try_deserialize::<RawConfig>()
            .map_err(|e| ConfigurationError::single(format!("failed to parse configuration: {}", e)))
    }
}

/// Exchange venue to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Binance,
    /// In-process venue, never touches the network
    Simulated,
}

impl ExchangeKind {
    pub const SUPPORTED: [&'static str; 2] = ["binance", "simulated"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "binance" => Some(ExchangeKind::Binance),
            "simulated" | "sim" | "paper" => Some(ExchangeKind::Simulated),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExchangeKind::Binance => "binance",
            ExchangeKind::Simulated => "simulated",
        }
    }
}

/// Connection settings for the exchange collaborator
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub kind: ExchangeKind,
    pub api_key: String,
    pub api_secret: String,
    pub trading_pair: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub sandbox: bool,
}

impl ExchangeSettings {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            kind: ExchangeKind::Simulated,
            api_key: String::new(),
            api_secret: String::new(),
            trading_pair: format!("{}/{}", DEFAULT_BASE_ASSET, DEFAULT_QUOTE_ASSET),
            base_asset: DEFAULT_BASE_ASSET.to_string(),
            quote_asset: DEFAULT_QUOTE_ASSET.to_string(),
            sandbox: false,
        }
    }
}

/// Validated strategy configuration. Downstream code trusts these values.
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub target_volume_per_hour: f64,
    pub price_walk_direction: WalkDirection,
    pub max_price_deviation: f64,
    pub order_frequency_secs: f64,
    pub min_order_ratio: f64,
    pub max_order_ratio: f64,
    pub cancel_previous_orders: bool,
    pub dry_run: bool,
    pub size_randomization: f64,
    pub timing_randomization: f64,
    pub burst_probability: f64,
    pub quiet_probability: f64,
    pub min_order_value: f64,
    pub max_spread_threshold: f64,
    pub pacing_window_secs: u64,
    pub max_open_orders: usize,
    pub rng_seed: Option<u64>,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            target_volume_per_hour: DEFAULT_TARGET_VOLUME_PER_HOUR,
            price_walk_direction: WalkDirection::Sideways,
            max_price_deviation: DEFAULT_MAX_PRICE_DEVIATION,
            order_frequency_secs: DEFAULT_ORDER_FREQUENCY_SECS,
            min_order_ratio: DEFAULT_MIN_ORDER_RATIO,
            max_order_ratio: DEFAULT_MAX_ORDER_RATIO,
            cancel_previous_orders: true,
            dry_run: true,
            size_randomization: DEFAULT_SIZE_RANDOMIZATION,
            timing_randomization: DEFAULT_TIMING_RANDOMIZATION,
            burst_probability: DEFAULT_BURST_PROBABILITY,
            quiet_probability: DEFAULT_QUIET_PROBABILITY,
            min_order_value: DEFAULT_MIN_ORDER_VALUE,
            max_spread_threshold: DEFAULT_MAX_SPREAD_THRESHOLD,
            pacing_window_secs: DEFAULT_PACING_WINDOW_SECS,
            max_open_orders: DEFAULT_MAX_OPEN_ORDERS,
            rng_seed: None,
        }
    }
}

impl VolumeConfig {
    /// Volume target for one pacing window, in quote units
    pub fn window_target(&self) -> f64 {
        self.target_volume_per_hour * self.pacing_window_secs as f64 / 3600.0
    }

    /// Effective spread ceiling: the configured threshold, never above 5%
    pub fn spread_ceiling(&self) -> f64 {
        self.max_spread_threshold.min(MAX_SPREAD_CEILING)
    }

    pub fn log_summary(&self) {
        tracing::info!("\n📊 Configuration:");
        tracing::info!("  Target Volume: {:.2}/hour", self.target_volume_per_hour);
        tracing::info!("  Price Walk: {}", self.price_walk_direction);
        tracing::info!("  Max Deviation: {:.2}%", self.max_price_deviation * 100.0);
        tracing::info!("  Order Frequency: {}s", self.order_frequency_secs);
        tracing::info!(
            "  Order Ratio: {:.4} - {:.4} of balance",
            self.min_order_ratio,
            self.max_order_ratio
        );
        tracing::info!(
            "  Cancel Previous Orders: {}",
            if self.cancel_previous_orders { "enabled" } else { "disabled" }
        );
        tracing::info!("  Dry Run: {}", if self.dry_run { "✅" } else { "❌" });
    }
}
