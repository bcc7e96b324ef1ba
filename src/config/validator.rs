use super::*;
use thiserror::Error;

const PLACEHOLDER_API_KEY: &str = "your_api_key_here";
const PLACEHOLDER_API_SECRET: &str = "your_api_secret_here";

/// Every constraint the configuration bundle violated
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid configuration ({} problem(s)): {}", .violations.len(), .violations.join("; "))]
pub struct ConfigurationError {
    pub violations: Vec<String>,
}

impl ConfigurationError {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            violations: vec![message.into()],
        }
    }
}

/// Output of a successful validation
#[derive(Debug, Clone)]
pub struct Settings {
    pub volume: VolumeConfig,
    pub exchange: ExchangeSettings,
    /// Non-fatal findings worth showing to the operator
    pub warnings: Vec<String>,
}

/// Validate a raw bundle, collecting every violation instead of stopping at the first.
pub fn validate(raw: &RawConfig) -> Result<Settings, ConfigurationError> {
    let mut checker = Checker::default();

    let mut volume = VolumeConfig {
        target_volume_per_hour: checker.number(
            "TARGET_VOLUME_PER_HOUR",
            &raw.target_volume_per_hour,
            DEFAULT_TARGET_VOLUME_PER_HOUR,
            |v| v > 0.0,
            "must be positive",
        ),
        price_walk_direction: checker.direction(&raw.price_walk_direction),
        max_price_deviation: checker.number(
            "MAX_PRICE_DEVIATION",
            &raw.max_price_deviation,
            DEFAULT_MAX_PRICE_DEVIATION,
            |v| v > 0.0 && v <= MAX_PRICE_DEVIATION_CEILING,
            "must be in (0, 0.2]",
        ),
        order_frequency_secs: checker.number(
            "ORDER_FREQUENCY",
            &raw.order_frequency,
            DEFAULT_ORDER_FREQUENCY_SECS,
            |v| v > 0.0 && v <= MAX_ORDER_FREQUENCY_SECS,
            "must be in (0, 86400] seconds",
        ),
        min_order_ratio: checker.number(
            "MIN_ORDER_RATIO",
            &raw.min_order_ratio,
            DEFAULT_MIN_ORDER_RATIO,
            is_ratio,
            "must be in (0, 1]",
        ),
        max_order_ratio: checker.number(
            "MAX_ORDER_RATIO",
            &raw.max_order_ratio,
            DEFAULT_MAX_ORDER_RATIO,
            is_ratio,
            "must be in (0, 1]",
        ),
        cancel_previous_orders: checker.flag(
            "CANCEL_PREVIOUS_ORDERS",
            &raw.cancel_previous_orders,
            true,
        ),
        dry_run: checker.flag("DRY_RUN", &raw.dry_run, true),
        size_randomization: checker.number(
            "SIZE_RANDOMIZATION",
            &raw.size_randomization,
            DEFAULT_SIZE_RANDOMIZATION,
            is_probability,
            "must be in [0, 1]",
        ),
        timing_randomization: checker.number(
            "TIMING_RANDOMIZATION",
            &raw.timing_randomization,
            DEFAULT_TIMING_RANDOMIZATION,
            is_probability,
            "must be in [0, 1]",
        ),
        burst_probability: checker.number(
            "BURST_PROBABILITY",
            &raw.burst_probability,
            DEFAULT_BURST_PROBABILITY,
            is_probability,
            "must be in [0, 1]",
        ),
        quiet_probability: checker.number(
            "QUIET_PROBABILITY",
            &raw.quiet_probability,
            DEFAULT_QUIET_PROBABILITY,
            is_probability,
            "must be in [0, 1]",
        ),
        min_order_value: checker.number(
            "MIN_ORDER_VALUE",
            &raw.min_order_value,
            DEFAULT_MIN_ORDER_VALUE,
            |v| v > 0.0,
            "must be positive",
        ),
        max_spread_threshold: checker.number(
            "MAX_SPREAD_THRESHOLD",
            &raw.max_spread_threshold,
            DEFAULT_MAX_SPREAD_THRESHOLD,
            |v| v > 0.0 && v <= MAX_SPREAD_CEILING,
            "must be in (0, 0.05]",
        ),
        pacing_window_secs: checker.integer(
            "PACING_WINDOW_SECS",
            &raw.pacing_window_secs,
            DEFAULT_PACING_WINDOW_SECS,
            |v| (MIN_PACING_WINDOW_SECS..=MAX_PACING_WINDOW_SECS).contains(&v),
            "must be between 60 seconds and 7 days",
        ),
        max_open_orders: checker.integer(
            "MAX_OPEN_ORDERS",
            &raw.max_open_orders,
            DEFAULT_MAX_OPEN_ORDERS as u64,
            |v| (1..=100).contains(&v),
            "must be between 1 and 100",
        ) as usize,
        rng_seed: checker.seed(&raw.rng_seed),
    };

    // Only compare the ratios when both parsed, otherwise the defaults would mask the real issue
    if is_ratio(volume.min_order_ratio)
        && is_ratio(volume.max_order_ratio)
        && volume.min_order_ratio > volume.max_order_ratio
    {
        checker.violation(format!(
            "MIN_ORDER_RATIO ({}) must not exceed MAX_ORDER_RATIO ({})",
            volume.min_order_ratio, volume.max_order_ratio
        ));
    }

    if volume.burst_probability + volume.quiet_probability > 1.0 {
        checker.violation(format!(
            "BURST_PROBABILITY + QUIET_PROBABILITY ({:.2}) must not exceed 1",
            volume.burst_probability + volume.quiet_probability
        ));
    }

    let exchange = checker.exchange(raw, volume.dry_run);

    // Simulated fills never reach a real book, so they must not be counted as live volume
    if exchange.kind == ExchangeKind::Simulated && !volume.dry_run {
        checker
            .warnings
            .push("DRY_RUN forced on for the simulated venue".to_string());
        volume.dry_run = true;
    }

    if checker.violations.is_empty() {
        Ok(Settings {
            volume,
            exchange,
            warnings: checker.warnings,
        })
    } else {
        Err(ConfigurationError {
            violations: checker.violations,
        })
    }
}

fn is_ratio(v: f64) -> bool {
    v > 0.0 && v <= 1.0
}

fn is_probability(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

/// Blank values count as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Default)]
struct Checker {
    violations: Vec<String>,
    warnings: Vec<String>,
}

impl Checker {
    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn number(
        &mut self,
        key: &str,
        value: &Option<String>,
        default: f64,
        valid: impl Fn(f64) -> bool,
        rule: &str,
    ) -> f64 {
        let Some(text) = present(value) else {
            return default;
        };

        match text.parse::<f64>() {
            Ok(v) if !v.is_finite() => {
                self.violation(format!("{} must be a finite number, got '{}'", key, text));
                default
            }
            Ok(v) if !valid(v) => {
                self.violation(format!("{} {}, got {}", key, rule, v));
                v
            }
            Ok(v) => v,
            Err(_) => {
                self.violation(format!("{} is not a number: '{}'", key, text));
                default
            }
        }
    }

    fn integer(
        &mut self,
        key: &str,
        value: &Option<String>,
        default: u64,
        valid: impl Fn(u64) -> bool,
        rule: &str,
    ) -> u64 {
        let Some(text) = present(value) else {
            return default;
        };

        match text.parse::<u64>() {
            Ok(v) if !valid(v) => {
                self.violation(format!("{} {}, got {}", key, rule, v));
                default
            }
            Ok(v) => v,
            Err(_) => {
                self.violation(format!("{} is not a whole number: '{}'", key, text));
                default
            }
        }
    }

    fn flag(&mut self, key: &str, value: &Option<String>, default: bool) -> bool {
        let Some(text) = present(value) else {
            return default;
        };

        match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                self.violation(format!("{} must be true or false, got '{}'", key, text));
                default
            }
        }
    }

    fn direction(&mut self, value: &Option<String>) -> WalkDirection {
        let Some(text) = present(value) else {
            return WalkDirection::Sideways;
        };

        WalkDirection::parse(text).unwrap_or_else(|| {
            let allowed: Vec<&str> = WalkDirection::ALL.iter().map(|d| d.as_str()).collect();
            self.violation(format!(
                "PRICE_WALK_DIRECTION '{}' is not one of {:?}",
                text, allowed
            ));
            WalkDirection::Sideways
        })
    }

    fn seed(&mut self, value: &Option<String>) -> Option<u64> {
        let text = present(value)?;
        match text.parse::<u64>() {
            Ok(seed) => Some(seed),
            Err(_) => {
                self.violation(format!("RNG_SEED is not a whole number: '{}'", text));
                None
            }
        }
    }

    fn exchange(&mut self, raw: &RawConfig, dry_run: bool) -> ExchangeSettings {
        let kind = match present(&raw.exchange) {
            None => ExchangeKind::Binance,
            Some(name) => ExchangeKind::parse(name).unwrap_or_else(|| {
                self.warnings.push(format!(
                    "Unsupported exchange '{}' (supported: {:?}), falling back to the simulated venue",
                    name,
                    ExchangeKind::SUPPORTED
                ));
                ExchangeKind::Simulated
            }),
        };

        let base_asset = present(&raw.base_asset)
            .unwrap_or(DEFAULT_BASE_ASSET)
            .to_ascii_uppercase();
        let quote_asset = present(&raw.quote_asset)
            .unwrap_or(DEFAULT_QUOTE_ASSET)
            .to_ascii_uppercase();

        let trading_pair = match present(&raw.trading_pair) {
            Some(pair) => pair.to_ascii_uppercase(),
            None => format!("{}/{}", base_asset, quote_asset),
        };

        let (base_asset, quote_asset) = match trading_pair.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                (base.to_string(), quote.to_string())
            }
            _ => {
                self.violation(format!(
                    "TRADING_PAIR '{}' must look like BASE/QUOTE",
                    trading_pair
                ));
                (base_asset, quote_asset)
            }
        };

        let api_key = present(&raw.api_key).unwrap_or_default().to_string();
        let api_secret = present(&raw.api_secret).unwrap_or_default().to_string();

        if kind == ExchangeKind::Binance {
            for (name, value, placeholder) in [
                ("API_KEY", &api_key, PLACEHOLDER_API_KEY),
                ("API_SECRET", &api_secret, PLACEHOLDER_API_SECRET),
            ] {
                if value.is_empty() {
                    if dry_run {
                        self.warnings
                            .push(format!("Environment variable {} is not set", name));
                    } else {
                        self.violation(format!("{} is required when DRY_RUN is false", name));
                    }
                } else if value.contains(placeholder) {
                    self.warnings
                        .push(format!("{} appears to be a placeholder value", name));
                }
            }
        }

        let sandbox = self.flag("SANDBOX_MODE", &raw.sandbox_mode, false);

        ExchangeSettings {
            kind,
            api_key,
            api_secret,
            trading_pair,
            base_asset,
            quote_asset,
            sandbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawConfig {
        let mut raw = RawConfig {
            exchange: Some("simulated".to_string()),
            ..Default::default()
        };
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "exchange" => raw.exchange = value,
                "api_key" => raw.api_key = value,
                "api_secret" => raw.api_secret = value,
                "trading_pair" => raw.trading_pair = value,
                "dry_run" => raw.dry_run = value,
                "target_volume_per_hour" => raw.target_volume_per_hour = value,
                "price_walk_direction" => raw.price_walk_direction = value,
                "max_price_deviation" => raw.max_price_deviation = value,
                "order_frequency" => raw.order_frequency = value,
                "min_order_ratio" => raw.min_order_ratio = value,
                "max_order_ratio" => raw.max_order_ratio = value,
                "burst_probability" => raw.burst_probability = value,
                "quiet_probability" => raw.quiet_probability = value,
                "cancel_previous_orders" => raw.cancel_previous_orders = value,
                "pacing_window_secs" => raw.pacing_window_secs = value,
                other => panic!("unknown test key {}", other),
            }
        }
        raw
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = validate(&raw(&[])).unwrap();
        assert_eq!(settings.volume.price_walk_direction, WalkDirection::Sideways);
        assert!(settings.volume.dry_run);
        assert!(settings.volume.cancel_previous_orders);
        assert_eq!(settings.exchange.base_asset, "ETH");
        assert_eq!(settings.exchange.quote_asset, "USDT");
    }

    #[test]
    fn test_scenario_bundle_is_accepted() {
        let settings = validate(&raw(&[
            ("target_volume_per_hour", "500"),
            ("price_walk_direction", "sideways"),
            ("max_price_deviation", "0.005"),
            ("order_frequency", "120"),
            ("min_order_ratio", "0.001"),
            ("max_order_ratio", "0.003"),
        ]))
        .unwrap();

        assert_eq!(settings.volume.target_volume_per_hour, 500.0);
        assert_eq!(settings.volume.order_frequency_secs, 120.0);
        assert_eq!(settings.volume.max_order_ratio, 0.003);
    }

    #[test]
    fn test_reports_every_violation() {
        let err = validate(&raw(&[
            ("target_volume_per_hour", "-1"),
            ("price_walk_direction", "diagonal"),
            ("max_price_deviation", "0.5"),
            ("order_frequency", "0"),
            ("min_order_ratio", "abc"),
            ("max_order_ratio", "1.5"),
        ]))
        .unwrap_err();

        assert_eq!(err.violations.len(), 6, "{:?}", err.violations);
        let joined = err.violations.join("\n");
        assert!(joined.contains("TARGET_VOLUME_PER_HOUR"));
        assert!(joined.contains("PRICE_WALK_DIRECTION"));
        assert!(joined.contains("MAX_PRICE_DEVIATION"));
        assert!(joined.contains("ORDER_FREQUENCY"));
        assert!(joined.contains("MIN_ORDER_RATIO"));
        assert!(joined.contains("MAX_ORDER_RATIO"));
    }

    #[test]
    fn test_min_ratio_above_max_rejected() {
        let err = validate(&raw(&[
            ("min_order_ratio", "0.01"),
            ("max_order_ratio", "0.005"),
        ]))
        .unwrap_err();

        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].contains("must not exceed"));
    }

    #[test]
    fn test_equal_ratios_allowed() {
        let settings = validate(&raw(&[
            ("min_order_ratio", "0.002"),
            ("max_order_ratio", "0.002"),
        ]))
        .unwrap();
        assert_eq!(settings.volume.min_order_ratio, settings.volume.max_order_ratio);
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = validate(&raw(&[("target_volume_per_hour", "NaN")])).unwrap_err();
        assert!(err.violations[0].contains("finite"));
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let err = validate(&raw(&[("cancel_previous_orders", "maybe")])).unwrap_err();
        assert!(err.violations[0].contains("CANCEL_PREVIOUS_ORDERS"));
    }

    #[test]
    fn test_probabilities_must_leave_room() {
        let err = validate(&raw(&[
            ("burst_probability", "0.6"),
            ("quiet_probability", "0.6"),
        ]))
        .unwrap_err();
        assert!(err.violations[0].contains("BURST_PROBABILITY"));
    }

    #[test]
    fn test_unsupported_exchange_warns_and_falls_back() {
        let settings = validate(&raw(&[("exchange", "gate")])).unwrap();
        assert_eq!(settings.exchange.kind, ExchangeKind::Simulated);
        assert!(settings.warnings.iter().any(|w| w.contains("gate")));
    }

    #[test]
    fn test_live_binance_requires_credentials() {
        let err = validate(&raw(&[("exchange", "binance"), ("dry_run", "false")])).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert!(err.violations.iter().any(|v| v.contains("API_KEY")));
        assert!(err.violations.iter().any(|v| v.contains("API_SECRET")));
    }

    #[test]
    fn test_dry_run_binance_only_warns_about_credentials() {
        let settings = validate(&raw(&[
            ("exchange", "binance"),
            ("api_key", "your_api_key_here"),
        ]))
        .unwrap();
        assert!(settings.warnings.iter().any(|w| w.contains("placeholder")));
        assert!(settings.warnings.iter().any(|w| w.contains("API_SECRET")));
    }

    #[test]
    fn test_trading_pair_sets_assets() {
        let settings = validate(&raw(&[("trading_pair", "sol/usdc")])).unwrap();
        assert_eq!(settings.exchange.trading_pair, "SOL/USDC");
        assert_eq!(settings.exchange.base_asset, "SOL");
        assert_eq!(settings.exchange.quote_asset, "USDC");
    }

    #[test]
    fn test_malformed_trading_pair_rejected() {
        let err = validate(&raw(&[("trading_pair", "ETHUSDT")])).unwrap_err();
        assert!(err.violations[0].contains("TRADING_PAIR"));
    }

    #[test]
    fn test_order_frequency_capped_at_one_day() {
        let settings = validate(&raw(&[("order_frequency", "86400")])).unwrap();
        assert_eq!(settings.volume.order_frequency_secs, 86_400.0);

        let err = validate(&raw(&[("order_frequency", "1e20")])).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].contains("ORDER_FREQUENCY"));
    }

    #[test]
    fn test_pacing_window_bounds() {
        let settings = validate(&raw(&[("pacing_window_secs", "604800")])).unwrap();
        assert_eq!(settings.volume.pacing_window_secs, MAX_PACING_WINDOW_SECS);

        for bad in ["59", "604801", "99999999999999999"] {
            let err = validate(&raw(&[("pacing_window_secs", bad)])).unwrap_err();
            assert!(err.violations[0].contains("PACING_WINDOW_SECS"), "{}", bad);
        }
    }

    #[test]
    fn test_simulated_venue_forces_dry_run() {
        let settings = validate(&raw(&[("exchange", "gate"), ("dry_run", "false")])).unwrap();
        assert_eq!(settings.exchange.kind, ExchangeKind::Simulated);
        assert!(settings.volume.dry_run);
        assert!(settings.warnings.iter().any(|w| w.contains("DRY_RUN forced")));
    }
}
