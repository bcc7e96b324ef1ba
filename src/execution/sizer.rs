use crate::config::VolumeConfig;
use crate::models::{Balance, MarketSnapshot, SymbolRules};
use rand::rngs::StdRng;
use rand::Rng;

/// Hard cap on a single order as a share of the balance basis
pub const MAX_BALANCE_USAGE_RATIO: f64 = 0.1;
/// Never take more than this share of the thinner top-of-book level
pub const LIQUIDITY_USAGE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum SizeDecision {
    Order { quantity: f64, notional: f64 },
    Abstain { reason: String },
}

impl SizeDecision {
    fn abstain(reason: impl Into<String>) -> Self {
        SizeDecision::Abstain {
            reason: reason.into(),
        }
    }
}

/// Turns balance, ratio bounds and the remaining pacing budget into an order quantity
pub struct OrderSizer {
    min_ratio: f64,
    max_ratio: f64,
    size_randomization: f64,
    min_order_value: f64,
    rng: StdRng,
}

impl OrderSizer {
    pub fn new(config: &VolumeConfig, rng: StdRng) -> Self {
        Self {
            min_ratio: config.min_order_ratio,
            max_ratio: config.max_order_ratio,
            size_randomization: config.size_randomization,
            min_order_value: config.min_order_value,
            rng,
        }
    }

    /// Size an order at `price`.
    ///
    /// `remaining_budget` is the quote volume still allowed in the current
    /// pacing window.
    pub fn size(
        &mut self,
        balance: &Balance,
        snapshot: &MarketSnapshot,
        price: f64,
        rules: &SymbolRules,
        remaining_budget: f64,
    ) -> SizeDecision {
        if !price.is_finite() || price <= 0.0 {
            return SizeDecision::abstain(format!("invalid order price {}", price));
        }

        let basis = balance.total_in_quote(snapshot.mid());
        if !basis.is_finite() || basis <= 0.0 {
            return SizeDecision::abstain("no balance available");
        }

        let floor_notional = self.min_order_value.max(rules.min_notional);
        if remaining_budget < floor_notional {
            return SizeDecision::abstain(format!(
                "pacing budget exhausted ({:.2} left)",
                remaining_budget.max(0.0)
            ));
        }

        let band_low = basis * self.min_ratio;
        let band_high = basis * self.max_ratio;

        let ratio = if self.max_ratio > self.min_ratio {
            self.rng.gen_range(self.min_ratio..=self.max_ratio)
        } else {
            self.min_ratio
        };
        let jitter = if self.size_randomization > 0.0 {
            self.rng
                .gen_range(-self.size_randomization..=self.size_randomization)
        } else {
            0.0
        };
        let candidate = (basis * ratio * (1.0 + jitter)).clamp(band_low, band_high);

        let mut cap = remaining_budget.min(basis * MAX_BALANCE_USAGE_RATIO);
        let depth = snapshot.top_liquidity();
        if depth.is_finite() && depth > 0.0 {
            cap = cap.min(depth * LIQUIDITY_USAGE_RATIO * price);
        }
        let notional = candidate.min(cap);

        let mut quantity = rules.floor_qty(notional / price);

        // Flooring can drop just under the ratio band; one extra step fixes that if the cap allows
        if quantity * price < band_low.min(cap) && rules.qty_step > 0.0 {
            let stepped = quantity + rules.qty_step;
            if stepped * price <= cap {
                quantity = stepped;
            }
        }

        if quantity <= 0.0 || quantity < rules.min_qty {
            return SizeDecision::abstain(format!(
                "quantity {:.8} below exchange minimum {}",
                quantity, rules.min_qty
            ));
        }

        let notional = quantity * price;
        if notional < floor_notional {
            return SizeDecision::abstain(format!(
                "notional {:.2} below minimum order value {:.2}",
                notional, floor_notional
            ));
        }

        SizeDecision::Order { quantity, notional }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;

    fn snapshot(mid: f64, depth: f64) -> MarketSnapshot {
        MarketSnapshot {
            bid: mid - 0.05,
            ask: mid + 0.05,
            bid_qty: depth,
            ask_qty: depth,
            last_price: mid,
            timestamp: Utc::now(),
        }
    }

    fn rules() -> SymbolRules {
        SymbolRules {
            min_qty: 0.0001,
            qty_step: 0.0001,
            tick_size: 0.01,
            min_notional: 1.0,
        }
    }

    fn sizer(min_ratio: f64, max_ratio: f64) -> OrderSizer {
        let config = VolumeConfig {
            min_order_ratio: min_ratio,
            max_order_ratio: max_ratio,
            ..Default::default()
        };
        OrderSizer::new(&config, StdRng::seed_from_u64(11))
    }

    fn order(decision: SizeDecision) -> (f64, f64) {
        match decision {
            SizeDecision::Order { quantity, notional } => (quantity, notional),
            SizeDecision::Abstain { reason } => panic!("unexpected abstain: {}", reason),
        }
    }

    #[test]
    fn test_notional_stays_in_ratio_band() {
        let mut sizer = sizer(0.001, 0.003);
        let balance = Balance {
            base: 0.0,
            quote: 10_000.0,
        };
        let snap = snapshot(100.0, 1_000.0);

        for _ in 0..500 {
            let (quantity, notional) =
                order(sizer.size(&balance, &snap, 100.0, &rules(), 1_000.0));
            assert!(notional >= 10.0 - 1e-9 && notional <= 30.0 + 1e-9, "{}", notional);
            assert!((quantity * 100.0 - notional).abs() < 1e-9);
        }
    }

    #[test]
    fn test_never_exceeds_balance_cap() {
        let mut sizer = sizer(0.5, 1.0);
        let balance = Balance {
            base: 1.0,
            quote: 900.0,
        };
        let snap = snapshot(100.0, 1_000.0);

        for _ in 0..200 {
            let (_, notional) = order(sizer.size(&balance, &snap, 100.0, &rules(), 10_000.0));
            assert!(notional <= 1_000.0 * MAX_BALANCE_USAGE_RATIO + 1e-9);
        }
    }

    #[test]
    fn test_remaining_budget_caps_order() {
        let mut sizer = sizer(0.01, 0.02);
        let balance = Balance {
            base: 0.0,
            quote: 10_000.0,
        };
        let (_, notional) = order(sizer.size(
            &balance,
            &snapshot(100.0, 1_000.0),
            100.0,
            &rules(),
            42.0,
        ));
        assert!(notional <= 42.0 + 1e-9);
    }

    #[test]
    fn test_thin_book_limits_quantity() {
        let mut sizer = sizer(0.01, 0.02);
        let balance = Balance {
            base: 0.0,
            quote: 10_000.0,
        };
        let (quantity, _) = order(sizer.size(
            &balance,
            &snapshot(100.0, 0.4),
            100.0,
            &rules(),
            10_000.0,
        ));
        assert!(quantity <= 0.2 + 1e-9);
    }

    #[test]
    fn test_abstains_without_balance() {
        let mut sizer = sizer(0.001, 0.003);
        let decision = sizer.size(
            &Balance::default(),
            &snapshot(100.0, 10.0),
            100.0,
            &rules(),
            1_000.0,
        );
        assert!(matches!(decision, SizeDecision::Abstain { .. }));
    }

    #[test]
    fn test_abstains_below_min_order_value() {
        let mut sizer = sizer(0.001, 0.003);
        // 1000 quote -> at most 3.0 notional, under the 5.0 default minimum
        let balance = Balance {
            base: 0.0,
            quote: 1_000.0,
        };
        let decision = sizer.size(&balance, &snapshot(100.0, 10.0), 100.0, &rules(), 1_000.0);
        match decision {
            SizeDecision::Abstain { reason } => assert!(reason.contains("minimum order value")),
            other => panic!("expected abstain, got {:?}", other),
        }
    }

    #[test]
    fn test_abstains_below_min_qty() {
        let mut sizer = sizer(0.001, 0.003);
        let balance = Balance {
            base: 0.0,
            quote: 10_000.0,
        };
        let coarse = SymbolRules {
            min_qty: 1.0,
            qty_step: 1.0,
            ..rules()
        };
        let decision = sizer.size(&balance, &snapshot(100.0, 10.0), 100.0, &coarse, 1_000.0);
        match decision {
            SizeDecision::Abstain { reason } => assert!(reason.contains("below exchange minimum")),
            other => panic!("expected abstain, got {:?}", other),
        }
    }

    #[test]
    fn test_abstains_when_budget_exhausted() {
        let mut sizer = sizer(0.001, 0.003);
        let balance = Balance {
            base: 0.0,
            quote: 10_000.0,
        };
        let decision = sizer.size(&balance, &snapshot(100.0, 10.0), 100.0, &rules(), 0.0);
        match decision {
            SizeDecision::Abstain { reason } => assert!(reason.contains("budget")),
            other => panic!("expected abstain, got {:?}", other),
        }
    }

    #[test]
    fn test_base_balance_counts_toward_basis() {
        let config = VolumeConfig {
            size_randomization: 0.0,
            min_order_ratio: 0.01,
            max_order_ratio: 0.01,
            ..Default::default()
        };
        let mut sizer = OrderSizer::new(&config, StdRng::seed_from_u64(3));
        let balance = Balance {
            base: 50.0,
            quote: 5_000.0,
        };
        let (_, notional) = order(sizer.size(
            &balance,
            &snapshot(100.0, 1_000.0),
            100.0,
            &rules(),
            10_000.0,
        ));
        assert!((notional - 100.0).abs() < 1e-6);
    }
}
