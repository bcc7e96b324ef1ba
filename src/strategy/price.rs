use crate::config::VolumeConfig;
use crate::models::{MarketSnapshot, Side, WalkDirection};
use crate::risk::{SafetyGate, SafetyTrip};
use rand::rngs::StdRng;
use rand::Rng;

/// Per-cycle progress of up/down walks, as a fraction of the anchor
const BASE_PRICE_STEP_RATIO: f64 = 0.001;
/// Share of the sideways offset taken by the slow oscillation; the rest is jitter
const SIDEWAYS_OSCILLATION_WEIGHT: f64 = 0.6;
/// Sideways mode pushes back toward the anchor once drift exceeds this share of the deviation
const MEAN_REVERSION_FRACTION: f64 = 0.5;
/// Chance of flipping side relative to the previous order when no bias applies
const ORDER_SIDE_ALTERNATE_PROBABILITY: f64 = 0.8;
const TICK_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum PriceDecision {
    Trade { side: Side, target_price: f64 },
    /// Do not place an order this cycle
    Abstain(SafetyTrip),
}

/// Maps market state and walk direction to a side and a target price.
///
/// Holds the reference anchor and the walk's progress; all randomness comes
/// from the injected `StdRng` so runs are reproducible under a fixed seed.
pub struct PriceStrategy {
    direction: WalkDirection,
    max_deviation: f64,
    gate: SafetyGate,
    tick_size: f64,
    anchor: f64,
    progress: f64,
    phase: f64,
    last_side: Option<Side>,
    rng: StdRng,
}

impl PriceStrategy {
    pub fn new(direction: WalkDirection, max_deviation: f64, gate: SafetyGate, rng: StdRng) -> Self {
        Self {
            direction,
            max_deviation,
            gate,
            tick_size: 0.0,
            anchor: 0.0,
            progress: 0.0,
            phase: 0.0,
            last_side: None,
            rng,
        }
    }

    pub fn from_config(config: &VolumeConfig, rng: StdRng) -> Self {
        Self::new(
            config.price_walk_direction,
            config.max_price_deviation,
            SafetyGate::from_config(config),
            rng,
        )
    }

    /// Round targets to this tick (toward the anchor, so rounding never leaves the band)
    pub fn set_tick_size(&mut self, tick_size: f64) {
        self.tick_size = tick_size;
    }

    pub fn direction(&self) -> WalkDirection {
        self.direction
    }

    pub fn anchor(&self) -> f64 {
        self.anchor
    }

    /// Distance walked from the anchor by up/down modes
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Re-anchor at `price` and restart the walk
    pub fn reset_anchor(&mut self, price: f64) {
        self.anchor = price;
        self.progress = 0.0;
        self.phase = 0.0;
    }

    /// Side and target price for this cycle, or abstain on an unhealthy book
    pub fn decide(&mut self, snapshot: &MarketSnapshot) -> PriceDecision {
        if let Err(trip) = self.gate.check_book(snapshot) {
            return PriceDecision::Abstain(trip);
        }

        let mid = snapshot.mid();
        if self.anchor <= 0.0 {
            self.reset_anchor(mid);
        }

        let d = self.max_deviation;
        let (side, offset) = match self.direction {
            WalkDirection::Sideways => {
                self.phase += self.rng.gen_range(0.1..0.3);
                let jitter = self.rng.gen_range(-1.0..=1.0);
                let offset = d
                    * (SIDEWAYS_OSCILLATION_WEIGHT * self.phase.sin()
                        + (1.0 - SIDEWAYS_OSCILLATION_WEIGHT) * jitter);

                let drift = (mid - self.anchor) / self.anchor;
                let threshold = d * MEAN_REVERSION_FRACTION;
                let side = if drift > threshold {
                    Side::Sell
                } else if drift < -threshold {
                    Side::Buy
                } else {
                    self.alternating_side()
                };
                (side, offset)
            }
            WalkDirection::Up | WalkDirection::Down => {
                let step = BASE_PRICE_STEP_RATIO * self.rng.gen_range(1.0..=2.0);
                self.progress = (self.progress + step).min(d);

                let (sign, tie_side) = if self.direction == WalkDirection::Up {
                    (1.0, Side::Buy)
                } else {
                    (-1.0, Side::Sell)
                };
                let offset = sign * self.progress;
                let target = self.anchor * (1.0 + offset);
                (side_toward(target, mid).unwrap_or(tie_side), offset)
            }
            WalkDirection::Random => {
                let offset = self.rng.gen_range(-d..=d);
                let target = self.anchor * (1.0 + offset);
                let side = match side_toward(target, mid) {
                    Some(side) => side,
                    None => self.random_side(),
                };
                (side, offset)
            }
        };

        let target_price = match self.bounded_target(offset) {
            Ok(price) => price,
            Err(trip) => return PriceDecision::Abstain(trip),
        };
        self.last_side = Some(side);

        PriceDecision::Trade { side, target_price }
    }

    /// Target price inside the band, snapped to the tick toward the anchor.
    ///
    /// The band edges are rounded inward to the tick first, so clamping can
    /// never produce an off-tick price.
    fn bounded_target(&self, offset: f64) -> Result<f64, SafetyTrip> {
        let d = self.max_deviation;
        let lower = self.anchor * (1.0 - d);
        let upper = self.anchor * (1.0 + d);
        let target = (self.anchor * (1.0 + offset)).clamp(lower, upper);

        let tick = self.tick_size;
        if tick <= 0.0 {
            return Ok(target);
        }

        // Tolerance absorbs float noise when an edge sits exactly on a tick
        let lo = ((lower / tick) - TICK_EPSILON).ceil();
        let hi = ((upper / tick) + TICK_EPSILON).floor();
        if lo > hi {
            return Err(SafetyTrip::TickWiderThanBand { tick, lower, upper });
        }

        let ticks = target / tick;
        let rounded = if target >= self.anchor {
            ticks.floor()
        } else {
            ticks.ceil()
        };
        Ok(rounded.clamp(lo, hi) * tick)
    }

    fn random_side(&mut self) -> Side {
        if self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    fn alternating_side(&mut self) -> Side {
        match self.last_side {
            None => self.random_side(),
            Some(last) if self.rng.gen_bool(ORDER_SIDE_ALTERNATE_PROBABILITY) => last.opposite(),
            Some(last) => last,
        }
    }
}

/// Buy to lift the price toward a higher target, sell toward a lower one
fn side_toward(target: f64, mid: f64) -> Option<Side> {
    if target > mid {
        Some(Side::Buy)
    } else if target < mid {
        Some(Side::Sell)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;

    fn snapshot(bid: f64, ask: f64) -> MarketSnapshot {
        MarketSnapshot {
            bid,
            ask,
            bid_qty: 10.0,
            ask_qty: 10.0,
            last_price: (bid + ask) / 2.0,
            timestamp: Utc::now(),
        }
    }

    fn strategy(direction: WalkDirection, deviation: f64) -> PriceStrategy {
        let mut strategy = PriceStrategy::new(
            direction,
            deviation,
            SafetyGate::default(),
            StdRng::seed_from_u64(7),
        );
        strategy.reset_anchor(100.0);
        strategy
    }

    fn trade(decision: PriceDecision) -> (Side, f64) {
        match decision {
            PriceDecision::Trade { side, target_price } => (side, target_price),
            PriceDecision::Abstain(trip) => panic!("unexpected abstain: {}", trip),
        }
    }

    #[test]
    fn test_sideways_stays_within_deviation() {
        let mut strategy = strategy(WalkDirection::Sideways, 0.005);
        let snap = snapshot(99.95, 100.05);

        for _ in 0..1000 {
            let (_, target) = trade(strategy.decide(&snap));
            assert!(
                (target - 100.0).abs() / 100.0 <= 0.005 + 1e-12,
                "target {} left the band",
                target
            );
        }
    }

    #[test]
    fn test_sideways_mean_reverts_after_drift() {
        let mut strategy = strategy(WalkDirection::Sideways, 0.01);

        // Mid 101 is 1% above the anchor, past the 0.5% threshold
        let (side, _) = trade(strategy.decide(&snapshot(100.95, 101.05)));
        assert_eq!(side, Side::Sell);

        let (side, _) = trade(strategy.decide(&snapshot(98.95, 99.05)));
        assert_eq!(side, Side::Buy);
    }

    #[test]
    fn test_sideways_uses_both_sides_near_anchor() {
        let mut strategy = strategy(WalkDirection::Sideways, 0.01);
        let snap = snapshot(99.99, 100.01);

        let sides: Vec<Side> = (0..50).map(|_| trade(strategy.decide(&snap)).0).collect();
        assert!(sides.contains(&Side::Buy));
        assert!(sides.contains(&Side::Sell));
    }

    #[test]
    fn test_up_is_monotonic_and_holds_at_cap() {
        let mut strategy = strategy(WalkDirection::Up, 0.01);
        let snap = snapshot(99.99, 100.01);

        let mut previous = 0.0;
        let mut reached_cap = false;
        for _ in 0..50 {
            let (_, target) = trade(strategy.decide(&snap));
            assert!(target >= previous, "{} < {}", target, previous);
            assert!(target <= 101.0 + 1e-9);
            if reached_cap {
                assert_eq!(target, previous);
            }
            reached_cap = (target - 101.0).abs() < 1e-9;
            previous = target;
        }
        assert!(reached_cap, "walk never reached the cap");
    }

    #[test]
    fn test_up_buys_while_target_above_mid() {
        let mut strategy = strategy(WalkDirection::Up, 0.01);
        let (side, target) = trade(strategy.decide(&snapshot(99.99, 100.01)));
        assert!(target > 100.0);
        assert_eq!(side, Side::Buy);
    }

    #[test]
    fn test_down_walks_down_and_resets() {
        let mut strategy = strategy(WalkDirection::Down, 0.005);
        let snap = snapshot(99.99, 100.01);

        let mut last = f64::MAX;
        for _ in 0..20 {
            let (side, target) = trade(strategy.decide(&snap));
            assert!(target <= last);
            assert!(target >= 99.5 - 1e-9);
            assert_eq!(side, Side::Sell);
            last = target;
        }
        assert!((strategy.progress() - 0.005).abs() < 1e-12);

        strategy.reset_anchor(200.0);
        assert_eq!(strategy.progress(), 0.0);
        let (_, target) = trade(strategy.decide(&snapshot(199.99, 200.01)));
        assert!(target < 200.0 && target > 199.0);
    }

    #[test]
    fn test_random_side_follows_target() {
        let mut strategy = strategy(WalkDirection::Random, 0.02);
        let snap = snapshot(99.99, 100.01);

        for _ in 0..200 {
            let (side, target) = trade(strategy.decide(&snap));
            assert!((target - 100.0).abs() <= 2.0 + 1e-9);
            if target > snap.mid() {
                assert_eq!(side, Side::Buy);
            } else if target < snap.mid() {
                assert_eq!(side, Side::Sell);
            }
        }
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let mut a = strategy(WalkDirection::Random, 0.01);
        let mut b = strategy(WalkDirection::Random, 0.01);
        let snap = snapshot(99.99, 100.01);

        for _ in 0..20 {
            assert_eq!(a.decide(&snap), b.decide(&snap));
        }
    }

    #[test]
    fn test_abstains_on_wide_spread() {
        let mut strategy = strategy(WalkDirection::Sideways, 0.01);
        let decision = strategy.decide(&snapshot(100.0, 106.0));
        assert!(matches!(
            decision,
            PriceDecision::Abstain(SafetyTrip::SpreadTooWide { .. })
        ));
    }

    #[test]
    fn test_abstains_on_inverted_book() {
        let mut strategy = strategy(WalkDirection::Up, 0.01);
        let decision = strategy.decide(&snapshot(100.5, 100.0));
        assert!(matches!(
            decision,
            PriceDecision::Abstain(SafetyTrip::InvertedBook { .. })
        ));
        assert_eq!(strategy.progress(), 0.0);
    }

    #[test]
    fn test_tick_rounding_stays_in_band() {
        let mut strategy = strategy(WalkDirection::Up, 0.01);
        strategy.set_tick_size(0.3);
        let snap = snapshot(99.99, 100.01);

        for _ in 0..30 {
            let (_, target) = trade(strategy.decide(&snap));
            assert!(target <= 101.0 + 1e-9);
            let ticks = target / 0.3;
            assert!((ticks - ticks.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_capped_walk_lands_on_tick_inside_band() {
        // Band edges 98.5 and 101.5 are not multiples of 0.4
        for direction in [WalkDirection::Up, WalkDirection::Down] {
            let mut strategy = strategy(direction, 0.015);
            strategy.set_tick_size(0.4);
            let snap = snapshot(99.99, 100.01);

            let mut last = 0.0;
            for _ in 0..40 {
                let (_, target) = trade(strategy.decide(&snap));
                assert!((98.5 - 1e-9..=101.5 + 1e-9).contains(&target), "{}", target);
                let ticks = target / 0.4;
                assert!((ticks - ticks.round()).abs() < 1e-6, "{} is off-tick", target);
                last = target;
            }
            let edge = if direction == WalkDirection::Up { 101.2 } else { 98.8 };
            assert!((last - edge).abs() < 1e-9, "{:?} capped at {}", direction, last);
        }
    }

    #[test]
    fn test_tick_wider_than_band_abstains() {
        let mut strategy = strategy(WalkDirection::Sideways, 0.0005);
        strategy.set_tick_size(0.3);

        let decision = strategy.decide(&snapshot(99.99, 100.01));
        assert!(matches!(
            decision,
            PriceDecision::Abstain(SafetyTrip::TickWiderThanBand { .. })
        ));
    }

    #[test]
    fn test_first_decision_anchors_at_mid() {
        let mut strategy = PriceStrategy::new(
            WalkDirection::Sideways,
            0.01,
            SafetyGate::default(),
            StdRng::seed_from_u64(1),
        );
        strategy.decide(&snapshot(49.9, 50.1));
        assert_eq!(strategy.anchor(), 50.0);
    }
}
