use super::{EngineError, EngineState, MarketDataError, PacingWindow, RunStats};
use crate::api::Exchange;
use crate::config::{VolumeConfig, MAX_ORDER_FREQUENCY_SECS};
use crate::execution::{CancelReport, OrderError, OrderManager, OrderPolicy, OrderSizer, SizeDecision};
use crate::models::{Side, SymbolRules, TrackedOrder};
use crate::risk::{SafetyGate, SafetyTrip};
use crate::strategy::{PriceDecision, PriceStrategy};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// Reconcile and purge tracked orders this often
pub const ORDER_CLEANUP_INTERVAL_SECS: i64 = 300;
pub const BURST_MODE_INTERVAL_MULTIPLIER: f64 = 0.3;
pub const QUIET_MODE_INTERVAL_MULTIPLIER: f64 = 3.0;
pub const MIN_CYCLE_DELAY_SECS: f64 = 1.0;
pub const MAX_CYCLE_DELAY_SECS: f64 =
    MAX_ORDER_FREQUENCY_SECS * 2.0 * QUIET_MODE_INTERVAL_MULTIPLIER;

/// Why a cycle placed nothing
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotRunning(EngineState),
    MarketData(MarketDataError),
    Safety(SafetyTrip),
    PacingBudgetExhausted,
    Sizing(String),
    InsufficientFunds(String),
    OpenOrderLimit { open: usize, limit: usize },
}

#[derive(Debug)]
pub enum CycleOutcome {
    Placed { order: TrackedOrder, notional: f64 },
    Skipped(SkipReason),
    Failed(OrderError),
}

impl CycleOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, CycleOutcome::Placed { .. })
    }
}

/// Drives the per-cycle pipeline: snapshot, safety, strategy, sizing,
/// pacing, placement and statistics.
pub struct VolumeEngine {
    config: VolumeConfig,
    exchange: Arc<dyn Exchange>,
    symbol: String,
    state: EngineState,
    safety: SafetyGate,
    strategy: PriceStrategy,
    sizer: OrderSizer,
    orders: OrderManager,
    stats: RunStats,
    window: PacingWindow,
    rules: SymbolRules,
    timing_rng: StdRng,
    last_cleanup: DateTime<Utc>,
}

/// Independent RNG streams so strategy, sizing and timing draws don't interleave
fn rng_stream(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

impl VolumeEngine {
    pub fn new(config: VolumeConfig, exchange: Arc<dyn Exchange>, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let now = Utc::now();

        Self {
            safety: SafetyGate::from_config(&config),
            strategy: PriceStrategy::from_config(&config, rng_stream(config.rng_seed, 0)),
            sizer: OrderSizer::new(&config, rng_stream(config.rng_seed, 1)),
            timing_rng: rng_stream(config.rng_seed, 2),
            orders: OrderManager::new(exchange.clone(), symbol.clone(), config.dry_run),
            stats: RunStats::new(now),
            window: PacingWindow::new(config.pacing_window_secs, config.window_target(), now),
            rules: SymbolRules::default(),
            state: EngineState::Idle,
            last_cleanup: now,
            exchange,
            symbol,
            config,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub fn strategy(&self) -> &PriceStrategy {
        &self.strategy
    }

    pub fn window(&self) -> &PacingWindow {
        &self.window
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Idle → Running: read the initial book, symbol rules and balance, set the anchor
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.start_at(Utc::now()).await
    }

    pub async fn start_at(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::InvalidState {
                expected: EngineState::Idle,
                actual: self.state,
            });
        }

        tracing::info!(
            "🚀 Starting volume engine on {} ({})",
            self.exchange.name(),
            self.symbol
        );

        let snapshot = self
            .exchange
            .snapshot(&self.symbol)
            .await
            .map_err(|e| EngineError::Startup(format!("initial snapshot: {}", e)))?;
        let mid = snapshot.mid();
        if !mid.is_finite() || snapshot.bid <= 0.0 || snapshot.ask <= 0.0 {
            return Err(EngineError::Startup(format!(
                "unusable initial book: bid={} ask={}",
                snapshot.bid, snapshot.ask
            )));
        }

        self.rules = self
            .exchange
            .symbol_rules(&self.symbol)
            .await
            .map_err(|e| EngineError::Startup(format!("symbol rules: {}", e)))?;

        // Signed endpoint: a bad or missing key fails here instead of skipping every cycle
        let balance = self
            .exchange
            .balance(&self.symbol)
            .await
            .map_err(|e| EngineError::Startup(format!("balance: {}", e)))?;
        tracing::info!(
            "💰 Balance: {:.6} base, {:.2} quote",
            balance.base,
            balance.quote
        );

        self.strategy.set_tick_size(self.rules.tick_size);
        self.strategy.reset_anchor(mid);
        self.window = PacingWindow::new(
            self.config.pacing_window_secs,
            self.config.window_target(),
            now,
        );
        self.stats = RunStats::new(now);
        self.last_cleanup = now;
        self.state = EngineState::Running;

        tracing::info!(
            "✅ Engine running: anchor {:.4}, window target {:.2} per {}s{}",
            mid,
            self.window.target(),
            self.config.pacing_window_secs,
            if self.config.dry_run { " [DRY RUN]" } else { "" }
        );
        Ok(())
    }

    /// One pass of the pipeline at `now`; never fails, only reports
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        if self.state != EngineState::Running {
            return CycleOutcome::Skipped(SkipReason::NotRunning(self.state));
        }

        self.stats.record_cycle();
        let outcome = self.cycle(now).await;

        match &outcome {
            CycleOutcome::Placed { order, notional } => {
                tracing::info!(
                    "✅ {} {:.6} @ {:.4} (notional {:.2}){} | window {:.2}/{:.2}",
                    order.side,
                    order.quantity,
                    order.price,
                    notional,
                    if order.simulated { " [simulated]" } else { "" },
                    self.window.volume(),
                    self.window.target()
                );
            }
            CycleOutcome::Skipped(reason) => {
                self.stats.record_skip();
                match reason {
                    SkipReason::Safety(trip) => {
                        tracing::warn!("⚠️  Skipping cycle, unsafe market: {}", trip)
                    }
                    SkipReason::MarketData(e) => tracing::warn!("⚠️  Skipping cycle: {}", e),
                    other => tracing::info!("⏭️  Skipping cycle: {:?}", other),
                }
            }
            CycleOutcome::Failed(e) => {
                tracing::error!("❌ Order placement failed: {}", e);
            }
        }

        if now - self.last_cleanup >= Duration::seconds(ORDER_CLEANUP_INTERVAL_SECS) {
            self.orders.periodic_cleanup().await;
            self.last_cleanup = now;
        }

        outcome
    }

    async fn cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let snapshot = match self.exchange.snapshot(&self.symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => return CycleOutcome::Skipped(SkipReason::MarketData(MarketDataError::Snapshot(e))),
        };

        // Freshness is wall-clock age; `now` only drives scheduling
        if let Err(trip) = self.safety.check(&snapshot, Utc::now()) {
            return CycleOutcome::Skipped(SkipReason::Safety(trip));
        }

        if self.window.roll_if_elapsed(now) {
            self.strategy.reset_anchor(snapshot.mid());
            tracing::info!(
                "🔄 New pacing window, re-anchored at {:.4}",
                self.strategy.anchor()
            );
        }

        let (side, target_price) = match self.strategy.decide(&snapshot) {
            PriceDecision::Trade { side, target_price } => (side, target_price),
            PriceDecision::Abstain(trip) => return CycleOutcome::Skipped(SkipReason::Safety(trip)),
        };

        if self.window.is_exhausted() {
            return CycleOutcome::Skipped(SkipReason::PacingBudgetExhausted);
        }

        let balance = match self.exchange.balance(&self.symbol).await {
            Ok(balance) => balance,
            Err(e) => return CycleOutcome::Skipped(SkipReason::MarketData(MarketDataError::Balance(e))),
        };

        let (quantity, notional) = match self.sizer.size(
            &balance,
            &snapshot,
            target_price,
            &self.rules,
            self.window.remaining(),
        ) {
            SizeDecision::Order { quantity, notional } => (quantity, notional),
            SizeDecision::Abstain { reason } => return CycleOutcome::Skipped(SkipReason::Sizing(reason)),
        };

        if !self.config.dry_run {
            let short = match side {
                Side::Buy if balance.quote < notional => {
                    Some(format!("need {:.2} quote, have {:.2}", notional, balance.quote))
                }
                Side::Sell if balance.base < quantity => {
                    Some(format!("need {:.6} base, have {:.6}", quantity, balance.base))
                }
                _ => None,
            };
            if let Some(reason) = short {
                return CycleOutcome::Skipped(SkipReason::InsufficientFunds(reason));
            }
        }

        tracing::debug!(
            "🎯 {} walk: {} {:.6} @ {:.4} (mid {:.4}, anchor {:.4})",
            self.strategy.direction(),
            side,
            quantity,
            target_price,
            snapshot.mid(),
            self.strategy.anchor()
        );

        let policy = OrderPolicy {
            cancel_previous: self.config.cancel_previous_orders,
            max_open_orders: self.config.max_open_orders,
        };
        let outcome = self
            .orders
            .place_with_policy(policy, side, target_price, quantity)
            .await;

        if let Some(report) = &outcome.cancel_report {
            self.stats.record_cancelled(report.cancelled.len());
        }

        match outcome.placement {
            Ok(order) => {
                self.stats.record_attempt();
                self.stats.record_placement(notional, order.simulated, now);
                self.window.record(notional);
                CycleOutcome::Placed { order, notional }
            }
            Err(OrderError::OpenOrderLimit { open, limit }) => {
                CycleOutcome::Skipped(SkipReason::OpenOrderLimit { open, limit })
            }
            Err(e) => {
                self.stats.record_attempt();
                self.stats.record_failure();
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Delay before the next cycle: jittered frequency with occasional bursts and quiet spells
    pub fn next_delay(&mut self) -> std::time::Duration {
        let base = self.config.order_frequency_secs;
        let spread = self.config.timing_randomization;
        let jitter = if spread > 0.0 {
            self.timing_rng.gen_range(-spread..=spread)
        } else {
            0.0
        };
        let mut secs = base * (1.0 + jitter);

        if self.timing_rng.gen_bool(self.config.burst_probability.clamp(0.0, 1.0)) {
            secs *= BURST_MODE_INTERVAL_MULTIPLIER;
        } else if self.timing_rng.gen_bool(self.config.quiet_probability.clamp(0.0, 1.0)) {
            secs *= QUIET_MODE_INTERVAL_MULTIPLIER;
        }

        let secs = secs.clamp(MIN_CYCLE_DELAY_SECS, MAX_CYCLE_DELAY_SECS);
        std::time::Duration::try_from_secs_f64(secs)
            .unwrap_or(std::time::Duration::from_secs(MAX_CYCLE_DELAY_SECS as u64))
    }

    /// Cycle until the shutdown flag flips or `duration` elapses, then shut down.
    ///
    /// Starts the engine first if it is still idle. Cycle-level problems are
    /// logged and never end the loop.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        duration: Option<std::time::Duration>,
    ) -> Result<CancelReport, EngineError> {
        if self.state == EngineState::Idle {
            self.start().await?;
        }

        let deadline = duration.map(|d| Instant::now() + d);
        if let Some(d) = duration {
            tracing::info!("⏱️  Running for {:.2}h", d.as_secs_f64() / 3600.0);
        }

        loop {
            if *shutdown.borrow() {
                tracing::info!("🛑 Shutdown requested");
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::info!("⏱️  Run duration reached");
                break;
            }

            self.run_cycle_at(Utc::now()).await;

            let mut delay = self.next_delay();
            if let Some(deadline) = deadline {
                delay = delay.min(deadline.saturating_duration_since(Instant::now()));
            }
            tracing::debug!("💤 Next cycle in {:.1}s", delay.as_secs_f64());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    // A dropped sender can never signal again; treat it as a stop
                    if changed.is_err() {
                        tracing::info!("🛑 Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        Ok(self.shutdown().await)
    }

    /// Running → Stopping → Stopped: cancel what is still open (best-effort) and log the summary
    pub async fn shutdown(&mut self) -> CancelReport {
        match self.state {
            EngineState::Stopped | EngineState::Stopping => return CancelReport::default(),
            EngineState::Idle => {
                self.state = EngineState::Stopped;
                return CancelReport::default();
            }
            EngineState::Running => {}
        }

        self.state = EngineState::Stopping;
        tracing::info!(
            "🧹 Stopping: cancelling {} open orders",
            self.orders.open_count()
        );

        let report = self.orders.cancel_all_open().await;
        self.stats.record_cancelled(report.cancelled.len());

        for (id, e) in &report.failures {
            tracing::error!("❌ Could not cancel order {} during shutdown: {}", id, e);
        }
        tracing::info!(
            "Cancelled {}, already gone {}, failed {}",
            report.cancelled.len(),
            report.already_gone.len(),
            report.failures.len()
        );

        self.stats.log_summary(self.config.dry_run, Utc::now());
        self.state = EngineState::Stopped;
        tracing::info!("👋 Volume engine stopped");

        report
    }
}
