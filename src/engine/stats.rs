use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative counters for one engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    // Volume (quote units)
    pub live_volume: f64,
    pub simulated_volume: f64,

    // Orders
    pub orders_attempted: u64,
    pub orders_placed: u64,
    pub orders_failed: u64,
    pub orders_cancelled: u64,

    // Cycles
    pub cycles_run: u64,
    pub cycles_skipped: u64,

    pub started_at: DateTime<Utc>,
    pub last_order_at: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            live_volume: 0.0,
            simulated_volume: 0.0,
            orders_attempted: 0,
            orders_placed: 0,
            orders_failed: 0,
            orders_cancelled: 0,
            cycles_run: 0,
            cycles_skipped: 0,
            started_at,
            last_order_at: None,
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.live_volume + self.simulated_volume
    }

    pub fn record_cycle(&mut self) {
        self.cycles_run += 1;
    }

    pub fn record_skip(&mut self) {
        self.cycles_skipped += 1;
    }

    pub fn record_attempt(&mut self) {
        self.orders_attempted += 1;
    }

    /// Count a confirmed placement; `simulated` routes the notional to the dry-run bucket
    pub fn record_placement(&mut self, notional: f64, simulated: bool, at: DateTime<Utc>) {
        self.orders_placed += 1;
        if simulated {
            self.simulated_volume += notional;
        } else {
            self.live_volume += notional;
        }
        self.last_order_at = Some(at);
    }

    pub fn record_failure(&mut self) {
        self.orders_failed += 1;
    }

    pub fn record_cancelled(&mut self, count: usize) {
        self.orders_cancelled += count as u64;
    }

    /// Placed / attempted, in percent
    pub fn success_rate(&self) -> f64 {
        if self.orders_attempted == 0 {
            return 0.0;
        }
        self.orders_placed as f64 / self.orders_attempted as f64 * 100.0
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    pub fn volume_per_hour(&self, now: DateTime<Utc>) -> f64 {
        let hours = self.elapsed(now).num_milliseconds() as f64 / 3_600_000.0;
        if hours <= 0.0 {
            return 0.0;
        }
        self.total_volume() / hours
    }

    pub fn log_summary(&self, dry_run: bool, now: DateTime<Utc>) {
        let elapsed = self.elapsed(now);

        tracing::info!("\n{}", "=".repeat(50));
        tracing::info!("📈 VOLUME BOT SUMMARY");
        tracing::info!("{}", "=".repeat(50));
        tracing::info!(
            "Runtime: {}h {}m {}s",
            elapsed.num_hours(),
            elapsed.num_minutes() % 60,
            elapsed.num_seconds() % 60
        );
        tracing::info!(
            "Cycles: {} run, {} skipped",
            self.cycles_run,
            self.cycles_skipped
        );
        tracing::info!(
            "Orders: {} placed / {} attempted ({} failed, {:.1}% success)",
            self.orders_placed,
            self.orders_attempted,
            self.orders_failed,
            self.success_rate()
        );
        tracing::info!("Orders Cancelled: {}", self.orders_cancelled);
        tracing::info!(
            "Total Volume: {:.2} (live {:.2}, simulated {:.2})",
            self.total_volume(),
            self.live_volume,
            self.simulated_volume
        );
        tracing::info!("Volume/Hour: {:.2}", self.volume_per_hour(now));
        match self.last_order_at {
            Some(at) => tracing::info!("Last Order: {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => tracing::info!("Last Order: none"),
        }
        tracing::info!("Dry Run Mode: {}", if dry_run { "✅" } else { "❌" });
        tracing::info!("{}", "=".repeat(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_is_split_by_mode() {
        let start = Utc::now();
        let mut stats = RunStats::new(start);

        stats.record_attempt();
        stats.record_placement(20.0, true, start);
        stats.record_attempt();
        stats.record_placement(30.0, false, start);

        assert_eq!(stats.simulated_volume, 20.0);
        assert_eq!(stats.live_volume, 30.0);
        assert_eq!(stats.total_volume(), 50.0);
        assert_eq!(stats.orders_placed, 2);
        assert_eq!(stats.last_order_at, Some(start));
    }

    #[test]
    fn test_success_rate() {
        let mut stats = RunStats::new(Utc::now());
        assert_eq!(stats.success_rate(), 0.0);

        for _ in 0..4 {
            stats.record_attempt();
        }
        stats.record_placement(10.0, true, Utc::now());
        stats.record_failure();
        assert_eq!(stats.success_rate(), 25.0);
    }

    #[test]
    fn test_volume_per_hour() {
        let start = Utc::now();
        let mut stats = RunStats::new(start);
        stats.record_placement(150.0, false, start);

        let later = start + Duration::minutes(30);
        assert!((stats.volume_per_hour(later) - 300.0).abs() < 1e-9);
        assert_eq!(stats.volume_per_hour(start), 0.0);
    }
}
