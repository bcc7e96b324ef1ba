use crate::config::MAX_PACING_WINDOW_SECS;
use chrono::{DateTime, Duration, Utc};

/// Fixed-length volume bucket the engine paces against
#[derive(Debug, Clone)]
pub struct PacingWindow {
    length: Duration,
    target: f64,
    started_at: DateTime<Utc>,
    volume: f64,
}

impl PacingWindow {
    /// Lengths above `MAX_PACING_WINDOW_SECS` are capped
    pub fn new(length_secs: u64, target: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            length: Duration::seconds(length_secs.min(MAX_PACING_WINDOW_SECS) as i64),
            target,
            started_at,
            volume: 0.0,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Volume still allowed before the window's target is met
    pub fn remaining(&self) -> f64 {
        (self.target - self.volume).max(0.0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() <= 0.0
    }

    pub fn record(&mut self, notional: f64) {
        self.volume += notional;
    }

    /// Start a fresh window if the current one has elapsed; returns true on rollover.
    ///
    /// Windows are aligned to the original start, so a long stall skips
    /// straight to the window containing `now`.
    pub fn roll_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if self.length <= Duration::zero() || now - self.started_at < self.length {
            return false;
        }

        let length_ms = self.length.num_milliseconds();
        let elapsed_windows = (now - self.started_at).num_milliseconds() / length_ms;
        self.started_at += Duration::milliseconds(elapsed_windows * length_ms);
        self.volume = 0.0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_budget_shrinks() {
        let mut window = PacingWindow::new(3600, 100.0, Utc::now());
        window.record(30.0);
        assert_eq!(window.remaining(), 70.0);
        window.record(80.0);
        assert_eq!(window.remaining(), 0.0);
        assert!(window.is_exhausted());
    }

    #[test]
    fn test_rollover_resets_volume() {
        let start = Utc::now();
        let mut window = PacingWindow::new(3600, 100.0, start);
        window.record(100.0);

        assert!(!window.roll_if_elapsed(start + Duration::minutes(59)));
        assert!(window.is_exhausted());

        assert!(window.roll_if_elapsed(start + Duration::minutes(61)));
        assert_eq!(window.volume(), 0.0);
        assert_eq!(window.started_at(), start + Duration::hours(1));
    }

    #[test]
    fn test_rollover_skips_missed_windows() {
        let start = Utc::now();
        let mut window = PacingWindow::new(600, 50.0, start);

        assert!(window.roll_if_elapsed(start + Duration::minutes(35)));
        assert_eq!(window.started_at(), start + Duration::minutes(30));
    }

    #[test]
    fn test_oversized_length_is_capped() {
        let start = Utc::now();
        let mut window = PacingWindow::new(u64::MAX, 100.0, start);
        window.record(100.0);

        let week = Duration::seconds(MAX_PACING_WINDOW_SECS as i64);
        assert!(!window.roll_if_elapsed(start + week - Duration::seconds(1)));
        assert!(window.roll_if_elapsed(start + week));
        assert_eq!(window.volume(), 0.0);
    }
}
