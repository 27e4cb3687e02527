//! Shared processor contract types.

use std::time::Duration;

/// Result of one `process_batch` invocation. `done` means the campaign has
/// no work left; `processed` is how many items this batch handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub done: bool,
    pub processed: u64,
}

/// Sleep needed to keep a campaign under its items-per-minute cap after
/// processing `processed` items in `elapsed`. `None` when uncapped or
/// already slower than the cap.
pub fn throttle_delay(
    processed: u64,
    speed_per_minute: Option<i32>,
    elapsed: Duration,
) -> Option<Duration> {
    let cap = speed_per_minute.filter(|&s| s > 0)? as u64;
    if processed == 0 {
        return None;
    }
    let budget = Duration::from_secs_f64(processed as f64 * 60.0 / cap as f64);
    budget.checked_sub(elapsed).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_never_sleeps() {
        assert_eq!(throttle_delay(100, None, Duration::from_secs(1)), None);
        assert_eq!(throttle_delay(100, Some(0), Duration::from_secs(1)), None);
    }

    #[test]
    fn fast_batches_sleep_out_the_budget() {
        // 60 items/min -> 1 item per second; 30 items in 5s owes ~25s.
        let d = throttle_delay(30, Some(60), Duration::from_secs(5)).unwrap();
        assert!(d > Duration::from_secs(24) && d <= Duration::from_secs(25));
    }

    #[test]
    fn slow_batches_owe_nothing() {
        assert_eq!(throttle_delay(10, Some(600), Duration::from_secs(60)), None);
    }
}
