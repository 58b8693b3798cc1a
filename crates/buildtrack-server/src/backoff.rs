//! Spacing between recompute passes while the database keeps failing.
//!
//! A pass that cannot list pending projects usually means the database file is
//! locked or gone. Ticking on the watch interval would retry and log on every tick.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PassBackoff {
    watch_interval: Duration,
    ceiling: Duration,
    delay: Duration,
    failed_passes: u32,
    resume_at: Option<Instant>,
}

impl PassBackoff {
    pub fn new(watch_interval: Duration, ceiling: Duration) -> Self {
        let watch_interval = watch_interval.max(Duration::from_millis(1));
        Self {
            watch_interval,
            ceiling: ceiling.max(watch_interval),
            delay: watch_interval,
            failed_passes: 0,
            resume_at: None,
        }
    }

    /// Whether a pass may start at `now`.
    pub fn should_run(&self, now: Instant) -> bool {
        self.resume_at.map_or(true, |at| now >= at)
    }

    /// Clear the failure streak. Returns its length if there was one.
    pub fn pass_succeeded(&mut self) -> Option<u32> {
        let streak = std::mem::take(&mut self.failed_passes);
        self.delay = self.watch_interval;
        self.resume_at = None;
        (streak > 0).then_some(streak)
    }

    /// Double the wait, up to the ceiling, and return it.
    pub fn pass_failed(&mut self, now: Instant) -> Duration {
        self.failed_passes += 1;
        self.delay = self.delay.saturating_mul(2).min(self.ceiling);
        self.resume_at = Some(now + self.delay);
        self.delay
    }

    pub fn failed_passes(&self) -> u32 {
        self.failed_passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_passes_wait_longer_up_to_the_ceiling() {
        let start = Instant::now();
        let mut backoff = PassBackoff::new(Duration::from_secs(5), Duration::from_secs(30));
        assert!(backoff.should_run(start));

        let waits: Vec<u64> = (0..4).map(|_| backoff.pass_failed(start).as_secs()).collect();
        assert_eq!(waits, vec![10, 20, 30, 30]);
        assert_eq!(backoff.failed_passes(), 4);
        assert!(!backoff.should_run(start + Duration::from_secs(29)));
        assert!(backoff.should_run(start + Duration::from_secs(30)));
    }

    #[test]
    fn success_ends_the_streak() {
        let start = Instant::now();
        let mut backoff = PassBackoff::new(Duration::from_secs(1), Duration::from_secs(4));
        assert_eq!(backoff.pass_succeeded(), None);

        backoff.pass_failed(start);
        backoff.pass_failed(start);
        assert_eq!(backoff.pass_succeeded(), Some(2));
        assert!(backoff.should_run(start));
        assert_eq!(backoff.pass_failed(start), Duration::from_secs(2));
    }

    #[test]
    fn ceiling_below_interval_is_raised() {
        let start = Instant::now();
        let mut backoff = PassBackoff::new(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(backoff.pass_failed(start), Duration::from_secs(60));
    }
}
