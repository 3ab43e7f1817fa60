use rand::Rng;
use std::time::Duration;

/// Doubling retry delay, capped, reset on the next successful acquisition.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        let base = base.min(cap);
        Self { base, cap, current: base }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Returns the delay to wait now and doubles the next one up to the cap.
    pub fn escalate(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        delay
    }
}

/// `delay` plus a uniform random extra in `0..=max_jitter`.
pub fn with_jitter(delay: Duration, max_jitter: Duration) -> Duration {
    let max_ms = max_jitter.as_millis() as u64;
    if max_ms == 0 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..=max_ms);
    delay + Duration::from_millis(extra)
}
