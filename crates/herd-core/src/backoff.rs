//! Backoff policy: jittered redelivery schedules.

use std::time::Duration;

use rand::Rng;

/// Base wait times between redelivery attempts, before jitter.
pub const BASE_DELAYS_MS: [u64; 5] = [1000, 2000, 4000, 8000, 16000];

/// Generates redelivery schedules: a fixed base ladder plus per-entry jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delays: Vec<Duration>,
    /// Jitter added to each entry, drawn uniformly from `[1ms, max_jitter]`.
    pub max_jitter: Duration,
}

impl BackoffPolicy {
    /// The stock policy: 1s/2s/4s/8s/16s with up to 1s of jitter per entry.
    pub fn standard() -> Self {
        Self {
            base_delays: BASE_DELAYS_MS.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            max_jitter: Duration::from_millis(1000),
        }
    }

    /// Draw one schedule. Jitter is sampled independently per entry and then
    /// frozen: a router keeps the schedule it drew at construction for its
    /// whole lifetime rather than re-rolling per enqueue or per retry.
    pub fn schedule(&self) -> Vec<Duration> {
        let cap = self.max_jitter.as_millis().max(1) as u64;
        let mut rng = rand::thread_rng();
        self.base_delays
            .iter()
            .map(|&base| base + Duration::from_millis(rng.gen_range(1..=cap)))
            .collect()
    }
}

/// One fresh schedule from the stock policy.
pub fn default_schedule() -> Vec<Duration> {
    BackoffPolicy::standard().schedule()
}
