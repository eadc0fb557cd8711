//! Randomized pause after each network fetch.
//!
//! Spreading requests over a random interval keeps a batch from hitting an
//! image host in lockstep. The pause only follows real fetches; cache hits
//! return immediately.

use std::time::Duration;

use rand::Rng;
use tracing::trace;

/// Uniform random delay in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JitterDelay {
    min: Duration,
    max: Duration,
}

impl JitterDelay {
    /// Creates a delay range. Callers guarantee `min <= max`; the config
    /// builder rejects anything else. Inverted bounds are swapped.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns true when the range is `[0, 0]`.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws one delay.
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let mut rng = rand::thread_rng();
        let nanos = rng.gen_range(self.min.as_nanos()..=self.max.as_nanos());
        // Both bounds came from Durations, so the sample fits back into one.
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Sleeps for one sampled delay, returning how long it waited.
    pub async fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            trace!(delay_ms = delay.as_millis(), "waiting before next request");
            tokio::time::sleep(delay).await;
        }
        delay
    }
}
