//! Exponential backoff with injectable jitter
//!
//! `delay(n) = min(base * 2^n + U[0, base * 2^n], max_delay)` unless a rate-limit
//! response supplied a wait hint, which is used as-is up to `max_retry_after`.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the random component added to each computed delay
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// Sample uniformly from `[0, upper]`
    fn sample(&self, upper: Duration) -> Duration;
}

fn sample_with<R: Rng + ?Sized>(rng: &mut R, upper: Duration) -> Duration {
    let upper_nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
    if upper_nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.gen_range(0..=upper_nanos))
}

/// Thread-local OS-seeded randomness
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self, upper: Duration) -> Duration {
        sample_with(&mut rand::thread_rng(), upper)
    }
}

/// Reproducible randomness for tests and simulations
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self, upper: Duration) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sample_with(&mut *rng, upper)
    }
}

/// No randomness; delays are exactly `base * 2^n`
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&self, _upper: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Backoff configuration shared by every call on a client
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry, before jitter
    pub base_delay: Duration,
    /// Ceiling on computed delays
    pub max_delay: Duration,
    /// Ceiling on server-supplied Retry-After hints
    pub max_retry_after: Duration,
    jitter: Arc<dyn JitterSource>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(120),
            jitter: Arc::new(ThreadRngJitter),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Disable jitter entirely
    pub fn without_jitter(self) -> Self {
        self.with_jitter(Arc::new(NoJitter))
    }

    /// Exponential component for a zero-based attempt, capped
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Wait before the attempt following `attempt`
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_retry_after);
        }

        let computed = self.exponential(attempt);
        computed
            .saturating_add(self.jitter.sample(computed))
            .min(self.max_delay)
    }
}
