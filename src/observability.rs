//! Metrics hooks and TTL policies.

use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Tier that satisfied a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Local,
    Distributed,
    Database,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Local => write!(f, "local"),
            Tier::Distributed => write!(f, "distributed"),
            Tier::Database => write!(f, "database"),
        }
    }
}

/// Receives one callback per cache read.
///
/// All methods default to no-ops so implementors pick what they need.
pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, _key: &str, _tier: Tier, _duration: Duration) {}

    /// Every consulted tier missed.
    fn record_miss(&self, _key: &str, _duration: Duration) {}

    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Default metrics sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}

/// Lifetime of entries written to the distributed tier.
#[derive(Clone, Debug, PartialEq)]
pub enum TtlPolicy {
    Fixed(Duration),
    /// `base` plus a uniform random offset in `[0, jitter)`, so keys written
    /// together do not expire together.
    Jittered { base: Duration, jitter: Duration },
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Jittered {
            base: crate::config::DEFAULT_STRING_TTL,
            jitter: crate::config::DEFAULT_TTL_JITTER,
        }
    }
}

impl TtlPolicy {
    pub fn get_ttl(&self) -> Duration {
        match self {
            TtlPolicy::Fixed(ttl) => *ttl,
            TtlPolicy::Jittered { base, jitter } => {
                let span = jitter.as_millis() as u64;
                if span == 0 {
                    return *base;
                }
                *base + Duration::from_millis(rand::rng().random_range(0..span))
            }
        }
    }
}
