use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Coarse ledger timestamp in whole seconds.
///
/// All operations share a single logical clock; the value only ever moves
/// forward and two events may carry the same timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerTime(u64);

impl LedgerTime {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn secs(&self) -> u64 {
        self.0
    }

    /// The zero time (ledger genesis).
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn saturating_add(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Returns `true` if this time is strictly after `other`.
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

impl fmt::Display for LedgerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Width of one ownership bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketDuration(u64);

impl BucketDuration {
    pub fn from_secs(secs: u64) -> Result<Self, TypeError> {
        if secs == 0 {
            return Err(TypeError::ZeroBucketDuration);
        }
        Ok(Self(secs))
    }

    pub const fn secs(&self) -> u64 {
        self.0
    }

    /// Apply a floor: the returned duration is never shorter than `min`.
    pub fn at_least(self, min: BucketDuration) -> Self {
        Self(self.0.max(min.0))
    }

    /// The bucket containing `time`.
    pub fn align(&self, time: LedgerTime) -> Bucket {
        Bucket(time.0 / self.0 * self.0)
    }

    /// Index of the bucket containing `time` (`time / duration`).
    pub fn index_of(&self, time: LedgerTime) -> u64 {
        time.0 / self.0
    }
}

impl fmt::Display for BucketDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Start timestamp of a bucket, always a multiple of the bucket duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket(u64);

impl Bucket {
    pub fn start(&self) -> LedgerTime {
        LedgerTime(self.0)
    }

    pub fn index(&self, duration: BucketDuration) -> u64 {
        self.0 / duration.0
    }

    pub fn next(&self, duration: BucketDuration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Monotonic source of ledger time.
pub trait Clock: Send + Sync {
    fn now(&self) -> LedgerTime;
}

/// Wall-clock seconds since the UNIX epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> LedgerTime {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        LedgerTime(secs)
    }
}

/// Manually driven clock for simulations and tests.
///
/// Setting the clock backwards is ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    pub fn new(start: LedgerTime) -> Self {
        Self {
            secs: AtomicU64::new(start.0),
        }
    }

    /// Move the clock forward by `secs`, returning the new time.
    pub fn advance(&self, secs: u64) -> LedgerTime {
        let prev = self.secs.fetch_add(secs, Ordering::SeqCst);
        LedgerTime(prev.saturating_add(secs))
    }

    /// Jump to `time` if it is not in the past.
    pub fn set(&self, time: LedgerTime) -> LedgerTime {
        let prev = self.secs.fetch_max(time.0, Ordering::SeqCst);
        LedgerTime(prev.max(time.0))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> LedgerTime {
        LedgerTime(self.secs.load(Ordering::SeqCst))
    }
}
