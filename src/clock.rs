//! Timestamps and the estimator-owned visual-to-inertial time offset.
//!
//! All sensor clocks in the pipeline are expressed as seconds on the IMU
//! clock. Feature timestamps are aligned to it by adding the offset `td`
//! that the back-end estimates online.

use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic sensor timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos as f64 * 1e-9)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }
}

/// Shifting a timestamp by an offset in seconds (e.g. `t + td`).
impl Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: f64) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

/// The elapsed time between two timestamps, in seconds.
impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, rhs: Timestamp) -> f64 {
        self.0 - rhs.0
    }
}

/// The latest `td` estimate, published by the dispatcher and read by the
/// alignment engine without taking the estimator lock.
///
/// The offset is advisory: a stale read delays a batch by at most one
/// cycle, so release/acquire on the raw bits is all the synchronization
/// this needs.
pub struct TimeOffsetCell(AtomicU64);

impl TimeOffsetCell {
    pub fn new(td: f64) -> Self {
        Self(AtomicU64::new(td.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, td: f64) {
        self.0.store(td.to_bits(), Ordering::Release);
    }
}
