//! Time utilities for write stamps and request timing

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Last write stamp handed out, in microseconds since the Unix epoch
static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Get the current time truncated to microseconds (the precision of `timestamptz`)
pub fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Timestamp for `created_at`/`updated_at` columns.
///
/// Stamps are strictly increasing within the process, so a record written
/// twice in the same microsecond still gets a later `updated_at`.
pub fn write_stamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_STAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_STAMP_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(now_micros),
            Err(actual) => prev = actual,
        }
    }
}

/// A simple timer for measuring request durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
