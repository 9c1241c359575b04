//! Injectable wall clock for the decision loop.
//!
//! The decision loop keys off hour/minute/second boundaries; injecting the
//! clock lets tests walk through those boundaries without waiting. Note this
//! is only the *local* tick clock — heartbeat timestamps always come from the
//! store, never from here.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait CoordClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
pub struct SystemClock;

impl CoordClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock tests move by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl CoordClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
