//! Clock abstraction so callers never reach for `Utc::now()` directly.
//!
//! Threading a `Clock` through constructors (rather than a global) keeps
//! fill timestamps, order timestamps, and id generation deterministic in
//! tests.

use chrono::{DateTime, Utc};

use crate::id::Id;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn new_id(&self) -> Id {
        Id::new(self.now())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests: advances only when told to.
#[derive(Debug)]
pub struct FixedClock {
    current: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self {
            current: std::sync::Mutex::new(ts),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut c = self.current.lock().unwrap();
        *c += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }
}
