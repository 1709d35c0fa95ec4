//! Wall clock behind status timestamps, staleness and retention ages

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn utc_now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when a test advances it
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let step = chrono::Duration::from_std(by).unwrap();
        *self.now.lock().unwrap() += step;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
