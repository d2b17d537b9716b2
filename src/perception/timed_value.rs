//! timed_value.rs
//! Single-slot cache whose contents expire after a fixed timeout.
//!
//! The sensing thread overwrites a slot on every recognition, the control thread
//! reads it. Value and timestamp live behind one lock so a reader never pairs a
//! new value with an old timestamp.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::StaleError;

/// A value together with the instant it was stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedReading<T> {
    pub value: T,
    pub timestamp: Instant,
}

impl<T> TimedReading<T> {
    /// Age at `now`; zero if `now` precedes the timestamp.
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}

pub struct TimeBoundedValue<T> {
    timeout: Duration,
    slot: Mutex<Option<TimedReading<T>>>,
}

impl<T: Clone> TimeBoundedValue<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: Mutex::new(None),
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store `value` stamped with the current instant, replacing any previous reading.
    pub fn set(&self, value: T) {
        self.set_at(value, Instant::now());
    }

    pub fn set_at(&self, value: T, timestamp: Instant) {
        *self.slot.lock() = Some(TimedReading { value, timestamp });
    }

    /// Stored value, provided it is no older than the timeout.
    pub fn get(&self) -> Result<T, StaleError> {
        self.get_at(Instant::now())
    }

    pub fn get_at(&self, now: Instant) -> Result<T, StaleError> {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(reading) => {
                let age = reading.age_at(now);
                if age <= self.timeout {
                    Ok(reading.value.clone())
                } else {
                    Err(StaleError {
                        age: Some(age),
                        timeout: self.timeout,
                    })
                }
            }
            None => Err(StaleError {
                age: None,
                timeout: self.timeout,
            }),
        }
    }

    /// Last reading regardless of age.
    pub fn latest(&self) -> Option<TimedReading<T>> {
        self.slot.lock().clone()
    }
}

impl<T: Clone> std::fmt::Debug for TimeBoundedValue<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBoundedValue")
            .field("timeout", &self.timeout)
            .field("reading", &self.latest())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn never_set_is_stale() {
        let slot: TimeBoundedValue<u32> = TimeBoundedValue::new(Duration::from_secs(1));
        let err = slot.get().unwrap_err();
        assert_eq!(err.age, None);
        assert_eq!(err.timeout, Duration::from_secs(1));
    }

    #[test]
    fn fresh_iff_age_within_timeout() {
        let timeouts = [0u64, 1, 10, 250, 1_000];
        let delays = [0u64, 1, 9, 10, 11, 249, 250, 251, 999, 1_000, 1_001];
        for &t in &timeouts {
            let slot = TimeBoundedValue::new(Duration::from_millis(t));
            let start = Instant::now();
            for &d in &delays {
                slot.set_at(d, start);
                let result = slot.get_at(start + Duration::from_millis(d));
                assert_eq!(result.is_ok(), d <= t, "timeout={}ms delay={}ms", t, d);
                if d <= t {
                    assert_eq!(result.unwrap(), d);
                }
            }
        }
    }

    #[test]
    fn later_set_overwrites_and_refreshes() {
        let slot = TimeBoundedValue::new(Duration::from_millis(100));
        let start = Instant::now();
        slot.set_at("old", start);
        let later = start + Duration::from_millis(150);
        assert!(slot.get_at(later).is_err());

        slot.set_at("new", later);
        assert_eq!(slot.get_at(later + Duration::from_millis(100)), Ok("new"));
        let err = slot.get_at(later + Duration::from_millis(101)).unwrap_err();
        assert_eq!(err.age, Some(Duration::from_millis(101)));
    }

    #[test]
    fn read_before_timestamp_counts_as_fresh() {
        let slot = TimeBoundedValue::new(Duration::ZERO);
        let start = Instant::now();
        slot.set_at(7, start + Duration::from_millis(5));
        assert_eq!(slot.get_at(start), Ok(7));
    }

    #[test]
    fn concurrent_writer_never_tears_reading() {
        let slot = Arc::new(TimeBoundedValue::new(Duration::from_secs(10)));
        let writer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 0..10_000u64 {
                    slot.set((i, i * 2));
                }
            })
        };
        for _ in 0..10_000 {
            if let Ok((a, b)) = slot.get() {
                assert_eq!(b, a * 2);
            }
        }
        writer.join().unwrap();
        assert_eq!(slot.get(), Ok((9_999, 19_998)));
    }
}
