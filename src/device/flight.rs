//! Single-flight guard for polling cycles
//!
//! A cycle acquires a permit before doing any I/O. While the permit is held
//! further attempts get `None` and are dropped. The permit releases on drop,
//! so every exit path (success, error, or a cancelled future) frees the guard.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FlightPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                in_flight: &self.in_flight,
            })
    }
}

#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct FlightPermit<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
