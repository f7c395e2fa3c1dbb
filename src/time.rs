//! Time sources for bounded waits and reconnection bookkeeping.
//!
//! Every wait in the MQTT session is measured against a [`Clock`] handed to
//! the session at construction. Firmware plugs in its hardware timer, hosted
//! builds use [`StdClock`], and tests use a clock that only moves when told.

/// A source of time for the session.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Wall-clock seconds since the Unix epoch.
    ///
    /// Used for reconnection state that outlives the process, so it must be
    /// comparable across restarts.
    fn unix_time(&self) -> u64;

    /// Block the current flow of control for `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);
}

/// [`Clock`] backed by `std::time` and `std::thread::sleep`.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Create a clock whose monotonic origin is now.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn unix_time(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn sleep_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
