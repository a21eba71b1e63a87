//! Monotonic clock adapter.
//!
//! Provides the 32 768 Hz tick count the soft timers run on.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side real-time runs.

use crate::timer::TICKS_PER_SEC;

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic, wraps at `u64::MAX`).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic, wraps at `u64::MAX`).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Low-frequency ticks since boot.
    pub fn now_ticks(&self) -> u64 {
        us_to_ticks(self.uptime_us())
    }

    /// Block the calling thread until `ticks` (no-op if already past).
    #[cfg(not(target_os = "espidf"))]
    pub fn wait_until(&self, ticks: u64) {
        let now = self.now_ticks();
        if ticks > now {
            let us = (ticks - now) * 1_000_000 / TICKS_PER_SEC;
            std::thread::sleep(std::time::Duration::from_micros(us));
        }
    }
}

fn us_to_ticks(us: u64) -> u64 {
    (u128::from(us) * u128::from(TICKS_PER_SEC) / 1_000_000) as u64
}
