//! Si7021 humidity / temperature conversions and the sample history.

use heapless::HistoryBuffer;

/// Number of recent humidity samples kept.
pub const HISTORY_DEPTH: usize = 10;

/// "Measure relative humidity, no hold master" command.
pub const MEASURE_RH_NO_HOLD: u8 = 0xF5;

/// Relative humidity (%RH) from a raw 16-bit reading.
pub fn humidity_from_raw(raw: u16) -> f32 {
    125.0 * f32::from(raw) / 65536.0 - 6.0
}

/// Temperature (°C) from a raw 16-bit reading.
pub fn temperature_from_raw(raw: u16) -> f32 {
    175.72 * f32::from(raw) / 65536.0 - 46.85
}

/// Bounded ring of the most recent humidity samples.
pub struct HumidityHistory {
    ring: HistoryBuffer<f32, HISTORY_DEPTH>,
}

impl HumidityHistory {
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuffer::new(),
        }
    }

    pub fn push(&mut self, humidity: f32) {
        self.ring.write(humidity);
    }

    pub fn latest(&self) -> Option<f32> {
        self.ring.recent().copied()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.ring.oldest_ordered()
    }

    pub fn average(&self) -> Option<f32> {
        if self.ring.is_empty() {
            return None;
        }
        let sum: f32 = self.ring.iter().sum();
        Some(sum / self.ring.len() as f32)
    }
}

impl Default for HumidityHistory {
    fn default() -> Self {
        Self::new()
    }
}
