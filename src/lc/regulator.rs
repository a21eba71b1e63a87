//! Light Controller PI regulator.
//!
//! Drives the linear lightness output so the measured ambient lux level
//! tracks the lux level of the current phase.  Separate coefficient pairs
//! apply when the output has to rise (`Kiu`, `Kpu`) or fall (`Kid`, `Kpd`).
//! Runs once per regulator interval.

use super::properties::{ACCURACY_UNKNOWN, LcPropertyState};

/// PI regulator state.
pub struct Regulator {
    kiu: f32,
    kid: f32,
    kpu: f32,
    kpd: f32,
    /// Dead band as a fraction of the setpoint.
    accuracy: f32,
    /// Target ambient lux level (lux).
    setpoint: f32,
    integral: f32,
    output_min: f32,
    output_max: f32,
}

impl Regulator {
    pub fn new(properties: &LcPropertyState) -> Self {
        let mut regulator = Self {
            kiu: 0.0,
            kid: 0.0,
            kpu: 0.0,
            kpd: 0.0,
            accuracy: 0.0,
            setpoint: 0.0,
            integral: 0.0,
            output_min: 0.0,
            output_max: f32::from(u16::MAX),
        };
        regulator.configure(properties);
        regulator
    }

    /// Reload the coefficients after a property write.
    pub fn configure(&mut self, p: &LcPropertyState) {
        self.kiu = p.regulator_kiu;
        self.kid = p.regulator_kid;
        self.kpu = p.regulator_kpu;
        self.kpd = p.regulator_kpd;
        self.accuracy = if p.regulator_accuracy == ACCURACY_UNKNOWN {
            0.0
        } else {
            f32::from(p.regulator_accuracy) / 200.0
        };
    }

    /// Set the target lux level, in hundredths of a lux.
    pub fn set_target(&mut self, centilux: u32) {
        self.setpoint = centilux as f32 / 100.0;
    }

    /// Lower bound of the output: the phase's linear lightness.
    pub fn set_floor(&mut self, linear: u16) {
        self.output_min = f32::from(linear);
    }

    /// One regulator step.  `ambient_centilux` is the latest ambient lux
    /// reading, `dt` the interval in seconds.  Returns the linear output.
    pub fn compute(&mut self, ambient_centilux: u32, dt: f32) -> u16 {
        let measured = ambient_centilux as f32 / 100.0;
        let raw_error = self.setpoint - measured;

        let band = self.setpoint * self.accuracy / 2.0;
        let error = if raw_error > band {
            raw_error - band
        } else if raw_error < -band {
            raw_error + band
        } else {
            0.0
        };

        let (kp, ki) = if error >= 0.0 {
            (self.kpu, self.kiu)
        } else {
            (self.kpd, self.kid)
        };

        // Integral (with anti-windup)
        self.integral += error * dt * ki;
        let output = (kp * error + self.integral).clamp(self.output_min, self.output_max);
        if output >= self.output_max || output <= self.output_min {
            self.integral -= error * dt * ki;
        }

        output as u16
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
    }
}
