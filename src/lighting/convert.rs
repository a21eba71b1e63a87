//! Lightness and level scale conversions.
//!
//! Linear lightness is perceptual: `actual² ≈ 65535 · linear`.  Levels are
//! signed 16-bit and map onto the unsigned lightness range by an offset of
//! 32768.  The secondary level maps linearly onto the temperature range.

/// Actual → linear lightness, rounding up.
pub fn actual_to_linear(actual: u16) -> u16 {
    let a = u32::from(actual);
    let linear = (a * a + 65_534) / 65_535;
    // actual ≤ 65535 keeps the quotient ≤ 65535
    linear as u16
}

/// Linear → actual lightness, `floor(sqrt(65535 · linear))`.
pub fn linear_to_actual(linear: u16) -> u16 {
    let product = 65_535u32 * u32::from(linear);
    let root = product.isqrt();
    root.min(u32::from(u16::MAX)) as u16
}

/// Primary level → lightness.
pub fn lightness_from_level(level: i16) -> u16 {
    (i32::from(level) + 32_768) as u16
}

/// Lightness → primary level.
pub fn level_from_lightness(lightness: u16) -> i16 {
    (i32::from(lightness) - 32_768) as i16
}

/// Secondary level → colour temperature within `[min, max]`.
pub fn temperature_from_level(level: i16, min: u16, max: u16) -> u16 {
    if max <= min {
        return min;
    }
    let span = u32::from(max - min);
    let offset = (i32::from(level) + 32_768) as u32;
    min + (offset * span / 65_535) as u16
}

/// Colour temperature → secondary level.  Temperatures outside the range
/// saturate at the level extremes.
pub fn level_from_temperature(temperature: u16, min: u16, max: u16) -> i16 {
    if max <= min {
        return i16::MIN;
    }
    let t = temperature.clamp(min, max);
    let span = u32::from(max - min);
    let scaled = u32::from(t - min) * 65_535 / span;
    (scaled as i32 - 32_768) as i16
}

/// Light Controller linear output → actual lightness for the LED.
pub fn lightness_from_lc_output(linear_output: u16) -> u16 {
    linear_to_actual(linear_output)
}
