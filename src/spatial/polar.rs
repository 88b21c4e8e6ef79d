// Directional gain model (ILD)
// Interpolates a measured polar response per ear and converts it to a linear gain

use std::f32::consts::TAU;

use crate::error::{Error, Result};

/// Number of entries in each polar response table
pub const TABLE_LEN: usize = 24;

/// Angular distance between two table entries in degrees
pub const TABLE_PITCH_DEG: f32 = 360.0 / TABLE_LEN as f32;

/// Right ear response in dB, starting straight ahead and rotating towards the right ear
const RIGHT_EAR_DB: [f32; TABLE_LEN] = [
    0.0, 2.7, 5.0, 7.5, 8.5, 9.3, 9.7, 7.7, 4.9, 2.0, -1.5, -3.5, -5.0, -6.5, -9.0, -12.0, -13.0,
    -13.0, -12.0, -11.0, -10.5, -8.0, -5.0, -2.5,
];

/// Left ear response in dB; the right ear's table mirrored around 0°
const LEFT_EAR_DB: [f32; TABLE_LEN] = [
    0.0, -2.5, -5.0, -8.0, -10.5, -11.0, -12.0, -13.0, -13.0, -12.0, -9.0, -6.5, -5.0, -3.5, -1.5,
    2.0, 4.9, 7.7, 9.7, 9.3, 8.5, 7.5, 5.0, 2.7,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarSide {
    Left,
    Right,
}

/// A polar intensity diagram for one ear
#[derive(Debug, Clone, Copy)]
pub struct PolarResponse {
    entries: &'static [f32; TABLE_LEN],
}

impl PolarResponse {
    pub fn for_ear(side: EarSide) -> Self {
        let entries = match side {
            EarSide::Left => &LEFT_EAR_DB,
            EarSide::Right => &RIGHT_EAR_DB,
        };
        Self { entries }
    }

    /// Interpolated attenuation in dB at `angle` radians.
    ///
    /// The table is circular: angles between the last entry (345°) and 360°
    /// interpolate towards entry 0.
    pub fn decibels(&self, angle: f32) -> Result<f32> {
        let degrees = normalize_degrees(angle)?;

        let position = degrees / TABLE_PITCH_DEG;
        let low_index = (position.floor() as usize) % TABLE_LEN;
        let high_index = (low_index + 1) % TABLE_LEN;
        let ratio = position - low_index as f32;

        let low = self.entries[low_index];
        let high = self.entries[high_index];
        Ok(low * (1.0 - ratio) + high * ratio)
    }

    /// Linear gain factor at `angle` radians: `10^(dB / 20)`
    pub fn gain(&self, angle: f32) -> Result<f32> {
        let db = self.decibels(angle)?;
        Ok(10.0_f32.powf(db / 20.0))
    }
}

/// Linear gain for `side` with the source at `angle` radians (0 ahead, positive towards the right ear)
pub fn gain(side: EarSide, angle: f32) -> Result<f32> {
    PolarResponse::for_ear(side).gain(angle)
}

/// Converts radians to degrees in `[0, 360)`. Fails on non-finite input.
pub(crate) fn normalize_degrees(angle: f32) -> Result<f32> {
    if !angle.is_finite() {
        return Err(Error::Domain(angle));
    }
    // Reduce before converting; to_degrees overflows above ~5.9e36 rad
    let degrees = angle.rem_euclid(TAU).to_degrees();
    // rem_euclid rounds tiny negative inputs up to a full turn in f32
    Ok(if degrees >= 360.0 { 0.0 } else { degrees })
}
