// Head delay model (ITD)
// Spherical head approximation of the arrival time difference between the two ears

use std::f32::consts::FRAC_PI_2;

use crate::error::Result;
use crate::spatial::polar::normalize_degrees;

/// Average head radius in meters
pub const HEAD_RADIUS_M: f32 = 0.0762;

/// Speed of sound in air in meters/second
pub const SPEED_OF_SOUND_M_S: f32 = 340.29;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadModel {
    pub radius_m: f32,
    pub speed_of_sound_m_s: f32,
}

impl Default for HeadModel {
    fn default() -> Self {
        Self {
            radius_m: HEAD_RADIUS_M,
            speed_of_sound_m_s: SPEED_OF_SOUND_M_S,
        }
    }
}

impl HeadModel {
    /// Interaural delay in seconds for a source at `angle` radians.
    ///
    /// Woodworth-Schlosberg: `r / c * (θ + sin θ)` evaluated on the folded angle.
    /// Positive when the source sits on the right, zero straight ahead or behind.
    pub fn interaural_delay(&self, angle: f32) -> Result<f32> {
        let folded = fold_azimuth(angle)?;
        Ok(self.radius_m / self.speed_of_sound_m_s * (folded + folded.sin()))
    }

    /// Largest delay this head can produce, reached with the source beside either ear
    pub fn max_delay(&self) -> f32 {
        self.radius_m / self.speed_of_sound_m_s * (FRAC_PI_2 + 1.0)
    }
}

/// Folds an azimuth in radians onto `[-π/2, π/2]` radians.
///
/// Angles behind the head are reflected around 180° so the delay peaks at
/// either ear and falls back to zero directly behind. In degrees:
///
/// | input (mod 360) | output      |
/// |-----------------|-------------|
/// | `[0, 90)`       | unchanged   |
/// | `[90, 270]`     | `180 - a`   |
/// | `(270, 360)`    | `a - 360`   |
pub fn fold_azimuth(angle: f32) -> Result<f32> {
    let degrees = normalize_degrees(angle)?;
    let folded = if (90.0..=270.0).contains(&degrees) {
        180.0 - degrees
    } else if degrees > 270.0 {
        degrees - 360.0
    } else {
        degrees
    };
    Ok(folded.to_radians().clamp(-FRAC_PI_2, FRAC_PI_2))
}

/// Interaural delay for the default head
pub fn interaural_delay(angle: f32) -> Result<f32> {
    HeadModel::default().interaural_delay(angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f32::consts::PI;

    fn deg(d: f32) -> f32 {
        d.to_radians()
    }

    #[test]
    fn test_fold_boundaries() {
        assert_abs_diff_eq!(fold_azimuth(deg(0.0)).unwrap(), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(fold_azimuth(deg(45.0)).unwrap(), deg(45.0), epsilon = 1e-5);
        assert_abs_diff_eq!(fold_azimuth(deg(90.0)).unwrap(), deg(90.0), epsilon = 1e-4);
        assert_abs_diff_eq!(fold_azimuth(deg(135.0)).unwrap(), deg(45.0), epsilon = 1e-4);
        assert_abs_diff_eq!(fold_azimuth(deg(180.0)).unwrap(), 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fold_azimuth(deg(225.0)).unwrap(), deg(-45.0), epsilon = 1e-4);
        assert_abs_diff_eq!(fold_azimuth(deg(270.0)).unwrap(), deg(-90.0), epsilon = 1e-4);
        assert_abs_diff_eq!(fold_azimuth(deg(315.0)).unwrap(), deg(-45.0), epsilon = 1e-4);
    }

    #[test]
    fn test_fold_stays_in_range() {
        for step in -720..720 {
            let folded = fold_azimuth(step as f32 * 0.01).unwrap();
            assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&folded));
        }
    }

    #[test]
    fn test_no_delay_straight_ahead() {
        assert_eq!(interaural_delay(0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_no_delay_directly_behind() {
        assert_abs_diff_eq!(interaural_delay(PI).unwrap(), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_delay_is_odd() {
        for step in 1..90 {
            let angle = deg(step as f32);
            let right = interaural_delay(angle).unwrap();
            let left = interaural_delay(-angle).unwrap();
            assert!(right > 0.0);
            assert_abs_diff_eq!(left, -right, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_delay_peaks_beside_the_ear() {
        let head = HeadModel::default();
        let max = head.max_delay();
        assert_relative_eq!(max, 0.000_575_6, epsilon = 1e-6);
        assert_relative_eq!(head.interaural_delay(deg(90.0)).unwrap(), max, epsilon = 1e-6);
        assert_relative_eq!(head.interaural_delay(deg(270.0)).unwrap(), -max, epsilon = 1e-6);
        for step in -360..360 {
            let itd = head.interaural_delay(step as f32 * 0.02).unwrap();
            assert!(itd.abs() <= max + 1e-9);
        }
    }

    #[test]
    fn test_normalizes_out_of_range_angles() {
        let base = interaural_delay(deg(30.0)).unwrap();
        assert_abs_diff_eq!(interaural_delay(deg(390.0)).unwrap(), base, epsilon = 1e-7);
        assert_abs_diff_eq!(interaural_delay(deg(-330.0)).unwrap(), base, epsilon = 1e-7);
    }

    #[test]
    fn test_huge_finite_angles_stay_bounded() {
        let max = HeadModel::default().max_delay();
        for angle in [1.0e37, -1.0e37, f32::MAX, f32::MIN] {
            let folded = fold_azimuth(angle).unwrap();
            assert!((-FRAC_PI_2..=FRAC_PI_2).contains(&folded));
            let itd = interaural_delay(angle).unwrap();
            assert!(itd.is_finite() && itd.abs() <= max + 1e-9);
        }
    }

    #[test]
    fn test_non_finite_angle_is_rejected() {
        assert!(matches!(interaural_delay(f32::NAN), Err(Error::Domain(_))));
        assert!(matches!(fold_azimuth(f32::INFINITY), Err(Error::Domain(_))));
    }
}
