// Conversion between controller ticks and radians
//
// The wheel resolution is measured, not derived: turn the wheel ten times,
// read the position back with "1,getp" and divide.

use std::f64::consts::PI;

use crate::config::ConfigError;

/// Tick <-> radian conversion for one wheel resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    ticks_to_radians: f64,
    radians_to_ticks: f64,
}

impl UnitConverter {
    /// Build a converter; `ticks_per_rev` must be positive
    pub fn new(ticks_per_rev: i32) -> Result<Self, ConfigError> {
        if ticks_per_rev <= 0 {
            return Err(ConfigError::InvalidTicksPerRev(ticks_per_rev));
        }

        let ticks_to_radians = 2.0 * PI / f64::from(ticks_per_rev);
        Ok(Self {
            ticks_to_radians,
            radians_to_ticks: 1.0 / ticks_to_radians,
        })
    }

    pub fn to_physical_position(&self, ticks: i32) -> f64 {
        f64::from(ticks) * self.ticks_to_radians
    }

    pub fn to_physical_velocity(&self, ticks_per_sec: i32) -> f64 {
        f64::from(ticks_per_sec) * self.ticks_to_radians
    }

    /// rad/s to ticks/s, truncated toward zero (and saturating at the i32 range)
    pub fn to_controller_velocity(&self, radians_per_sec: f64) -> i32 {
        (radians_per_sec * self.radians_to_ticks) as i32
    }

    /// rad to ticks, truncated the same way as velocities
    pub fn to_controller_position(&self, radians: f64) -> i32 {
        (radians * self.radians_to_ticks) as i32
    }
}
