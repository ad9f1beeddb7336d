//! Operator settings for one scan run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ScanError, ScanResult};

/// Which end of the arc the first pass starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartDirection {
    /// From the 0° end (towards +X) to the 90° end
    #[default]
    Forward,
    /// From the 90° end back to the 0° end
    Reverse,
}

impl fmt::Display for StartDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartDirection::Forward => write!(f, "forward"),
            StartDirection::Reverse => write!(f, "reverse"),
        }
    }
}

/// Immutable snapshot of the scan controls, taken at `start()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Arc radius in scene units
    pub radius: f64,
    /// Number of waypoints on the arc
    pub waypoint_count: usize,
    /// Number of back-and-forth cycles
    pub repeats: usize,
    /// Which end of the arc the first pass starts from
    pub start_direction: StartDirection,
    /// Begin the first cycle at the arc midpoint
    pub start_at_center: bool,
    /// Simulate telemetry instead of driving the device
    pub dry_run: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            radius: 320.0,
            waypoint_count: 9,
            repeats: 1,
            start_direction: StartDirection::Forward,
            start_at_center: false,
            dry_run: false,
        }
    }
}

impl ScanSettings {
    /// Reject settings a run cannot start with.
    pub fn validate(&self) -> ScanResult<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ScanError::Validation(format!(
                "radius must be a positive number, got {}",
                self.radius
            )));
        }
        if self.waypoint_count < 1 {
            return Err(ScanError::Validation(
                "waypoint count must be at least 1".to_string(),
            ));
        }
        if self.repeats < 1 {
            return Err(ScanError::Validation(
                "repeat count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(ScanSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let cases = [
            ScanSettings {
                radius: 0.0,
                ..Default::default()
            },
            ScanSettings {
                radius: f64::NAN,
                ..Default::default()
            },
            ScanSettings {
                waypoint_count: 0,
                ..Default::default()
            },
            ScanSettings {
                repeats: 0,
                ..Default::default()
            },
        ];
        for settings in cases {
            assert!(
                matches!(settings.validate(), Err(ScanError::Validation(_))),
                "{settings:?} should be rejected"
            );
        }
    }
}
