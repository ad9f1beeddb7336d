//! Coordinate mapping between the scene and the motion controller.
//!
//! The operator console works in a 2D scene space (X horizontal, Z vertical, origin at
//! the rig base). The controller works in native stage units. The mapping is a plain
//! affine transform per axis:
//!
//! ```text
//! pos_x = x_origin - x_scale * scene_x
//! pos_z = z_origin - z_scale * scene_z
//! ```
//!
//! Angles follow two conventions. A *heading* is an absolute angle in `(-180, 180]`
//! degrees measured like `atan2`. A *deflection* is the P joint setting in `[-90, 90]`,
//! where zero points the device back along the negative X direction (heading 180).
//!
//! All functions here are total: nothing is clamped except where documented.

use crate::config::GeometryConfig;
use crate::planner::Waypoint;

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap180(degrees: f64) -> f64 {
    let mut wrapped = degrees % 360.0;
    if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}

/// Wrap an angle in degrees into `[0, 360)`. Display only.
pub fn wrap360(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Map a joint deflection to an absolute heading.
pub fn deflection_to_angle(deflection: f64) -> f64 {
    wrap180(deflection + 180.0)
}

/// Map an absolute heading to a joint deflection, silently clamped to `[-90, 90]`.
pub fn angle_to_deflection(angle: f64) -> f64 {
    wrap180(angle - 180.0).clamp(-90.0, 90.0)
}

/// Position in controller units for the two translational axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosXZ {
    /// Controller X
    pub x: f64,
    /// Controller vertical position
    pub z: f64,
}

/// Converts between scene space and controller units for one rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    x_origin: f64,
    x_scale: f64,
    z_origin: f64,
    z_scale: f64,
    r_units_per_rev: f64,
    scan_origin: Waypoint,
    p_raw_full_scale: f64,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self::from_config(&GeometryConfig::default())
    }
}

impl CoordinateMapper {
    /// Build a mapper from the geometry section of the configuration.
    pub fn from_config(config: &GeometryConfig) -> Self {
        Self {
            x_origin: config.x_origin,
            x_scale: config.x_scale,
            z_origin: config.z_origin,
            z_scale: config.z_scale,
            r_units_per_rev: config.r_units_per_rev,
            scan_origin: Waypoint::new(config.scan_origin_x, config.scan_origin_z),
            p_raw_full_scale: config.p_raw_full_scale,
        }
    }

    /// The fixed reference point the scan arc is centred on.
    pub fn scan_origin(&self) -> Waypoint {
        self.scan_origin
    }

    /// Native R units for one full revolution of the disc.
    pub fn units_per_rev(&self) -> f64 {
        self.r_units_per_rev
    }

    /// Scene coordinates to controller units.
    pub fn scene_to_pos(&self, x_scene: f64, z_scene: f64) -> PosXZ {
        PosXZ {
            x: self.x_origin - self.x_scale * x_scene,
            z: self.z_origin - self.z_scale * z_scene,
        }
    }

    /// Controller units to scene coordinates.
    pub fn pos_to_scene(&self, x_pos: f64, z_pos: f64) -> Waypoint {
        Waypoint::new(
            (self.x_origin - x_pos) / self.x_scale,
            (self.z_origin - z_pos) / self.z_scale,
        )
    }

    /// R controller units to degrees (unwrapped).
    pub fn r_pos_to_degrees(&self, pos: f64) -> f64 {
        pos * (360.0 / self.r_units_per_rev)
    }

    /// Degrees to R controller units.
    pub fn r_degrees_to_pos(&self, degrees: f64) -> f64 {
        degrees * (self.r_units_per_rev / 360.0)
    }

    /// Accumulated R position as a `[0, 360)` angle for the presentation layer.
    pub fn r_display_degrees(&self, pos: f64) -> f64 {
        wrap360(self.r_pos_to_degrees(pos))
    }

    /// Bearing in degrees from `(x, z)` towards the scan origin.
    pub fn angle_to_origin(&self, x: f64, z: f64) -> f64 {
        (self.scan_origin.z - z)
            .atan2(self.scan_origin.x - x)
            .to_degrees()
    }

    /// Deflection that keeps the device aimed at the scan origin from `(x, z)`.
    pub fn lock_origin_deflection(&self, x: f64, z: f64) -> f64 {
        angle_to_deflection(self.angle_to_origin(x, z))
    }

    /// Deflection in degrees to raw P units. Positive deflection is negative raw.
    pub fn deflection_to_p_raw(&self, deflection: f64) -> f64 {
        (-deflection / 90.0) * self.p_raw_full_scale
    }

    /// Raw P units to deflection degrees.
    pub fn p_raw_to_deflection(&self, raw: f64) -> f64 {
        (-raw / self.p_raw_full_scale) * 90.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn scene_pos_round_trip() {
        let mapper = CoordinateMapper::default();
        for &(x, z) in &[(0.0, 0.0), (320.0, 27.0), (-15.5, 812.25), (1e6, -3e5)] {
            let pos = mapper.scene_to_pos(x, z);
            let back = mapper.pos_to_scene(pos.x, pos.z);
            assert!((back.x - x).abs() < 1e-6, "x: {} vs {}", back.x, x);
            assert!((back.z - z).abs() < 1e-6, "z: {} vs {}", back.z, z);
        }
    }

    #[test]
    fn scene_to_pos_uses_rig_constants() {
        let mapper = CoordinateMapper::default();
        let pos = mapper.scene_to_pos(100.0, 10.0);
        assert!((pos.x - (1665.0 - 500.0)).abs() < EPS);
        assert!((pos.z - (625.0 - 250.0)).abs() < EPS);
    }

    #[test]
    fn deflection_round_trip_over_joint_range() {
        let mut d = -90.0;
        while d <= 90.0 {
            let back = angle_to_deflection(deflection_to_angle(d));
            assert!((back - d).abs() < EPS, "deflection {d} came back as {back}");
            d += 0.5;
        }
    }

    #[test]
    fn deflection_to_angle_range() {
        assert!((deflection_to_angle(0.0) - 180.0).abs() < EPS);
        assert!((deflection_to_angle(90.0) - -90.0).abs() < EPS);
        assert!((deflection_to_angle(-90.0) - 90.0).abs() < EPS);
    }

    #[test]
    fn angle_to_deflection_clamps_silently() {
        // heading 0 points away from the joint's reachable half-plane
        assert_eq!(angle_to_deflection(0.0), 90.0);
        assert!(angle_to_deflection(10.0).abs() <= 90.0);
        assert_eq!(angle_to_deflection(45.0), -90.0);
        assert_eq!(angle_to_deflection(-45.0), 90.0);
    }

    #[test]
    fn lock_origin_points_back_at_origin() {
        let mapper = CoordinateMapper::default();
        let origin = mapper.scan_origin();
        // Directly to the right of the origin the device must look straight back (-X).
        let bearing = mapper.angle_to_origin(origin.x + 100.0, origin.z);
        assert!((bearing.abs() - 180.0).abs() < EPS);
        assert!(mapper.lock_origin_deflection(origin.x + 100.0, origin.z).abs() < EPS);

        // Directly above the origin it has to look down: heading -90, deflection 90.
        let deflection = mapper.lock_origin_deflection(origin.x, origin.z + 50.0);
        assert!((deflection - 90.0).abs() < EPS);
    }

    #[test]
    fn rotation_units_and_display_wrapping() {
        let mapper = CoordinateMapper::default();
        assert!((mapper.r_pos_to_degrees(3000.0) - 360.0).abs() < EPS);
        assert!((mapper.r_degrees_to_pos(90.0) - 750.0).abs() < EPS);
        assert!((mapper.r_display_degrees(3000.0 * 7.0 + 750.0) - 90.0).abs() < 1e-6);
        assert!((mapper.r_display_degrees(-750.0) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn p_raw_conversion() {
        let mapper = CoordinateMapper::default();
        assert!((mapper.deflection_to_p_raw(90.0) + 255.0).abs() < EPS);
        assert!((mapper.deflection_to_p_raw(-45.0) - 127.5).abs() < EPS);
        assert!((mapper.p_raw_to_deflection(-255.0) - 90.0).abs() < EPS);
    }

    #[test]
    fn wrap180_boundaries() {
        assert_eq!(wrap180(180.0), 180.0);
        assert_eq!(wrap180(-180.0), 180.0);
        assert!((wrap180(540.0) - 180.0).abs() < EPS);
        assert!((wrap180(-190.0) - 170.0).abs() < EPS);
    }
}
