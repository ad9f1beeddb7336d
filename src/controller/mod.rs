//! Motion Controller Capability
//!
//! The rig's motion controller is a remote device that only offers fire-and-forget
//! move commands plus best-effort status queries. This module defines the seam the
//! scan core talks through:
//!
//! - [`MotionController`]: the four verbs the device exposes
//! - [`http::HttpController`]: the production client (JSON over HTTP)
//! - [`mock::MockController`]: in-process simulated device for tests and demos
//!
//! # Contract
//! - `move_absolute` returns once the command is accepted, not when motion completes
//! - `poll_status` may omit any field; callers must tolerate partial or stale data
//! - `poll_coordinated_motion_state` may lag behind the true device state
//!
//! # Thread Safety
//! - All methods take `&self`; implementations use interior mutability
//! - Implementations are shared as `Arc<dyn MotionController>`

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ScanResult;

/// Every axis the emergency stop addresses, by wire name.
pub const STOP_AXES: [Axis; 6] = [Axis::X, Axis::Y, Axis::P, Axis::R, Axis::X1, Axis::X2];

/// Axis names as the controller knows them.
///
/// The vertical stage is `y` on the wire; the scan core calls it Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Horizontal stage
    X,
    /// Vertical stage (the core's z)
    Y,
    /// Deflection joint
    P,
    /// Rotation disc
    R,
    /// First X motor
    X1,
    /// Second X motor
    X2,
}

impl Axis {
    /// Wire name of the axis.
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::P => "p",
            Axis::R => "r",
            Axis::X1 => "x1",
            Axis::X2 => "x2",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute move in controller units, already rounded for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveCommand {
    /// Horizontal stage
    pub x: i64,
    /// Vertical stage, sent as `y`
    #[serde(rename = "y")]
    pub z: i64,
    /// Deflection joint in raw units
    pub p: i64,
    /// Rotation disc
    pub r: i64,
}

impl MoveCommand {
    /// Round floating targets to controller steps.
    pub fn rounded(x: f64, z: f64, p: f64, r: f64) -> Self {
        Self {
            x: x.round() as i64,
            z: z.round() as i64,
            p: p.round() as i64,
            r: r.round() as i64,
        }
    }
}

/// Raw axis positions as reported by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    /// Horizontal stage
    pub x: f64,
    /// Vertical stage (wire `y`)
    pub z: f64,
    /// Out-of-plane stage, when the controller reports one
    pub depth: Option<f64>,
    /// Deflection joint in raw units
    pub p: Option<f64>,
    /// Rotation disc
    pub r: Option<f64>,
}

/// Result of a best-effort status poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Free-form controller status (`"ok"` when healthy)
    pub status: Option<String>,
    /// Present only if both translational axes were reported
    pub position: Option<RawPosition>,
    /// 1 when the axes are referenced
    pub homed: Option<f64>,
}

impl StatusReport {
    /// Whether the device accepts operator moves: healthy status and homed.
    pub fn permits_direct_control(&self) -> bool {
        let ok = self
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("ok"))
            .unwrap_or(false);
        ok && self.homed == Some(1.0)
    }
}

/// Coordinated motion queue state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    /// No coordinated motion pending
    Idle,
    /// Motion accepted but not started
    Queued,
    /// Coordinated motion in progress
    Running,
}

impl MotionState {
    /// Queued or running.
    pub fn is_active(&self) -> bool {
        !matches!(self, MotionState::Idle)
    }

    /// Parse a state name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(MotionState::Idle),
            "queued" => Some(MotionState::Queued),
            "running" => Some(MotionState::Running),
            _ => None,
        }
    }
}

/// Capability: remote multi-axis motion controller.
#[async_trait]
pub trait MotionController: Send + Sync {
    /// Queue an absolute move of X, Z, P and R.
    ///
    /// Returns once the controller acknowledged the command.
    async fn move_absolute(&self, command: MoveCommand) -> ScanResult<()>;

    /// Stop a single axis.
    async fn stop(&self, axis: Axis) -> ScanResult<()>;

    /// Read positions and status. `refresh` asks the device for a fresh sample.
    async fn poll_status(&self, refresh: bool) -> ScanResult<StatusReport>;

    /// Read the coordinated motion queue state.
    async fn poll_coordinated_motion_state(&self) -> ScanResult<MotionState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_command_uses_wire_names() {
        let cmd = MoveCommand::rounded(64.6, 100.4, -127.5, 3000.0);
        let json = serde_json::to_value(cmd).unwrap();
        assert_eq!(json, serde_json::json!({"x": 65, "y": 100, "p": -128, "r": 3000}));
    }

    #[test]
    fn direct_control_requires_ok_and_homed() {
        let mut report = StatusReport {
            status: Some("OK".to_string()),
            position: None,
            homed: Some(1.0),
        };
        assert!(report.permits_direct_control());
        report.homed = Some(0.0);
        assert!(!report.permits_direct_control());
        report.homed = Some(1.0);
        report.status = Some("error".to_string());
        assert!(!report.permits_direct_control());
        report.status = None;
        assert!(!report.permits_direct_control());
    }

    #[test]
    fn motion_state_parsing() {
        assert_eq!(MotionState::parse(" Running "), Some(MotionState::Running));
        assert_eq!(MotionState::parse("queued"), Some(MotionState::Queued));
        assert!(!MotionState::Idle.is_active());
        assert!(MotionState::Queued.is_active());
        assert_eq!(MotionState::parse("moving"), None);
    }
}
