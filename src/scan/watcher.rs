//! Completion detection for fire-and-forget moves.
//!
//! The controller acknowledges a move before it is executed, so the watcher decides
//! completion by polling: first the latest telemetry against the target, then the
//! coordinated-motion state. A status of idle only counts once the watcher has seen
//! the motion active during the same wait, so an idle reading taken before the move
//! starts never completes it. Time spent paused does not count against the timeout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::control::RunControl;
use crate::controller::MotionController;
use crate::planner::Waypoint;
use crate::telemetry::{TelemetryCell, TelemetrySnapshot};

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitOutcome {
    /// Telemetry came within tolerance of the target
    Reached,
    /// The controller went active and then idle again
    SettledByStatus,
    /// Deadline passed without completion
    TimedOut,
    /// Stop requested while waiting
    Cancelled,
}

impl WaitOutcome {
    /// Whether the move is considered done.
    pub fn is_complete(self) -> bool {
        matches!(self, WaitOutcome::Reached | WaitOutcome::SettledByStatus)
    }
}

/// What a wait is waiting for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitTarget {
    /// Scene-space X/Z position
    Translation(Waypoint),
    /// Native R position
    Rotation(f64),
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTarget::Translation(wp) => write!(f, "translation to ({:.1}, {:.1})", wp.x, wp.z),
            WaitTarget::Rotation(r) => write!(f, "rotation to {r:.0}"),
        }
    }
}

/// Decides when a commanded move has finished.
pub struct MotionCompletionWatcher {
    controller: Arc<dyn MotionController>,
    telemetry: Arc<TelemetryCell>,
    translation_tolerance: f64,
    rotation_tolerance: f64,
}

impl MotionCompletionWatcher {
    /// Watcher with the given tolerances (scene units for translation, R units for
    /// rotation).
    pub fn new(
        controller: Arc<dyn MotionController>,
        telemetry: Arc<TelemetryCell>,
        translation_tolerance: f64,
        rotation_tolerance: f64,
    ) -> Self {
        Self {
            controller,
            telemetry,
            translation_tolerance,
            rotation_tolerance,
        }
    }

    /// Wait for a translation to `target`.
    pub async fn wait_for_move(
        &self,
        target: Waypoint,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        self.wait(WaitTarget::Translation(target), timeout, control)
            .await
    }

    /// Wait for R to reach `target_r`.
    pub async fn wait_for_rotation(
        &self,
        target_r: f64,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        self.wait(WaitTarget::Rotation(target_r), timeout, control)
            .await
    }

    /// Whether `snapshot` is within tolerance of `target`.
    pub fn within_tolerance(&self, target: WaitTarget, snapshot: &TelemetrySnapshot) -> bool {
        match target {
            WaitTarget::Translation(wp) => {
                let pos = snapshot.scene_position;
                (pos.x - wp.x).abs() <= self.translation_tolerance
                    && (pos.z - wp.z).abs() <= self.translation_tolerance
            }
            WaitTarget::Rotation(r) => snapshot
                .raw_position
                .r
                .map(|current| (current - r).abs() <= self.rotation_tolerance)
                .unwrap_or(false),
        }
    }

    /// Poll until `target` is reached, the controller reports settled motion, the timeout
    /// passes or the run is stopped. Time spent paused does not count towards the timeout.
    pub async fn wait(
        &self,
        target: WaitTarget,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        let started = Instant::now();
        let paused_at_start = control.paused_total();
        let mut saw_active = false;

        loop {
            if control.checkpoint().await.is_err() {
                return WaitOutcome::Cancelled;
            }

            if let Some(snapshot) = self.telemetry.latest() {
                if self.within_tolerance(target, &snapshot) {
                    trace!(%target, "Target reached by telemetry");
                    return WaitOutcome::Reached;
                }
            }

            match self.controller.poll_coordinated_motion_state().await {
                Ok(state) if state.is_active() => saw_active = true,
                Ok(_) if saw_active => {
                    debug!(%target, "Motion settled by controller status");
                    return WaitOutcome::SettledByStatus;
                }
                Ok(_) => {}
                Err(e) => trace!(error = %e, "Motion state poll failed"),
            }

            let paused = control.paused_total().saturating_sub(paused_at_start);
            if started.elapsed() >= timeout + paused {
                return WaitOutcome::TimedOut;
            }

            if control.sleep(control.poll_interval()).await.is_err() {
                return WaitOutcome::Cancelled;
            }
        }
    }
}
