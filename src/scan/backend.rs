//! Motion backends: where a scan's moves go and how their completion is awaited.
//!
//! The sequencer drives a single [`MotionBackend`] chosen at start: [`LiveBackend`]
//! talks to the controller, the dry-run simulator fabricates telemetry instead.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::control::RunControl;
use super::watcher::{MotionCompletionWatcher, WaitOutcome};
use crate::controller::{MotionController, MoveCommand};
use crate::error::ScanResult;
use crate::planner::Waypoint;

/// Where a scan sends its moves and how it learns they finished.
#[async_trait]
pub trait MotionBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Issue an absolute move. Returns once the command is accepted, not executed.
    async fn send_move(&self, command: MoveCommand) -> ScanResult<()>;

    /// Wait until the translation to `target` is done, timed out or cancelled.
    async fn await_translation(
        &self,
        target: Waypoint,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome;

    /// Wait until R reaches `target_r`, timed out or cancelled.
    async fn await_rotation(
        &self,
        target_r: f64,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome;
}

/// Drives the real controller and watches telemetry for completion.
pub struct LiveBackend {
    controller: Arc<dyn MotionController>,
    watcher: MotionCompletionWatcher,
}

impl LiveBackend {
    /// Backend over `controller`, confirming moves with `watcher`.
    pub fn new(controller: Arc<dyn MotionController>, watcher: MotionCompletionWatcher) -> Self {
        Self {
            controller,
            watcher,
        }
    }
}

#[async_trait]
impl MotionBackend for LiveBackend {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn send_move(&self, command: MoveCommand) -> ScanResult<()> {
        self.controller.move_absolute(command).await
    }

    async fn await_translation(
        &self,
        target: Waypoint,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        self.watcher.wait_for_move(target, timeout, control).await
    }

    async fn await_rotation(
        &self,
        target_r: f64,
        timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        self.watcher
            .wait_for_rotation(target_r, timeout, control)
            .await
    }
}
