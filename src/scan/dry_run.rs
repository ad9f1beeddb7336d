//! Dry-run backend.
//!
//! Nothing is sent to the controller. Each move is written straight into the shared
//! telemetry as if the device had arrived, followed by a short cooperative settle
//! delay. The simulator holds the telemetry writer claim for its whole lifetime, so
//! live polling cannot overwrite the fabricated position mid-run.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::backend::MotionBackend;
use super::control::RunControl;
use super::watcher::WaitOutcome;
use crate::controller::{MoveCommand, RawPosition};
use crate::error::ScanResult;
use crate::geometry::CoordinateMapper;
use crate::planner::Waypoint;
use crate::telemetry::{TelemetryCell, TelemetrySnapshot, TelemetryWriter, WriterClaim};

/// Status reported in fabricated telemetry.
pub const DRY_RUN_STATUS: &str = "dry-run";

/// Backend that fabricates telemetry instead of moving the device.
pub struct DryRunSimulator {
    telemetry: Arc<TelemetryCell>,
    mapper: CoordinateMapper,
    settle: Duration,
    _claim: WriterClaim,
}

impl DryRunSimulator {
    /// Take over telemetry writes until the simulator is dropped.
    pub fn new(telemetry: Arc<TelemetryCell>, mapper: CoordinateMapper, settle: Duration) -> Self {
        let claim = telemetry.claim(TelemetryWriter::Simulator);
        Self {
            telemetry,
            mapper,
            settle,
            _claim: claim,
        }
    }

    /// Settle delay that honours pause and ends early on stop.
    async fn settle(&self, control: &RunControl) -> WaitOutcome {
        let deadline = Instant::now() + self.settle;
        let paused_at_start = control.paused_total();
        loop {
            if control.checkpoint().await.is_err() {
                return WaitOutcome::Cancelled;
            }
            let paused = control.paused_total().saturating_sub(paused_at_start);
            let now = Instant::now();
            if now >= deadline + paused {
                return WaitOutcome::Reached;
            }
            let step = (deadline + paused - now).min(control.poll_interval());
            if control.sleep(step).await.is_err() {
                return WaitOutcome::Cancelled;
            }
        }
    }
}

#[async_trait]
impl MotionBackend for DryRunSimulator {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send_move(&self, command: MoveCommand) -> ScanResult<()> {
        let raw = RawPosition {
            x: command.x as f64,
            z: command.z as f64,
            depth: None,
            p: Some(command.p as f64),
            r: Some(command.r as f64),
        };
        let snapshot = TelemetrySnapshot::from_raw(
            &self.mapper,
            raw,
            Some(DRY_RUN_STATUS.to_string()),
            Some(1.0),
        );
        trace!(?command, "Simulated move");
        self.telemetry
            .publish(TelemetryWriter::Simulator, snapshot);
        Ok(())
    }

    async fn await_translation(
        &self,
        _target: Waypoint,
        _timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        self.settle(control).await
    }

    async fn await_rotation(
        &self,
        _target_r: f64,
        _timeout: Duration,
        control: &RunControl,
    ) -> WaitOutcome {
        self.settle(control).await
    }
}
