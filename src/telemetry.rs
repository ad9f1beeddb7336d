//! Device telemetry: the latest observed rig state and who is allowed to write it.
//!
//! There is exactly one writer of the [`TelemetryCell`] at any time. In live operation
//! that is the [`TelemetryPoller`], which samples the controller every ~50 ms. During a
//! dry run the simulator claims the cell and fabricates snapshots itself; the poller's
//! samples are dropped until the claim is released.
//!
//! Readers only ever look at the latest value. They must tolerate staleness and never
//! wait for a *fresh* sample.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::controller::{MotionController, RawPosition, StatusReport};
use crate::geometry::CoordinateMapper;

/// Rig position in scene units.
///
/// `x` and `z` span the scan plane; `y` is the out-of-plane offset (zero when the
/// controller does not report a depth stage).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenePosition {
    /// Scene x
    pub x: f64,
    /// Out-of-plane offset
    pub y: f64,
    /// Scene z
    pub z: f64,
}

/// Most recently observed device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Position in scene units
    pub scene_position: ScenePosition,
    /// Position as reported by the controller
    pub raw_position: RawPosition,
    /// Homing flag, 1 when homed
    pub homed: Option<f64>,
    /// Controller status string
    pub status: Option<String>,
    /// When the sample was taken
    pub observed_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// Snapshot from a raw controller position.
    pub fn from_raw(
        mapper: &CoordinateMapper,
        raw: RawPosition,
        status: Option<String>,
        homed: Option<f64>,
    ) -> Self {
        let plane = mapper.pos_to_scene(raw.x, raw.z);
        Self {
            scene_position: ScenePosition {
                x: plane.x,
                y: raw.depth.unwrap_or(0.0),
                z: plane.z,
            },
            raw_position: raw,
            homed,
            status,
            observed_at: Utc::now(),
        }
    }
}

/// Which component currently owns telemetry writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryWriter {
    /// Live controller polling
    Poller,
    /// Dry-run simulation
    Simulator,
}

/// Single-owner cell holding the latest [`TelemetrySnapshot`].
pub struct TelemetryCell {
    tx: watch::Sender<Option<TelemetrySnapshot>>,
    writer: Mutex<TelemetryWriter>,
}

impl TelemetryCell {
    /// Empty cell owned by the live poller.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            writer: Mutex::new(TelemetryWriter::Poller),
        }
    }

    /// Latest snapshot, if any.
    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.tx.borrow().clone()
    }

    /// Snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<TelemetrySnapshot>> {
        self.tx.subscribe()
    }

    /// Current writer.
    pub fn writer(&self) -> TelemetryWriter {
        *self.writer.lock()
    }

    /// Publish `snapshot` if `from` currently owns the cell.
    ///
    /// Returns `false` (and drops the sample) otherwise.
    pub fn publish(&self, from: TelemetryWriter, snapshot: TelemetrySnapshot) -> bool {
        let owner = self.writer.lock();
        if *owner != from {
            trace!(?from, owner = ?*owner, "Dropping telemetry from non-owning writer");
            return false;
        }
        self.tx.send_replace(Some(snapshot));
        true
    }

    /// Hand ownership to `writer` until the returned claim is dropped.
    pub fn claim(self: &Arc<Self>, writer: TelemetryWriter) -> WriterClaim {
        let previous = std::mem::replace(&mut *self.writer.lock(), writer);
        debug!(?writer, ?previous, "Telemetry writer claimed");
        WriterClaim {
            cell: Arc::clone(self),
            previous,
        }
    }
}

impl Default for TelemetryCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of a [`TelemetryCell`]; the previous writer is restored on drop.
pub struct WriterClaim {
    cell: Arc<TelemetryCell>,
    previous: TelemetryWriter,
}

impl Drop for WriterClaim {
    fn drop(&mut self) {
        *self.cell.writer.lock() = self.previous;
        debug!(writer = ?self.previous, "Telemetry writer restored");
    }
}

/// Link and readiness state of the controller as seen by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Whether the last poll succeeded
    pub online: bool,
    /// Status string of the last poll
    pub status: Option<String>,
    /// Homing flag of the last poll
    pub homed: Option<f64>,
    /// When `online` last changed
    pub since: DateTime<Utc>,
}

impl DeviceStatus {
    /// Status before the first successful poll.
    pub fn offline() -> Self {
        Self {
            online: false,
            status: None,
            homed: None,
            since: Utc::now(),
        }
    }

    /// Healthy and homed, so operator moves are allowed.
    pub fn permits_direct_control(&self) -> bool {
        self.online
            && StatusReport {
                status: self.status.clone(),
                position: None,
                homed: self.homed,
            }
            .permits_direct_control()
    }

    /// Seconds since the link went online or offline.
    pub fn seconds_in_state(&self) -> i64 {
        (Utc::now() - self.since).num_seconds().max(0)
    }
}

/// Periodic status poller feeding the telemetry cell and the device status channel.
pub struct TelemetryPoller {
    controller: Arc<dyn MotionController>,
    cell: Arc<TelemetryCell>,
    mapper: CoordinateMapper,
    interval: Duration,
    device_tx: watch::Sender<DeviceStatus>,
}

impl TelemetryPoller {
    /// Poller publishing into `cell` every `interval`.
    pub fn new(
        controller: Arc<dyn MotionController>,
        cell: Arc<TelemetryCell>,
        mapper: CoordinateMapper,
        interval: Duration,
    ) -> Self {
        let (device_tx, _) = watch::channel(DeviceStatus::offline());
        Self {
            controller,
            cell,
            mapper,
            interval,
            device_tx,
        }
    }

    /// Receiver for link/readiness updates.
    pub fn device_status(&self) -> watch::Receiver<DeviceStatus> {
        self.device_tx.subscribe()
    }

    /// Poll the controller once and publish the result.
    pub async fn poll_once(&self) {
        match self.controller.poll_status(true).await {
            Ok(report) => {
                self.update_device(true, report.status.clone(), report.homed);
                if let Some(raw) = report.position {
                    let snapshot =
                        TelemetrySnapshot::from_raw(&self.mapper, raw, report.status, report.homed);
                    self.cell.publish(TelemetryWriter::Poller, snapshot);
                }
            }
            Err(e) => {
                warn!(error = %e, "Position poll failed");
                self.update_device(false, Some("error".to_string()), None);
            }
        }
    }

    fn update_device(&self, online: bool, status: Option<String>, homed: Option<f64>) {
        self.device_tx.send_modify(|device| {
            if device.online != online {
                info!(online, "Controller link changed");
                device.since = Utc::now();
            }
            device.online = online;
            device.status = status;
            device.homed = homed;
        });
    }

    /// Run the polling loop until `shutdown` is cancelled.
    ///
    /// A tick that fires while the previous poll is still in flight is skipped.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = self.interval.as_millis() as u64, "Telemetry poller started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.poll_once().await,
                    _ = shutdown.cancelled() => {
                        info!("Telemetry poller shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Cancel a spawned poller and wait for it. A panicked or aborted task is logged.
pub async fn stop_poller(shutdown: &CancellationToken, task: JoinHandle<()>) {
    shutdown.cancel();
    if let Err(e) = task.await {
        warn!(error = %e, "Telemetry poller task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mock::MockController;
    use tracing_test::traced_test;

    fn snapshot_at(x: f64) -> TelemetrySnapshot {
        TelemetrySnapshot::from_raw(
            &CoordinateMapper::default(),
            RawPosition {
                x,
                z: 625.0,
                ..Default::default()
            },
            Some("ok".into()),
            Some(1.0),
        )
    }

    #[test]
    fn only_owner_may_publish() {
        let cell = Arc::new(TelemetryCell::new());
        assert!(cell.publish(TelemetryWriter::Poller, snapshot_at(1665.0)));

        {
            let _claim = cell.claim(TelemetryWriter::Simulator);
            assert!(!cell.publish(TelemetryWriter::Poller, snapshot_at(0.0)));
            assert!(cell.publish(TelemetryWriter::Simulator, snapshot_at(1165.0)));
        }

        assert_eq!(cell.writer(), TelemetryWriter::Poller);
        let latest = cell.latest().unwrap();
        assert!((latest.scene_position.x - 100.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_maps_into_scene_space() {
        let snap = snapshot_at(1665.0 - 5.0 * 40.0);
        assert!((snap.scene_position.x - 40.0).abs() < 1e-9);
        assert!(snap.scene_position.z.abs() < 1e-9);
        assert_eq!(snap.scene_position.y, 0.0);
    }

    #[tokio::test]
    async fn poll_once_publishes_and_tracks_link() {
        let mock = Arc::new(MockController::new());
        let cell = Arc::new(TelemetryCell::new());
        let poller = TelemetryPoller::new(
            mock.clone(),
            cell.clone(),
            CoordinateMapper::default(),
            Duration::from_millis(50),
        );
        let device = poller.device_status();
        assert!(!device.borrow().online);

        poller.poll_once().await;

        assert!(cell.latest().is_some());
        assert!(device.borrow().online);
        assert!(device.borrow().permits_direct_control());

        mock.set_status(Some("fault"), Some(1.0));
        poller.poll_once().await;
        assert!(!device.borrow().permits_direct_control());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poller_stops_on_cancel() {
        let mock = Arc::new(MockController::new());
        let cell = Arc::new(TelemetryCell::new());
        let poller = TelemetryPoller::new(
            mock.clone(),
            cell,
            CoordinateMapper::default(),
            Duration::from_millis(50),
        );
        let token = CancellationToken::new();
        let handle = poller.spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(260)).await;
        token.cancel();
        handle.await.unwrap();

        let polls = mock.status_poll_count();
        assert!(polls >= 5, "expected regular polling, got {polls}");
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_poller_task_is_logged() {
        let token = CancellationToken::new();
        let task = tokio::spawn(std::future::pending::<()>());
        task.abort();
        stop_poller(&token, task).await;
        assert!(token.is_cancelled());
        assert!(logs_contain("Telemetry poller task failed"));
    }
}
