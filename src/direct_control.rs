//! Direct control: periodically push the operator's target position to the device.
//!
//! On every tick the pusher sends one absolute move, but only when direct control is
//! enabled, the device is ready (status `ok` and homed), a target is set, and the
//! rounded command differs from the last one that went through. A failed send is
//! retried on the next tick.
//!
//! The pusher and a scan run share the single "send move" channel of the controller;
//! the scan mode arbiter locks direct control out for the duration of a run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::{MotionController, MoveCommand};
use crate::geometry::CoordinateMapper;
use crate::modes::OperatorModes;

/// Operator-requested rig pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectTarget {
    /// Scene X
    pub x: f64,
    /// Scene Z
    pub z: f64,
    /// Manual P deflection in degrees, ignored while lock-origin is on
    pub deflection: f64,
    /// R position in native units
    pub r: f64,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Direct control is off or locked out by a scan
    Disabled,
    /// Device not ready; direct control was switched off
    Unavailable,
    /// No usable operator target
    NoTarget,
    /// Same payload as the last successful send
    Unchanged,
    /// Move sent
    Sent,
    /// Controller refused the move
    Failed,
}

/// Periodic pusher of the operator's target.
pub struct DirectControl {
    controller: Arc<dyn MotionController>,
    modes: OperatorModes,
    mapper: CoordinateMapper,
    interval: Duration,
    target: Mutex<Option<DirectTarget>>,
    /// Last successfully sent command, tagged with the enable epoch it belongs to
    last_sent: Mutex<Option<(u64, MoveCommand)>>,
}

impl DirectControl {
    /// Create a pusher ticking every `interval` once spawned.
    pub fn new(
        controller: Arc<dyn MotionController>,
        modes: OperatorModes,
        mapper: CoordinateMapper,
        interval: Duration,
    ) -> Self {
        Self {
            controller,
            modes,
            mapper,
            interval,
            target: Mutex::new(None),
            last_sent: Mutex::new(None),
        }
    }

    /// Replace the operator target.
    pub fn set_target(&self, target: DirectTarget) {
        *self.target.lock() = Some(target);
    }

    /// Current operator target, if any.
    pub fn target(&self) -> Option<DirectTarget> {
        *self.target.lock()
    }

    /// Command for the current target under the current modes.
    pub fn payload(&self) -> Option<MoveCommand> {
        let target = self.target()?;
        if ![target.x, target.z, target.deflection, target.r]
            .iter()
            .all(|v| v.is_finite())
        {
            return None;
        }
        let deflection = if self.modes.flags().lock_origin {
            self.mapper.lock_origin_deflection(target.x, target.z)
        } else {
            target.deflection
        };
        let pos = self.mapper.scene_to_pos(target.x, target.z);
        Some(MoveCommand::rounded(
            pos.x,
            pos.z,
            self.mapper.deflection_to_p_raw(deflection),
            target.r,
        ))
    }

    /// One push attempt.
    pub async fn tick(&self) -> TickOutcome {
        let flags = self.modes.flags();
        if flags.scan_active() || !flags.direct_control {
            return TickOutcome::Disabled;
        }
        if !self.modes.direct_control_permitted() {
            warn!("Device not ready, disabling direct control");
            self.modes.set_direct_control(false);
            return TickOutcome::Unavailable;
        }
        let Some(command) = self.payload() else {
            return TickOutcome::NoTarget;
        };
        let unchanged = matches!(
            *self.last_sent.lock(),
            Some((epoch, last)) if epoch == flags.direct_control_epoch && last == command
        );
        if unchanged {
            return TickOutcome::Unchanged;
        }

        match self.controller.move_absolute(command).await {
            Ok(()) => {
                debug!(?command, "Direct control move sent");
                *self.last_sent.lock() = Some((flags.direct_control_epoch, command));
                TickOutcome::Sent
            }
            Err(e) => {
                warn!(error = %e, "Direct control moveabs failed");
                TickOutcome::Failed
            }
        }
    }

    /// Tick every `interval` until `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_s = self.interval.as_secs_f64(), "Direct control pusher started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mock::MockController;
    use crate::telemetry::DeviceStatus;
    use chrono::Utc;
    use tokio::sync::watch;

    fn setup() -> (
        Arc<MockController>,
        DirectControl,
        OperatorModes,
        watch::Sender<DeviceStatus>,
    ) {
        let (tx, rx) = watch::channel(DeviceStatus {
            online: true,
            status: Some("ok".to_string()),
            homed: Some(1.0),
            since: Utc::now(),
        });
        let modes = OperatorModes::new(3000.0, rx);
        let mock = Arc::new(MockController::new());
        let direct = DirectControl::new(
            mock.clone(),
            modes.clone(),
            CoordinateMapper::default(),
            Duration::from_secs(5),
        );
        (mock, direct, modes, tx)
    }

    #[tokio::test]
    async fn sends_only_changed_payloads() {
        let (mock, direct, modes, _tx) = setup();
        assert_eq!(direct.tick().await, TickOutcome::Disabled);

        modes.set_direct_control(true);
        assert_eq!(direct.tick().await, TickOutcome::NoTarget);

        direct.set_target(DirectTarget {
            x: 100.0,
            z: 10.0,
            deflection: 45.0,
            r: 0.0,
        });
        assert_eq!(direct.tick().await, TickOutcome::Sent);
        assert_eq!(direct.tick().await, TickOutcome::Unchanged);
        assert_eq!(
            mock.commands(),
            vec![MoveCommand {
                x: 1165,
                z: 375,
                p: -128,
                r: 0
            }]
        );

        // re-enabling forces a resend of the same payload
        modes.set_direct_control(false);
        modes.set_direct_control(true);
        assert_eq!(direct.tick().await, TickOutcome::Sent);
        assert_eq!(mock.commands().len(), 2);
    }

    #[tokio::test]
    async fn lock_origin_overrides_manual_deflection() {
        let (mock, direct, modes, _tx) = setup();
        modes.set_direct_control(true);
        modes.set_lock_origin(true);
        // directly right of the origin: lock-origin deflection is zero
        direct.set_target(DirectTarget {
            x: 200.0,
            z: 27.0,
            deflection: 60.0,
            r: 0.0,
        });
        direct.tick().await;
        assert_eq!(mock.commands()[0].p, 0);
    }

    #[tokio::test]
    async fn unavailable_device_disables_direct_control() {
        let (mock, direct, modes, tx) = setup();
        modes.set_direct_control(true);
        direct.set_target(DirectTarget {
            x: 1.0,
            z: 1.0,
            deflection: 0.0,
            r: 0.0,
        });
        tx.send_modify(|d| d.homed = Some(0.0));

        assert_eq!(direct.tick().await, TickOutcome::Unavailable);
        assert!(!modes.flags().direct_control);
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn failed_send_is_retried() {
        let (mock, direct, modes, _tx) = setup();
        modes.set_direct_control(true);
        direct.set_target(DirectTarget {
            x: 1.0,
            z: 1.0,
            deflection: 0.0,
            r: 0.0,
        });
        mock.set_fail_moves(true);
        assert_eq!(direct.tick().await, TickOutcome::Failed);
        mock.set_fail_moves(false);
        assert_eq!(direct.tick().await, TickOutcome::Sent);
    }
}
