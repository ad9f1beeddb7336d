//! Operator modes that cooperate with (and are overridden by) a scan run.
//!
//! - **Lock-origin**: the P deflection is derived from the position so the device
//!   stays aimed at the scan origin
//! - **Direct control**: a periodic pusher sends the operator's target to the device
//! - **Rotation soft limit**: upper bound of the R input, extended by scans on demand
//!
//! [`OperatorModes`] is a cheap cloneable handle; the console, the direct-control pusher
//! and the scan mode arbiter all share one instance.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::telemetry::DeviceStatus;

/// Current values of the cooperating modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeFlags {
    /// P is aimed at the scan origin
    pub lock_origin: bool,
    /// Operator pusher enabled
    pub direct_control: bool,
    /// Upper bound of the R input
    pub rotation_soft_limit: f64,
    /// Bumped on every enable of direct control
    pub direct_control_epoch: u64,
    /// Number of scan leases currently held; direct control is locked out while non-zero
    pub scan_leases: u32,
}

impl ModeFlags {
    /// Whether a scan run currently owns the move channel.
    pub fn scan_active(&self) -> bool {
        self.scan_leases > 0
    }
}

/// Shared handle on the operator modes.
#[derive(Clone)]
pub struct OperatorModes {
    flags: Arc<Mutex<ModeFlags>>,
    device: watch::Receiver<DeviceStatus>,
}

impl OperatorModes {
    /// Modes tied to the device status published by the telemetry poller.
    pub fn new(rotation_soft_limit: f64, device: watch::Receiver<DeviceStatus>) -> Self {
        Self {
            flags: Arc::new(Mutex::new(ModeFlags {
                lock_origin: false,
                direct_control: false,
                rotation_soft_limit,
                direct_control_epoch: 0,
                scan_leases: 0,
            })),
            device,
        }
    }

    /// Modes with no device link, e.g. for dry runs or tests.
    pub fn detached(rotation_soft_limit: f64) -> Self {
        let (_tx, rx) = watch::channel(DeviceStatus::offline());
        Self::new(rotation_soft_limit, rx)
    }

    /// Copy of the current flags.
    pub fn flags(&self) -> ModeFlags {
        *self.flags.lock()
    }

    /// Switch lock-origin on or off.
    pub fn set_lock_origin(&self, enabled: bool) {
        self.flags.lock().lock_origin = enabled;
    }

    /// Whether the device currently allows operator moves.
    pub fn direct_control_permitted(&self) -> bool {
        self.device.borrow().permits_direct_control()
    }

    /// Enable or disable direct control. Returns the resulting state.
    ///
    /// Enabling is refused while a scan holds the modes or the device is not ready.
    pub fn set_direct_control(&self, enabled: bool) -> bool {
        if enabled && self.flags.lock().scan_active() {
            warn!("Direct control unavailable: scan in progress");
            return false;
        }
        if enabled && !self.direct_control_permitted() {
            warn!("Direct control unavailable: device not ready");
            self.flags.lock().direct_control = false;
            return false;
        }
        let mut flags = self.flags.lock();
        if enabled && !flags.direct_control {
            flags.direct_control_epoch += 1;
            info!("Direct control enabled");
        } else if !enabled && flags.direct_control {
            info!("Direct control disabled");
        }
        flags.direct_control = enabled;
        enabled
    }

    /// Register a scan run: direct control is switched off and stays locked out
    /// until the matching [`release_scan`](Self::release_scan).
    pub(crate) fn claim_scan(&self) {
        let mut flags = self.flags.lock();
        flags.scan_leases += 1;
        if flags.direct_control {
            flags.direct_control = false;
            info!("Direct control disabled");
        }
    }

    pub(crate) fn release_scan(&self) {
        let mut flags = self.flags.lock();
        flags.scan_leases = flags.scan_leases.saturating_sub(1);
    }

    /// Set the rotation soft limit outright.
    pub fn set_rotation_soft_limit(&self, limit: f64) {
        self.flags.lock().rotation_soft_limit = limit;
    }

    /// Raise the rotation soft limit to at least `value`. Never lowers it.
    pub fn extend_rotation_soft_limit(&self, value: f64) -> bool {
        let mut flags = self.flags.lock();
        if value > flags.rotation_soft_limit {
            flags.rotation_soft_limit = value;
            true
        } else {
            false
        }
    }
}
