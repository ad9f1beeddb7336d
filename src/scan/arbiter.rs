//! Exclusive mode lease for the duration of a scan run.
//!
//! Acquiring the lease forces lock-origin on and locks direct control out, so the scan
//! is the only source of moves and the P axis stays aimed at the scan origin. Direct
//! control cannot be switched back on while the lease is held. Dropping the lease puts
//! every mode back the way it was, on every exit path.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::modes::OperatorModes;

/// Mode values captured when a run started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeSnapshot {
    /// Lock-origin before the run
    pub lock_origin: bool,
    /// Direct control before the run
    pub direct_control: bool,
    /// Rotation soft limit before the run
    pub rotation_soft_limit: f64,
}

/// Hands out the exclusive [`ModeLease`] a scan runs under.
pub struct ModeArbiter;

impl ModeArbiter {
    /// Capture the current modes, force lock-origin on and lock direct control out.
    pub fn acquire(modes: &OperatorModes) -> ModeLease {
        let flags = modes.flags();
        let snapshot = ModeSnapshot {
            lock_origin: flags.lock_origin,
            direct_control: flags.direct_control,
            rotation_soft_limit: flags.rotation_soft_limit,
        };
        modes.set_lock_origin(true);
        modes.claim_scan();
        info!(?snapshot, "Scan took over operator modes");
        ModeLease {
            modes: modes.clone(),
            snapshot,
        }
    }
}

/// Restores the captured modes on drop.
pub struct ModeLease {
    modes: OperatorModes,
    snapshot: ModeSnapshot,
}

impl ModeLease {
    /// Modes as they were before the run.
    pub fn snapshot(&self) -> ModeSnapshot {
        self.snapshot
    }

    /// Raise the rotation soft limit so `target_r` is reachable.
    pub fn extend_rotation_limit(&self, target_r: f64) -> bool {
        self.modes.extend_rotation_soft_limit(target_r)
    }
}

impl Drop for ModeLease {
    fn drop(&mut self) {
        self.modes.release_scan();
        self.modes.set_lock_origin(self.snapshot.lock_origin);
        self.modes
            .set_rotation_soft_limit(self.snapshot.rotation_soft_limit);
        if self.snapshot.direct_control && !self.modes.set_direct_control(true) {
            warn!("Direct control not restored: device not ready");
        }
        info!("Operator modes restored");
    }
}
