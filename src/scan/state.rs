//! Observable scan state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::arbiter::ModeSnapshot;

/// Scan lifecycle phase.
///
/// ```text
/// Idle ──start──▶ Running ◀──resume── Paused
///                   │  └────pause────▶  │
///                   └──stop──▶ Stopping ◀┘
///                                 │
///            Idle ◀──run ends─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    /// No run
    #[default]
    Idle,
    /// Run in progress
    Running,
    /// Run suspended at a checkpoint
    Paused,
    /// Stop requested, run winding down
    Stopping,
}

impl ScanPhase {
    /// Whether a run may start.
    pub fn can_start(&self) -> bool {
        matches!(self, ScanPhase::Idle)
    }

    /// Whether the run may pause.
    pub fn can_pause(&self) -> bool {
        matches!(self, ScanPhase::Running)
    }

    /// Whether the run may resume.
    pub fn can_resume(&self) -> bool {
        matches!(self, ScanPhase::Paused)
    }

    /// Whether a stop may be requested.
    pub fn can_stop(&self) -> bool {
        matches!(self, ScanPhase::Running | ScanPhase::Paused)
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Idle => write!(f, "idle"),
            ScanPhase::Running => write!(f, "running"),
            ScanPhase::Paused => write!(f, "paused"),
            ScanPhase::Stopping => write!(f, "stopping"),
        }
    }
}

/// State of the current run, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanState {
    /// Lifecycle phase
    pub phase: ScanPhase,
    /// Whether the run is simulated
    pub dry_run: bool,
    /// Identifier of the current run
    pub run_id: Option<Uuid>,
    /// Modes to restore once the run ends
    pub restore: Option<ModeSnapshot>,
}

impl ScanState {
    /// True from start until the run has fully wound down.
    pub fn active(&self) -> bool {
        self.phase != ScanPhase::Idle
    }

    /// Whether the run is paused.
    pub fn paused(&self) -> bool {
        self.phase == ScanPhase::Paused
    }
}
