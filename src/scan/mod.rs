//! Scan orchestration.
//!
//! Turns a handful of operator settings into a resumable, time-bounded sequence of
//! multi-axis moves against a controller that only offers fire-and-forget commands.
//!
//! ```text
//! ScanSettings ──plan──▶ ScanPlan ──▶ ScanSequencer ──▶ MotionBackend
//!                                         │                 ├─ LiveBackend ──▶ MotionCompletionWatcher
//!                                         │                 └─ DryRunSimulator
//!                                         ├─ ProgressEstimator
//!                                         └─ ModeArbiter (lease)
//! ```

pub mod arbiter;
pub mod backend;
pub mod control;
pub mod dry_run;
pub mod plan;
pub mod progress;
pub mod sequencer;
pub mod settings;
pub mod state;
pub mod watcher;

pub use arbiter::{ModeArbiter, ModeLease, ModeSnapshot};
pub use backend::{LiveBackend, MotionBackend};
pub use control::{Cancelled, RunControl};
pub use dry_run::DryRunSimulator;
pub use plan::{PlannedStep, RotationAccumulator, RotationSign, ScanPlan};
pub use progress::{ProgressEstimator, ProgressSnapshot};
pub use sequencer::{ScanOutcome, ScanSequencer, ScanStatus};
pub use settings::{ScanSettings, StartDirection};
pub use state::{ScanPhase, ScanState};
pub use watcher::{MotionCompletionWatcher, WaitOutcome, WaitTarget};
