//! Mock Motion Controller
//!
//! Simulated controller for tests and demos without the physical rig.
//! All waiting uses `tokio::time::sleep`, so tests can run in paused virtual time.
//!
//! # Behaviour
//!
//! - Every command is recorded and can be inspected afterwards
//! - By default a move "arrives" instantly; `with_travel_time` makes the device report
//!   `running` for that long before the position updates
//! - `set_reach_targets(false)` simulates a stuck axis: commands are accepted but the
//!   reported position never changes
//! - `script_motion_states` queues the answers of the next coordinated-state polls
//! - `set_fail_moves(true)` makes `move_absolute` fail with a transport error
//!
//! # Example
//!
//! ```rust,ignore
//! let mock = Arc::new(MockController::new());
//! mock.move_absolute(MoveCommand::rounded(1200.0, 400.0, 0.0, 3000.0)).await?;
//! assert_eq!(mock.commands().len(), 1);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::{Axis, MotionController, MotionState, MoveCommand, RawPosition, StatusReport};
use crate::error::{ScanError, ScanResult};

#[derive(Debug)]
struct MockDevice {
    position: RawPosition,
    motion_state: MotionState,
    scripted_states: VecDeque<MotionState>,
    status: Option<String>,
    homed: Option<f64>,
    commands: Vec<MoveCommand>,
    stops: Vec<Axis>,
}

/// In-process stand-in for the remote motion controller.
pub struct MockController {
    device: Arc<Mutex<MockDevice>>,
    travel_time: Duration,
    reach_targets: AtomicBool,
    fail_moves: AtomicBool,
    status_polls: AtomicUsize,
}

impl MockController {
    /// Create a homed, healthy controller parked at the origin.
    pub fn new() -> Self {
        Self::with_travel_time(Duration::ZERO)
    }

    /// Create a controller whose moves take `travel_time` to arrive.
    pub fn with_travel_time(travel_time: Duration) -> Self {
        Self {
            device: Arc::new(Mutex::new(MockDevice {
                position: RawPosition {
                    p: Some(0.0),
                    r: Some(0.0),
                    ..Default::default()
                },
                motion_state: MotionState::Idle,
                scripted_states: VecDeque::new(),
                status: Some("ok".to_string()),
                homed: Some(1.0),
                commands: Vec::new(),
                stops: Vec::new(),
            })),
            travel_time,
            reach_targets: AtomicBool::new(true),
            fail_moves: AtomicBool::new(false),
            status_polls: AtomicUsize::new(0),
        }
    }

    /// Place the simulated axes somewhere without recording a command.
    pub fn set_position(&self, position: RawPosition) {
        self.device.lock().position = position;
    }

    /// When false, accepted moves leave the simulated axes where they are.
    pub fn set_reach_targets(&self, reach: bool) {
        self.reach_targets.store(reach, Ordering::SeqCst);
    }

    /// Refuse every move with a transport error.
    pub fn set_fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    /// Change the reported status string and homing flag.
    pub fn set_status(&self, status: Option<&str>, homed: Option<f64>) {
        let mut device = self.device.lock();
        device.status = status.map(str::to_string);
        device.homed = homed;
    }

    /// Answers for the next coordinated-state polls, consumed in order.
    pub fn script_motion_states<I: IntoIterator<Item = MotionState>>(&self, states: I) {
        self.device.lock().scripted_states.extend(states);
    }

    /// Every move command accepted so far.
    pub fn commands(&self) -> Vec<MoveCommand> {
        self.device.lock().commands.clone()
    }

    /// Every axis a stop was requested for.
    pub fn stops(&self) -> Vec<Axis> {
        self.device.lock().stops.clone()
    }

    /// Current simulated axis positions.
    pub fn position(&self) -> RawPosition {
        self.device.lock().position
    }

    /// Number of status polls served so far.
    pub fn status_poll_count(&self) -> usize {
        self.status_polls.load(Ordering::SeqCst)
    }

    fn arrive(device: &mut MockDevice, command: MoveCommand) {
        device.position.x = command.x as f64;
        device.position.z = command.z as f64;
        device.position.p = Some(command.p as f64);
        device.position.r = Some(command.r as f64);
        device.motion_state = MotionState::Idle;
    }
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MotionController for MockController {
    async fn move_absolute(&self, command: MoveCommand) -> ScanResult<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(ScanError::Transport("moveabs 503 mock failure".to_string()));
        }

        let reach = self.reach_targets.load(Ordering::SeqCst);
        {
            let mut device = self.device.lock();
            device.commands.push(command);
            if reach && self.travel_time.is_zero() {
                Self::arrive(&mut device, command);
                return Ok(());
            }
            if reach {
                device.motion_state = MotionState::Running;
            }
        }

        if reach {
            let device = Arc::clone(&self.device);
            let travel = self.travel_time;
            tokio::spawn(async move {
                sleep(travel).await;
                let mut device = device.lock();
                // A newer command supersedes this one
                if device.commands.last() == Some(&command) {
                    MockController::arrive(&mut device, command);
                }
            });
        }
        Ok(())
    }

    async fn stop(&self, axis: Axis) -> ScanResult<()> {
        let mut device = self.device.lock();
        device.stops.push(axis);
        device.motion_state = MotionState::Idle;
        Ok(())
    }

    async fn poll_status(&self, _refresh: bool) -> ScanResult<StatusReport> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        let device = self.device.lock();
        Ok(StatusReport {
            status: device.status.clone(),
            position: Some(device.position),
            homed: device.homed,
        })
    }

    async fn poll_coordinated_motion_state(&self) -> ScanResult<MotionState> {
        let mut device = self.device.lock();
        if let Some(state) = device.scripted_states.pop_front() {
            return Ok(state);
        }
        Ok(device.motion_state)
    }
}
