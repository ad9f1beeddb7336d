//! ScanSequencer - executes a scan run as a background task.
//!
//! A run visits every planned waypoint in order. For each one it
//!
//! 1. derives the lock-origin deflection and converts the waypoint to controller units
//! 2. moves X/Z/P while holding R, then waits for the translation (20 s default)
//! 3. advances the R accumulator by one signed revolution, extending the rotation
//!    soft limit if needed, then waits for the rotation (25 s default)
//! 4. passes a pause checkpoint and records the step's active duration
//!
//! A timed-out wait or a failed command is logged and the run carries on with the
//! next step; only `stop()` ends a run early.
//!
//! # Usage
//!
//! ```rust,ignore
//! let sequencer = ScanSequencer::new(&config, Some(controller), telemetry, modes);
//! let mut status = sequencer.subscribe();
//! sequencer.start(ScanSettings { radius: 320.0, ..Default::default() })?;
//! sequencer.pause();
//! sequencer.resume();
//! let outcome = sequencer.join().await;
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::arbiter::{ModeArbiter, ModeLease};
use super::backend::{LiveBackend, MotionBackend};
use super::control::{Cancelled, RunControl};
use super::dry_run::DryRunSimulator;
use super::plan::{PlannedStep, RotationAccumulator, ScanPlan};
use super::progress::{ProgressEstimator, ProgressSnapshot};
use super::settings::ScanSettings;
use super::state::{ScanPhase, ScanState};
use super::watcher::{MotionCompletionWatcher, WaitOutcome};
use crate::config::{RigConfig, TimingConfig};
use crate::controller::{MotionController, MoveCommand};
use crate::error::{ScanError, ScanResult};
use crate::geometry::CoordinateMapper;
use crate::modes::OperatorModes;
use crate::planner::{plan_waypoints, AxisBounds, Waypoint};
use crate::telemetry::TelemetryCell;

/// Summary of a finished (or stopped) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Identifier of the run, also carried by its tracing span
    pub run_id: Uuid,
    /// Waypoints fully visited
    pub completed_steps: usize,
    /// Waypoints planned
    pub total_steps: usize,
    /// Whether the run ended on a stop request
    pub stopped: bool,
    /// Waits that ran into their timeout
    pub timeouts: usize,
    /// Move commands the controller did not accept
    pub transport_failures: usize,
    /// Signed revolutions R moved over the run
    pub net_revolutions: f64,
}

/// Everything an observer needs to render the scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    /// Lifecycle state
    pub state: ScanState,
    /// Progress for display
    pub progress: ProgressSnapshot,
    /// R accumulator in native units
    pub current_r: f64,
    /// R accumulator as a wrapped display angle
    pub current_r_degrees: f64,
    /// Cycle of the waypoint being visited
    pub cycle: Option<usize>,
    /// Index of the waypoint being visited
    pub waypoint_index: Option<usize>,
    /// Outcome of the previous run
    pub last_outcome: Option<ScanOutcome>,
}

#[derive(Default)]
struct Inner {
    state: ScanState,
    progress: ProgressEstimator,
    control: Option<RunControl>,
    current_r: f64,
    cursor: Option<(usize, usize)>,
    last_outcome: Option<ScanOutcome>,
    task: Option<JoinHandle<ScanOutcome>>,
}

struct Shared {
    mapper: CoordinateMapper,
    bounds: AxisBounds,
    timing: TimingConfig,
    controller: Option<Arc<dyn MotionController>>,
    telemetry: Arc<TelemetryCell>,
    modes: OperatorModes,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<ScanStatus>,
}

/// Per-run resources owned by the run task.
struct RunContext {
    backend: Box<dyn MotionBackend>,
    lease: ModeLease,
    control: RunControl,
    rotation: RotationAccumulator,
    outcome: ScanOutcome,
}

/// Cloneable handle to the scan engine.
#[derive(Clone)]
pub struct ScanSequencer {
    shared: Arc<Shared>,
}

impl ScanSequencer {
    /// Create an idle sequencer. Without a controller only dry runs can start.
    pub fn new(
        config: &RigConfig,
        controller: Option<Arc<dyn MotionController>>,
        telemetry: Arc<TelemetryCell>,
        modes: OperatorModes,
    ) -> Self {
        let (status_tx, _) = watch::channel(ScanStatus::default());
        Self {
            shared: Arc::new(Shared {
                mapper: config.mapper(),
                bounds: config.bounds(),
                timing: config.timing.clone(),
                controller,
                telemetry,
                modes,
                inner: Mutex::new(Inner::default()),
                status_tx,
            }),
        }
    }

    /// Status updates, sent on every change.
    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Current status.
    pub fn status(&self) -> ScanStatus {
        self.shared.status()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.shared.inner.lock().state.clone()
    }

    /// Current progress.
    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.inner.lock().progress.snapshot()
    }

    /// Waypoints a scan with `radius` and `count` would visit.
    pub fn preview(&self, radius: f64, count: usize) -> Vec<Waypoint> {
        plan_waypoints(self.shared.mapper.scan_origin(), radius, count, &self.shared.bounds)
    }

    /// Begin a run in the background.
    ///
    /// Returns `Ok(false)` without side effects while a run is already active.
    pub fn start(&self, settings: ScanSettings) -> ScanResult<bool> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if !inner.state.phase.can_start() {
            info!(phase = %inner.state.phase, "Scan already active, ignoring start");
            return Ok(false);
        }
        settings.validate()?;

        let waypoints = self.preview(settings.radius, settings.waypoint_count);
        if waypoints.is_empty() {
            return Err(ScanError::Validation(
                "no reachable waypoints for this radius".to_string(),
            ));
        }
        let plan = ScanPlan::build(waypoints, &settings);

        let backend: Box<dyn MotionBackend> = if settings.dry_run {
            Box::new(DryRunSimulator::new(
                Arc::clone(&shared.telemetry),
                shared.mapper,
                shared.timing.dry_run_settle(),
            ))
        } else {
            let controller = shared.controller.clone().ok_or_else(|| {
                ScanError::Validation("live scan needs a motion controller".to_string())
            })?;
            let watcher = MotionCompletionWatcher::new(
                Arc::clone(&controller),
                Arc::clone(&shared.telemetry),
                shared.timing.translation_tolerance,
                shared.timing.rotation_tolerance,
            );
            Box::new(LiveBackend::new(controller, watcher))
        };

        let initial_r = shared
            .telemetry
            .latest()
            .and_then(|snapshot| snapshot.raw_position.r)
            .unwrap_or(0.0);
        let run_id = Uuid::new_v4();
        let lease = ModeArbiter::acquire(&shared.modes);
        let control = RunControl::new(shared.timing.poll_interval());

        info!(
            %run_id,
            backend = backend.name(),
            radius = settings.radius,
            waypoints = plan.waypoints().len(),
            repeats = settings.repeats,
            direction = %settings.start_direction,
            from_center = settings.start_at_center,
            total_steps = plan.total_steps(),
            "Starting scan"
        );

        inner.progress.reset(plan.total_steps());
        inner.current_r = initial_r;
        inner.cursor = None;
        inner.control = Some(control.clone());
        inner.state = ScanState {
            phase: ScanPhase::Running,
            dry_run: settings.dry_run,
            run_id: Some(run_id),
            restore: Some(lease.snapshot()),
        };

        let context = RunContext {
            backend,
            lease,
            control,
            rotation: RotationAccumulator::new(initial_r, shared.mapper.units_per_rev()),
            outcome: ScanOutcome {
                run_id,
                completed_steps: 0,
                total_steps: plan.total_steps(),
                stopped: false,
                timeouts: 0,
                transport_failures: 0,
                net_revolutions: 0.0,
            },
        };
        let task_shared = Arc::clone(shared);
        inner.task = Some(tokio::spawn(
            async move { task_shared.run(plan, context).await }
                .instrument(info_span!("scan", %run_id)),
        ));
        drop(inner);

        shared.publish();
        Ok(true)
    }

    /// Hold the run at its next checkpoint.
    pub fn pause(&self) -> bool {
        self.transition(ScanPhase::can_pause, ScanPhase::Paused, RunControl::pause)
    }

    /// Resume a paused run. Returns false when not paused.
    pub fn resume(&self) -> bool {
        self.transition(ScanPhase::can_resume, ScanPhase::Running, RunControl::resume)
    }

    /// Ask the run to end. In-flight waits return promptly; modes are restored once the
    /// run task has wound down.
    pub fn stop(&self) -> bool {
        self.transition(ScanPhase::can_stop, ScanPhase::Stopping, RunControl::stop)
    }

    /// Wait for the current run to finish and return its outcome.
    ///
    /// Without an active run this returns the previous run's outcome, if any.
    pub async fn join(&self) -> Option<ScanOutcome> {
        let task = self.shared.inner.lock().task.take();
        let Some(task) = task else {
            return self.shared.inner.lock().last_outcome.clone();
        };
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(error = %e, "Scan task failed");
                {
                    let mut inner = self.shared.inner.lock();
                    inner.state = ScanState::default();
                    inner.control = None;
                }
                self.shared.publish();
                None
            }
        }
    }

    fn transition(
        &self,
        allowed: fn(&ScanPhase) -> bool,
        next: ScanPhase,
        signal: fn(&RunControl),
    ) -> bool {
        {
            let mut inner = self.shared.inner.lock();
            if !allowed(&inner.state.phase) {
                debug!(phase = %inner.state.phase, requested = %next, "Ignoring scan transition");
                return false;
            }
            if let Some(control) = &inner.control {
                signal(control);
            }
            inner.state.phase = next;
        }
        info!(phase = %next, "Scan phase changed");
        self.shared.publish();
        true
    }
}

impl Shared {
    fn status(&self) -> ScanStatus {
        let inner = self.inner.lock();
        ScanStatus {
            state: inner.state.clone(),
            progress: inner.progress.snapshot(),
            current_r: inner.current_r,
            current_r_degrees: self.mapper.r_display_degrees(inner.current_r),
            cycle: inner.cursor.map(|(cycle, _)| cycle),
            waypoint_index: inner.cursor.map(|(_, index)| index),
            last_outcome: inner.last_outcome.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    async fn run(self: Arc<Self>, plan: ScanPlan, mut ctx: RunContext) -> ScanOutcome {
        for step in plan.steps() {
            if ctx.control.checkpoint().await.is_err() {
                break;
            }
            self.inner.lock().cursor = Some((step.cycle, step.waypoint_index));
            self.publish();

            if self.execute_waypoint(&mut ctx, step).await.is_err() {
                break;
            }
        }
        self.finish(ctx)
    }

    async fn execute_waypoint(
        &self,
        ctx: &mut RunContext,
        step: PlannedStep,
    ) -> Result<(), Cancelled> {
        let started = Instant::now();
        let paused_before = ctx.control.paused_total();
        let target = step.waypoint;

        let deflection = self.mapper.lock_origin_deflection(target.x, target.z);
        let pos = self.mapper.scene_to_pos(target.x, target.z);
        let p_raw = self.mapper.deflection_to_p_raw(deflection);

        // translate with R held
        let command = MoveCommand::rounded(pos.x, pos.z, p_raw, ctx.rotation.current());
        Self::send(ctx, command).await;
        let wait = ctx
            .backend
            .await_translation(target, self.timing.move_timeout(), &ctx.control)
            .await;
        Self::tally(&mut ctx.outcome, "translation", wait)?;

        // one revolution at the reached position
        let next_r = ctx.rotation.advance(step.sign);
        if ctx.lease.extend_rotation_limit(next_r) {
            debug!(limit = next_r, "Rotation soft limit extended");
        }
        self.inner.lock().current_r = next_r;
        let command = MoveCommand::rounded(pos.x, pos.z, p_raw, next_r);
        Self::send(ctx, command).await;
        let wait = ctx
            .backend
            .await_rotation(next_r, self.timing.rotation_timeout(), &ctx.control)
            .await;
        Self::tally(&mut ctx.outcome, "rotation", wait)?;

        ctx.control.checkpoint().await?;

        let paused = ctx.control.paused_total().saturating_sub(paused_before);
        let active = started.elapsed().saturating_sub(paused);
        ctx.outcome.completed_steps += 1;
        self.inner.lock().progress.record_step(active);
        debug!(
            step = ctx.outcome.completed_steps,
            total = ctx.outcome.total_steps,
            cycle = step.cycle,
            waypoint = step.waypoint_index,
            r = next_r,
            elapsed_ms = active.as_millis() as u64,
            "Waypoint done"
        );
        self.publish();
        Ok(())
    }

    async fn send(ctx: &mut RunContext, command: MoveCommand) {
        if let Err(e) = ctx.backend.send_move(command).await {
            warn!(?command, error = %e, "Move command failed; continuing");
            ctx.outcome.transport_failures += 1;
        }
    }

    fn tally(outcome: &mut ScanOutcome, what: &str, wait: WaitOutcome) -> Result<(), Cancelled> {
        match wait {
            WaitOutcome::Cancelled => Err(Cancelled),
            WaitOutcome::TimedOut => {
                warn!(wait = what, "Wait timed out; continuing with next move");
                outcome.timeouts += 1;
                Ok(())
            }
            WaitOutcome::Reached | WaitOutcome::SettledByStatus => Ok(()),
        }
    }

    fn finish(&self, ctx: RunContext) -> ScanOutcome {
        let RunContext {
            backend,
            lease,
            control,
            rotation,
            mut outcome,
        } = ctx;
        outcome.stopped = control.is_cancelled();
        outcome.net_revolutions = rotation.net_revolutions();

        // hand telemetry back to the poller and restore modes before going idle
        drop(backend);
        drop(lease);

        {
            let mut inner = self.inner.lock();
            inner.state = ScanState::default();
            inner.control = None;
            inner.cursor = None;
            inner.last_outcome = Some(outcome.clone());
        }
        self.publish();

        if outcome.stopped {
            info!(
                completed = outcome.completed_steps,
                total = outcome.total_steps,
                "Scan stopped"
            );
        } else {
            info!(
                completed = outcome.completed_steps,
                timeouts = outcome.timeouts,
                transport_failures = outcome.transport_failures,
                "Scan finished"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mock::MockController;
    use crate::scan::settings::StartDirection;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn dry_sequencer() -> (ScanSequencer, Arc<TelemetryCell>, OperatorModes) {
        let config = RigConfig::default();
        let telemetry = Arc::new(TelemetryCell::new());
        let modes = OperatorModes::detached(config.limits.rotation_soft_limit);
        let sequencer = ScanSequencer::new(&config, None, telemetry.clone(), modes.clone());
        (sequencer, telemetry, modes)
    }

    fn dry_settings(waypoint_count: usize) -> ScanSettings {
        ScanSettings {
            radius: 320.0,
            waypoint_count,
            repeats: 1,
            start_direction: StartDirection::Forward,
            start_at_center: false,
            dry_run: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let (sequencer, _, _) = dry_sequencer();
        assert!(sequencer.start(dry_settings(3)).unwrap());
        let run_id = sequencer.state().run_id;
        assert!(!sequencer.start(dry_settings(5)).unwrap());
        assert_eq!(sequencer.state().run_id, run_id);
        assert_eq!(sequencer.progress().total_steps, 6);
        sequencer.join().await.unwrap();
    }

    #[tokio::test]
    async fn live_start_without_controller_fails() {
        let (sequencer, _, modes) = dry_sequencer();
        let settings = ScanSettings {
            dry_run: false,
            ..dry_settings(3)
        };
        assert!(matches!(
            sequencer.start(settings),
            Err(ScanError::Validation(_))
        ));
        assert!(!sequencer.state().active());
        assert!(!modes.flags().lock_origin);
    }

    #[tokio::test]
    async fn invalid_settings_leave_sequencer_idle() {
        let (sequencer, _, _) = dry_sequencer();
        let settings = ScanSettings {
            repeats: 0,
            ..dry_settings(3)
        };
        assert!(sequencer.start(settings).is_err());
        assert!(!sequencer.state().active());
        assert!(sequencer.join().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn controls_are_ignored_when_idle() {
        let (sequencer, _, _) = dry_sequencer();
        assert!(!sequencer.pause());
        assert!(!sequencer.resume());
        assert!(!sequencer.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn status_tracks_rotation_accumulator() {
        let (sequencer, _, _) = dry_sequencer();
        let mut status = sequencer.subscribe();
        sequencer.start(dry_settings(2)).unwrap();

        // first step rotates one revolution forward
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                status.changed().await.unwrap();
                if status.borrow().progress.completed_steps == 1 {
                    break;
                }
            }
        })
        .await
        .unwrap();
        {
            let current = status.borrow();
            assert_eq!(current.current_r, 3000.0);
            assert_eq!(current.current_r_degrees, 0.0);
            assert!(current.state.active());
        }

        let outcome = sequencer.join().await.unwrap();
        assert_eq!(outcome.net_revolutions, 0.0);
        assert_eq!(sequencer.status().last_outcome, Some(outcome));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn stuck_axis_times_out_and_moves_on() {
        let config = RigConfig::default();
        let mock = Arc::new(MockController::new());
        mock.set_reach_targets(false);
        let controller: Arc<dyn MotionController> = mock.clone();
        let sequencer = ScanSequencer::new(
            &config,
            Some(controller),
            Arc::new(TelemetryCell::new()),
            OperatorModes::detached(3000.0),
        );

        let start = Instant::now();
        sequencer
            .start(ScanSettings {
                dry_run: false,
                ..dry_settings(1)
            })
            .unwrap();

        // the rotation command only goes out once the 20 s translation wait expires
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(mock.commands().len(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(mock.commands().len(), 2);

        let outcome = sequencer.join().await.unwrap();
        assert_eq!(outcome.completed_steps, 2);
        assert_eq!(outcome.timeouts, 4);
        assert!(start.elapsed() >= Duration::from_secs(90));
        assert!(logs_contain("timed out"));
    }
}
