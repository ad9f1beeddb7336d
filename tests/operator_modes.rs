//! Integration tests for the operator modes around a scan
//!
//! Direct control depends on the device status published by the telemetry poller, and
//! a running scan takes direct control away from the operator until it ends.

use scanbot::config::RigConfig;
use scanbot::controller::mock::MockController;
use scanbot::controller::MotionController;
use scanbot::direct_control::{DirectControl, DirectTarget, TickOutcome};
use scanbot::modes::OperatorModes;
use scanbot::scan::{ScanSequencer, ScanSettings};
use scanbot::telemetry::{TelemetryCell, TelemetryPoller};
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    mock: Arc<MockController>,
    poller: TelemetryPoller,
    modes: OperatorModes,
    direct: DirectControl,
    telemetry: Arc<TelemetryCell>,
    config: RigConfig,
}

fn rig() -> Rig {
    let config = RigConfig::default();
    let mock = Arc::new(MockController::new());
    let controller: Arc<dyn MotionController> = mock.clone();
    let telemetry = Arc::new(TelemetryCell::new());
    let poller = TelemetryPoller::new(
        controller.clone(),
        telemetry.clone(),
        config.mapper(),
        config.controller.telemetry_poll_interval(),
    );
    let modes = OperatorModes::new(config.limits.rotation_soft_limit, poller.device_status());
    let direct = DirectControl::new(
        controller,
        modes.clone(),
        config.mapper(),
        config.direct_control.interval(),
    );
    Rig {
        mock,
        poller,
        modes,
        direct,
        telemetry,
        config,
    }
}

#[tokio::test]
async fn test_direct_control_follows_device_readiness() {
    let rig = rig();

    // nothing polled yet: the device counts as offline
    assert!(!rig.modes.set_direct_control(true));

    rig.poller.poll_once().await;
    assert!(rig.modes.set_direct_control(true));
    rig.direct.set_target(DirectTarget {
        x: 200.0,
        z: 100.0,
        deflection: 0.0,
        r: 0.0,
    });
    assert_eq!(rig.direct.tick().await, TickOutcome::Sent);

    // the controller loses its reference
    rig.mock.set_status(Some("ok"), Some(0.0));
    rig.poller.poll_once().await;
    assert_eq!(rig.direct.tick().await, TickOutcome::Unavailable);
    assert!(!rig.modes.flags().direct_control);
    assert_eq!(rig.mock.commands().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scan_suspends_direct_control() {
    let rig = rig();
    rig.poller.poll_once().await;
    rig.modes.set_direct_control(true);
    rig.direct.set_target(DirectTarget {
        x: 200.0,
        z: 100.0,
        deflection: 10.0,
        r: 0.0,
    });

    let sequencer = ScanSequencer::new(&rig.config, None, rig.telemetry.clone(), rig.modes.clone());
    sequencer
        .start(ScanSettings {
            radius: 150.0,
            waypoint_count: 3,
            dry_run: true,
            ..Default::default()
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.direct.tick().await, TickOutcome::Disabled);

    sequencer.join().await.unwrap();
    assert!(rig.modes.flags().direct_control);
    assert_eq!(rig.direct.tick().await, TickOutcome::Sent);
    assert_eq!(rig.mock.commands().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_direct_control_cannot_be_reenabled_during_live_scan() {
    let rig = rig();
    rig.mock.set_reach_targets(false);
    rig.poller.poll_once().await;
    assert!(rig.modes.set_direct_control(true));
    rig.direct.set_target(DirectTarget {
        x: 200.0,
        z: 100.0,
        deflection: 0.0,
        r: 0.0,
    });

    let controller: Arc<dyn MotionController> = rig.mock.clone();
    let sequencer = ScanSequencer::new(
        &rig.config,
        Some(controller),
        rig.telemetry.clone(),
        rig.modes.clone(),
    );
    sequencer
        .start(ScanSettings {
            radius: 150.0,
            waypoint_count: 3,
            ..Default::default()
        })
        .unwrap();

    // the run is parked in its first translation wait
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(sequencer.state().active());
    assert!(!rig.modes.set_direct_control(true));
    assert!(!rig.modes.flags().direct_control);
    assert_eq!(rig.direct.tick().await, TickOutcome::Disabled);
    assert_eq!(rig.mock.commands().len(), 1);

    sequencer.stop();
    sequencer.join().await.unwrap();
    assert!(!rig.modes.flags().scan_active());
    assert!(rig.modes.flags().direct_control);
    assert_eq!(rig.direct.tick().await, TickOutcome::Sent);
    assert_eq!(rig.mock.commands().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pusher_task_sends_on_interval() {
    let rig = rig();
    rig.poller.poll_once().await;
    rig.modes.set_direct_control(true);
    rig.direct.set_target(DirectTarget {
        x: 100.0,
        z: 50.0,
        deflection: 0.0,
        r: 0.0,
    });

    let direct = Arc::new(rig.direct);
    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = direct.clone().spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(11)).await;
    // unchanged payloads are sent once
    assert_eq!(rig.mock.commands().len(), 1);

    direct.set_target(DirectTarget {
        x: 110.0,
        z: 50.0,
        deflection: 0.0,
        r: 0.0,
    });
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(rig.mock.commands().len(), 2);

    shutdown.cancel();
    task.await.unwrap();
}
