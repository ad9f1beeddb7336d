//! Emergency stop of every axis.
//!
//! Stop requests go out concurrently and are all awaited, so one unreachable axis
//! does not delay the others.

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, warn};

use crate::controller::{Axis, MotionController, STOP_AXES};

/// Result of an emergency stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmergencyStopReport {
    /// Axes that acknowledged the stop
    pub stopped: Vec<Axis>,
    /// Axes whose stop failed, with the error text
    pub failed: Vec<(Axis, String)>,
}

impl EmergencyStopReport {
    /// Whether every axis acknowledged.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Send `stop` to every axis and collect the results.
pub async fn emergency_stop(controller: &dyn MotionController) -> EmergencyStopReport {
    warn!("EMERGENCY STOP requested");
    let results = join_all(STOP_AXES.iter().map(|&axis| async move {
        (axis, controller.stop(axis).await)
    }))
    .await;

    let mut report = EmergencyStopReport::default();
    for (axis, result) in results {
        match result {
            Ok(()) => report.stopped.push(axis),
            Err(e) => {
                error!(%axis, error = %e, "Stop failed");
                report.failed.push((axis, e.to_string()));
            }
        }
    }
    report
}
