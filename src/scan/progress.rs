//! Completion percentage and remaining-time estimate for a scan run.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Number of recent step durations the estimate averages over.
pub const DURATION_WINDOW: usize = 6;

/// Label shown when no estimate is available.
pub const INDETERMINATE: &str = "--";

/// Point-in-time view of the estimator, for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Steps finished so far
    pub completed_steps: usize,
    /// Steps in the whole run
    pub total_steps: usize,
    /// 0..=100
    pub percentage: f64,
    /// Remaining time in seconds, once known
    pub eta_secs: Option<f64>,
    /// Percentage for display
    pub percentage_label: String,
    /// ETA for display, `--` while unknown
    pub eta_label: String,
}

/// Step counter with a moving-average ETA.
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    total_steps: usize,
    completed_steps: usize,
    step_durations: VecDeque<Duration>,
}

impl ProgressEstimator {
    /// Empty estimator for a run of zero steps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over for a run of `total_steps`.
    pub fn reset(&mut self, total_steps: usize) {
        self.total_steps = total_steps;
        self.completed_steps = 0;
        self.step_durations.clear();
    }

    /// Count one finished step that took `duration` of active (unpaused) time.
    pub fn record_step(&mut self, duration: Duration) {
        self.completed_steps = (self.completed_steps + 1).min(self.total_steps);
        if self.step_durations.len() == DURATION_WINDOW {
            self.step_durations.pop_front();
        }
        self.step_durations.push_back(duration);
    }

    /// Steps finished so far.
    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    /// Steps in the whole run.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Completion in percent.
    pub fn percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps as f64 / self.total_steps as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Mean of the recent step durations.
    pub fn average_step(&self) -> Option<Duration> {
        if self.step_durations.is_empty() {
            return None;
        }
        let sum: Duration = self.step_durations.iter().sum();
        Some(sum / self.step_durations.len() as u32)
    }

    /// Estimated remaining active time.
    pub fn eta(&self) -> Option<Duration> {
        let average = self.average_step()?;
        if average.is_zero() {
            return None;
        }
        let remaining = self.total_steps.saturating_sub(self.completed_steps);
        Some(average * remaining as u32)
    }

    /// Display view of the estimator.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let eta = self.eta();
        let percentage_label = if self.total_steps == 0 {
            INDETERMINATE.to_string()
        } else {
            format!("{:.0}%", self.percentage())
        };
        ProgressSnapshot {
            completed_steps: self.completed_steps,
            total_steps: self.total_steps,
            percentage: self.percentage(),
            eta_secs: eta.map(|d| d.as_secs_f64()),
            percentage_label,
            eta_label: format_eta(eta),
        }
    }
}

/// Render a remaining-time estimate as `1h 02m 03s`, `2m 05s` or `12s`.
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return INDETERMINATE.to_string();
    };
    let secs = eta.as_secs_f64().round() as u64;
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
