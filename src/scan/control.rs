//! Cooperative pause/stop signalling between the control surface and a running scan.
//!
//! Every wait inside a run goes through [`RunControl`]: sleeps end early on stop, and
//! checkpoints hold the run in place while it is paused. Time spent paused is
//! accumulated so waits and step timing can exclude it.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[derive(Debug, Default)]
struct PauseClock {
    paused_since: Option<Instant>,
    accumulated: Duration,
}

/// Stop and pause signals shared by every suspension point of a run.
#[derive(Clone)]
pub struct RunControl {
    cancel: CancellationToken,
    pause: Arc<Mutex<PauseClock>>,
    poll_interval: Duration,
}

impl RunControl {
    /// Fresh control; paused checkpoints re-check every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            pause: Arc::new(Mutex::new(PauseClock::default())),
            poll_interval,
        }
    }

    /// How often a paused checkpoint re-checks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Suspend the run at its next checkpoint.
    pub fn pause(&self) {
        let mut clock = self.pause.lock();
        if clock.paused_since.is_none() {
            clock.paused_since = Some(Instant::now());
        }
    }

    /// Let a paused run continue.
    pub fn resume(&self) {
        let mut clock = self.pause.lock();
        if let Some(since) = clock.paused_since.take() {
            clock.accumulated += since.elapsed();
        }
    }

    /// Whether the run is paused.
    pub fn is_paused(&self) -> bool {
        self.pause.lock().paused_since.is_some()
    }

    /// Request a stop. Also releases a paused run.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Total time spent paused so far, including an ongoing pause.
    pub fn paused_total(&self) -> Duration {
        let clock = self.pause.lock();
        clock.accumulated
            + clock
                .paused_since
                .map(|since| since.elapsed())
                .unwrap_or_default()
    }

    /// Sleep for `duration` unless stopped first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(Cancelled),
        }
    }

    /// Return immediately when running, block while paused, fail once stopped.
    pub async fn checkpoint(&self) -> Result<(), Cancelled> {
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            if !self.is_paused() {
                return Ok(());
            }
            self.sleep(self.poll_interval).await?;
        }
    }
}
