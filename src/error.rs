//! Custom error types for the scan core.
//!
//! This module defines the primary error type, `ScanError`, shared by the controller client,
//! the configuration loader and the scan sequencer. Using the `thiserror` crate, it keeps the
//! failure taxonomy of the rig in one place.
//!
//! ## Error Hierarchy
//!
//! - **`Validation`**: Scan settings rejected at `start()`. The run never begins.
//! - **`Transport`**: A command could not be delivered to the motion controller, or the
//!   controller answered with a non-success status. The sequencer logs these and keeps going,
//!   since the device may still execute a previously accepted command.
//! - **`Http`**: Wraps `reqwest::Error` for connection-level failures.
//! - **`Protocol`**: The controller answered, but with a payload we could not interpret.
//! - **`Config`** / **`InvalidConfig`**: Figment extraction failures and semantic validation
//!   failures of the rig configuration.
//!
//! Timeouts and user cancellation are not errors. They are reported as
//! [`WaitOutcome`](crate::scan::WaitOutcome) values by the completion watcher.

use thiserror::Error;

/// Convenience alias for results using the scan error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Errors raised by the scan core.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Scan settings rejected before a run starts
    #[error("Invalid scan settings: {0}")]
    Validation(String),

    /// Command not delivered, or refused by the controller
    #[error("Controller transport failure: {0}")]
    Transport(String),

    /// Connection-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Controller payload that could not be interpreted
    #[error("Unexpected controller payload: {0}")]
    Protocol(String),

    /// Configuration could not be extracted
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but semantically invalid
    #[error("Configuration validation error: {0}")]
    InvalidConfig(String),
}
