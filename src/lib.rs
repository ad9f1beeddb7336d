//! # scanbot
//!
//! Scan orchestration for a multi-axis rig: two translational stages (X, Z), a
//! deflection joint (P) and a continuously spinning disc (R), all driven through a
//! remote motion controller that accepts absolute moves over HTTP.
//!
//! ## Crate Structure
//!
//! - **`config`**: `RigConfig`, loaded from `config/scanbot.toml` plus `SCANBOT_*`
//!   environment overrides and validated before use.
//! - **`error`**: the `ScanError` enum shared by every module.
//! - **`tracing_setup`**: `tracing` subscriber initialisation (pretty, compact or JSON).
//! - **`geometry`**: conversions between scene space, controller units and angles.
//! - **`planner`**: the quarter-arc waypoint pipeline (sample, clamp, resample).
//! - **`controller`**: the `MotionController` trait with an HTTP client and a mock.
//! - **`telemetry`**: the shared latest-position cell and the live poller feeding it.
//! - **`modes`**: lock-origin, direct control and the rotation soft limit.
//! - **`direct_control`**: the periodic pusher of operator target positions.
//! - **`estop`**: emergency stop of every axis.
//! - **`scan`**: settings, plan expansion, completion watching, progress estimation
//!   and the `ScanSequencer` that runs it all.

pub mod config;
pub mod controller;
pub mod direct_control;
pub mod error;
pub mod estop;
pub mod geometry;
pub mod modes;
pub mod planner;
pub mod scan;
pub mod telemetry;
pub mod tracing_setup;

pub use error::{ScanError, ScanResult};
