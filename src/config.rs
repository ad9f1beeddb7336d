//! Rig Configuration using Figment
//!
//! Strongly-typed configuration for the scan core. Configuration is loaded from:
//! 1. a TOML file (default `config/scanbot.toml`)
//! 2. Environment variables (prefixed with `SCANBOT_`, sections split by `__`)
//!
//! Every section carries serde defaults matching the rig as built, so an empty
//! file (or no file at all) yields a usable configuration.
//!
//! # Example
//! ```no_run
//! use scanbot::config::RigConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RigConfig::load()?;
//! config.validate()?;
//! println!("Controller: {}", config.controller.base_url);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ScanError, ScanResult};
use crate::geometry::CoordinateMapper;
use crate::planner::AxisBounds;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/scanbot.toml";

/// Top-level rig configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Motion controller endpoint
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Scene <-> controller unit conversion
    #[serde(default)]
    pub geometry: GeometryConfig,
    /// Translational bounds and rotation soft limit
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Wait cadence, timeouts and tolerances
    #[serde(default)]
    pub timing: TimingConfig,
    /// Direct control pusher
    #[serde(default)]
    pub direct_control: DirectControlConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Remote motion controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Base URL of the controller API, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Telemetry poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub telemetry_poll_ms: u64,
}

/// Affine mapping between scene space and controller position units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Controller X at scene x = 0
    #[serde(default = "default_x_origin")]
    pub x_origin: f64,
    /// Controller X units per scene unit (X runs opposite to scene x)
    #[serde(default = "default_x_scale")]
    pub x_scale: f64,
    /// Controller vertical position at scene z = 0
    #[serde(default = "default_z_origin")]
    pub z_origin: f64,
    /// Controller vertical units per scene unit
    #[serde(default = "default_z_scale")]
    pub z_scale: f64,
    /// Native R-axis units per full revolution
    #[serde(default = "default_r_units_per_rev")]
    pub r_units_per_rev: f64,
    /// Scene-space X of the lock-origin reference point
    #[serde(default)]
    pub scan_origin_x: f64,
    /// Scene-space Z of the lock-origin reference point
    #[serde(default = "default_scan_origin_z")]
    pub scan_origin_z: f64,
    /// Raw P units corresponding to a 90 degree deflection
    #[serde(default = "default_p_raw_full_scale")]
    pub p_raw_full_scale: f64,
}

/// Axis limits in scene units plus the rotation soft limit in native units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Lowest reachable scene x
    #[serde(default)]
    pub x_min: f64,
    /// Highest reachable scene x
    #[serde(default = "default_x_max")]
    pub x_max: f64,
    /// Lowest reachable scene z
    #[serde(default)]
    pub z_min: f64,
    /// Highest reachable scene z
    #[serde(default = "default_z_max")]
    pub z_max: f64,
    /// Initial upper soft limit of the R axis (extended during scans)
    #[serde(default = "default_rotation_soft_limit")]
    pub rotation_soft_limit: f64,
}

/// Timing and tolerance configuration for the scan sequencer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Cooperative polling interval for every wait, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Translation wait timeout in milliseconds
    #[serde(default = "default_move_timeout")]
    pub move_timeout_ms: u64,
    /// Rotation wait timeout in milliseconds
    #[serde(default = "default_rotation_timeout")]
    pub rotation_timeout_ms: u64,
    /// Settle delay the dry-run simulator uses in place of real completion
    #[serde(default = "default_dry_run_settle")]
    pub dry_run_settle_ms: u64,
    /// Translation tolerance in scene units
    #[serde(default = "default_translation_tolerance")]
    pub translation_tolerance: f64,
    /// Rotation tolerance in native R units
    #[serde(default = "default_rotation_tolerance")]
    pub rotation_tolerance: f64,
}

/// Direct control pusher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectControlConfig {
    /// Push interval in seconds, clamped into 1..=60
    #[serde(default = "default_direct_control_interval")]
    pub interval_secs: f64,
}

// Default value functions
fn default_name() -> String {
    "scanbot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_base_url() -> String {
    "http://192.168.178.222:8001/api".to_string()
}

fn default_request_timeout() -> u64 {
    2000
}

fn default_poll_interval() -> u64 {
    50
}

fn default_x_origin() -> f64 {
    1665.0
}

fn default_x_scale() -> f64 {
    5.0
}

fn default_z_origin() -> f64 {
    625.0
}

fn default_z_scale() -> f64 {
    25.0
}

fn default_r_units_per_rev() -> f64 {
    3000.0
}

fn default_scan_origin_z() -> f64 {
    27.0
}

fn default_p_raw_full_scale() -> f64 {
    255.0
}

fn default_x_max() -> f64 {
    600.0
}

fn default_z_max() -> f64 {
    400.0
}

fn default_rotation_soft_limit() -> f64 {
    3000.0
}

fn default_move_timeout() -> u64 {
    20_000
}

fn default_rotation_timeout() -> u64 {
    25_000
}

fn default_dry_run_settle() -> u64 {
    120
}

fn default_translation_tolerance() -> f64 {
    1.5
}

fn default_rotation_tolerance() -> f64 {
    10.0
}

fn default_direct_control_interval() -> f64 {
    5.0
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
            telemetry_poll_ms: default_poll_interval(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            x_origin: default_x_origin(),
            x_scale: default_x_scale(),
            z_origin: default_z_origin(),
            z_scale: default_z_scale(),
            r_units_per_rev: default_r_units_per_rev(),
            scan_origin_x: 0.0,
            scan_origin_z: default_scan_origin_z(),
            p_raw_full_scale: default_p_raw_full_scale(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: default_x_max(),
            z_min: 0.0,
            z_max: default_z_max(),
            rotation_soft_limit: default_rotation_soft_limit(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            move_timeout_ms: default_move_timeout(),
            rotation_timeout_ms: default_rotation_timeout(),
            dry_run_settle_ms: default_dry_run_settle(),
            translation_tolerance: default_translation_tolerance(),
            rotation_tolerance: default_rotation_tolerance(),
        }
    }
}

impl Default for DirectControlConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_direct_control_interval(),
        }
    }
}

impl RigConfig {
    /// Load configuration from `config/scanbot.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `SCANBOT_`.
    /// Example: `SCANBOT_TIMING__MOVE_TIMEOUT_MS=30000`
    pub fn load() -> ScanResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScanResult<Self> {
        let config = Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SCANBOT_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> ScanResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ScanError::InvalidConfig(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(ScanError::InvalidConfig(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let url = &self.controller.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ScanError::InvalidConfig(format!(
                "Controller base_url '{url}' must start with http:// or https://"
            )));
        }

        let g = &self.geometry;
        for (name, value) in [
            ("x_scale", g.x_scale),
            ("z_scale", g.z_scale),
            ("r_units_per_rev", g.r_units_per_rev),
            ("p_raw_full_scale", g.p_raw_full_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ScanError::InvalidConfig(format!(
                    "geometry.{name} must be positive, got {value}"
                )));
            }
        }

        let l = &self.limits;
        if l.x_min > l.x_max || l.z_min > l.z_max {
            return Err(ScanError::InvalidConfig(format!(
                "Axis limits must satisfy min <= max (x: {}..{}, z: {}..{})",
                l.x_min, l.x_max, l.z_min, l.z_max
            )));
        }

        if self.controller.telemetry_poll_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "telemetry poll interval must be non-zero".to_string(),
            ));
        }

        let t = &self.timing;
        if t.poll_interval_ms == 0 || t.move_timeout_ms == 0 || t.rotation_timeout_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "poll interval and timeouts must be non-zero".to_string(),
            ));
        }
        if !(t.translation_tolerance > 0.0 && t.rotation_tolerance > 0.0) {
            return Err(ScanError::InvalidConfig(
                "tolerances must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Coordinate mapper built from the geometry section
    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::from_config(&self.geometry)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> ScanResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ScanError::InvalidConfig(format!("Failed to render configuration: {e}")))
    }

    /// Translational bounds in scene units
    pub fn bounds(&self) -> AxisBounds {
        AxisBounds {
            x_min: self.limits.x_min,
            x_max: self.limits.x_max,
            z_min: self.limits.z_min,
            z_max: self.limits.z_max,
        }
    }
}

impl ControllerConfig {
    /// Cadence of the live telemetry poller.
    pub fn telemetry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_poll_ms)
    }
}

impl TimingConfig {
    /// Cadence of completion polling while waiting for a move.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout for one translation wait.
    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    /// Timeout for one rotation wait.
    pub fn rotation_timeout(&self) -> Duration {
        Duration::from_millis(self.rotation_timeout_ms)
    }

    /// Simulated settle time per dry-run move.
    pub fn dry_run_settle(&self) -> Duration {
        Duration::from_millis(self.dry_run_settle_ms)
    }
}

impl DirectControlConfig {
    /// Push interval after clamping into the accepted 1..=60 second range
    pub fn interval(&self) -> Duration {
        let secs = if self.interval_secs.is_finite() {
            self.interval_secs.clamp(1.0, 60.0)
        } else {
            default_direct_control_interval()
        };
        Duration::from_secs_f64(secs)
    }
}
