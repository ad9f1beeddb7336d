//! HTTP client for the rig's motion controller.
//!
//! The controller exposes a small JSON API:
//!
//! | Verb | Endpoint | Body / Response |
//! |------|----------|-----------------|
//! | move | `POST /moveabs` | `{"x":..,"y":..,"p":..,"r":..}` |
//! | stop | `POST /stop` | `{"axis":"x"}` |
//! | status | `GET /pos?refresh=true` | position keys, `status`, `homed`, optional `line` |
//! | motion state | `GET /motionstate` | `{"state":"idle"}` or `"idle"` |
//!
//! Status payloads are loosely typed: numbers may arrive as strings, and some firmware
//! only reports a `line` such as `"x: 1200 y=400 p:-12"`. Keys found in the JSON object
//! take precedence over keys parsed from the line.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{Axis, MotionController, MotionState, MoveCommand, RawPosition, StatusReport};
use crate::config::ControllerConfig;
use crate::error::{ScanError, ScanResult};

const POSITION_KEYS: [&str; 8] = ["x", "y", "z", "x1", "x2", "p", "r", "homed"];

/// Motion controller reached over HTTP.
pub struct HttpController {
    client: reqwest::Client,
    base_url: String,
    line_pattern: Regex,
}

impl HttpController {
    /// Build a client for the controller at `config.base_url`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(config: &ControllerConfig) -> ScanResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        let line_pattern = Regex::new(r"([a-zA-Z][a-zA-Z0-9]*)\s*[:=]\s*(-?\d+(?:\.\d+)?)")
            .map_err(|e| ScanError::Protocol(format!("status line pattern: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            line_pattern,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: &Value, what: &str) -> ScanResult<()> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ScanError::Transport(
                format!("{what} {} {}", status.as_u16(), detail.trim())
                    .trim()
                    .to_string(),
            ));
        }
        Ok(())
    }

    async fn get_json(&self, path: &str, what: &str) -> ScanResult<Value> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Transport(format!("{what} {}", status.as_u16())));
        }
        Ok(response.json().await?)
    }

    /// Interpret a `/pos` payload.
    pub fn parse_status(&self, payload: &Value) -> ScanResult<StatusReport> {
        let object = payload
            .as_object()
            .ok_or_else(|| ScanError::Protocol("status payload is not an object".into()))?;

        let mut axes: HashMap<String, f64> = HashMap::new();
        for key in POSITION_KEYS {
            if let Some(value) = object.get(key).and_then(read_numeric) {
                axes.insert(key.to_string(), value);
            }
        }
        if let Some(line) = object.get("line").and_then(Value::as_str) {
            for (key, value) in self.parse_line(line) {
                axes.entry(key).or_insert(value);
            }
        }

        let status = object.get("status").and_then(|s| match s {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        let raw_x = axes.get("x").or_else(|| axes.get("x1")).copied();
        let raw_vertical = axes.get("y").copied();
        let position = match (raw_x, raw_vertical) {
            (Some(x), Some(z)) => Some(RawPosition {
                x,
                z,
                depth: axes.get("z").copied(),
                p: axes.get("p").copied(),
                r: axes.get("r").copied(),
            }),
            _ => None,
        };

        // homing state is only trusted alongside a complete position
        let homed = position.and(axes.get("homed").copied());
        Ok(StatusReport {
            status,
            position,
            homed,
        })
    }

    fn parse_line(&self, line: &str) -> Vec<(String, f64)> {
        self.line_pattern
            .captures_iter(line)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str().to_ascii_lowercase();
                let value: f64 = caps.get(2)?.as_str().parse().ok()?;
                value.is_finite().then_some((key, value))
            })
            .collect()
    }
}

/// Accept finite numbers and numeric strings.
fn read_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Interpret a `/motionstate` payload.
pub fn parse_motion_state(payload: &Value) -> ScanResult<MotionState> {
    let raw = match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("state").and_then(Value::as_str),
        _ => None,
    };
    raw.and_then(MotionState::parse)
        .ok_or_else(|| ScanError::Protocol(format!("unrecognised motion state: {payload}")))
}

#[async_trait]
impl MotionController for HttpController {
    #[instrument(skip(self), level = "debug")]
    async fn move_absolute(&self, command: MoveCommand) -> ScanResult<()> {
        let body = serde_json::to_value(command)
            .map_err(|e| ScanError::Protocol(format!("encode moveabs: {e}")))?;
        self.post_json("moveabs", &body, "moveabs").await
    }

    async fn stop(&self, axis: Axis) -> ScanResult<()> {
        debug!(%axis, "Sending stop");
        let body = serde_json::json!({ "axis": axis.as_str() });
        self.post_json("stop", &body, &format!("stop {axis}")).await
    }

    async fn poll_status(&self, refresh: bool) -> ScanResult<StatusReport> {
        let path = if refresh { "pos?refresh=true" } else { "pos" };
        let payload = self.get_json(path, "pos api").await?;
        self.parse_status(&payload)
    }

    async fn poll_coordinated_motion_state(&self) -> ScanResult<MotionState> {
        let payload = self.get_json("motionstate", "motion state").await?;
        parse_motion_state(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn controller() -> HttpController {
        HttpController::new(&ControllerConfig::default()).unwrap()
    }

    #[test]
    fn parses_full_status_payload() {
        let report = controller()
            .parse_status(&json!({
                "status": "ok",
                "x": 1200,
                "y": "400.5",
                "p": -12,
                "r": 6000,
                "homed": 1
            }))
            .unwrap();

        assert_eq!(report.status.as_deref(), Some("ok"));
        assert_eq!(report.homed, Some(1.0));
        let pos = report.position.unwrap();
        assert_eq!(pos.x, 1200.0);
        assert_eq!(pos.z, 400.5);
        assert_eq!(pos.p, Some(-12.0));
        assert_eq!(pos.r, Some(6000.0));
        assert_eq!(pos.depth, None);
    }

    #[test]
    fn line_fills_missing_keys_only() {
        let report = controller()
            .parse_status(&json!({
                "status": "ok",
                "y": 300,
                "line": "X1: 900 y=1 R:42.5 homed=0"
            }))
            .unwrap();

        let pos = report.position.unwrap();
        assert_eq!(pos.x, 900.0); // from x1
        assert_eq!(pos.z, 300.0); // object wins over line
        assert_eq!(pos.r, Some(42.5));
        assert_eq!(report.homed, Some(0.0));
    }

    #[test]
    fn missing_axes_yield_no_position() {
        let report = controller()
            .parse_status(&json!({"status": "ok", "x": 10, "homed": 1}))
            .unwrap();
        assert!(report.position.is_none());
        assert_eq!(report.homed, None);
        assert_eq!(report.status.as_deref(), Some("ok"));
        assert!(!report.permits_direct_control());
    }

    #[test]
    fn non_object_status_is_protocol_error() {
        assert!(matches!(
            controller().parse_status(&json!([1, 2])),
            Err(ScanError::Protocol(_))
        ));
    }

    #[test]
    fn parses_motion_state_shapes() {
        assert_eq!(
            parse_motion_state(&json!({"state": "queued"})).unwrap(),
            MotionState::Queued
        );
        assert_eq!(parse_motion_state(&json!("IDLE")).unwrap(), MotionState::Idle);
        assert!(parse_motion_state(&json!({"state": 3})).is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ControllerConfig {
            base_url: "http://rig.local/api/".to_string(),
            ..Default::default()
        };
        let http = HttpController::new(&config).unwrap();
        assert_eq!(http.url("moveabs"), "http://rig.local/api/moveabs");
    }
}
