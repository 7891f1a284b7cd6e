//! Delivery of the latest snapshot to the collector and application of the
//! commands it returns.
//!
//! Delivery is at-most-once: a cycle that cannot reach the collector drops
//! its telemetry. Nothing in here may fail the caller; every error path ends
//! in a logged [`ReportOutcome`] with the thresholds untouched.

use embedded_hal::delay::DelayNs;
use log::{info, warn};
use serde_json::Value;

use crate::{
    error::{ReportError, TransportError},
    types::{ControlThresholds, Snapshot, TelemetryPayload},
};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const COMMAND_FAN_LIMITS: &str = "fan_limits";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorReply {
    pub status: u16,
    pub body: String,
}

impl CollectorReply {
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

/// Network side of the reporter. `post_json` is a single blocking exchange.
pub trait CollectorLink {
    fn is_connected(&mut self) -> bool;
    fn begin_reconnect(&mut self);
    fn post_json(&mut self, url: &str, body: &str) -> Result<CollectorReply, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    FanLimits {
        min_temp: Option<i32>,
        max_temp: Option<i32>,
    },
}

impl RemoteCommand {
    /// Unknown kinds, non-object entries, and a missing `type` yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let kind = object.get("type").and_then(Value::as_str).unwrap_or("");

        match kind {
            COMMAND_FAN_LIMITS => Some(Self::FanLimits {
                min_temp: object.get("min_temp").and_then(int_field),
                max_temp: object.get("max_temp").and_then(int_field),
            }),
            _ => None,
        }
    }
}

fn int_field(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|raw| i32::try_from(raw).ok())
}

pub fn parse_commands(body: &str) -> Result<Vec<RemoteCommand>, ReportError> {
    let document: Value =
        serde_json::from_str(body).map_err(|err| ReportError::Malformed(err.to_string()))?;

    let Some(object) = document.as_object() else {
        return Err(ReportError::Malformed("top level is not an object".to_string()));
    };

    match object.get("commands") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => Ok(entries
            .iter()
            .filter_map(RemoteCommand::from_value)
            .collect()),
        Some(_) => Err(ReportError::Malformed("`commands` is not an array".to_string())),
    }
}

/// Applies commands in order; returns how many changed the thresholds.
pub fn apply_commands(commands: &[RemoteCommand], thresholds: &mut ControlThresholds) -> usize {
    let mut changes = 0;
    for command in commands {
        match *command {
            RemoteCommand::FanLimits { min_temp, max_temp } => {
                if thresholds.apply_limits(min_temp, max_temp) {
                    changes += 1;
                    info!("fan limits updated: {}", thresholds.window_label());
                    if thresholds.is_inverted() {
                        warn!(
                            "accepted inverted fan window {}; fan holds floor duty until corrected",
                            thresholds.window_label()
                        );
                    }
                }
            }
        }
    }
    changes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Send mode is off.
    Skipped,
    /// The DHT reading is invalid; NaN is never transmitted.
    InvalidReading,
    LinkDown,
    Delivered { threshold_changes: usize },
    Rejected { status: u16 },
    Malformed,
    TransportFailed,
}

#[derive(Debug, Clone)]
pub struct TelemetryReporter {
    url: String,
    reconnect_attempts: u32,
    reconnect_delay_ms: u32,
}

impl TelemetryReporter {
    pub fn new(url: impl Into<String>, reconnect_attempts: u32, reconnect_delay_ms: u32) -> Self {
        Self {
            url: url.into(),
            reconnect_attempts: reconnect_attempts.max(1),
            reconnect_delay_ms,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn report<L, D>(
        &self,
        link: &mut L,
        delay: &mut D,
        snapshot: &Snapshot,
        thresholds: &mut ControlThresholds,
    ) -> ReportOutcome
    where
        L: CollectorLink,
        D: DelayNs,
    {
        if !snapshot.send_enabled {
            return ReportOutcome::Skipped;
        }

        let Some(payload) = TelemetryPayload::from_snapshot(snapshot) else {
            warn!("skipping telemetry: sensor reading is invalid");
            return ReportOutcome::InvalidReading;
        };

        match self.deliver(link, delay, &payload, thresholds) {
            Ok(threshold_changes) => ReportOutcome::Delivered { threshold_changes },
            Err(err) => {
                warn!("telemetry not delivered: {err}");
                match err {
                    ReportError::LinkUnavailable { .. } => ReportOutcome::LinkDown,
                    ReportError::Transport(_) => ReportOutcome::TransportFailed,
                    ReportError::Rejected { status, .. } => ReportOutcome::Rejected { status },
                    ReportError::Malformed(_) => ReportOutcome::Malformed,
                }
            }
        }
    }

    fn deliver<L, D>(
        &self,
        link: &mut L,
        delay: &mut D,
        payload: &TelemetryPayload,
        thresholds: &mut ControlThresholds,
    ) -> Result<usize, ReportError>
    where
        L: CollectorLink,
        D: DelayNs,
    {
        self.ensure_link(link, delay)?;

        let body = serde_json::to_string(payload)
            .map_err(|err| ReportError::Transport(TransportError(err.to_string())))?;
        let reply = link.post_json(&self.url, &body)?;
        info!("HTTP: {}", reply.status);

        if !reply.is_success() {
            return Err(ReportError::Rejected {
                status: reply.status,
                body: reply.body,
            });
        }

        let commands = parse_commands(&reply.body)?;
        Ok(apply_commands(&commands, thresholds))
    }

    fn ensure_link<L, D>(&self, link: &mut L, delay: &mut D) -> Result<(), ReportError>
    where
        L: CollectorLink,
        D: DelayNs,
    {
        if link.is_connected() {
            return Ok(());
        }

        info!("link down; trying to reconnect");
        link.begin_reconnect();
        for _ in 0..self.reconnect_attempts {
            delay.delay_ms(self.reconnect_delay_ms);
            if link.is_connected() {
                info!("link restored");
                return Ok(());
            }
        }

        Err(ReportError::LinkUnavailable {
            attempts: self.reconnect_attempts,
        })
    }
}
