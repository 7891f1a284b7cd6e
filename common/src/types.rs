use serde::{Deserialize, Serialize};

/// One DHT snapshot. `valid == false` means the numbers are not meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature_c: f32,
    pub humidity: f32,
    pub valid: bool,
}

impl SensorReading {
    pub fn new(temperature_c: f32, humidity: f32) -> Self {
        Self {
            temperature_c,
            humidity,
            valid: temperature_c.is_finite() && humidity.is_finite(),
        }
    }

    pub fn invalid() -> Self {
        Self {
            temperature_c: f32::NAN,
            humidity: f32::NAN,
            valid: false,
        }
    }

    pub fn values(&self) -> Option<(f32, f32)> {
        self.valid.then_some((self.temperature_c, self.humidity))
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::invalid()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LedTemperatureEstimate {
    pub temperature_c: f32,
    /// Averaged photodiode voltage, surfaced for diagnostics only.
    pub voltage: f32,
    pub passes: u8,
    /// Set when a pending input cut the measurement short.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlThresholds {
    pub min_temp: i32,
    pub max_temp: i32,
}

impl Default for ControlThresholds {
    fn default() -> Self {
        Self::new(20, 50)
    }
}

impl ControlThresholds {
    pub const fn new(min_temp: i32, max_temp: i32) -> Self {
        Self { min_temp, max_temp }
    }

    pub fn is_inverted(&self) -> bool {
        self.max_temp <= self.min_temp
    }

    /// Applies a partial update; absent fields keep their current value.
    /// Both fields are replaced together. Returns whether anything changed.
    pub fn apply_limits(&mut self, min_temp: Option<i32>, max_temp: Option<i32>) -> bool {
        let next = Self::new(
            min_temp.unwrap_or(self.min_temp),
            max_temp.unwrap_or(self.max_temp),
        );
        if next != *self {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn window_label(&self) -> String {
        format!("{}-{}C", self.min_temp, self.max_temp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanCommand {
    pub duty_pct: u8,
}

pub fn send_mode_label(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}

/// Everything one slow tick produced; display and telemetry read the same copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub reading: SensorReading,
    pub estimate: LedTemperatureEstimate,
    pub fan: FanCommand,
    pub thresholds: ControlThresholds,
    pub send_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryPayload {
    pub temperature: f32,
    pub humidity: f32,
    pub led_temp: f32,
}

impl TelemetryPayload {
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let (temperature, humidity) = snapshot.reading.values()?;
        Some(Self {
            temperature,
            humidity,
            led_temp: snapshot.estimate.temperature_c,
        })
    }
}
