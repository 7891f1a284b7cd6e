use serde::{Deserialize, Serialize};

use crate::types::ControlThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Falling edge sets a latched flag; the loop confirms the level.
    Interrupt,
    /// Level sampled every fast tick and debounced with a timer.
    Polled,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::Polled => "polled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "interrupt" | "irq" => Some(Self::Interrupt),
            "polled" | "poll" => Some(Self::Polled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub reference_temp_c: f32,
    pub reference_voltage: f32,
    /// Volts per degree; negative for a forward-biased junction.
    pub coefficient: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            reference_temp_c: 24.6,
            reference_voltage: 1.722_145_4,
            coefficient: -0.001_876,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub passes: u8,
    pub samples_per_pass: u16,
    pub sample_delay_us: u32,
    pub settle_ms: u32,
    pub adc_full_scale: u16,
    pub reference_voltage: f32,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            passes: 3,
            samples_per_pass: 200,
            sample_delay_us: 50,
            settle_ms: 1_000,
            adc_full_scale: (1 << 12) - 1,
            reference_voltage: 3.3,
            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub measure_interval_ms: u64,
    pub input_mode: InputMode,
    pub interrupt_debounce_ms: u64,
    pub polled_debounce_ms: u64,
    /// Input level that counts as "pressed". Buttons are wired to a pull-up.
    pub active_low: bool,
    pub fan_floor_pct: u8,
    pub default_thresholds: ControlThresholds,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u32,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            measure_interval_ms: 5_000,
            input_mode: InputMode::Interrupt,
            interrupt_debounce_ms: 1_000,
            polled_debounce_ms: 50,
            active_low: true,
            fan_floor_pct: 20,
            default_thresholds: ControlThresholds::default(),
            reconnect_attempts: 20,
            reconnect_delay_ms: 500,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn debounce_ms(&self) -> u64 {
        match self.input_mode {
            InputMode::Interrupt => self.interrupt_debounce_ms,
            InputMode::Polled => self.polled_debounce_ms,
        }
    }

    pub fn sanitize(&mut self) {
        self.measure_interval_ms = self.measure_interval_ms.max(100);
        self.fan_floor_pct = self.fan_floor_pct.min(100);
        self.reconnect_attempts = self.reconnect_attempts.clamp(1, 100);
        self.reconnect_delay_ms = self.reconnect_delay_ms.min(10_000);

        let estimator = &mut self.estimator;
        estimator.passes = estimator.passes.max(1);
        estimator.samples_per_pass = estimator.samples_per_pass.max(1);
        estimator.sample_delay_us = estimator.sample_delay_us.min(10_000);
        estimator.settle_ms = estimator.settle_ms.min(10_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub collector_url: String,
    /// The collector sits behind a dynamic-hostname development tunnel whose
    /// certificate cannot be pinned, so chain validation is off by default.
    pub accept_invalid_certs: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            collector_url: "https://localhost:3000/api/sensors".to_string(),
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut runtime: Self = serde_json::from_str(raw)?;
        runtime.sanitize();
        Ok(runtime)
    }

    pub fn sanitize(&mut self) {
        self.monitor.sanitize();
        self.network.collector_url = self.network.collector_url.trim().to_string();
    }
}
