//! Mock peripherals for driving `MonitorLoop` on the host.
//!
//! Every mock records what the loop asked of it so tests can assert on the
//! full history without real GPIO, ADC, or network.

use std::{cell::Cell, collections::VecDeque, convert::Infallible, rc::Rc};

use embedded_hal::{
    delay::DelayNs,
    pwm::{ErrorType, SetDutyCycle},
};
use ledmon_common::{
    display::Display, estimator::AnalogInput, Board, CollectorLink, CollectorReply,
    ControlThresholds, DigitalInput, EdgeFlag, EnvironmentSensor, MonitorLoop, RuntimeConfig,
    TransportError,
};

// ── Sensor ────────────────────────────────────────────────────

pub struct MockSensor {
    pub readings: VecDeque<(f32, f32)>,
    pub fallback: (f32, f32),
    current: (f32, f32),
    pub reinitialized: u32,
}

impl MockSensor {
    pub fn steady(temperature_c: f32, humidity: f32) -> Self {
        Self {
            readings: VecDeque::new(),
            fallback: (temperature_c, humidity),
            current: (temperature_c, humidity),
            reinitialized: 0,
        }
    }
}

impl EnvironmentSensor for MockSensor {
    fn read_temperature(&mut self) -> f32 {
        self.current = self.readings.pop_front().unwrap_or(self.fallback);
        self.current.0
    }

    fn read_humidity(&mut self) -> f32 {
        self.current.1
    }

    fn reinitialize(&mut self) {
        self.reinitialized += 1;
    }
}

// ── ADC ───────────────────────────────────────────────────────

/// Photodiode stand-in. Optionally simulates a button press after a given
/// number of conversions, the way a user presses mid-measurement.
pub struct MockAdc {
    pub raw: u16,
    pub taken: usize,
    press_after: Option<(usize, Option<EdgeFlag>, Rc<Cell<bool>>)>,
}

impl MockAdc {
    pub fn new(raw: u16) -> Self {
        Self {
            raw,
            taken: 0,
            press_after: None,
        }
    }

    pub fn press_after(&mut self, samples: usize, flag: Option<EdgeFlag>, pressed: Rc<Cell<bool>>) {
        self.taken = 0;
        self.press_after = Some((samples, flag, pressed));
    }
}

impl AnalogInput for MockAdc {
    fn sample(&mut self) -> u16 {
        self.taken += 1;
        if let Some((after, flag, pressed)) = &self.press_after {
            if self.taken == *after {
                pressed.set(true);
                if let Some(flag) = flag {
                    flag.raise();
                }
            }
        }
        self.raw
    }
}

// ── Fan PWM ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockFan {
    pub duties: Vec<u8>,
}

impl ErrorType for MockFan {
    type Error = Infallible;
}

impl SetDutyCycle for MockFan {
    fn max_duty_cycle(&self) -> u16 {
        100
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duties.push(duty as u8);
        Ok(())
    }
}

// ── Button ────────────────────────────────────────────────────

/// Active-low button; the shared cell is "physically pressed".
pub struct MockButton {
    pub pressed: Rc<Cell<bool>>,
}

impl DigitalInput for MockButton {
    fn read_level(&mut self) -> bool {
        !self.pressed.get()
    }
}

// ── Display ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCall {
    Status(String),
    Reading(f32, f32),
    Error(String),
    Led(f32, f32),
    Duty(u8),
    Thresholds(ControlThresholds),
    SendMode(bool),
    Flush,
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub calls: Vec<DisplayCall>,
}

impl RecordingDisplay {
    pub fn last_send_mode(&self) -> Option<bool> {
        self.calls.iter().rev().find_map(|call| match call {
            DisplayCall::SendMode(enabled) => Some(*enabled),
            _ => None,
        })
    }

    pub fn errors(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DisplayCall::Error(_)))
            .count()
    }
}

impl Display for RecordingDisplay {
    fn show_status(&mut self, message: &str) {
        self.calls.push(DisplayCall::Status(message.to_string()));
    }

    fn show_reading(&mut self, temperature: f32, humidity: f32) {
        self.calls.push(DisplayCall::Reading(temperature, humidity));
    }

    fn show_error(&mut self, label: &str) {
        self.calls.push(DisplayCall::Error(label.to_string()));
    }

    fn show_led(&mut self, temperature_c: f32, voltage: f32) {
        self.calls.push(DisplayCall::Led(temperature_c, voltage));
    }

    fn show_duty(&mut self, duty_pct: u8) {
        self.calls.push(DisplayCall::Duty(duty_pct));
    }

    fn show_thresholds(&mut self, thresholds: &ControlThresholds) {
        self.calls.push(DisplayCall::Thresholds(*thresholds));
    }

    fn show_send_mode(&mut self, enabled: bool) {
        self.calls.push(DisplayCall::SendMode(enabled));
    }

    fn flush(&mut self) {
        self.calls.push(DisplayCall::Flush);
    }
}

// ── Collector link ────────────────────────────────────────────

pub struct MockLink {
    pub connected: bool,
    pub replies: VecDeque<CollectorReply>,
    pub posted: Vec<String>,
    pub reconnects: u32,
}

impl MockLink {
    pub fn queue_body(&mut self, body: &str) {
        self.replies.push_back(CollectorReply {
            status: 201,
            body: body.to_string(),
        });
    }
}

impl CollectorLink for MockLink {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn begin_reconnect(&mut self) {
        self.reconnects += 1;
    }

    fn post_json(&mut self, _url: &str, body: &str) -> Result<CollectorReply, TransportError> {
        self.posted.push(body.to_string());
        Ok(self.replies.pop_front().unwrap_or(CollectorReply {
            status: 201,
            body: r#"{"commands":[]}"#.to_string(),
        }))
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Assembly ──────────────────────────────────────────────────

pub type TestMonitor =
    MonitorLoop<MockSensor, MockAdc, MockFan, MockButton, RecordingDisplay, MockLink, NoDelay>;

/// Raw count that the default calibration maps to roughly 35 °C.
pub const RAW_35C: u16 = 2_113;

pub fn make_monitor(runtime: &RuntimeConfig) -> (TestMonitor, Rc<Cell<bool>>) {
    let pressed = Rc::new(Cell::new(false));
    let board = Board {
        sensor: MockSensor::steady(22.5, 48.0),
        adc: MockAdc::new(RAW_35C),
        fan: MockFan::default(),
        button: MockButton {
            pressed: pressed.clone(),
        },
        display: RecordingDisplay::default(),
        link: MockLink {
            connected: true,
            replies: VecDeque::new(),
            posted: Vec::new(),
            reconnects: 0,
        },
        delay: NoDelay,
    };
    let mut monitor = MonitorLoop::new(runtime, board).expect("valid config");
    monitor.start(0);
    (monitor, pressed)
}

/// One ISR-style press: pin goes low and the edge flag is raised.
pub fn press(monitor: &TestMonitor, pressed: &Rc<Cell<bool>>) {
    pressed.set(true);
    if let Some(flag) = monitor.edge_flag() {
        flag.raise();
    }
}
