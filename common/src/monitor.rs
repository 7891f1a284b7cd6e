//! Two-cadence control loop.
//!
//! Every call to [`MonitorLoop::tick`] runs the fast step (button latch,
//! send-mode indicator). When the measurement interval has elapsed it also
//! runs the slow step: sample, estimate, fan law, PWM, display, and then
//! telemetry unless a button edge is waiting to be serviced.
//!
//! Thresholds changed by the collector are written to [`ControlState`] at
//! the end of a slow step and therefore first used by the next one.

use embedded_hal::{delay::DelayNs, pwm::SetDutyCycle};
use log::{info, warn};

use crate::{
    config::RuntimeConfig,
    display::{self, Display},
    error::ConfigError,
    estimator::{AnalogInput, LedTemperatureEstimator},
    fan::FanControlLaw,
    input::{DigitalInput, EdgeFlag, EdgeSource, ToggleEvent},
    sampler::{self, EnvironmentSensor},
    telemetry::{CollectorLink, ReportOutcome, TelemetryReporter},
    types::{
        send_mode_label, ControlThresholds, FanCommand, LedTemperatureEstimate, SensorReading,
        Snapshot,
    },
};

/// Peripherals the loop drives.
pub struct Board<S, A, F, B, D, L, W> {
    pub sensor: S,
    pub adc: A,
    pub fan: F,
    pub button: B,
    pub display: D,
    pub link: L,
    pub delay: W,
}

/// Mutable context owned by the loop. Each field has one writer per tick:
/// the latch writes `send_enabled`, the reporter writes `thresholds`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub thresholds: ControlThresholds,
    pub send_enabled: bool,
    shown_send_enabled: bool,
    last_slow_tick_ms: u64,
    pub last_reading: SensorReading,
    pub last_estimate: LedTemperatureEstimate,
    pub last_fan: FanCommand,
}

impl ControlState {
    fn new(thresholds: ControlThresholds, floor_pct: u8) -> Self {
        Self {
            thresholds,
            send_enabled: false,
            shown_send_enabled: false,
            last_slow_tick_ms: 0,
            last_reading: SensorReading::invalid(),
            last_estimate: LedTemperatureEstimate::default(),
            last_fan: FanCommand {
                duty_pct: floor_pct,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryStep {
    /// A button edge arrived during the slow step; it is serviced first.
    DeferredForInput,
    Reported(ReportOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlowTick {
    pub snapshot: Snapshot,
    pub telemetry: TelemetryStep,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    pub toggle: Option<ToggleEvent>,
    pub slow: Option<SlowTick>,
}

pub struct MonitorLoop<S, A, F, B, D, L, W> {
    interval_ms: u64,
    edge: EdgeSource,
    estimator: LedTemperatureEstimator,
    law: FanControlLaw,
    reporter: TelemetryReporter,
    state: ControlState,
    board: Board<S, A, F, B, D, L, W>,
}

impl<S, A, F, B, D, L, W> MonitorLoop<S, A, F, B, D, L, W>
where
    S: EnvironmentSensor,
    A: AnalogInput,
    F: SetDutyCycle,
    B: DigitalInput,
    D: Display,
    L: CollectorLink,
    W: DelayNs,
{
    pub fn new(
        runtime: &RuntimeConfig,
        board: Board<S, A, F, B, D, L, W>,
    ) -> Result<Self, ConfigError> {
        let monitor = &runtime.monitor;
        let law = FanControlLaw::new(monitor.fan_floor_pct);

        Ok(Self {
            interval_ms: monitor.measure_interval_ms,
            edge: EdgeSource::from_config(monitor),
            estimator: LedTemperatureEstimator::new(&monitor.estimator)?,
            law,
            reporter: TelemetryReporter::new(
                runtime.network.collector_url.clone(),
                monitor.reconnect_attempts,
                monitor.reconnect_delay_ms,
            ),
            state: ControlState::new(monitor.default_thresholds, law.floor_pct()),
            board,
        })
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn board(&self) -> &Board<S, A, F, B, D, L, W> {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board<S, A, F, B, D, L, W> {
        &mut self.board
    }

    /// Handle for the edge interrupt; `None` when the button is polled.
    pub fn edge_flag(&self) -> Option<EdgeFlag> {
        self.edge.edge_flag()
    }

    /// Fan to floor, send indicator to OFF. The measurement clock starts at
    /// `now_ms`, so the first slow step runs one interval later.
    pub fn start(&mut self, now_ms: u64) {
        self.state.last_slow_tick_ms = now_ms;
        self.apply_fan(self.state.last_fan);
        self.board.display.show_send_mode(self.state.send_enabled);
        self.board.display.flush();
        info!(
            "monitor started: interval {} ms, window {}, floor {}%, collector {}",
            self.interval_ms,
            self.state.thresholds.window_label(),
            self.law.floor_pct(),
            self.reporter.url()
        );
    }

    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        let toggle = self.fast_tick(now_ms);

        let slow = if now_ms.saturating_sub(self.state.last_slow_tick_ms) >= self.interval_ms {
            self.state.last_slow_tick_ms = now_ms;
            Some(self.slow_tick())
        } else {
            None
        };

        TickReport { toggle, slow }
    }

    fn fast_tick(&mut self, now_ms: u64) -> Option<ToggleEvent> {
        let toggle = self
            .edge
            .poll_or_handle_edge(&mut self.board.button, now_ms);
        if toggle.is_some() {
            self.state.send_enabled = !self.state.send_enabled;
        }

        if self.state.send_enabled != self.state.shown_send_enabled {
            self.board.display.show_send_mode(self.state.send_enabled);
            self.board.display.flush();
            info!(
                "data sending {}",
                if self.state.send_enabled {
                    "ENABLED"
                } else {
                    "DISABLED"
                }
            );
            self.state.shown_send_enabled = self.state.send_enabled;
        }

        toggle
    }

    fn slow_tick(&mut self) -> SlowTick {
        let reading = sampler::sample(&mut self.board.sensor);
        let estimate = self.measure_led();
        let thresholds = self.state.thresholds;
        let fan = self.law.compute_duty(estimate.temperature_c, thresholds);
        self.apply_fan(fan);

        self.state.last_reading = reading;
        self.state.last_estimate = estimate;
        self.state.last_fan = fan;

        let snapshot = Snapshot {
            reading,
            estimate,
            fan,
            thresholds,
            send_enabled: self.state.send_enabled,
        };
        display::present(&mut self.board.display, &snapshot);

        info!(
            "T:{:.2} H:{:.2} LED:{:.2} Fan:{}% V:{:.4} Range: {} Send:{}",
            reading.temperature_c,
            reading.humidity,
            estimate.temperature_c,
            fan.duty_pct,
            estimate.voltage,
            thresholds.window_label(),
            send_mode_label(snapshot.send_enabled)
        );

        let telemetry = if self.edge.edge_pending(&mut self.board.button) {
            info!("skipping telemetry: button input pending");
            TelemetryStep::DeferredForInput
        } else {
            TelemetryStep::Reported(self.reporter.report(
                &mut self.board.link,
                &mut self.board.delay,
                &snapshot,
                &mut self.state.thresholds,
            ))
        };

        SlowTick {
            snapshot,
            telemetry,
        }
    }

    fn measure_led(&mut self) -> LedTemperatureEstimate {
        let Self {
            edge,
            estimator,
            board,
            state,
            ..
        } = self;
        let Board {
            adc,
            delay,
            button,
            ..
        } = board;

        match estimator.measure(adc, delay, || edge.edge_pending(button)) {
            Some(estimate) => {
                if estimate.partial {
                    info!(
                        "LED measurement cut short by button after {} pass(es)",
                        estimate.passes
                    );
                }
                estimate
            }
            None => {
                info!("LED measurement cancelled by button; keeping previous estimate");
                state.last_estimate
            }
        }
    }

    fn apply_fan(&mut self, fan: FanCommand) {
        if let Err(err) = self.board.fan.set_duty_cycle_percent(fan.duty_pct) {
            warn!("failed to set fan duty {}%: {err:?}", fan.duty_pct);
        }
    }
}
