//! End-to-end behavior of the two-cadence loop.

use std::{cell::Cell, rc::Rc};

use ledmon_common::{
    display::SENSOR_ERROR_LABEL, ControlThresholds, InputMode, ReportOutcome, RuntimeConfig,
    TelemetryStep,
};
use pretty_assertions::assert_eq;

use crate::mock_hw::{make_monitor, press, DisplayCall, TestMonitor};

const INTERVAL: u64 = 5_000;

fn runtime() -> RuntimeConfig {
    RuntimeConfig::default()
}

fn polled_runtime() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.monitor.input_mode = InputMode::Polled;
    runtime
}

fn enable_sending(monitor: &mut TestMonitor, pressed: &Rc<Cell<bool>>, now: u64) {
    press(monitor, pressed);
    let report = monitor.tick(now);
    pressed.set(false);
    assert!(report.toggle.is_some(), "press at {now} ms ignored");
    assert!(monitor.state().send_enabled);
}

#[test]
fn start_drives_fan_to_floor_and_shows_send_off() {
    let (monitor, _pressed) = make_monitor(&runtime());
    let board = monitor.board();

    assert_eq!(board.fan.duties, vec![20]);
    assert_eq!(board.display.last_send_mode(), Some(false));
    assert!(board.link.posted.is_empty());
}

#[test]
fn slow_step_waits_for_the_measurement_interval() {
    let (mut monitor, _pressed) = make_monitor(&runtime());

    assert!(monitor.tick(10).slow.is_none());
    assert!(monitor.tick(INTERVAL - 1).slow.is_none());
    assert!(monitor.tick(INTERVAL).slow.is_some());
    assert!(monitor.tick(INTERVAL + 10).slow.is_none());
    assert!(monitor.tick(2 * INTERVAL).slow.is_some());
}

#[test]
fn slow_step_drives_fan_from_led_estimate() {
    let (mut monitor, _pressed) = make_monitor(&runtime());

    let slow = monitor.tick(INTERVAL).slow.expect("slow step ran");

    assert!(slow.snapshot.reading.valid);
    assert!((slow.snapshot.estimate.temperature_c - 34.9).abs() < 0.2);
    assert_eq!(slow.snapshot.estimate.passes, 3);
    assert_eq!(slow.snapshot.fan.duty_pct, 59);
    assert_eq!(monitor.board().fan.duties.last(), Some(&59));
    assert_eq!(
        slow.telemetry,
        TelemetryStep::Reported(ReportOutcome::Skipped)
    );

    let calls = &monitor.board().display.calls;
    let window = ControlThresholds::new(20, 50);
    assert!(calls.contains(&DisplayCall::Reading(22.5, 48.0)));
    assert!(calls.contains(&DisplayCall::Duty(59)));
    assert!(calls.contains(&DisplayCall::Thresholds(window)));
}

#[test]
fn press_refreshes_send_indicator_without_waiting_for_slow_step() {
    let (mut monitor, pressed) = make_monitor(&runtime());

    enable_sending(&mut monitor, &pressed, 200);

    assert_eq!(monitor.board().display.last_send_mode(), Some(true));
    assert!(monitor.board().link.posted.is_empty());
}

#[test]
fn bounce_inside_debounce_window_is_ignored() {
    let (mut monitor, pressed) = make_monitor(&runtime());

    enable_sending(&mut monitor, &pressed, 200);

    press(&monitor, &pressed);
    let report = monitor.tick(900);
    pressed.set(false);

    assert!(report.toggle.is_none());
    assert!(monitor.state().send_enabled);
}

#[test]
fn sends_telemetry_once_enabled() {
    let (mut monitor, pressed) = make_monitor(&runtime());
    enable_sending(&mut monitor, &pressed, 200);

    let slow = monitor.tick(INTERVAL).slow.expect("slow step ran");

    assert_eq!(
        slow.telemetry,
        TelemetryStep::Reported(ReportOutcome::Delivered {
            threshold_changes: 0
        })
    );
    let posted = &monitor.board().link.posted;
    let expected = r#"{"temperature":22.5,"humidity":48.0,"led_temp":34.9"#;
    assert_eq!(posted.len(), 1);
    assert!(posted[0].starts_with(expected));
}

#[test]
fn collector_limits_take_effect_on_next_slow_step() {
    let (mut monitor, pressed) = make_monitor(&runtime());
    enable_sending(&mut monitor, &pressed, 200);
    monitor
        .board_mut()
        .link
        .queue_body(r#"{"commands":[{"type":"fan_limits","min_temp":40,"max_temp":60}]}"#);

    let first = monitor.tick(INTERVAL).slow.expect("first slow step");
    assert_eq!(first.snapshot.thresholds, ControlThresholds::new(20, 50));
    assert_eq!(first.snapshot.fan.duty_pct, 59);
    assert_eq!(monitor.state().thresholds, ControlThresholds::new(40, 60));

    let second = monitor.tick(2 * INTERVAL).slow.expect("second slow step");
    assert_eq!(second.snapshot.thresholds, ControlThresholds::new(40, 60));
    assert_eq!(second.snapshot.fan.duty_pct, 20);
}

#[test]
fn inverted_limits_from_collector_hold_floor() {
    let (mut monitor, pressed) = make_monitor(&runtime());
    enable_sending(&mut monitor, &pressed, 200);
    monitor
        .board_mut()
        .link
        .queue_body(r#"{"commands":[{"type":"fan_limits","min_temp":50,"max_temp":20}]}"#);

    monitor.tick(INTERVAL);
    assert!(monitor.state().thresholds.is_inverted());

    let slow = monitor.tick(2 * INTERVAL).slow.expect("slow step ran");
    assert_eq!(slow.snapshot.fan.duty_pct, 20);
}

#[test]
fn press_during_measurement_defers_telemetry() {
    let (mut monitor, pressed) = make_monitor(&runtime());
    enable_sending(&mut monitor, &pressed, 200);

    let flag = monitor.edge_flag();
    // Second pass, well after the first 200 samples.
    monitor
        .board_mut()
        .adc
        .press_after(250, flag, pressed.clone());

    let slow = monitor.tick(INTERVAL).slow.expect("slow step ran");

    assert_eq!(slow.telemetry, TelemetryStep::DeferredForInput);
    assert!(slow.snapshot.estimate.partial);
    assert_eq!(slow.snapshot.estimate.passes, 1);
    assert!(monitor.board().link.posted.is_empty());

    // The deferred press is serviced on the very next fast step.
    let report = monitor.tick(INTERVAL + 10);
    pressed.set(false);
    assert!(report.toggle.is_some());
    assert!(!monitor.state().send_enabled);
    assert_eq!(monitor.board().display.last_send_mode(), Some(false));
}

#[test]
fn sensor_fault_shows_error_and_skips_telemetry() {
    let (mut monitor, pressed) = make_monitor(&runtime());
    enable_sending(&mut monitor, &pressed, 200);
    monitor
        .board_mut()
        .sensor
        .readings
        .push_back((f32::NAN, f32::NAN));

    let slow = monitor.tick(INTERVAL).slow.expect("slow step ran");

    assert!(!slow.snapshot.reading.valid);
    assert_eq!(
        slow.telemetry,
        TelemetryStep::Reported(ReportOutcome::InvalidReading)
    );
    assert_eq!(monitor.board().sensor.reinitialized, 1);
    assert!(monitor
        .board()
        .display
        .calls
        .contains(&DisplayCall::Error(SENSOR_ERROR_LABEL.to_string())));
    assert_eq!(monitor.board().display.errors(), 1);
    assert!(monitor.board().link.posted.is_empty());

    // LED path keeps running regardless.
    assert_eq!(slow.snapshot.fan.duty_pct, 59);

    let recovered = monitor.tick(2 * INTERVAL).slow.expect("slow step ran");
    assert!(recovered.snapshot.reading.valid);
    assert_eq!(monitor.board().link.posted.len(), 1);
}

#[test]
fn link_down_is_reported_without_stalling_control() {
    let (mut monitor, pressed) = make_monitor(&runtime());
    enable_sending(&mut monitor, &pressed, 200);
    monitor.board_mut().link.connected = false;

    let slow = monitor.tick(INTERVAL).slow.expect("slow step ran");

    assert_eq!(
        slow.telemetry,
        TelemetryStep::Reported(ReportOutcome::LinkDown)
    );
    assert_eq!(monitor.board().link.reconnects, 1);
    assert_eq!(monitor.board().fan.duties.last(), Some(&59));
}

#[test]
fn polled_press_toggles_once_after_debounce() {
    let (mut monitor, pressed) = make_monitor(&polled_runtime());
    assert!(monitor.edge_flag().is_none());
    assert!(monitor.tick(50).toggle.is_none());

    pressed.set(true);
    assert!(monitor.tick(100).toggle.is_none());
    assert!(monitor.tick(140).toggle.is_none());
    assert!(monitor.tick(151).toggle.is_some());
    // Holding the button does not repeat.
    assert!(monitor.tick(400).toggle.is_none());

    pressed.set(false);
    assert!(monitor.tick(420).toggle.is_none());
    assert!(monitor.tick(480).toggle.is_none());
    assert!(monitor.state().send_enabled);
}

#[test]
fn polled_button_held_from_boot_never_toggles() {
    let (mut monitor, pressed) = make_monitor(&polled_runtime());
    pressed.set(true);

    let toggles = (0..=2_000)
        .step_by(20)
        .filter(|now| monitor.tick(*now).toggle.is_some())
        .count();

    assert_eq!(toggles, 0);
    assert!(!monitor.state().send_enabled);
    assert_eq!(monitor.board().display.last_send_mode(), Some(false));

    pressed.set(false);
    assert!(monitor.tick(2_020).toggle.is_none());
    assert!(monitor.tick(2_080).toggle.is_none());
    pressed.set(true);
    assert!(monitor.tick(2_100).toggle.is_none());
    assert!(monitor.tick(2_160).toggle.is_some());
    assert!(monitor.state().send_enabled);
}

#[test]
fn polled_press_pending_at_slow_step_keeps_previous_estimate() {
    let (mut monitor, pressed) = make_monitor(&polled_runtime());

    let first = monitor.tick(INTERVAL).slow.expect("first slow step");
    let before = first.snapshot.estimate;

    pressed.set(true);
    let second = monitor.tick(2 * INTERVAL).slow.expect("second slow step");

    assert_eq!(second.snapshot.estimate, before);
    assert_eq!(second.telemetry, TelemetryStep::DeferredForInput);

    let report = monitor.tick(2 * INTERVAL + 60);
    assert!(report.toggle.is_some());
    assert!(monitor.state().send_enabled);
}
