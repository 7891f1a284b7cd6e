//! Presentation surface for the latest snapshot.
//!
//! The loop only talks to [`Display`]; the character-LCD and OLED panels
//! are interchangeable backends.

mod graphic;
mod sh1106;
mod text;

pub use graphic::GraphicPanel;
pub use sh1106::{Sh1106, SH1106_ADDRESS};
pub use text::{TextPanel, TEXT_COLUMNS, TEXT_ROWS};

use crate::types::{ControlThresholds, Snapshot};

pub const SENSOR_ERROR_LABEL: &str = "DHT ERR";
pub const CONNECTING_LABEL: &str = "WiFi...";

pub trait Display {
    /// Full-screen message used during bring-up. Lines split on `\n`.
    fn show_status(&mut self, message: &str);
    fn show_reading(&mut self, temperature_c: f32, humidity: f32);
    fn show_error(&mut self, label: &str);
    fn show_led(&mut self, temperature_c: f32, voltage: f32);
    fn show_duty(&mut self, duty_pct: u8);
    fn show_thresholds(&mut self, thresholds: &ControlThresholds);
    fn show_send_mode(&mut self, enabled: bool);

    fn flush(&mut self) {}
}

pub fn present<D: Display + ?Sized>(display: &mut D, snapshot: &Snapshot) {
    match snapshot.reading.values() {
        Some((temperature_c, humidity)) => display.show_reading(temperature_c, humidity),
        None => display.show_error(SENSOR_ERROR_LABEL),
    }
    let estimate = &snapshot.estimate;
    display.show_led(estimate.temperature_c, estimate.voltage);
    display.show_duty(snapshot.fan.duty_pct);
    display.show_thresholds(&snapshot.thresholds);
    display.show_send_mode(snapshot.send_enabled);
    display.flush();
}
