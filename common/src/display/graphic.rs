use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use log::warn;

use crate::types::{send_mode_label, ControlThresholds};

use super::Display;

const LABELS: [(&str, i32); 5] = [
    ("Temp:", 0),
    ("Hum:", 10),
    ("LED:", 20),
    ("Fan:", 30),
    ("V:", 40),
];

const VALUE_X: i32 = 50;
const VOLTAGE_X: i32 = 40;
const WINDOW_X: i32 = 85;
const BOTTOM_Y: i32 = 50;
const ROW_HEIGHT: u32 = 10;

/// 128x64 monochrome OLED layout: labels on the left, values from x=50.
pub struct GraphicPanel<D> {
    target: D,
    labels_drawn: bool,
}

impl<D> GraphicPanel<D>
where
    D: DrawTarget<Color = BinaryColor>,
    D::Error: core::fmt::Debug,
{
    pub fn new(target: D) -> Self {
        Self {
            target,
            labels_drawn: false,
        }
    }

    pub fn target_mut(&mut self) -> &mut D {
        &mut self.target
    }

    pub fn into_inner(self) -> D {
        self.target
    }

    fn style() -> MonoTextStyle<'static, BinaryColor> {
        MonoTextStyle::new(&FONT_6X10, BinaryColor::On)
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32) {
        let result = Text::with_baseline(text, Point::new(x, y), Self::style(), Baseline::Top)
            .draw(&mut self.target);
        if let Err(err) = result {
            warn!("display draw failed: {err:?}");
        }
    }

    fn clear_area(&mut self, x: i32, y: i32, width: u32, height: u32) {
        let result = Rectangle::new(Point::new(x, y), Size::new(width, height))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
            .draw(&mut self.target);
        if let Err(err) = result {
            warn!("display clear failed: {err:?}");
        }
    }

    fn write_field(&mut self, text: &str, x: i32, y: i32, width: u32) {
        self.ensure_labels();
        self.clear_area(x, y, width, ROW_HEIGHT);
        self.draw_text(text, x, y);
    }

    fn value_width(&self, x: i32) -> u32 {
        let width = self.target.bounding_box().size.width as i32;
        (width - x).max(0) as u32
    }

    fn ensure_labels(&mut self) {
        if self.labels_drawn {
            return;
        }
        if let Err(err) = self.target.clear(BinaryColor::Off) {
            warn!("display clear failed: {err:?}");
        }
        for (label, y) in LABELS {
            self.draw_text(label, 0, y);
        }
        self.labels_drawn = true;
    }
}

impl<D> Display for GraphicPanel<D>
where
    D: DrawTarget<Color = BinaryColor>,
    D::Error: core::fmt::Debug,
{
    fn show_status(&mut self, message: &str) {
        if let Err(err) = self.target.clear(BinaryColor::Off) {
            warn!("display clear failed: {err:?}");
        }
        for (index, line) in message.lines().enumerate() {
            self.draw_text(line, 10, 10 + 20 * index as i32);
        }
        self.labels_drawn = false;
    }

    fn show_reading(&mut self, temperature_c: f32, humidity: f32) {
        let width = self.value_width(VALUE_X);
        self.write_field(&format!("{temperature_c:.1} C"), VALUE_X, 0, width);
        self.write_field(&format!("{humidity:.1} %"), VALUE_X, 10, width);
    }

    fn show_error(&mut self, label: &str) {
        let width = self.value_width(VALUE_X);
        self.write_field(label, VALUE_X, 0, width);
        self.write_field("", VALUE_X, 10, width);
    }

    fn show_led(&mut self, temperature_c: f32, voltage: f32) {
        let width = self.value_width(VALUE_X);
        self.write_field(&format!("{temperature_c:.1} C"), VALUE_X, 20, width);
        let width = self.value_width(VOLTAGE_X);
        self.write_field(&format!("{voltage:.4} V"), VOLTAGE_X, 40, width);
    }

    fn show_duty(&mut self, duty_pct: u8) {
        let width = self.value_width(VALUE_X);
        self.write_field(&format!("{duty_pct}.0 %"), VALUE_X, 30, width);
    }

    fn show_thresholds(&mut self, thresholds: &ControlThresholds) {
        let width = self.value_width(WINDOW_X);
        self.write_field(&thresholds.window_label(), WINDOW_X, BOTTOM_Y, width);
    }

    fn show_send_mode(&mut self, enabled: bool) {
        self.write_field(
            &format!("Send:{:>3}", send_mode_label(enabled)),
            0,
            BOTTOM_Y,
            (WINDOW_X - 1) as u32,
        );
    }
}
