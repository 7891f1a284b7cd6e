use crate::types::{send_mode_label, ControlThresholds};

use super::Display;

pub const TEXT_COLUMNS: usize = 20;
pub const TEXT_ROWS: usize = 4;

const ROW_AMBIENT: usize = 0;
const ROW_LED: usize = 1;
const ROW_FAN: usize = 2;
const ROW_SEND: usize = 3;

/// 20x4 character grid, laid out for an HD44780-style LCD.
#[derive(Debug, Clone)]
pub struct TextPanel {
    rows: [String; TEXT_ROWS],
    duty_pct: Option<u8>,
    window: Option<String>,
}

impl Default for TextPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl TextPanel {
    pub fn new() -> Self {
        Self {
            rows: std::array::from_fn(|_| blank_row()),
            duty_pct: None,
            window: None,
        }
    }

    pub fn rows(&self) -> &[String; TEXT_ROWS] {
        &self.rows
    }

    pub fn render(&self) -> String {
        self.rows.join("\n")
    }

    fn set_row(&mut self, row: usize, text: &str) {
        self.rows[row] = fit(text);
    }

    fn redraw_fan_row(&mut self) {
        let left = match self.duty_pct {
            Some(duty) => format!("Fan:{duty:>4}%"),
            None => "Fan:   --".to_string(),
        };
        let right = self.window.clone().unwrap_or_default();
        let gap = TEXT_COLUMNS.saturating_sub(left.len() + right.len()).max(1);
        self.set_row(ROW_FAN, &format!("{left}{}{right}", " ".repeat(gap)));
    }
}

fn blank_row() -> String {
    " ".repeat(TEXT_COLUMNS)
}

fn fit(text: &str) -> String {
    let mut row: String = text.chars().take(TEXT_COLUMNS).collect();
    let width = row.chars().count();
    row.push_str(&" ".repeat(TEXT_COLUMNS - width));
    row
}

impl Display for TextPanel {
    fn show_status(&mut self, message: &str) {
        self.rows = std::array::from_fn(|_| blank_row());
        self.duty_pct = None;
        self.window = None;
        for (row, line) in message.lines().take(TEXT_ROWS).enumerate() {
            self.set_row(row, line);
        }
    }

    fn show_reading(&mut self, temperature_c: f32, humidity: f32) {
        self.set_row(
            ROW_AMBIENT,
            &format!("Temp:{temperature_c:>5.1}C H:{humidity:>5.1}%"),
        );
    }

    fn show_error(&mut self, label: &str) {
        self.set_row(ROW_AMBIENT, &format!("Temp: {label}"));
    }

    fn show_led(&mut self, temperature_c: f32, voltage: f32) {
        self.set_row(ROW_LED, &format!("LED:{temperature_c:>5.1}C {voltage:.4}V"));
    }

    fn show_duty(&mut self, duty_pct: u8) {
        self.duty_pct = Some(duty_pct);
        self.redraw_fan_row();
    }

    fn show_thresholds(&mut self, thresholds: &ControlThresholds) {
        self.window = Some(thresholds.window_label());
        self.redraw_fan_row();
    }

    fn show_send_mode(&mut self, enabled: bool) {
        self.set_row(ROW_SEND, &format!("Send:{:>3}", send_mode_label(enabled)));
    }
}
