use log::warn;

use crate::types::{ControlThresholds, FanCommand};

/// Linear fan curve between the threshold window, never below `floor_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanControlLaw {
    floor_pct: u8,
}

impl FanControlLaw {
    pub fn new(floor_pct: u8) -> Self {
        Self {
            floor_pct: floor_pct.min(100),
        }
    }

    pub fn floor_pct(&self) -> u8 {
        self.floor_pct
    }

    pub fn compute_duty(&self, estimate_c: f32, thresholds: ControlThresholds) -> FanCommand {
        let floor = self.floor_pct;

        if thresholds.is_inverted() {
            warn!(
                "fan window inverted ({}); holding floor duty {floor}%",
                thresholds.window_label()
            );
            return FanCommand { duty_pct: floor };
        }

        let min = thresholds.min_temp as f32;
        let max = thresholds.max_temp as f32;

        // NaN estimates fall through to the floor as well.
        let duty_pct = if estimate_c >= max {
            100
        } else if estimate_c > min {
            let span = f32::from(100 - floor);
            let scaled = (estimate_c - min) * span / (max - min);
            (f32::from(floor) + scaled).clamp(f32::from(floor), 100.0) as u8
        } else {
            floor
        };

        FanCommand { duty_pct }
    }
}
