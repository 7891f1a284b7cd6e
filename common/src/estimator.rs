//! LED junction temperature from the photodiode ADC channel.
//!
//! Repeated-averaging filter: each pass settles, averages a full window of
//! raw samples, converts the mean to volts against ADC full scale and then
//! to degrees through a linear calibration. The pass temperatures and
//! voltages are averaged.
//!
//! The measurement can be cut short between samples (and during the settle
//! wait) by the caller's cancellation check; completed passes still produce
//! an estimate, marked `partial`.

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::{
    config::{CalibrationConfig, EstimatorConfig},
    error::ConfigError,
    types::LedTemperatureEstimate,
};

const CANCEL_POLL_MS: u32 = 10;

pub trait AnalogInput {
    /// One raw conversion, `0..=full_scale`.
    fn sample(&mut self) -> u16;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedCalibration {
    reference_temp_c: f32,
    reference_voltage: f32,
    coefficient: f32,
}

impl LedCalibration {
    pub fn new(config: CalibrationConfig) -> Result<Self, ConfigError> {
        if !config.coefficient.is_finite() || config.coefficient.abs() < f32::EPSILON {
            return Err(ConfigError::DegenerateCalibration(config.coefficient));
        }
        Ok(Self {
            reference_temp_c: config.reference_temp_c,
            reference_voltage: config.reference_voltage,
            coefficient: config.coefficient,
        })
    }

    pub fn temperature_at(&self, voltage: f32) -> f32 {
        self.reference_temp_c + (voltage - self.reference_voltage) / self.coefficient
    }
}

#[derive(Debug, Clone)]
pub struct LedTemperatureEstimator {
    passes: u8,
    samples_per_pass: u16,
    sample_delay_us: u32,
    settle_ms: u32,
    full_scale: f32,
    reference_voltage: f32,
    calibration: LedCalibration,
}

impl LedTemperatureEstimator {
    pub fn new(config: &EstimatorConfig) -> Result<Self, ConfigError> {
        if config.adc_full_scale == 0 {
            return Err(ConfigError::ZeroFullScale);
        }
        if !(config.reference_voltage.is_finite() && config.reference_voltage > 0.0) {
            return Err(ConfigError::InvalidReferenceVoltage(
                config.reference_voltage,
            ));
        }
        if config.passes == 0 || config.samples_per_pass == 0 {
            return Err(ConfigError::EmptySampleWindow);
        }

        Ok(Self {
            passes: config.passes,
            samples_per_pass: config.samples_per_pass,
            sample_delay_us: config.sample_delay_us,
            settle_ms: config.settle_ms,
            full_scale: f32::from(config.adc_full_scale),
            reference_voltage: config.reference_voltage,
            calibration: LedCalibration::new(config.calibration)?,
        })
    }

    pub fn raw_to_volts(&self, raw: f32) -> f32 {
        raw / self.full_scale * self.reference_voltage
    }

    /// Returns `None` only when cancelled before the first pass completed.
    pub fn measure<A, D, C>(
        &self,
        adc: &mut A,
        delay: &mut D,
        mut cancelled: C,
    ) -> Option<LedTemperatureEstimate>
    where
        A: AnalogInput,
        D: DelayNs,
        C: FnMut() -> bool,
    {
        let mut temperature_sum = 0.0_f32;
        let mut voltage_sum = 0.0_f32;
        let mut completed = 0_u8;

        for _ in 0..self.passes {
            let Some(voltage) = self.run_pass(adc, delay, &mut cancelled) else {
                break;
            };
            voltage_sum += voltage;
            temperature_sum += self.calibration.temperature_at(voltage);
            completed += 1;
        }

        if completed == 0 {
            return None;
        }

        let partial = completed < self.passes;
        if partial {
            debug!(
                "LED measurement cut short after {completed}/{} passes",
                self.passes
            );
        }

        Some(LedTemperatureEstimate {
            temperature_c: temperature_sum / f32::from(completed),
            voltage: voltage_sum / f32::from(completed),
            passes: completed,
            partial,
        })
    }

    fn run_pass<A, D, C>(&self, adc: &mut A, delay: &mut D, cancelled: &mut C) -> Option<f32>
    where
        A: AnalogInput,
        D: DelayNs,
        C: FnMut() -> bool,
    {
        if cancelled() {
            return None;
        }

        let mut remaining = self.settle_ms;
        while remaining > 0 {
            let step = remaining.min(CANCEL_POLL_MS);
            delay.delay_ms(step);
            remaining -= step;
            if cancelled() {
                return None;
            }
        }

        let mut raw_sum = 0_u64;
        for _ in 0..self.samples_per_pass {
            if cancelled() {
                return None;
            }
            raw_sum += u64::from(adc.sample());
            if self.sample_delay_us > 0 {
                delay.delay_us(self.sample_delay_us);
            }
        }

        let raw_mean = raw_sum as f32 / f32::from(self.samples_per_pass);
        Some(self.raw_to_volts(raw_mean))
    }
}
