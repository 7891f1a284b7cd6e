use log::warn;

use crate::types::SensorReading;

/// Primary temperature/humidity transceiver. Reads return NaN on failure.
pub trait EnvironmentSensor {
    fn read_temperature(&mut self) -> f32;
    fn read_humidity(&mut self) -> f32;
    fn reinitialize(&mut self);
}

/// Reads both channels once. A failed channel marks the reading invalid and
/// asks the driver to reinitialize; the next slow tick simply tries again.
pub fn sample<S: EnvironmentSensor>(sensor: &mut S) -> SensorReading {
    let temperature_c = sensor.read_temperature();
    let humidity = sensor.read_humidity();
    let reading = SensorReading::new(temperature_c, humidity);

    if !reading.valid {
        warn!(
            "DHT sensor error: non-finite value (T={temperature_c}, H={humidity}); reinitializing"
        );
        sensor.reinitialize();
    }

    reading
}
