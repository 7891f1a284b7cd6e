pub mod config;
pub mod display;
pub mod error;
pub mod estimator;
pub mod fan;
pub mod input;
pub mod monitor;
pub mod sampler;
pub mod telemetry;
pub mod types;

pub use config::{
    CalibrationConfig, EstimatorConfig, InputMode, MonitorConfig, NetworkConfig, RuntimeConfig,
};
pub use display::{Display, GraphicPanel, TextPanel};
pub use error::{ConfigError, ReportError, TransportError};
pub use estimator::{AnalogInput, LedTemperatureEstimator};
pub use fan::FanControlLaw;
pub use input::{DigitalInput, EdgeFlag, EdgeSource, ToggleEvent};
pub use monitor::{Board, ControlState, MonitorLoop, SlowTick, TelemetryStep, TickReport};
pub use sampler::EnvironmentSensor;
pub use telemetry::{CollectorLink, CollectorReply, RemoteCommand, ReportOutcome, TelemetryReporter};
pub use types::{
    ControlThresholds, FanCommand, LedTemperatureEstimate, SensorReading, Snapshot,
    TelemetryPayload,
};
