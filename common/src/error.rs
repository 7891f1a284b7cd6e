use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("calibration coefficient {0} is degenerate")]
    DegenerateCalibration(f32),
    #[error("ADC full scale must be non-zero")]
    ZeroFullScale,
    #[error("reference voltage {0} must be positive")]
    InvalidReferenceVoltage(f32),
    #[error("estimator needs at least one pass and one sample per pass")]
    EmptySampleWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("link still down after {attempts} reconnect checks")]
    LinkUnavailable { attempts: u32 },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("collector rejected telemetry with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed collector response: {0}")]
    Malformed(String),
}
