use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispenserError {
    #[error("weight sensor read failed: {0}")]
    SensorRead(String),
    #[error("fingerprint verification timed out")]
    VerifierTimeout,
    #[error("fingerprint did not match")]
    VerifierMismatch,
    #[error("no pill detected after {attempts} attempts")]
    DispenseExhausted { attempts: u32 },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("state file is locked by pid {pid} ({holder})")]
    StateLocked { pid: u32, holder: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing weight sensor")]
    MissingWeightSensor,
    #[error("missing verifier")]
    MissingVerifier,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
