use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("uart error: {0}")]
    Uart(String),
    #[error("fingerprint sensor replied with code {0:#04x}")]
    Fingerprint(u8),
    #[error("fingerprint scan timeout")]
    Timeout,
    #[error("hx711 data-ready timeout")]
    DataReadyTimeout,
    #[error("simulation: {0}")]
    Simulation(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
