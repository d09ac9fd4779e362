use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration violation: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to decode DEM raster: {0}")]
    Dem(String),

    #[error("unrouteable: no path from ({0:.1}, {1:.1}) to ({2:.1}, {3:.1})")]
    Unrouteable(f64, f64, f64, f64),

    #[error("state-machine desynchronization: {0}")]
    StateDesync(String),

    #[error("drone {0} lost: battery exhausted mid-flight")]
    BatteryExhausted(String),

    #[error("unknown error: {0}")]
    Other(#[from] anyhow::Error),
}
