use thiserror::Error;

/// Startup and serving failures outside the request path.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("listener failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("page store unavailable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("logging setup failed: {0}")]
    Telemetry(String),
    #[error("`{0}` must be set for this command")]
    MissingSetting(&'static str),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
