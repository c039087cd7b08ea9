//! Error types for the loto app

use crate::draw::DrawError;
use crate::generator::PredictionError;
use thiserror::Error;

/// Result type alias for app operations
pub type AppResult<T> = Result<T, AppError>;

/// Main error type for the app
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid draw: {0}")]
    InvalidDraw(#[from] DrawError),

    #[error("Prediction failed: {0}")]
    Prediction(#[from] PredictionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Offline cache error: {0}")]
    ServiceWorker(#[from] loto_sw::ServiceWorkerError),

    #[error("Network error: {0}")]
    Network(#[from] loto_sw::NetworkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short, stable name for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidDraw(_) => "draw",
            Self::Prediction(_) => "prediction",
            Self::Config(_) => "config",
            Self::ServiceWorker(_) => "service_worker",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
        }
    }

    /// Message shown to the user in place of a generated draw.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidDraw(_) => "AI-ul a returnat un format nevalid.".to_string(),
            Self::Prediction(e) => format!("Could not generate numbers: {e}"),
            other => other.to_string(),
        }
    }
}
