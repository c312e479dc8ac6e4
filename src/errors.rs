use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Required tool not available: {0}")]
    ToolMissing(String),

    #[error("Batch finished with failures: {succeeded}/{total} succeeded")]
    PartialBatch { succeeded: usize, total: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Interrupted by user")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AppError>;
