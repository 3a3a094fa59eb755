use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("record {0} was modified concurrently")]
    Conflict(String),

    #[error("{provider} error: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database error: {0}")]
    AsyncDatabase(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Envelope code for errors that carry no domain classification.
pub const UNCLASSIFIED_CODE: i32 = 100;

impl AppError {
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        AppError::Upstream {
            provider,
            message: message.into(),
        }
    }

    /// Maps a failed provider round-trip (connect, timeout, body decode) to
    /// an upstream error for `provider`.
    pub fn provider(provider: &'static str) -> impl Fn(reqwest::Error) -> AppError {
        move |e| AppError::upstream(provider, e.to_string())
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::Conflict(_) => 409,
            AppError::Upstream { .. } => 502,
            _ => UNCLASSIFIED_CODE,
        }
    }
}
