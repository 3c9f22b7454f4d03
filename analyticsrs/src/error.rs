use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The requested scope is outside what the principal may see.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The request itself is malformed.
    #[error("illegal query: {0}")]
    IllegalQuery(String),
    /// The caller invoked a component in a state it should never reach.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("settings error: {0}")]
    Settings(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse status category surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Forbidden,
    BadRequest,
    Internal,
}

impl AnalyticsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalyticsError::AccessDenied(_) => ErrorCategory::Forbidden,
            AnalyticsError::IllegalQuery(_) => ErrorCategory::BadRequest,
            _ => ErrorCategory::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Internal)
    }
}
