use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error("No table found at {url}")]
    MissingTable { url: String },

    #[error("Row shape mismatch: expected {expected} cells, found {found}")]
    RowShapeMismatch { expected: usize, found: usize },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl ScraperError {
    /// Short stable label for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScraperError::Http(e) if e.is_timeout() => "timeout",
            ScraperError::Http(_) | ScraperError::Status { .. } => "network",
            ScraperError::Timeout { .. } => "timeout",
            ScraperError::Url(_) => "url",
            ScraperError::Json(_) => "json",
            ScraperError::Toml(_) | ScraperError::Config(_) => "config",
            ScraperError::Io(_) => "io",
            ScraperError::Selector(_) => "selector",
            ScraperError::MissingTable { .. } => "missing_table",
            ScraperError::RowShapeMismatch { .. } => "row_shape_mismatch",
            ScraperError::Database { .. } => "database",
        }
    }

    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScraperError::Http(_) | ScraperError::Timeout { .. } => true,
            ScraperError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for ScraperError {
    fn from(err: rusqlite::Error) -> Self {
        ScraperError::Database {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_retry_only_on_server_side_codes() {
        let server = ScraperError::Status { url: "https://x/".into(), status: 503 };
        let missing = ScraperError::Status { url: "https://x/".into(), status: 404 };
        let throttled = ScraperError::Status { url: "https://x/".into(), status: 429 };
        assert!(server.is_retryable());
        assert!(!missing.is_retryable());
        assert!(throttled.is_retryable());
        assert_eq!(missing.kind(), "network");
    }

    #[test]
    fn database_errors_are_not_retryable() {
        let err = ScraperError::Database { message: "locked".into() };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "database");
        assert_eq!(err.to_string(), "Database error: locked");
    }
}
