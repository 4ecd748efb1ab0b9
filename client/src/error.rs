use thiserror::Error;

/// Message shown when the server gave us nothing better to say.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

/// Underlying cause kept for `Error::source`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never got a response (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    /// The server answered with a non-2xx status.
    #[error("http error {status}: {}", message.as_deref().unwrap_or("no message"))]
    Http { status: u16, message: Option<String> },
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
    /// A body that is not the JSON shape we expect, usually a response
    /// missing required fields.
    #[error("malformed json: {0}")]
    Decode(#[from] serde_json::Error),
    /// Malformed input caught before any request is sent.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not signed in")]
    NotAuthenticated,
}

impl ApiError {
    /// Text suitable for an inline banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http {
                message: Some(m), ..
            } if !m.is_empty() => m.clone(),
            ApiError::Validation(m) => m.clone(),
            ApiError::NotAuthenticated => "Log in to continue.".to_string(),
            _ => GENERIC_MESSAGE.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(Box::new(e))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Storage(Box::new(e))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid api url {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("invalid {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("no data directory available; set UPDATES_DATA_DIR")]
    NoDataDir,
}
