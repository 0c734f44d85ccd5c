use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    /// Every upstream quote source failed; there is no context to build.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("market source HTTP error: {0}")]
    Http(String),

    #[error("market source returned malformed payload: {0}")]
    Payload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        MarketError::Http(e.to_string())
    }
}
