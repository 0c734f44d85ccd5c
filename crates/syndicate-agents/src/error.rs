use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("inference provider error: {0}")]
    Inference(String),

    #[error("inference response parse error: {0}")]
    Parse(String),

    #[error("inference call timed out after {0} seconds")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Inference(e.to_string())
    }
}
