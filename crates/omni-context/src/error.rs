use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to read context file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize context: {0}")]
    Serde(#[from] serde_json::Error),
}
