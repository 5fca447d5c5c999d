use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("rerank error: {0}")]
    Rerank(String),

    #[error("completion error: {0}")]
    Completion(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type LmeResult<T> = Result<T, LmeError>;
