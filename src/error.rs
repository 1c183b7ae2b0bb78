use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("job channel closed: {0}")]
    ChannelClosed(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SummarizeError>;
