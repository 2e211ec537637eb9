use thiserror::Error;

#[derive(Error, Debug)]
pub enum KVError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("connect error: {0}")]
    Connect(String),
}
