/// Error types for the activity engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A chain backend failed or timed out. Callers retry on the next trigger.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The chain rejected a transfer. Propagated to the caller as-is.
    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("No adapter for chain: {0}")]
    UnknownChain(String),

    #[error("Pending transfer error: {0}")]
    PendingTransfer(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl WalletError {
    /// Whether the condition is transient and should be retried silently
    pub fn is_unavailable(&self) -> bool {
        matches!(self, WalletError::SourceUnavailable(_))
    }
}

impl From<sled::Error> for WalletError {
    fn from(e: sled::Error) -> Self {
        WalletError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
