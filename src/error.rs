//! Error handling for riskwatch

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Observation source could not supply a window
    #[error("Source acquisition error: {0}")]
    Source(String),

    /// Inference endpoint error
    #[error("Inference error: {0}")]
    Inference(String),

    /// Notification channel delivery error
    #[error("Channel delivery error ({channel}): {message}")]
    Channel { channel: String, message: String },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a channel delivery error
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }
}
