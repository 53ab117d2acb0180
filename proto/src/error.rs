/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while encoding or decoding NT4 frames
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmpv::decode::Error),

    /// A structurally valid frame that does not hold an NT4 message
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A text message with a method this crate does not know about
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),
}

impl Error {
    /// Whether the error only means the peer speaks a newer protocol revision
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, Error::UnknownMethod(_))
    }
}
