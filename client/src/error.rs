//! Error types for the NT4 client

use proto::prelude::DataType;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server could not be reached. Retried by the connection loop, never returned by bindings.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] async_tungstenite::tungstenite::Error),

    /// A frame could not be decoded or encoded. Received frames failing this way are dropped.
    #[error("Protocol error: {0}")]
    Protocol(#[from] proto::Error),

    /// A write whose value cannot be stored in the topic's type
    #[error("Type mismatch on {path}: topic is {expected}, value is {found}")]
    TypeMismatch {
        path: String,
        expected: DataType,
        found: DataType,
    },

    /// A write was attempted while the transport is not connected. The write is discarded.
    #[error("Not connected to a NetworkTables server")]
    NotConnected,

    #[error("Client has been closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
