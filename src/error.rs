use thiserror::Error;

/// Result type for LWCP operations
pub type Result<T> = std::result::Result<T, LwcpError>;

/// Errors that can occur when talking to an LWCP device
#[derive(Error, Debug)]
pub enum LwcpError {
    /// The initial TCP connection could not be established
    #[error("Unable to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection's I/O task has exited
    #[error("Connection closed")]
    ConnectionClosed,

    /// Channel type selector was neither "fader" nor "livewire"
    #[error("Invalid channel type '{0}'. Use 'fader' or 'livewire'.")]
    InvalidChannelType(String),

    /// Caller input rejected before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
