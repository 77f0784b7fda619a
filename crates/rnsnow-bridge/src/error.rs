use std::path::PathBuf;

use rnsnow_frame::FrameError;
use rnsnow_transport::TransportError;

/// Errors that can occur while configuring or running the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The radio could not be brought up at startup. Fatal.
    #[error("radio initialisation failed: {0}")]
    RadioInit(#[source] TransportError),

    /// The configuration failed validation. Fatal.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing or fragmentation error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether this error should end the process (and trigger a restart).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RadioInit(_) | Self::Config(_) | Self::ConfigRead { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
