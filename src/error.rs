use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur during Discord IPC operations
#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Failed to connect to Discord IPC socket")]
    ConnectionFailed(#[from] io::Error),

    #[error("No Discord IPC endpoint accepted a connection ({attempted} tried)")]
    NoEndpointFound { attempted: u8 },

    #[error("Discord IPC endpoint {index} refused the connection")]
    EndpointRefused {
        index: u8,
        #[source]
        source: io::Error,
    },

    #[error("Discord IPC is not supported on this platform ({0})")]
    UnsupportedPlatform(&'static str),

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Incomplete frame: need {needed} bytes, {available} buffered")]
    IncompleteFrame { needed: usize, available: usize },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Failed to write to Discord IPC transport")]
    WriteError(#[source] io::Error),

    #[error("Socket connection was closed")]
    SocketClosed,

    #[error("Discord returned error {code}: {message}")]
    RemoteError { code: i64, message: String },

    #[error("Failed to serialize JSON payload")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid presence: {0}")]
    InvalidPresence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Presence client is already running")]
    AlreadyStarted,

    #[error("Failed to spawn IPC worker thread")]
    SpawnFailed(#[source] io::Error),

    #[error("IPC worker thread panicked")]
    WorkerPanicked,
}

/// Broad grouping of [`PresenceError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Endpoint discovery and transport I/O
    Connection,
    /// Framing and handshake violations
    Protocol,
    /// Errors reported by Discord itself
    Application,
    /// Bad input from the consumer
    Configuration,
    /// Worker lifecycle problems
    Runtime,
}

impl PresenceError {
    /// Build a [`PresenceError::RemoteError`] from a Discord error code and message
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::RemoteError {
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed(_)
            | Self::NoEndpointFound { .. }
            | Self::EndpointRefused { .. }
            | Self::UnsupportedPlatform(_)
            | Self::WriteError(_)
            | Self::SocketClosed => ErrorCategory::Connection,
            Self::HandshakeTimeout(_)
            | Self::IncompleteFrame { .. }
            | Self::MalformedFrame(_)
            | Self::InvalidTransition { .. } => ErrorCategory::Protocol,
            Self::RemoteError { .. } => ErrorCategory::Application,
            Self::SerializationFailed(_) | Self::InvalidPresence(_) | Self::InvalidConfig(_) => {
                ErrorCategory::Configuration
            }
            Self::AlreadyStarted | Self::SpawnFailed(_) | Self::WorkerPanicked => {
                ErrorCategory::Runtime
            }
        }
    }

    pub fn is_connection_error(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    /// Whether the reconnect supervisor should keep trying after this error
    ///
    /// Transport and framing failures are recoverable. A missing platform
    /// transport, a Discord-side rejection or bad consumer input are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::UnsupportedPlatform(_) => false,
            Self::InvalidTransition { .. } => false,
            other => matches!(
                other.category(),
                ErrorCategory::Connection | ErrorCategory::Protocol
            ),
        }
    }
}

/// Result type for Discord IPC operations
pub type Result<T = ()> = std::result::Result<T, PresenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_recoverable() {
        assert!(PresenceError::SocketClosed.is_recoverable());
        assert!(PresenceError::NoEndpointFound { attempted: 10 }.is_recoverable());
        assert!(PresenceError::HandshakeTimeout(Duration::from_secs(5)).is_recoverable());
        assert!(PresenceError::MalformedFrame("bad".into()).is_recoverable());
    }

    #[test]
    fn application_and_platform_errors_are_not_recoverable() {
        assert!(!PresenceError::remote(4000, "Invalid Client ID").is_recoverable());
        assert!(!PresenceError::UnsupportedPlatform("wasm32").is_recoverable());
        assert!(!PresenceError::InvalidPresence("too long".into()).is_recoverable());
    }

    #[test]
    fn remote_error_display_contains_code_and_message() {
        let error = PresenceError::remote(4000, "Invalid Client ID");
        assert_eq!(error.category(), ErrorCategory::Application);
        assert_eq!(error.to_string(), "Discord returned error 4000: Invalid Client ID");
    }
}
