//! # Bridge Errors
//! This module defines the `BridgeError` enum, which encapsulates all potential errors that can occur within the bisecur2mqtt bridge.
//! The variants separate transient transport faults from protocol-level and configuration errors, so callers can decide between
//! re-initializing the gateway session, reporting the error on the bus, or terminating the process.

use thiserror::Error;
use std::io;

/// Exit code used when the gateway addressing is missing or the gateway login fails.
pub const FATAL_EXIT_CODE: i32 = 2;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Represents errors arising from misconfigurations or invalid settings.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The gateway IP or MAC address is absent from the configuration.
    #[error("Gateway IP and MAC addresses must be specified in the configuration")]
    MissingAddressing,

    /// The gateway did not hand out a session token for the configured user.
    #[error("Gateway login failed for user '{0}'")]
    LoginFailed(String),

    /// Represents standard input/output errors, including the socket to the gateway.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The gateway did not answer within the configured timeout.
    #[error("Gateway request timed out after {0}ms")]
    Timeout(u64),

    /// The gateway answered with an error frame.
    #[error("Gateway protocol error {code} ({name})")]
    ProtocolError { code: u8, name: String },

    /// A frame received from the gateway could not be decoded.
    #[error("Frame decode error: {0}")]
    DecodeError(String),

    /// No gateway session has been established yet.
    #[error("Gateway session not initialised")]
    NotConnected,

    /// Represents errors reported by the MQTT client.
    #[error("MQTT error: {0}")]
    MqttError(String),

    /// Represents errors that occur during serialization or deserialization of data.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BridgeError {
    /// Returns `true` for the "broken pipe" family of transport faults.
    ///
    /// Typed I/O errors are classified by kind; everything else falls back to the failure text,
    /// since some faults only surface as messages (`errno 32`, `broken pipe`, `connection reset`).
    pub fn is_broken_pipe(&self) -> bool {
        if let BridgeError::IoError(e) = self {
            if matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        is_broken_pipe_text(&self.to_string())
    }

    /// Returns `true` for errors that must terminate the process with [`FATAL_EXIT_CODE`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::MissingAddressing | BridgeError::LoginFailed(_))
    }
}

/// Classifies a failure message as belonging to the broken pipe family.
pub fn is_broken_pipe_text(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("errno 32")
        || message.contains("broken pipe")
        || message.contains("connection reset")
        || message.contains("errno 104")
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::ConfigError(err.to_string())
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::MqttError(err.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_is_detected_by_kind_and_text() {
        let typed = BridgeError::IoError(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        assert!(typed.is_broken_pipe());

        let reset = BridgeError::IoError(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_broken_pipe());

        let textual = BridgeError::DecodeError("[Errno 32] Broken pipe".to_string());
        assert!(textual.is_broken_pipe());

        assert!(!BridgeError::Timeout(2000).is_broken_pipe());
        assert!(!BridgeError::ProtocolError { code: 12, name: "PERMISSION_DENIED".into() }.is_broken_pipe());
    }

    #[test]
    fn only_addressing_and_login_errors_are_fatal() {
        assert!(BridgeError::MissingAddressing.is_fatal());
        assert!(BridgeError::LoginFailed("admin".into()).is_fatal());
        assert!(!BridgeError::NotConnected.is_fatal());
        assert!(!BridgeError::Timeout(10).is_fatal());
    }
}
