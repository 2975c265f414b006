//! Error types for the gateway.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the gateway.
///
/// Guard rejections are not represented here: they travel as
/// [`GateOutcome`](crate::guard::GateOutcome) values and end up as a
/// [`Halt`](crate::protocol::Halt) carrying an error envelope.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Socket-related errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Signing key errors.
    #[error("Signature error: {kind}")]
    Signature { kind: SignatureErrorKind },

    /// Action and hook wiring errors.
    #[error("Action error: {kind}")]
    Action { kind: ActionErrorKind },

    /// Protocol errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Signing key error kinds.
#[derive(Error, Debug)]
pub enum SignatureErrorKind {
    #[error("HMAC secret file {path} has insecure permissions {mode:04o}, expected 0600 or 0400")]
    InsecureSecretFile { path: PathBuf, mode: u32 },

    #[error("Failed to read HMAC secret from {path}: {message}")]
    SecretUnreadable { path: PathBuf, message: String },

    #[error("HMAC secret at {path} is empty")]
    EmptySecret { path: PathBuf },
}

/// Action and hook wiring error kinds.
#[derive(Error, Debug)]
pub enum ActionErrorKind {
    #[error("Action already registered: {path}")]
    DuplicateAction { path: String },

    #[error("Hook '{method}' is configured but not registered")]
    UnknownHook { method: String },
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out")]
    ConnectionTimeout,
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
