//! Error types and handling
//!
//! This module provides the error type used throughout the Crewline engine.
//! Every error belongs to exactly one [`ErrorClass`], which decides how far the
//! failure propagates:
//!
//! - **Configuration** errors are raised while capabilities, workers or run
//!   plans are being built. They are fatal for whatever was being built and
//!   block a Run from starting.
//! - **Request** errors fail only the Run that hit them. The process keeps
//!   serving other senders.
//! - **Transport** errors come from the pull ingestion path and are retried
//!   with back-off. They are never shown to an end user.
//!
//! All errors implement [`CrewErrorExt`], which provides user-safe hints.
//!
//! # Security
//!
//! Hints never contain secrets, file paths or upstream response bodies.

use thiserror::Error;

/// Trait for Crewline error extensions
///
/// Provides a user-facing hint and recoverability information.
pub trait CrewErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to send back through a chat channel.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors fail a single request; the process keeps running.
    /// Non-recoverable errors indicate a misconfigured deployment.
    fn is_recoverable(&self) -> bool;
}

/// How far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Raised at registration or plan-build time
    Configuration,
    /// Fails the current Run only
    Request,
    /// Pull-path transport failure, retried with back-off
    Transport,
    /// Local I/O or serialization failure outside a Run
    Internal,
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{CrewErrorExt, EngineError, ErrorClass};
///
/// let error = EngineError::UnknownCapability("publish_tiktok".to_string());
/// assert_eq!(error.class(), ErrorClass::Configuration);
/// assert!(!error.is_recoverable());
///
/// let error = EngineError::ExternalCallFailed {
///     capability: "publish_post".to_string(),
///     reason: "timeout".to_string(),
/// };
/// assert_eq!(error.class(), ErrorClass::Request);
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    #[error("Worker '{worker}' was not granted capability '{capability}'")]
    CapabilityNotGranted { worker: String, capability: String },

    #[error("Missing secret: {0}")]
    MissingSecret(String),

    // Request-time errors
    #[error("Schema violation for '{capability}': {reason}")]
    SchemaViolation { capability: String, reason: String },

    #[error("External call '{capability}' failed: {reason}")]
    ExternalCallFailed { capability: String, reason: String },

    #[error("Store conflict: {0}")]
    StoreConflict(String),

    #[error("Record {id} not found in {collection}")]
    RecordNotFound { collection: String, id: u64 },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for an external call failure.
    pub fn external(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalCallFailed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a schema violation.
    pub fn schema(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// The propagation class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_)
            | Self::DuplicateCapability(_)
            | Self::UnknownCapability(_)
            | Self::UnknownWorker(_)
            | Self::CapabilityNotGranted { .. }
            | Self::MissingSecret(_) => ErrorClass::Configuration,

            Self::SchemaViolation { .. }
            | Self::ExternalCallFailed { .. }
            | Self::StoreConflict(_)
            | Self::RecordNotFound { .. } => ErrorClass::Request,

            Self::Transport(_) => ErrorClass::Transport,

            Self::KeyringError(_) | Self::Serialization(_) | Self::Io(_) => ErrorClass::Internal,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl CrewErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::DuplicateCapability(_) => "A capability was registered twice. Check startup wiring",
            Self::UnknownCapability(_) => "The requested capability is not available",
            Self::UnknownWorker(_) => "The requested worker is not defined",
            Self::CapabilityNotGranted { .. } => "That worker is not allowed to use this capability",
            Self::MissingSecret(_) => "A required API token is not configured",

            // Request-time errors
            Self::SchemaViolation { .. } => "The request was missing required details",
            Self::ExternalCallFailed { .. } => "An external service did not respond. Try again later",
            Self::StoreConflict(_) => "Saving data failed. Nothing was changed",
            Self::RecordNotFound { .. } => "That record does not exist",

            // Transport errors
            Self::Transport(_) => "Connection to the messaging service was interrupted",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Serialization(_) => "Data could not be read or written",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self.class(), ErrorClass::Configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_fatal() {
        let errs = [
            EngineError::DuplicateCapability("a".into()),
            EngineError::UnknownCapability("b".into()),
            EngineError::CapabilityNotGranted {
                worker: "creator".into(),
                capability: "publish_post".into(),
            },
        ];
        for err in errs {
            assert_eq!(err.class(), ErrorClass::Configuration);
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn test_request_errors_are_recoverable() {
        let errs = [
            EngineError::schema("leads_manager", "missing 'action'"),
            EngineError::external("publish_post", "timeout"),
            EngineError::StoreConflict("rename failed".into()),
            EngineError::RecordNotFound {
                collection: "leads".into(),
                id: 7,
            },
        ];
        for err in errs {
            assert_eq!(err.class(), ErrorClass::Request);
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn test_transport_class() {
        let err = EngineError::Transport("connection reset".into());
        assert_eq!(err.class(), ErrorClass::Transport);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::CapabilityNotGranted {
            worker: "creator".into(),
            capability: "send_campaign".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("creator"));
        assert!(msg.contains("send_campaign"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: EngineError = parse.unwrap_err().into();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
