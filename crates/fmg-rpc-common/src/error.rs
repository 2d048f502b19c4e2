//! Error types for connector operations.
//!
//! Every failure raised anywhere in the request pipeline is a
//! [`ConnectorError`]. Callers see one uniform error whose message carries
//! the original cause.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Why an ADOM lock could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockFailureReason {
    /// The controller reported that the ADOM does not exist.
    AdomNotFound,
    /// Every attempt in the retry budget was refused.
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl fmt::Display for LockFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockFailureReason::AdomNotFound => write!(f, "ADOM does not exist"),
            LockFailureReason::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} attempts", attempts)
            }
        }
    }
}

/// Errors that can occur while processing a connector request.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A text payload could not be parsed as JSON.
    #[error("Could not parse JSON: {message}")]
    MalformedInput {
        /// Parser error message.
        message: String,
    },

    /// The payload was neither text, a list, nor a mapping.
    #[error("Unexpected data type: {type_name}. Please pass a string, list, or dict.")]
    UnsupportedInputType {
        /// JSON type name of the received value.
        type_name: String,
    },

    /// A batched request's payload does not have the required shape.
    #[error("Invalid payload shape: {message}")]
    InvalidPayloadShape {
        /// What was wrong with the payload.
        message: String,
    },

    /// A required request parameter was absent.
    #[error("Missing required parameter '{name}'")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// The ADOM lock could not be acquired.
    #[error("Failed to lock ADOM: {adom} ({reason})")]
    LockAcquisitionFailed {
        /// The ADOM that was being locked.
        adom: String,
        /// Why acquisition failed.
        reason: LockFailureReason,
    },

    /// The RPC collaborator failed at the transport or protocol level.
    #[error("Remote call '{operation}' failed: {message}")]
    RemoteCallFailed {
        /// The remote operation (e.g., "login", "exec", "free_form").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Connection configuration failed validation.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A configuration file could not be read.
    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigRead {
        /// Path of the file.
        path: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The request was interrupted by shutdown.
    #[error("Operation cancelled during {stage}")]
    Cancelled {
        /// Pipeline stage that was interrupted.
        stage: String,
    },
}

impl ConnectorError {
    /// Creates a malformed input error.
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Creates an unsupported input type error.
    pub fn unsupported_input(type_name: impl Into<String>) -> Self {
        Self::UnsupportedInputType {
            type_name: type_name.into(),
        }
    }

    /// Creates an invalid payload shape error.
    pub fn invalid_shape(message: impl Into<String>) -> Self {
        Self::InvalidPayloadShape {
            message: message.into(),
        }
    }

    /// Creates a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates a lock acquisition error.
    pub fn lock_failed(adom: impl Into<String>, reason: LockFailureReason) -> Self {
        Self::LockAcquisitionFailed {
            adom: adom.into(),
            reason,
        }
    }

    /// Creates a remote call error.
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Returns true if the error was raised before anything was sent to
    /// the controller.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ConnectorError::MalformedInput { .. }
                | ConnectorError::UnsupportedInputType { .. }
                | ConnectorError::InvalidPayloadShape { .. }
                | ConnectorError::MissingParameter { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectorError::lock_failed("root", LockFailureReason::AdomNotFound);
        assert_eq!(
            err.to_string(),
            "Failed to lock ADOM: root (ADOM does not exist)"
        );
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = ConnectorError::lock_failed(
            "root",
            LockFailureReason::RetriesExhausted { attempts: 1500 },
        );
        assert!(err.to_string().contains("gave up after 1500 attempts"));
    }

    #[test]
    fn test_remote_error() {
        let err = ConnectorError::remote("exec", "connection reset");
        assert_eq!(
            err.to_string(),
            "Remote call 'exec' failed: connection reset"
        );
    }

    #[test]
    fn test_unsupported_input_message() {
        let err = ConnectorError::unsupported_input("number");
        assert!(err.to_string().starts_with("Unexpected data type: number."));
    }

    #[test]
    fn test_is_input_error() {
        assert!(ConnectorError::malformed_input("eof").is_input_error());
        assert!(ConnectorError::missing_parameter("url").is_input_error());
        assert!(!ConnectorError::remote("get", "timeout").is_input_error());
        assert!(!ConnectorError::cancelled("lock").is_input_error());
    }
}
