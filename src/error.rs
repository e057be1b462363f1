//! Error types and handling for Aeolus
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Aeolus operations
pub type Result<T> = std::result::Result<T, AeolusError>;

/// Process exit codes contractual to service supervision.
pub mod exit_code {
    /// Clean shutdown
    pub const OK: i32 = 0;
    /// Unparseable or out-of-range configuration
    pub const CONFIG: i32 = 1;
    /// Serial device could not be opened
    pub const SERIAL_OPEN: i32 = 2;
    /// Unrecoverable protocol desynchronization
    pub const PROTOCOL_DESYNC: i32 = 3;
}

/// Main error type for Aeolus
#[derive(Debug, Error)]
pub enum AeolusError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serial transport errors
    #[error("Serial error: {message}")]
    Serial { message: String },

    /// Wire protocol errors (framing, decoding, command matching)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// UDP companion channel errors
    #[error("UDP error: {message}")]
    Udp { message: String },

    /// MQTT publishing errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// External script launch errors
    #[error("Script error: {message}")]
    Script { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Command or duty timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AeolusError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AeolusError::Config {
            message: message.into(),
        }
    }

    /// Create a new serial error
    pub fn serial<S: Into<String>>(message: S) -> Self {
        AeolusError::Serial {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        AeolusError::Protocol {
            message: message.into(),
        }
    }

    /// Create a new UDP error
    pub fn udp<S: Into<String>>(message: S) -> Self {
        AeolusError::Udp {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        AeolusError::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new script error
    pub fn script<S: Into<String>>(message: S) -> Self {
        AeolusError::Script {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AeolusError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AeolusError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AeolusError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AeolusError::Generic {
            message: message.into(),
        }
    }

    /// Map an error to the process exit code it mandates at startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            AeolusError::Config { .. } | AeolusError::Validation { .. } => exit_code::CONFIG,
            AeolusError::Serial { .. } => exit_code::SERIAL_OPEN,
            AeolusError::Protocol { .. } => exit_code::PROTOCOL_DESYNC,
            _ => exit_code::CONFIG,
        }
    }
}

impl From<std::io::Error> for AeolusError {
    fn from(err: std::io::Error) -> Self {
        AeolusError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AeolusError {
    fn from(err: serde_yaml::Error) -> Self {
        AeolusError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AeolusError {
    fn from(err: serde_json::Error) -> Self {
        AeolusError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for AeolusError {
    fn from(err: chrono::ParseError) -> Self {
        AeolusError::validation("datetime", &err.to_string())
    }
}

impl From<regex::Error> for AeolusError {
    fn from(err: regex::Error) -> Self {
        AeolusError::protocol(err.to_string())
    }
}

impl From<tokio_serial::Error> for AeolusError {
    fn from(err: tokio_serial::Error) -> Self {
        AeolusError::serial(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AeolusError::config("test config error");
        assert!(matches!(err, AeolusError::Config { .. }));

        let err = AeolusError::serial("test serial error");
        assert!(matches!(err, AeolusError::Serial { .. }));

        let err = AeolusError::validation("field", "test validation error");
        assert!(matches!(err, AeolusError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = AeolusError::config("test error");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Configuration error: test error");

        let err = AeolusError::validation("test_field", "invalid value");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Validation error: test_field - invalid value");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AeolusError::config("x").exit_code(), exit_code::CONFIG);
        assert_eq!(AeolusError::serial("x").exit_code(), exit_code::SERIAL_OPEN);
        assert_eq!(
            AeolusError::protocol("x").exit_code(),
            exit_code::PROTOCOL_DESYNC
        );
    }
}
