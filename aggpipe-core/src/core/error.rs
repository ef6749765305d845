//! Unified error handling for the aggregation layer
//!
//! This module provides the centralized error type shared by the pipeline
//! builder, the cache store, the method-caching middleware and the performance
//! monitor.

use std::fmt;

/// Main error type for the aggregation layer
#[derive(Debug)]
pub enum AggPipeError {
    /// Configuration-related errors
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument passed to a builder or query helper
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// A string that should be a structured identifier could not be parsed
    InvalidIdentifier {
        /// The rejected input
        value: String,
    },

    /// The external execution engine failed
    Engine {
        /// Engine name
        engine: String,
        /// Error message reported by the engine
        message: String,
    },

    /// A cache key could not be derived from the call arguments
    CacheKey {
        /// Operation whose key failed (`Owner.name` or `pipeline`)
        operation: String,
        /// Error message
        message: String,
    },

    /// A wrapped operation failed
    Operation {
        /// Error message
        message: String,
    },

    /// Unsupported operation errors
    Unsupported {
        /// Operation name
        operation: String,
        /// Reason for not supporting
        reason: String,
    },

    /// Serialization errors
    Serialization {
        /// Error message
        message: String,
    },

    /// I/O errors from file operations
    Io(std::io::Error),

    /// Serde JSON errors
    SerdeJson(serde_json::Error),
}

impl fmt::Display for AggPipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggPipeError::Config { message } => {
                write!(
                    f,
                    "Configuration error: {message}. \
                          Solution: Check your config file or start from AggPipeConfig::default()"
                )
            },
            AggPipeError::InvalidArgument { message } => {
                write!(f, "Invalid argument: {message}")
            },
            AggPipeError::InvalidIdentifier { value } => {
                write!(
                    f,
                    "Invalid identifier format: '{value}'. \
                          Solution: Identifiers must be 24 hexadecimal characters"
                )
            },
            AggPipeError::Engine { engine, message } => {
                write!(f, "Execution engine '{engine}' failed: {message}")
            },
            AggPipeError::CacheKey { operation, message } => {
                write!(
                    f,
                    "Cache key generation failed for {operation}: {message}. \
                          Solution: Make the arguments JSON-serializable or supply a key function"
                )
            },
            AggPipeError::Operation { message } => {
                write!(f, "Operation failed: {message}")
            },
            AggPipeError::Unsupported { operation, reason } => {
                write!(f, "Unsupported operation '{operation}': {reason}")
            },
            AggPipeError::Serialization { message } => {
                write!(f, "Serialization error: {message}")
            },
            AggPipeError::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}. \
                          Solution: Check file permissions and that paths exist"
                )
            },
            AggPipeError::SerdeJson(err) => {
                write!(
                    f,
                    "JSON serialization error: {err}. \
                          Solution: Verify data structure compatibility"
                )
            },
        }
    }
}

impl std::error::Error for AggPipeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggPipeError::Io(err) => Some(err),
            AggPipeError::SerdeJson(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AggPipeError {
    fn from(err: std::io::Error) -> Self {
        AggPipeError::Io(err)
    }
}

impl From<serde_json::Error> for AggPipeError {
    fn from(err: serde_json::Error) -> Self {
        AggPipeError::SerdeJson(err)
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, AggPipeError>;

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: &str) -> Result<T>;

    /// Add context using a closure
    fn with_context_lazy<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AggPipeError>,
{
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            AggPipeError::Config { message } => AggPipeError::Config {
                message: format!("{context}: {message}"),
            },
            AggPipeError::InvalidArgument { message } => AggPipeError::InvalidArgument {
                message: format!("{context}: {message}"),
            },
            AggPipeError::Operation { message } => AggPipeError::Operation {
                message: format!("{context}: {message}"),
            },
            AggPipeError::Serialization { message } => AggPipeError::Serialization {
                message: format!("{context}: {message}"),
            },
            // Engine and identifier errors are surfaced verbatim.
            other => other,
        })
    }

    fn with_context_lazy<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        match self {
            Ok(value) => Ok(value),
            Err(e) => {
                let context = f();
                Err(e).with_context(&context)
            },
        }
    }
}

/// Creates a configuration error with a message
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::AggPipeError::Config {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::AggPipeError::Config {
            message: format!($fmt, $($arg)*),
        }
    };
}

/// Creates an invalid-argument error with a message
#[macro_export]
macro_rules! invalid_argument {
    ($msg:expr) => {
        $crate::AggPipeError::InvalidArgument {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::AggPipeError::InvalidArgument {
            message: format!($fmt, $($arg)*),
        }
    };
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Warning - something unexpected but recoverable
    Warning,
    /// Error - operation failed but system can continue
    Error,
    /// Critical - system integrity compromised
    Critical,
}

impl AggPipeError {
    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AggPipeError::Config { .. } => ErrorSeverity::Critical,
            AggPipeError::InvalidArgument { .. } => ErrorSeverity::Warning,
            AggPipeError::InvalidIdentifier { .. } => ErrorSeverity::Warning,
            AggPipeError::Engine { .. } => ErrorSeverity::Error,
            AggPipeError::CacheKey { .. } => ErrorSeverity::Warning,
            AggPipeError::Operation { .. } => ErrorSeverity::Error,
            AggPipeError::Unsupported { .. } => ErrorSeverity::Error,
            AggPipeError::Serialization { .. } => ErrorSeverity::Error,
            AggPipeError::Io(_) => ErrorSeverity::Error,
            AggPipeError::SerdeJson(_) => ErrorSeverity::Error,
        }
    }

    /// Get error category for metrics/monitoring
    pub fn category(&self) -> &'static str {
        match self {
            AggPipeError::Config { .. } => "config",
            AggPipeError::InvalidArgument { .. } => "invalid_argument",
            AggPipeError::InvalidIdentifier { .. } => "invalid_identifier",
            AggPipeError::Engine { .. } => "engine",
            AggPipeError::CacheKey { .. } => "cache_key",
            AggPipeError::Operation { .. } => "operation",
            AggPipeError::Unsupported { .. } => "unsupported",
            AggPipeError::Serialization { .. } | AggPipeError::SerdeJson(_) => "serialization",
            AggPipeError::Io(_) => "io",
        }
    }
}
