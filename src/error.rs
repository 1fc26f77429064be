// ============================================================================
// ERROR HANDLING FRAMEWORK
// ============================================================================
// One error enum per subsystem, all convertible into `PulseError`.
// Sampling, persistence and remote sync failures never cross the HTTP
// boundary; callers match on these results and substitute a default.
// ============================================================================

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Core Engine Errors
// ----------------------------------------------------------------------------

/// The main error type for the engine.
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Update error: {0}")]
    Update(#[from] UpdateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PulseError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            PulseError::Config(_) => "config",
            PulseError::Sampler(_) => "sampler",
            PulseError::Storage(_) => "storage",
            PulseError::Update(_) => "update",
            PulseError::Io(_) => "io",
            PulseError::Internal(_) => "internal",
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors related to configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String, source: Option<Box<dyn StdError + Send + Sync>> },

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        ConfigError::ParseError {
            message: message.into(),
            source: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Sampler Errors
// ----------------------------------------------------------------------------

/// Errors from reading host counters
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("statvfs({path}) failed: {source}")]
    StatFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} is not supported on this platform")]
    Unsupported { what: &'static str },
}

impl SamplerError {
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SamplerError::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Storage Errors
// ----------------------------------------------------------------------------

/// Errors from the snapshot file
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization failed: {message}")]
    SerializationFailed { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationFailed { message: String },

    #[error("Write failed for {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Read failed for {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ----------------------------------------------------------------------------
// Update Errors
// ----------------------------------------------------------------------------

/// Errors from the version-control helper
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Failed to spawn `git {command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` exited with {status}: {stderr}")]
    CommandFailed { command: String, status: String, stderr: String },

    #[error("`git {command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
}

// ----------------------------------------------------------------------------
// Result Type Aliases
// ----------------------------------------------------------------------------

/// Standard result type for engine operations
pub type PulseResult<T> = Result<T, PulseError>;

/// Result type for sampler operations
pub type SamplerResult<T> = Result<T, SamplerError>;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for update operations
pub type UpdateResult<T> = Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err: PulseError = ConfigError::invalid_value("http.port", "must be non-zero").into();
        assert_eq!(err.category(), "config");
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration value for 'http.port': must be non-zero"
        );

        let err: PulseError = UpdateError::Timeout { command: "fetch".into(), timeout_secs: 5 }.into();
        assert_eq!(err.category(), "update");
    }
}
