//! Core error types for attendance-sync-core.
//!
//! Local failures (storage, configuration, validation) are surfaced through
//! [`CoreError`]. Remote delivery failures never show up here: they are
//! absorbed into record state by the sync coordinator (see
//! [`crate::sync::RemoteError`]).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for attendance-sync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistent storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Key-value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading a key failed for a reason other than absence
    #[error("Failed to read '{key}': {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a key failed
    #[error("Failed to write '{key}': {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Removing a key failed
    #[error("Failed to remove '{key}': {source}")]
    RemoveFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A bucket could not be serialized
    #[error("Failed to encode bucket '{bucket}': {source}")]
    EncodeFailed {
        bucket: String,
        #[source]
        source: serde_json::Error,
    },

    /// Storage root could not be prepared
    #[error("Storage directory {path} unavailable: {message}")]
    Unavailable { path: PathBuf, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Required field was empty
    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl StorageError {
    /// Storage key the failure relates to, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            StorageError::ReadFailed { key, .. }
            | StorageError::WriteFailed { key, .. }
            | StorageError::RemoveFailed { key, .. } => Some(key),
            StorageError::EncodeFailed { bucket, .. } => Some(bucket),
            StorageError::Unavailable { .. } => None,
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
