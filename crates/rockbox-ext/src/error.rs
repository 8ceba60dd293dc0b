//! Bridge error types.
//!
//! `OpError` is what a single operation call settles with and is the only
//! error a script ever sees (as a `ScriptError`). `RegistryError` covers
//! initialization, `BridgeError` everything the host does around scripts.

use rockbox_audio::AudioError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Script-visible failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownOperation,
    ArgumentError,
    PathNotFound,
    NotADirectory,
    InvalidStateTransition,
    StorageError,
    InternalError,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownOperation => "UnknownOperation",
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::PathNotFound => "PathNotFound",
            ErrorKind::NotADirectory => "NotADirectory",
            ErrorKind::InvalidStateTransition => "InvalidStateTransition",
            ErrorKind::StorageError => "StorageError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// Kinds any operation may fail with, whatever it declares.
    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            ErrorKind::ArgumentError | ErrorKind::InternalError | ErrorKind::Cancelled
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid argument `{parameter}`: {reason}")]
    Argument { parameter: String, reason: String },

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("call cancelled")]
    Cancelled,
}

impl OpError {
    pub fn argument(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        OpError::Argument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OpError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            OpError::Argument { .. } => ErrorKind::ArgumentError,
            OpError::PathNotFound(_) => ErrorKind::PathNotFound,
            OpError::NotADirectory(_) => ErrorKind::NotADirectory,
            OpError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            OpError::Storage(_) => ErrorKind::StorageError,
            OpError::Internal(_) => ErrorKind::InternalError,
            OpError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The serialized form handed back to scripts.
    pub fn to_script(&self) -> ScriptError {
        let parameter = match self {
            OpError::Argument { parameter, .. } => Some(parameter.clone()),
            _ => None,
        };
        ScriptError {
            kind: self.kind(),
            message: self.to_string(),
            parameter,
        }
    }
}

impl From<AudioError> for OpError {
    fn from(e: AudioError) -> Self {
        tracing::error!("audio engine failure: {e}");
        OpError::Internal("audio engine unavailable".into())
    }
}

impl From<rockbox_library::sea_orm::DbErr> for OpError {
    fn from(e: rockbox_library::sea_orm::DbErr) -> Self {
        tracing::error!("library index failure: {e}");
        OpError::Internal("library index unavailable".into())
    }
}

/// A structured error as seen from script code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("operation already registered: {0}")]
    DuplicateOperation(String),

    #[error("registry is frozen, cannot register {0}")]
    RegistryFrozen(String),

    #[error("invalid schema for {operation}: {reason}")]
    InvalidSchema { operation: String, reason: String },

    #[error("namespace conflict at {0}")]
    NamespaceConflict(String),

    #[error("{path} is bound to unregistered operation {operation}")]
    UnknownBinding { path: String, operation: String },
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("execution timeout: script {0} exceeded fuel limit")]
    FuelExhausted(String),

    #[error("memory limit exceeded: script {0}")]
    MemoryExceeded(String),

    #[error("guest protocol violation: {0}")]
    Protocol(String),

    #[error("script {script} did not finish within {turns} turns")]
    TurnLimit { script: String, turns: usize },

    #[error("audio engine error: {0}")]
    Audio(#[from] AudioError),

    #[error("database error: {0}")]
    Database(#[from] rockbox_library::sea_orm::DbErr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
