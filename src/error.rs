//! Error taxonomy for the compression session.
//!
//! Everything that crosses the session boundary is a [`SessionError`], so a
//! caller can render a notification without knowing which component failed.
//! Codec internals keep using `anyhow` and are folded into
//! [`SessionError::CompressionFailed`] by the session controller.

use std::io;

use thiserror::Error;

use crate::preset::Preset;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("not a PDF file: {0}")]
    InvalidFileType(String),

    #[error("no document loaded")]
    NoDocumentLoaded,

    #[error("already processing with preset '{0}', please wait for it to finish")]
    AlreadyProcessing(Preset),

    #[error("operation not allowed while a compression job is running")]
    OperationInProgress,

    #[error("source document is empty, compression ratio is undefined")]
    InvalidSourceSize,

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("unknown preset '{0}' (expected medium, small or tiny)")]
    UnknownPreset(String),

    #[error("no artifact for preset '{0}'")]
    ArtifactNotFound(Preset),

    #[error("session has been torn down")]
    SessionClosed,
}

/// Errors returned by `load_document`.
pub type LoadError = SessionError;

/// Errors returned by `apply_preset`.
pub type ProcessingError = SessionError;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

impl SessionError {
    pub(crate) fn io(context: &str, err: io::Error) -> Self {
        SessionError::IoFailure(format!("{}: {}", context, err))
    }
}
