//! Error types for the assembly pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the run.
///
/// Soft rejections (noisy overlaps, failed placements, unassembled tigs)
/// are never errors; they are counted in per-phase summary structs.
#[derive(Error, Debug)]
pub enum AsmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("data error in {path}: {message}")]
    Data { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, AsmError>;

impl AsmError {
    pub fn data(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AsmError::Data {
            path: path.into(),
            message: message.into(),
        }
    }
}
