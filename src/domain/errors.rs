use std::io;
use thiserror::Error;

/// Errors surfaced by the filemap core. The command layer decides how each
/// one maps to user-visible output.
#[derive(Debug, Error)]
pub enum FilemapError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unknown fileset: {0}")]
    UnknownFileset(String),

    #[error("path escapes the working root: {0}")]
    PathEscape(String),

    #[error("invalid fileset pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("unsupported output format: {0} (expected one of: raw, json)")]
    UnsupportedFormat(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write {path} after writing {} file(s): {source}", .written.len())]
    WriteBack {
        path: String,
        written: Vec<String>,
        #[source]
        source: io::Error,
    },
}

impl FilemapError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        FilemapError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FilemapError>;
