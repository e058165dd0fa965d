use std::path::PathBuf;

use thiserror::Error;
use tower_lsp::lsp_types::Url;

/// Failures surfaced by the language services.
///
/// Lookups that simply find nothing (an unresolved reference, a cursor inside
/// a comment) are not errors; they are reported as `Ok(None)` or empty lists.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid text range {start}..{end} for text of length {len}")]
    InvalidTextRange { start: usize, end: usize, len: usize },

    #[error("offset {offset} is outside of text of length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("position {line}:{character} is outside of document")]
    PositionOutOfRange { line: u32, character: u32 },

    #[error("document {0} is not tracked")]
    UnknownDocument(Url),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ServiceError>;
