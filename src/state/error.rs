use std::path::PathBuf;

use thiserror::Error;

/// Everything the library can refuse or fail at.
///
/// Validation errors (`DuplicateTitle`, `NotFound`, `PageOutOfRange`,
/// `InvalidPageNumber`) leave the library untouched. Extraction errors
/// (`UnsupportedFormat`, `ArchiveCorrupt`) abort an open before anything is
/// inserted. `Io` raised by a save means the in-memory change was applied
/// but did not reach disk.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("corrupt archive {}: {reason}", .path.display())]
    ArchiveCorrupt { path: PathBuf, reason: String },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("comic already in library: {0}")]
    DuplicateTitle(String),

    #[error("comic not found: {0}")]
    NotFound(String),

    #[error("page {index} is out of range for {title} ({page_count} pages)")]
    PageOutOfRange {
        title: String,
        index: i64,
        page_count: usize,
    },

    #[error("not a page number: {0:?}")]
    InvalidPageNumber(String),

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("library worker channel closed")]
    ChannelClosed,
}

impl LibraryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArchiveCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
