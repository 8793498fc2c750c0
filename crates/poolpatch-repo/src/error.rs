//! Error types for poolpatch-repo

use thiserror::Error;

/// Errors that can occur while handling repository metadata or tools
#[derive(Error, Debug, Clone)]
pub enum RepoError {
    /// Repository metadata index (`repomd.xml`) missing or malformed
    #[error("invalid repository metadata: {0}")]
    InvalidMetadata(String),

    /// Update-info document missing, not gzip, or malformed
    #[error("invalid update-info document: {0}")]
    InvalidUpdateInfo(String),

    /// Checksum recorded elsewhere differs from the one on disk
    #[error("checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch {
        /// Checksum the caller believed in
        expected: String,
        /// Checksum actually found
        actual: String,
    },

    /// Tool ran but exited unsuccessfully
    #[error("{tool} failed with status {status}: {message}")]
    CommandFailed {
        /// Program name
        tool: String,
        /// Exit status
        status: i32,
        /// Error output
        message: String,
    },

    /// Tool could not be run at all
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Metadata could not be fetched from a remote repository
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// URL requested
        url: String,
        /// Transport or status failure
        reason: String,
    },

    /// Filesystem operation failed
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path being operated on
        path: String,
        /// OS-level reason
        reason: String,
    },
}

impl RepoError {
    pub(crate) fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        RepoError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
