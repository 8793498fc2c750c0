//! Error types for poolpatch-exec

use thiserror::Error;

/// Errors that can occur while running an external tool
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Process could not be spawned (missing binary, permissions)
    #[error("failed to spawn {program}: {reason}")]
    SpawnError {
        /// Program that failed to start
        program: String,
        /// OS-level reason
        reason: String,
    },

    /// I/O error while collecting output
    #[error("I/O error: {0}")]
    IoError(String),
}
