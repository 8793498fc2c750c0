//! Command executor trait

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandResult, ToolCommand};

/// Something that can run an external tool and report its outcome.
///
/// A non-zero exit status is not an error at this layer: callers inspect
/// [`CommandResult::status`] because some tools use it to signal data.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    async fn run(&self, cmd: &ToolCommand) -> Result<CommandResult, ExecError>;
}
