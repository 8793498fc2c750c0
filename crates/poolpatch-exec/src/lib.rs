//! poolpatch-exec: External command execution
//!
//! Runs the package manager, repository tools and hypervisor CLI that the
//! orchestration engine drives as external collaborators.

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::{CommandResult, ToolCommand};
pub use traits::CommandExecutor;
