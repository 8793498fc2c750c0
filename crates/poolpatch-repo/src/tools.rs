//! Repository mirroring and metadata tools (reposync, createrepo_c, modifyrepo_c)

use std::path::Path;

use poolpatch_exec::{CommandExecutor, CommandResult, ToolCommand};
use tracing::{debug, instrument};

use crate::error::RepoError;

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Mirror `repo_id` (described by `config_file`) into `<mirror_root>/<repo_id>`,
/// deleting anything upstream no longer carries
#[must_use]
pub fn reposync(config_file: &Path, mirror_root: &Path, repo_id: &str, gpgcheck: bool) -> ToolCommand {
    let cmd = ToolCommand::new("reposync")
        .arg(format!("--config={}", path_arg(config_file)))
        .arg("-p")
        .arg(path_arg(mirror_root))
        .arg("--download-metadata")
        .arg("--delete")
        .arg(format!("--repoid={repo_id}"));
    if gpgcheck {
        cmd
    } else {
        cmd.arg("--nogpgcheck")
    }
}

/// Regenerate repository metadata for the packages under `dir`
#[must_use]
pub fn createrepo(dir: &Path) -> ToolCommand {
    ToolCommand::new("createrepo_c").arg(path_arg(dir))
}

/// Drop the update-info record from `repodata`
#[must_use]
pub fn modifyrepo_remove_update_info(repodata: &Path) -> ToolCommand {
    ToolCommand::new("modifyrepo_c")
        .args(["--remove", "updateinfo"])
        .arg(path_arg(repodata))
}

/// Add an already compressed update-info document to `repodata` as-is,
/// so its checksum is preserved
#[must_use]
pub fn modifyrepo_add_update_info(document: &Path, repodata: &Path) -> ToolCommand {
    ToolCommand::new("modifyrepo_c")
        .args(["--mdtype", "updateinfo", "--no-compress"])
        .arg(path_arg(document))
        .arg(path_arg(repodata))
}

/// Run `cmd`, turning a non-zero exit into `RepoError::CommandFailed`
///
/// # Errors
/// Returns `RepoError::ExecutionError` if the tool cannot be started and
/// `RepoError::CommandFailed` if it exits unsuccessfully
#[instrument(skip(executor, cmd), fields(tool = %cmd.program))]
pub async fn run_tool(
    executor: &dyn CommandExecutor,
    cmd: &ToolCommand,
) -> Result<CommandResult, RepoError> {
    let result = executor
        .run(cmd)
        .await
        .map_err(|e| RepoError::ExecutionError(e.to_string()))?;

    if !result.success() {
        return Err(RepoError::CommandFailed {
            tool: cmd.program.clone(),
            status: result.status,
            message: result.combined_output().trim().to_string(),
        });
    }

    debug!(duration_ms = result.duration.as_millis(), "tool finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_reposync_arguments() {
        let cmd = reposync(
            Path::new("/etc/yum.repos.d/base.repo"),
            Path::new("/srv/mirror"),
            "base",
            true,
        );
        assert_eq!(cmd.program, "reposync");
        assert_eq!(
            cmd.args,
            vec![
                "--config=/etc/yum.repos.d/base.repo",
                "-p",
                "/srv/mirror",
                "--download-metadata",
                "--delete",
                "--repoid=base",
            ]
        );
        assert!(!cmd.has_arg("--nogpgcheck"));
    }

    #[test]
    fn test_reposync_without_gpgcheck() {
        let cmd = reposync(Path::new("a.repo"), Path::new("/m"), "base", false);
        assert!(cmd.has_arg("--nogpgcheck"));
    }

    #[test]
    fn test_modifyrepo_keeps_document_compressed() {
        let repodata = PathBuf::from("/srv/mirror/base/repodata");
        let add = modifyrepo_add_update_info(Path::new("/srv/mirror/base/abc-updateinfo.xml.gz"), &repodata);
        assert!(add.has_arg("--no-compress"));
        assert_eq!(add.args.last().map(String::as_str), Some("/srv/mirror/base/repodata"));

        let remove = modifyrepo_remove_update_info(&repodata);
        assert_eq!(remove.to_string(), "modifyrepo_c --remove updateinfo /srv/mirror/base/repodata");
    }
}
