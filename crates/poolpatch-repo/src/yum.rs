//! yum/dnf package manager

use std::sync::Arc;

use async_trait::async_trait;
use poolpatch_exec::{CommandExecutor, ToolCommand};
use tracing::{debug, info, instrument};

use crate::error::RepoError;
use crate::traits::PackageManager;
use crate::types::{PackageVersion, UpgradablePackage, UpgradeResult};

/// yum/dnf package manager implementation
///
/// Every repository-scoped command disables all configured repositories and
/// enables only the one it was asked about.
pub struct YumManager {
    executor: Arc<dyn CommandExecutor>,
    /// `yum` or `dnf`
    tool: String,
}

impl YumManager {
    /// Create a manager driving `tool` (`yum` or `dnf`)
    pub fn new(executor: Arc<dyn CommandExecutor>, tool: impl Into<String>) -> Self {
        Self {
            executor,
            tool: tool.into(),
        }
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.tool)
    }

    fn restrict_to(cmd: ToolCommand, repo_id: &str) -> ToolCommand {
        cmd.arg("--disablerepo=*")
            .arg(format!("--enablerepo={repo_id}"))
    }

    async fn run_checked(&self, cmd: &ToolCommand) -> Result<String, RepoError> {
        let result = self
            .executor
            .run(cmd)
            .await
            .map_err(|e| RepoError::ExecutionError(e.to_string()))?;

        if !result.success() {
            return Err(RepoError::CommandFailed {
                tool: cmd.program.clone(),
                status: result.status,
                message: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout)
    }

    fn is_header(line: &str) -> bool {
        line.starts_with("Last metadata")
            || line.ends_with("Packages")
            || line.ends_with("Upgrades")
            || line.starts_with("Loaded plugins")
    }

    /// Parse `list updates` / `list installed` output
    ///
    /// Each entry is `name.arch [epoch:]version-release repo`; long names make
    /// the package manager wrap an entry across two lines.
    fn parse_package_list(output: &str) -> Vec<UpgradablePackage> {
        let mut packages = Vec::new();
        let mut tokens: Vec<&str> = Vec::new();

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || Self::is_header(line) {
                tokens.clear();
                continue;
            }

            tokens.extend(line.split_whitespace());
            if tokens.len() < 3 {
                continue;
            }

            match Self::parse_entry(tokens[0], tokens[1], tokens[2]) {
                Some(pkg) => packages.push(pkg),
                None => debug!(line, "skipping unparseable package line"),
            }
            tokens.clear();
        }

        packages
    }

    fn parse_entry(name_arch: &str, evr: &str, repo: &str) -> Option<UpgradablePackage> {
        let (name, arch) = name_arch.rsplit_once('.')?;
        let version = PackageVersion::parse(evr)?;
        Some(UpgradablePackage {
            name: name.to_string(),
            arch: arch.to_string(),
            version,
            repository: repo.trim_start_matches('@').to_string(),
        })
    }

    /// Read the count from the transaction summary (`Upgrade  3 Packages`)
    fn parse_upgrade_count(output: &str) -> u32 {
        output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("Upgrade" | "Update"), Some(n)) => n.parse::<u32>().ok(),
                    _ => None,
                }
            })
            .sum()
    }
}

#[async_trait]
impl PackageManager for YumManager {
    #[instrument(skip(self))]
    async fn list_updates(&self, repo_id: &str) -> Result<Vec<UpgradablePackage>, RepoError> {
        let cmd = Self::restrict_to(self.command().arg("-q"), repo_id).args(["list", "updates"]);
        let stdout = self.run_checked(&cmd).await?;

        let packages = Self::parse_package_list(&stdout);
        info!(count = packages.len(), "found upgradable packages");
        Ok(packages)
    }

    #[instrument(skip(self))]
    async fn list_installed(&self) -> Result<Vec<UpgradablePackage>, RepoError> {
        let cmd = self.command().args(["-q", "list", "installed"]);
        let stdout = self.run_checked(&cmd).await?;
        Ok(Self::parse_package_list(&stdout))
    }

    #[instrument(skip(self))]
    async fn upgrade(&self, repo_id: &str) -> Result<UpgradeResult, RepoError> {
        info!("starting upgrade");

        let cmd = Self::restrict_to(self.command().arg("-y"), repo_id).arg("upgrade");
        let stdout = self.run_checked(&cmd).await?;

        let upgraded_count = Self::parse_upgrade_count(&stdout);
        info!(upgraded = upgraded_count, "upgrade completed");

        Ok(UpgradeResult {
            success: true,
            upgraded_count,
        })
    }

    #[instrument(skip(self))]
    async fn clean_metadata(&self, repo_id: &str) -> Result<(), RepoError> {
        let cmd = Self::restrict_to(self.command().args(["clean", "all"]), repo_id);
        self.run_checked(&cmd).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use poolpatch_exec::{CommandResult, ExecError};

    use super::*;

    struct RecordingExecutor {
        commands: Mutex<Vec<ToolCommand>>,
        reply: CommandResult,
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run(&self, cmd: &ToolCommand) -> Result<CommandResult, ExecError> {
            self.commands.lock().unwrap().push(cmd.clone());
            Ok(self.reply.clone())
        }
    }

    fn manager(reply: CommandResult) -> (YumManager, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor {
            commands: Mutex::new(Vec::new()),
            reply,
        });
        (YumManager::new(executor.clone(), "yum"), executor)
    }

    #[test]
    fn test_parse_package_list() {
        let output = r"Updated Packages
vim-enhanced.x86_64 2:8.2.2637-20.el9_1 local
curl.x86_64         7.76.1-26.el9_0 local";

        let packages = YumManager::parse_package_list(output);

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "vim-enhanced");
        assert_eq!(packages[0].arch, "x86_64");
        assert_eq!(packages[0].version.to_string(), "2:8.2.2637-20.el9_1");
        assert_eq!(packages[1].repository, "local");
    }

    #[test]
    fn test_parse_wrapped_line() {
        let output = "Installed Packages
xenserver-a-very-long-package-name-indeed.noarch
                     1.0-1.xs8 @anaconda";

        let packages = YumManager::parse_package_list(output);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].arch, "noarch");
        assert_eq!(packages[0].repository, "anaconda");
    }

    #[test]
    fn test_parse_upgrade_count() {
        let output = "Transaction Summary\n=====\nUpgrade  3 Packages\n\nComplete!";
        assert_eq!(YumManager::parse_upgrade_count(output), 3);
    }

    #[tokio::test]
    async fn test_list_updates_restricts_repo() {
        let (yum, executor) = manager(CommandResult::ok("qemu.x86_64 4.2.1-5.xs8 local\n"));

        let packages = yum.list_updates("local").await.unwrap();
        assert_eq!(packages.len(), 1);

        let commands = executor.commands.lock().unwrap();
        assert_eq!(
            commands[0].args,
            vec!["-q", "--disablerepo=*", "--enablerepo=local", "list", "updates"]
        );
    }

    #[tokio::test]
    async fn test_upgrade_failure() {
        let (yum, _) = manager(CommandResult::failed(1, "Error: rpmdb lock held"));

        let result = yum.upgrade("local").await;
        assert!(matches!(result, Err(RepoError::CommandFailed { status: 1, .. })));
    }
}
