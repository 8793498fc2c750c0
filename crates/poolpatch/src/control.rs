//! Host control through the hypervisor CLI
//!
//! The host agent acts on its own host: listing resident VMs, restarting a
//! VM's device model by migrating it onto the same host, restarting the
//! toolstack and rebooting.

use std::sync::Arc;

use poolpatch_api::vm::{PowerState, VmRecord};
use poolpatch_exec::{CommandExecutor, CommandResult, ToolCommand};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::ControlConfig;

/// Failures of a host control command
#[derive(Error, Debug, Clone)]
pub enum ControlError {
    /// Command missing from configuration
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Command could not run or exited unsuccessfully
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    /// `xe` printed something we cannot read
    #[error("unexpected xe output: {0}")]
    Parse(String),
}

const VM_LIST_PARAMS: &str = "uuid,name-label,power-state,is-control-domain,domain-type";

/// Runs host control commands for the host agent
pub struct HostControl {
    executor: Arc<dyn CommandExecutor>,
    config: ControlConfig,
}

impl HostControl {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: ControlConfig) -> Self {
        Self { executor, config }
    }

    fn host_uuid(&self) -> Result<&str, ControlError> {
        if self.config.host_uuid.is_empty() {
            Err(ControlError::NotConfigured("control.host_uuid"))
        } else {
            Ok(&self.config.host_uuid)
        }
    }

    async fn run(&self, cmd: ToolCommand) -> Result<CommandResult, ControlError> {
        let failed = |message: String| ControlError::CommandFailed {
            command: cmd.to_string(),
            message,
        };

        let result = self
            .executor
            .run(&cmd)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if result.success() {
            Ok(result)
        } else {
            Err(failed(result.combined_output().trim().to_string()))
        }
    }

    /// VMs resident on this host
    ///
    /// # Errors
    /// Returns `ControlError` if `xe` fails or prints an unreadable record
    #[instrument(skip(self))]
    pub async fn resident_vms(&self) -> Result<Vec<VmRecord>, ControlError> {
        let cmd = ToolCommand::new(&self.config.xe_path).args([
            "vm-list".to_string(),
            format!("resident-on={}", self.host_uuid()?),
            format!("params={VM_LIST_PARAMS}"),
        ]);
        let result = self.run(cmd).await?;
        parse_vm_list(&result.stdout)
    }

    /// Live-migrate `vm` onto this host, restarting its device model
    ///
    /// # Errors
    /// Returns `ControlError` if the migration fails
    #[instrument(skip(self))]
    pub async fn migrate_local(&self, vm: &str) -> Result<(), ControlError> {
        let cmd = ToolCommand::new(&self.config.xe_path).args([
            "vm-migrate".to_string(),
            format!("uuid={vm}"),
            format!("host-uuid={}", self.host_uuid()?),
            "live=true".to_string(),
        ]);
        self.run(cmd).await?;
        info!(vm, "device model restarted");
        Ok(())
    }

    /// # Errors
    /// Returns `ControlError` if the restart command fails
    #[instrument(skip(self))]
    pub async fn restart_toolstack(&self) -> Result<(), ControlError> {
        let cmd = configured_command("control.toolstack_restart_command", &self.config.toolstack_restart_command)?;
        self.run(cmd).await?;
        info!("toolstack restarted");
        Ok(())
    }

    /// Start a reboot in the background
    ///
    /// Completion is never observed: the reboot takes this process with it.
    ///
    /// # Errors
    /// Returns `ControlError::NotConfigured` if no reboot command is set
    pub fn reboot(self: &Arc<Self>) -> Result<(), ControlError> {
        let cmd = configured_command("control.reboot_command", &self.config.reboot_command)?;
        let control = Arc::clone(self);
        info!(command = %cmd, "rebooting host");
        tokio::spawn(async move {
            if let Err(e) = control.run(cmd).await {
                warn!(error = %e, "reboot failed");
            }
        });
        Ok(())
    }
}

fn configured_command(key: &'static str, line: &str) -> Result<ToolCommand, ControlError> {
    let mut words = line.split_whitespace();
    let program = words.next().ok_or(ControlError::NotConfigured(key))?;
    Ok(ToolCommand::new(program).args(words))
}

/// Parse `xe vm-list` records: blocks of `key ( RO): value` lines separated
/// by blank lines
///
/// # Errors
/// Returns `ControlError::Parse` for a record missing a field or with an
/// unknown power state
pub fn parse_vm_list(output: &str) -> Result<Vec<VmRecord>, ControlError> {
    let mut records = Vec::new();
    let mut fields: Vec<(&str, &str)> = Vec::new();

    for line in output.lines().chain(std::iter::once("")) {
        let line = line.trim();
        if line.is_empty() {
            if !fields.is_empty() {
                records.push(vm_record(&fields)?);
                fields.clear();
            }
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ControlError::Parse(line.to_string()))?;
        // "name-label ( RW)" -> "name-label"
        let key = key.split_once('(').map_or(key, |(k, _)| k).trim();
        fields.push((key, value.trim()));
    }

    Ok(records)
}

fn vm_record(fields: &[(&str, &str)]) -> Result<VmRecord, ControlError> {
    let get = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| ControlError::Parse(format!("record without {name}")))
    };

    let power_state = match get("power-state")? {
        "running" => PowerState::Running,
        "paused" => PowerState::Paused,
        "halted" => PowerState::Halted,
        "suspended" => PowerState::Suspended,
        other => return Err(ControlError::Parse(format!("power state {other}"))),
    };

    Ok(VmRecord {
        uuid: get("uuid")?.to_string(),
        name_label: get("name-label")?.to_string(),
        power_state,
        is_control_domain: get("is-control-domain")? == "true",
        // Only HVM guests run an emulator
        has_device_model: get("domain-type").is_ok_and(|t| t == "hvm"),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use poolpatch_exec::ExecError;

    use super::*;

    const VM_LIST: &str = "\
uuid ( RO)                : 6c1f5e58-0000-4000-8000-000000000001
          name-label ( RW): web-1
         power-state ( RO): running
   is-control-domain ( RO): false
         domain-type ( RW): hvm


uuid ( RO)                : 6c1f5e58-0000-4000-8000-000000000002
          name-label ( RW): Control domain on host: host-1
         power-state ( RO): running
   is-control-domain ( RO): true
         domain-type ( RW): pv


uuid ( RO)                : 6c1f5e58-0000-4000-8000-000000000003
          name-label ( RW): batch: nightly
         power-state ( RO): paused
   is-control-domain ( RO): false
         domain-type ( RW): hvm
";

    struct MockExecutor {
        output: String,
        commands: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn new(output: &str) -> Arc<Self> {
            Arc::new(Self {
                output: output.to_string(),
                commands: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn run(&self, cmd: &ToolCommand) -> Result<CommandResult, ExecError> {
            self.commands.lock().unwrap().push(cmd.to_string());
            Ok(CommandResult::ok(self.output.clone()))
        }
    }

    fn control(executor: Arc<MockExecutor>) -> HostControl {
        HostControl::new(
            executor,
            ControlConfig {
                host_uuid: "host-uuid-1".to_string(),
                ..ControlConfig::default()
            },
        )
    }

    #[test]
    fn test_parse_vm_list() {
        let vms = parse_vm_list(VM_LIST).unwrap();

        assert_eq!(vms.len(), 3);
        assert_eq!(vms[0].name_label, "web-1");
        assert_eq!(vms[0].power_state, PowerState::Running);
        assert!(vms[0].has_device_model);
        assert!(vms[1].is_control_domain);
        assert!(!vms[1].has_device_model);
        // Colons inside values survive
        assert_eq!(vms[2].name_label, "batch: nightly");
        assert_eq!(vms[2].power_state, PowerState::Paused);
    }

    #[test]
    fn test_parse_vm_list_empty() {
        assert!(parse_vm_list("").unwrap().is_empty());
        assert!(parse_vm_list("\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_vm_list_bad_power_state() {
        let output = "uuid ( RO): a\nname-label ( RW): b\npower-state ( RO): dancing\nis-control-domain ( RO): false\n";
        assert!(matches!(parse_vm_list(output), Err(ControlError::Parse(_))));
    }

    #[tokio::test]
    async fn test_resident_vms_command() {
        let executor = MockExecutor::new(VM_LIST);
        let vms = control(executor.clone()).resident_vms().await.unwrap();

        assert_eq!(vms.len(), 3);
        assert_eq!(
            executor.commands.lock().unwrap()[0],
            "xe vm-list resident-on=host-uuid-1 params=uuid,name-label,power-state,is-control-domain,domain-type"
        );
    }

    #[tokio::test]
    async fn test_migrate_local_command() {
        let executor = MockExecutor::new("");
        control(executor.clone()).migrate_local("vm-1").await.unwrap();

        assert_eq!(
            executor.commands.lock().unwrap()[0],
            "xe vm-migrate uuid=vm-1 host-uuid=host-uuid-1 live=true"
        );
    }

    #[tokio::test]
    async fn test_missing_host_uuid() {
        let control = HostControl::new(MockExecutor::new(""), ControlConfig::default());
        assert!(matches!(
            control.resident_vms().await,
            Err(ControlError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_configured_command_splits_arguments() {
        let cmd = configured_command("key", "systemctl restart xapi").unwrap();
        assert_eq!(cmd.program, "systemctl");
        assert_eq!(cmd.args, vec!["restart", "xapi"]);

        assert!(configured_command("key", "  ").is_err());
    }
}
