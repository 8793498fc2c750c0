//! poolpatch CLI
//!
//! Command-line interface for driving a poolpatch coordinator

use clap::{Parser, Subcommand};
use color_eyre::Result;
use poolpatch_api::Guidance;
use poolpatch_api::requests::{IntroduceRepositoryRequest, RegisterHostRequest};
use poolpatch_client::HttpClient;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "poolpatch")]
#[command(about = "Pool-wide software update orchestration CLI", long_about = None)]
struct Cli {
    /// Coordinator base URL
    #[arg(long, global = true, env = "POOLPATCH_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Pool secret used to open a session
    #[arg(long, global = true, env = "POOLPATCH_SECRET", default_value = "", hide_env_values = true)]
    secret: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage update repositories
    #[command(subcommand)]
    Repo(RepoCommand),

    /// Manage pool members
    #[command(subcommand)]
    Host(HostCommand),

    /// Sync the enabled repository and compute pool update status
    Sync,

    /// Show the updates each host needs, with guidance
    Updates {
        /// Only these hosts (comma-separated)
        #[arg(long, value_delimiter = ',')]
        hosts: Option<Vec<String>>,
    },

    /// Apply updates to a host and execute its guidance
    Apply {
        host: String,
        /// Checksum from the `updates` report being acted on
        #[arg(long)]
        hash: String,
    },
}

#[derive(Subcommand)]
enum RepoCommand {
    List,
    Introduce {
        name: String,
        /// URL of the binary package repository
        binary_url: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        source_url: String,
    },
    Forget {
        name: String,
    },
    /// Enable a repository for the pool; without a name, disable pool updates
    Enable {
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum HostCommand {
    List,
    Add {
        name: String,
        /// Base URL of the host's agent
        url: String,
    },
    Remove {
        name: String,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn join_guidance(guidance: &[Guidance]) -> String {
    if guidance.is_empty() {
        return "-".to_string();
    }
    guidance
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.url)?.login(&cli.secret).await?;
    let result = run(&client, cli.command, cli.json).await;
    // Close the session even when the command failed
    client.logout().await?;
    result
}

async fn run(client: &HttpClient, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Repo(RepoCommand::List) => {
            let repositories = client.list_repositories().await?;
            if json {
                return print_json(&repositories);
            }
            for repo in repositories {
                let marker = if repo.enabled { "*" } else { " " };
                let synced = repo
                    .last_synced
                    .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
                println!(
                    "{marker} {:<20} {:<50} up_to_date={} synced={synced}",
                    repo.name, repo.binary_url, repo.up_to_date
                );
            }
        }
        Commands::Repo(RepoCommand::Introduce {
            name,
            binary_url,
            description,
            source_url,
        }) => {
            let repository = client
                .introduce_repository(IntroduceRepositoryRequest {
                    name,
                    name_description: description,
                    binary_url,
                    source_url,
                })
                .await?;
            if json {
                return print_json(&repository);
            }
            println!("Introduced repository {}", repository.name);
        }
        Commands::Repo(RepoCommand::Forget { name }) => {
            client.forget_repository(&name).await?;
            println!("Forgot repository {name}");
        }
        Commands::Repo(RepoCommand::Enable { name }) => {
            client.enable_repository(name.clone()).await?;
            match name {
                Some(name) => println!("Enabled repository {name}"),
                None => println!("Disabled pool updates"),
            }
        }
        Commands::Host(HostCommand::List) => {
            let hosts = client.list_hosts().await?;
            if json {
                return print_json(&hosts);
            }
            for host in hosts {
                println!("{:<20} {}", host.name, host.url);
            }
        }
        Commands::Host(HostCommand::Add { name, url }) => {
            let host = client
                .register_host(RegisterHostRequest { name, url })
                .await?;
            if json {
                return print_json(&host);
            }
            println!("Registered host {}", host.name);
        }
        Commands::Host(HostCommand::Remove { name }) => {
            client.unregister_host(&name).await?;
            println!("Unregistered host {name}");
        }
        Commands::Sync => {
            let sync = client.sync_pool().await?;
            if json {
                return print_json(&sync);
            }
            let state = if sync.up_to_date {
                "up to date"
            } else {
                "updates pending"
            };
            println!("Synced: {state} (hash {})", sync.hash);
        }
        Commands::Updates { hosts } => {
            let report = client.pool_updates(hosts.as_deref()).await?;
            if json {
                return print_json(&report);
            }
            println!("hash {}", report.hash);
            for host in &report.hosts {
                println!(
                    "{:<20} {:>4} updates  recommended={}  absolute={}",
                    host.host,
                    host.updates.len(),
                    join_guidance(&host.recommended_guidance),
                    join_guidance(&host.absolute_guidance),
                );
            }
        }
        Commands::Apply { host, hash } => {
            let applied = client.apply_updates(&host, &hash).await?;
            if json {
                return print_json(&applied);
            }
            println!(
                "Applied updates to {host}, executed guidance: {}",
                join_guidance(&applied.guidance)
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_updates_hosts_are_split() {
        let cli = Cli::parse_from(["poolpatch", "updates", "--hosts", "host-1,host-2"]);
        match cli.command {
            Commands::Updates { hosts } => {
                assert_eq!(hosts, Some(vec!["host-1".to_string(), "host-2".to_string()]));
            }
            _ => panic!("expected updates command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "poolpatch",
            "apply",
            "host-1",
            "--hash",
            "c0ffee",
            "--url",
            "http://master:8080",
            "--json",
        ]);
        assert_eq!(cli.url, "http://master:8080");
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Apply { host, hash } if host == "host-1" && hash == "c0ffee"));
    }

    #[test]
    fn test_enable_without_name_disables() {
        let cli = Cli::parse_from(["poolpatch", "repo", "enable"]);
        assert!(matches!(
            cli.command,
            Commands::Repo(RepoCommand::Enable { name: None })
        ));
    }

    #[test]
    fn test_join_guidance() {
        assert_eq!(join_guidance(&[]), "-");
        assert_eq!(
            join_guidance(&[Guidance::RestartDeviceModel, Guidance::RestartToolstack]),
            format!("{},{}", Guidance::RestartDeviceModel, Guidance::RestartToolstack)
        );
    }
}
