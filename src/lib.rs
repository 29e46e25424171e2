pub mod adhoc;
pub mod callback;
pub mod cli;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod modules;
pub mod playbook;
pub mod shell;
pub mod template;
pub mod vars;

use crate::adhoc::AdHoc;
use crate::callback::minimal::Minimal;
use crate::cli::Cli;
use crate::config::manager::ConfigManager;
use crate::executor::task_queue_manager::TaskQueueManager;
use crate::inventory::manager::InventoryManager;
use crate::playbook::Playbook;
use anyhow::{bail, Context, Result};
use log::{debug, warn};

/// Runs the command line, returning the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let mut config = ConfigManager::new();
    config.init(cli.config.as_deref())?;

    let sources = cli.resolve_inventory(&config)?;
    let mut manager = InventoryManager::new();
    manager.parse_sources(sources.as_deref())?;
    if sources.is_none() {
        warn!("no inventory was parsed, only implicit localhost is available");
    }

    let playbook = load_playbook(&cli)?;

    if cli.list_hosts {
        for play in playbook.plays() {
            let hosts = manager.filter_hosts(play.get_pattern(), cli.limit.as_deref())?;
            println!("play: {} ({} hosts)", play.name, hosts.len());
            for host in hosts {
                println!("  {}", host.name);
            }
        }
        return Ok(0);
    }

    let mut tqm = TaskQueueManager::new(
        Some(cli.resolve_forks(&config)?),
        cli.resolve_play_context(&config)?,
        cli.resolve_connection_defaults(&config)?,
    );
    tqm.register_callback(Box::new(Minimal));

    let report = tqm.run(&playbook, &manager, cli.limit.as_deref()).await?;
    debug!("run finished with {} task results", report.results.len());

    Ok(report.exit_code())
}

fn load_playbook(cli: &Cli) -> Result<Playbook> {
    if let Some(path) = &cli.playbook {
        return Playbook::from_file(path);
    }

    match &cli.module_name {
        Some(module_name) => {
            let pattern = cli
                .pattern
                .as_deref()
                .context("A host pattern is required for ad-hoc runs")?;
            AdHoc::playbook(module_name, cli.args.as_deref(), pattern)
        }
        None => bail!("Nothing to run: pass --module-name or --playbook"),
    }
}
