use crate::config::manager::ConfigManager;
use crate::connection::{ConnectionDefaults, ConnectionType, HostKeyChecking};
use crate::constants::{DEFAULT_BECOME_USER, DEFAULT_FORKS};
use crate::playbook::play_context::PlayContext;
use anyhow::Result;
use clap::{ArgAction, Parser};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// outputs a list of matching hosts; does not execute anything else
    #[arg(long, action)]
    pub list_hosts: bool,

    #[arg(short, long, value_name = "CONNECTION")]
    pub connection: Option<String>,

    /// the action's options in space separated k=v format: -a 'opt1=val1 opt2=val2', a json
    /// string: -a '{"opt1": "val1"}', or the command line itself for command/shell
    #[arg(short, long)]
    pub args: Option<String>,

    #[arg(short, long)]
    pub forks: Option<u32>,

    /// name of the action to execute
    #[arg(short, long, group = "action")]
    pub module_name: Option<String>,

    /// further limit selected hosts to an additional pattern
    #[arg(short, long, value_name = "SUBSET")]
    pub limit: Option<String>,

    /// don't make any changes; report what would change instead
    #[arg(short = 'C', long)]
    pub check: bool,

    /// connect as this user
    #[arg(short, long, value_name = "REMOTE_USER")]
    pub user: Option<String>,

    /// run operations with become (sudo)
    #[arg(short = 'b', long = "become")]
    pub use_become: bool,

    #[arg(long, value_name = "BECOME_USER")]
    pub become_user: Option<String>,

    /// -v for info, -vv for debug logging
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// host pattern
    pub pattern: Option<String>,

    /// specify inventory host path or comma separated host list
    #[arg(short, long)]
    pub inventory: Option<Vec<String>>,

    /// specify playbook you want to run
    #[arg(short, long, value_name = "FILE", group = "action")]
    pub playbook: Option<PathBuf>,
}

fn config_value<T: DeserializeOwned>(config: &ConfigManager, key: &str) -> Result<Option<T>> {
    Ok(config.get_config_value::<T>(key)?.map(|(value, _)| value))
}

/// Command line flags win over configuration values.
impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    pub fn resolve_forks(&self, config: &ConfigManager) -> Result<u32> {
        match self.forks {
            Some(forks) => Ok(forks),
            None => Ok(config_value(config, "DEFAULT_FORKS")?.unwrap_or(DEFAULT_FORKS)),
        }
    }

    pub fn resolve_inventory(&self, config: &ConfigManager) -> Result<Option<Vec<String>>> {
        match &self.inventory {
            Some(sources) => Ok(Some(sources.clone())),
            None => Ok(config_value::<String>(config, "DEFAULT_INVENTORY")?.map(|s| vec![s])),
        }
    }

    pub fn resolve_play_context(&self, config: &ConfigManager) -> Result<PlayContext> {
        let become_user = match &self.become_user {
            Some(user) => user.clone(),
            None => config_value(config, "DEFAULT_BECOME_USER")?
                .unwrap_or_else(|| DEFAULT_BECOME_USER.to_string()),
        };
        Ok(PlayContext::new(self.check, self.use_become, &become_user))
    }

    pub fn resolve_connection_defaults(
        &self,
        config: &ConfigManager,
    ) -> Result<ConnectionDefaults> {
        let mut defaults = ConnectionDefaults::default();

        let connection = match &self.connection {
            Some(connection) => Some(connection.clone()),
            None => config_value::<String>(config, "DEFAULT_CONNECTION")?,
        };
        if let Some(connection) = connection {
            defaults.connection = connection.parse::<ConnectionType>()?;
        }

        defaults.remote_user = match &self.user {
            Some(user) => Some(user.clone()),
            None => config_value(config, "DEFAULT_REMOTE_USER")?,
        };
        defaults.remote_port = config_value(config, "DEFAULT_REMOTE_PORT")?;

        if let Some(checking) = config_value::<String>(config, "HOST_KEY_CHECKING")? {
            defaults.host_key_checking = checking.parse::<HostKeyChecking>()?;
        }
        if let Some(timeout) = config_value::<u64>(config, "CONNECT_TIMEOUT")? {
            defaults.connect_timeout = Duration::from_secs(timeout);
        }

        Ok(defaults)
    }
}
