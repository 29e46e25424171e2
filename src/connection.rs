pub mod local;
pub mod ssh;

use crate::vars::{var_as_string, Vars};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub(crate) fn from_process(output: std::process::Output) -> Self {
        Self::new(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.code().unwrap_or(-1),
        )
    }
}

/// An open transport to one host. Commands run serially through `sh -c`.
#[async_trait]
pub trait Connection: Send + Sync {
    fn host(&self) -> &str;

    /// Executes a shell script on the target. A non-zero exit status is not an
    /// error; only transport failures are.
    async fn exec_command(&self, command: &str) -> Result<CommandOutput>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens connections; the seam used to swap transports in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn Connection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Ssh,
    Local,
}

impl FromStr for ConnectionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ssh" => Ok(ConnectionType::Ssh),
            "local" => Ok(ConnectionType::Local),
            _ => Err(anyhow::format_err!("Connection type {} not supported", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyChecking {
    Strict,
    Add,
    Accept,
}

impl FromStr for HostKeyChecking {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(HostKeyChecking::Strict),
            "add" => Ok(HostKeyChecking::Add),
            "accept" => Ok(HostKeyChecking::Accept),
            _ => Err(anyhow::format_err!(
                "Host key checking must be one of strict, add, accept; got {}",
                s
            )),
        }
    }
}

/// Run-wide connection settings, from config and command line.
#[derive(Debug, Clone)]
pub struct ConnectionDefaults {
    pub connection: ConnectionType,
    pub remote_user: Option<String>,
    pub remote_port: Option<u16>,
    pub host_key_checking: HostKeyChecking,
    pub connect_timeout: Duration,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            connection: ConnectionType::Ssh,
            remote_user: None,
            remote_port: None,
            host_key_checking: HostKeyChecking::Strict,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connection parameters of one host, resolved from its variables.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub address: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub connection: ConnectionType,
    pub host_key_checking: HostKeyChecking,
    pub connect_timeout: Duration,
}

impl ConnectionInfo {
    pub fn from_vars(host: &str, vars: &Vars, defaults: &ConnectionDefaults) -> Result<Self> {
        let connection = match var_as_string(vars, "connection") {
            Some(c) => c.parse()?,
            None => defaults.connection,
        };

        let port = match var_as_string(vars, "port") {
            Some(p) => Some(
                p.parse::<u16>()
                    .map_err(|_| anyhow!("Invalid port '{p}' for host {host}"))?,
            ),
            None => defaults.remote_port,
        };

        let address = var_as_string(vars, "address").unwrap_or_else(|| host.to_string());
        if address.is_empty() {
            bail!("Empty address for host {host}");
        }

        Ok(Self {
            host: host.to_string(),
            address,
            user: var_as_string(vars, "user").or_else(|| defaults.remote_user.clone()),
            port,
            identity_file: var_as_string(vars, "identity_file").map(PathBuf::from),
            connection,
            host_key_checking: defaults.host_key_checking,
            connect_timeout: defaults.connect_timeout,
        })
    }
}

/// Dispatches on the host's connection type.
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn Connection>> {
        match info.connection {
            ConnectionType::Ssh => Ok(Box::new(ssh::Ssh::connect(info).await?)),
            ConnectionType::Local => Ok(Box::new(local::Local::new(&info.host))),
        }
    }
}
