use super::{CommandOutput, Connection, ConnectionInfo, HostKeyChecking};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use openssh::{KnownHosts, Session, SessionBuilder};

/// OpenSSH transport over a multiplexed master connection.
pub struct Ssh {
    host: String,
    session: Session,
}

impl Ssh {
    pub async fn connect(info: &ConnectionInfo) -> Result<Self> {
        let mut builder = SessionBuilder::default();
        builder
            .known_hosts_check(known_hosts(info.host_key_checking))
            .connect_timeout(info.connect_timeout);

        if let Some(user) = &info.user {
            builder.user(user.clone());
        }
        if let Some(port) = info.port {
            builder.port(port);
        }
        if let Some(identity_file) = &info.identity_file {
            builder.keyfile(identity_file);
        }

        debug!(
            "Opening ssh session to {} ({}) as {}",
            info.host,
            info.address,
            info.user.as_deref().unwrap_or("<default>")
        );

        let session = builder
            .connect_mux(&info.address)
            .await
            .with_context(|| format!("Failed to connect to {}.", info.address))?;

        Ok(Self {
            host: info.host.clone(),
            session,
        })
    }
}

fn known_hosts(checking: HostKeyChecking) -> KnownHosts {
    match checking {
        HostKeyChecking::Strict => KnownHosts::Strict,
        HostKeyChecking::Add => KnownHosts::Add,
        HostKeyChecking::Accept => KnownHosts::Accept,
    }
}

#[async_trait]
impl Connection for Ssh {
    fn host(&self) -> &str {
        &self.host
    }

    async fn exec_command(&self, command: &str) -> Result<CommandOutput> {
        debug!("[{}] ssh exec: {}", self.host, command);
        let output = self
            .session
            .command("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .with_context(|| format!("Failed to run command on {}", self.host))?;

        Ok(CommandOutput::from_process(output))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!("Closing ssh session to {}", self.host);
        self.session.close().await?;
        Ok(())
    }
}
