use super::{CommandOutput, Connection};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

/// Runs commands on the control machine.
pub struct Local {
    host: String,
}

impl Local {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
        }
    }
}

#[async_trait]
impl Connection for Local {
    fn host(&self) -> &str {
        &self.host
    }

    async fn exec_command(&self, command: &str) -> Result<CommandOutput> {
        debug!("[{}] local exec: {}", self.host, command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .context("Failed to spawn sh")?;

        Ok(CommandOutput::from_process(output))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
