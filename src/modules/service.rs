use super::{require_tool, Module, Step};
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Started,
    Stopped,
    Restarted,
    Reloaded,
}

/// A systemd unit.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub state: Option<ServiceState>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub daemon_reload: bool,
}

impl Module for Service {
    fn name(&self) -> &'static str {
        "service"
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("Module service requires a unit name");
        }
        if self.state.is_none() && self.enabled.is_none() && !self.daemon_reload {
            bail!("Module service needs one of state, enabled or daemon_reload");
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let unit = Sh::quote(&self.name)?;
        let mut checks = Vec::new();

        match self.state {
            // One-shot actions never hold beforehand.
            Some(ServiceState::Restarted) | Some(ServiceState::Reloaded) => return Ok(None),
            Some(ServiceState::Started) => {
                checks.push(format!("systemctl is-active --quiet {unit}"))
            }
            Some(ServiceState::Stopped) => {
                checks.push(format!("! systemctl is-active --quiet {unit}"))
            }
            None => {}
        }

        match self.enabled {
            Some(true) => checks.push(format!("systemctl is-enabled --quiet {unit}")),
            Some(false) => checks.push(format!("! systemctl is-enabled --quiet {unit}")),
            None => {}
        }

        if checks.is_empty() {
            return Ok(None);
        }

        Ok(Some(format!(
            "{}; {}",
            require_tool("systemctl"),
            Sh::and_all(&checks)
        )))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let unit = Sh::quote(&self.name)?;
        let mut steps = Vec::new();

        if self.daemon_reload {
            steps.push(Step::mutation("systemctl daemon-reload"));
        }

        match self.enabled {
            Some(true) => steps.push(Step::mutation(format!("systemctl enable {unit}"))),
            Some(false) => steps.push(Step::mutation(format!("systemctl disable {unit}"))),
            None => {}
        }

        let action = self.state.map(|state| match state {
            ServiceState::Started => "start",
            ServiceState::Stopped => "stop",
            ServiceState::Restarted => "restart",
            ServiceState::Reloaded => "reload",
        });
        if let Some(action) = action {
            steps.push(Step::mutation(format!("systemctl {action} {unit}")));
        }

        Ok(steps)
    }
}
