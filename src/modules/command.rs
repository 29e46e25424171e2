use super::{Module, Step};
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;
use serde_yaml::Value;

/// Runs an arbitrary command. Only idempotent when guarded by `creates` or `removes`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub cmd: String,
    /// Skip when this path exists.
    #[serde(default)]
    pub creates: Option<String>,
    /// Skip when this path does not exist.
    #[serde(default)]
    pub removes: Option<String>,
    #[serde(default)]
    pub chdir: Option<String>,
}

impl Command {
    /// Accepts the free-form `command: uptime` shorthand as well as a mapping.
    pub fn from_args(args: &Value) -> Result<Self> {
        match args {
            Value::String(cmd) => Ok(Command {
                cmd: cmd.clone(),
                creates: None,
                removes: None,
                chdir: None,
            }),
            Value::Mapping(_) => serde_yaml::from_value(args.clone())
                .map_err(|e| anyhow::format_err!("Invalid arguments for module command: {e}")),
            _ => bail!("Module command expects a command string or a mapping of arguments"),
        }
    }
}

impl Module for Command {
    fn name(&self) -> &'static str {
        "command"
    }

    fn validate(&self) -> Result<()> {
        if self.cmd.trim().is_empty() {
            bail!("Module command requires a non-empty cmd");
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let mut guards = Vec::new();
        if let Some(creates) = &self.creates {
            guards.push(Sh::path_exists(creates, false)?);
        }
        if let Some(removes) = &self.removes {
            guards.push(Sh::path_exists(removes, true)?);
        }

        if guards.is_empty() {
            return Ok(None);
        }
        Ok(Some(guards.join(" || ")))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let command = match &self.chdir {
            Some(dir) => format!("cd {} && {}", Sh::quote(dir)?, self.cmd),
            None => self.cmd.clone(),
        };
        Ok(vec![Step::mutation(command)])
    }
}
