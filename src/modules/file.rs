use super::{attribute_checks, attribute_commands, Mode, Module, Step};
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// The file must already exist; only attributes are managed.
    #[default]
    File,
    Directory,
    /// Create an empty file if missing.
    Touch,
    Absent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub path: String,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

impl File {
    fn attribute_checks(&self) -> Result<Vec<String>> {
        attribute_checks(
            &self.path,
            self.mode.as_ref(),
            self.owner.as_deref(),
            self.group.as_deref(),
        )
    }

    fn attribute_commands(&self) -> Result<Vec<String>> {
        attribute_commands(
            &self.path,
            self.mode.as_ref(),
            self.owner.as_deref(),
            self.group.as_deref(),
        )
    }
}

impl Module for File {
    fn name(&self) -> &'static str {
        "file"
    }

    fn validate(&self) -> Result<()> {
        if self.path.is_empty() || self.path == "/" {
            bail!("Module file refuses to manage path '{}'", self.path);
        }
        if self.state == FileState::Absent
            && (self.mode.is_some() || self.owner.is_some() || self.group.is_some())
        {
            bail!("Module file cannot set attributes on an absent path");
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let path = Sh::quote(&self.path)?;

        let mut checks = match self.state {
            FileState::Absent => {
                return Ok(Some(format!("[ ! -e {path} ] && [ ! -L {path} ]")));
            }
            FileState::Directory => vec![format!("test -d {path}")],
            FileState::File | FileState::Touch => vec![format!("test -f {path}")],
        };
        checks.extend(self.attribute_checks()?);

        Ok(Some(Sh::and_all(&checks)))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let path = Sh::quote(&self.path)?;

        let mut commands = match self.state {
            FileState::Absent => return Ok(vec![Step::mutation(format!("rm -rf {path}"))]),
            FileState::Directory => vec![format!("mkdir -p {path}")],
            FileState::Touch => vec![format!("test -e {path} || touch {path}")],
            FileState::File => vec![format!("test -f {path}")],
        };
        commands.extend(self.attribute_commands()?);

        Ok(commands.into_iter().map(Step::mutation).collect())
    }
}
