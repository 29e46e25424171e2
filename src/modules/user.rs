use super::{one_or_many, require_tool, Module, Presence, Step};
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;

/// A local account. Supplementary groups are added to the existing ones
/// unless `append` is false, in which case they replace them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub state: Presence,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub groups: Vec<String>,
    #[serde(default = "default_append")]
    pub append: bool,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub system: bool,
    /// With `state: absent`, also delete the home directory.
    #[serde(default)]
    pub remove: bool,
}

fn default_append() -> bool {
    true
}

impl User {
    fn passwd_field(&self, field: u8) -> Result<String> {
        Ok(format!(
            "\"$(getent passwd {} | cut -d: -f{field})\"",
            Sh::quote(&self.name)?
        ))
    }
}

impl Module for User {
    fn name(&self) -> &'static str {
        "user"
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(|c: char| c.is_whitespace() || c == ':') {
            bail!("Invalid user name '{}'", self.name);
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let name = Sh::quote(&self.name)?;
        let exists = format!("id -u {name} >/dev/null 2>&1");

        let mut checks = vec![require_tool("getent")];

        match self.state {
            Presence::Absent => checks.push(format!("! {exists}")),
            Presence::Present => {
                let mut conditions = vec![exists];
                if let Some(shell) = &self.shell {
                    conditions.push(format!(
                        "[ {} = {} ]",
                        self.passwd_field(7)?,
                        Sh::quote(shell)?
                    ));
                }
                if let Some(home) = &self.home {
                    conditions.push(format!(
                        "[ {} = {} ]",
                        self.passwd_field(6)?,
                        Sh::quote(home)?
                    ));
                }
                if self.append {
                    for group in &self.groups {
                        conditions.push(format!(
                            "id -nG {name} | tr ' ' '\\n' | grep -qx {}",
                            Sh::quote(group)?
                        ));
                    }
                } else {
                    let mut wanted = self.groups.clone();
                    wanted.sort();
                    wanted.dedup();
                    conditions.push(format!(
                        "[ \"$(id -nG {name} | tr ' ' '\\n' | grep -vx \"$(id -gn {name})\" | sort -u | paste -sd, -)\" = {} ]",
                        Sh::quote(&wanted.join(","))?
                    ));
                }
                checks.push(Sh::and_all(&conditions));
            }
        }

        Ok(Some(checks.join("; ")))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let name = Sh::quote(&self.name)?;

        if self.state == Presence::Absent {
            let flags = if self.remove { "-r " } else { "" };
            return Ok(vec![Step::mutation(format!("userdel {flags}{name}"))]);
        }

        let mut shared = Vec::new();
        if let Some(shell) = &self.shell {
            shared.push(format!("-s {}", Sh::quote(shell)?));
        }
        if let Some(home) = &self.home {
            shared.push(format!("-d {}", Sh::quote(home)?));
        }
        let groups = if self.groups.is_empty() && self.append {
            None
        } else {
            Some(Sh::quote(&self.groups.join(","))?)
        };

        let mut create = vec!["useradd".to_string(), "-m".to_string()];
        if self.system {
            create.push("-r".to_string());
        }
        create.extend(shared.iter().cloned());
        if let Some(groups) = groups.as_ref().filter(|_| !self.groups.is_empty()) {
            create.push(format!("-G {groups}"));
        }
        create.push(name.clone());

        let mut modify = shared;
        if let Some(groups) = &groups {
            let flag = if self.append { "-a -G" } else { "-G" };
            modify.push(format!("{flag} {groups}"));
        }
        let modify = if modify.is_empty() {
            "true".to_string()
        } else {
            format!("usermod {} {name}", modify.join(" "))
        };

        Ok(vec![Step::mutation(format!(
            "if id -u {name} >/dev/null 2>&1; then {modify}; else {}; fi",
            create.join(" ")
        ))])
    }
}
