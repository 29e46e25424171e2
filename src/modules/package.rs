use super::{one_or_many, require_tool, Module, Presence, Step};
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;

/// Debian packages managed through apt.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    #[serde(deserialize_with = "one_or_many")]
    pub name: Vec<String>,
    #[serde(default)]
    pub state: Presence,
    #[serde(default)]
    pub update_cache: bool,
}

impl Package {
    fn installed(package: &str) -> Result<String> {
        Ok(format!(
            "dpkg-query -W -f='${{Status}}' {} 2>/dev/null | grep -q 'ok installed'",
            Sh::quote(package)?
        ))
    }

    fn quoted_names(&self) -> Result<String> {
        Ok(self
            .name
            .iter()
            .map(|n| Sh::quote(n))
            .collect::<Result<Vec<String>>>()?
            .join(" "))
    }
}

impl Module for Package {
    fn name(&self) -> &'static str {
        "package"
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("Module package requires at least one package name");
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let checks = self
            .name
            .iter()
            .map(|package| {
                let installed = Self::installed(package)?;
                Ok(match self.state {
                    Presence::Present => installed,
                    Presence::Absent => format!("! {{ {installed}; }}"),
                })
            })
            .collect::<Result<Vec<String>>>()?;

        Ok(Some(format!(
            "{}; {}",
            require_tool("dpkg-query"),
            Sh::and_all(&checks)
        )))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();

        if self.update_cache {
            steps.push(Step::mutation("apt-get update -q"));
        }

        let action = match self.state {
            Presence::Present => "install",
            Presence::Absent => "remove",
        };
        steps.push(Step::mutation(format!(
            "DEBIAN_FRONTEND=noninteractive apt-get {action} -y -q {}",
            self.quoted_names()?
        )));

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_lists_every_package() {
        let package: Package = serde_yaml::from_str("name: [nginx, curl]").unwrap();
        let probe = package.probe().unwrap().unwrap();

        assert!(probe.starts_with("command -v dpkg-query >/dev/null 2>&1 || exit 127; "));
        assert!(probe.contains("dpkg-query -W -f='${Status}' nginx 2>/dev/null"));
        assert!(probe.contains("dpkg-query -W -f='${Status}' curl 2>/dev/null"));
    }

    #[test]
    fn test_install_with_cache_update() {
        let package: Package =
            serde_yaml::from_str("name: nginx\nupdate_cache: true").unwrap();
        assert_eq!(
            package.steps().unwrap(),
            vec![
                Step::mutation("apt-get update -q"),
                Step::mutation("DEBIAN_FRONTEND=noninteractive apt-get install -y -q nginx"),
            ]
        );
    }

    #[test]
    fn test_absent() {
        let package: Package = serde_yaml::from_str("name: telnet\nstate: absent").unwrap();
        assert!(package.probe().unwrap().unwrap().contains("! { dpkg-query"));
        assert_eq!(
            package.steps().unwrap(),
            vec![Step::mutation(
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y -q telnet"
            )]
        );
    }

    #[test]
    fn test_requires_a_name() {
        let package: Package = serde_yaml::from_str("name: []").unwrap();
        assert!(package.validate().is_err());
    }
}
