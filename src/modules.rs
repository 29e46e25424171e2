pub mod authorized_key;
pub mod command;
pub mod copy;
pub mod file;
pub mod get_url;
pub mod package;
pub mod service;
pub mod user;

use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::fmt::Debug;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Changes the target; a failure is a mutation failure.
    Mutation,
    /// Checks a staged change before it is committed; a failure is a validation failure.
    Validation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub kind: StepKind,
    pub command: String,
}

impl Step {
    pub fn mutation(command: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Mutation,
            command: command.into(),
        }
    }

    pub fn validation(command: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Validation,
            command: command.into(),
        }
    }
}

/// A declarative task kind: a target state with a way to detect it and a
/// way to reach it.
pub trait Module: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Rejects argument combinations that can never work.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Shell command whose exit status 0 means the target state already
    /// holds. `None` means the state cannot be detected and the task always runs.
    fn probe(&self) -> Result<Option<String>>;

    /// Commands that bring the target into the desired state, run in order.
    fn steps(&self) -> Result<Vec<Step>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    Command,
    User,
    Package,
    File,
    Copy,
    GetUrl,
    Service,
    AuthorizedKey,
}

impl FromStr for ModuleType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "command" | "shell" => Ok(ModuleType::Command),
            "user" => Ok(ModuleType::User),
            "package" | "apt" => Ok(ModuleType::Package),
            "file" => Ok(ModuleType::File),
            "copy" => Ok(ModuleType::Copy),
            "get_url" => Ok(ModuleType::GetUrl),
            "service" | "systemd" => Ok(ModuleType::Service),
            "authorized_key" => Ok(ModuleType::AuthorizedKey),
            _ => Err(anyhow::format_err!("Module {} not supported", s)),
        }
    }
}

/// Builds a module from its name and (already rendered) arguments.
pub fn build_module(name: &str, args: &Value) -> Result<Box<dyn Module>> {
    let module_type: ModuleType = name.parse()?;

    let module: Box<dyn Module> = match module_type {
        ModuleType::Command => Box::new(command::Command::from_args(args)?),
        ModuleType::User => Box::new(parse_args::<user::User>(name, args)?),
        ModuleType::Package => Box::new(parse_args::<package::Package>(name, args)?),
        ModuleType::File => Box::new(parse_args::<file::File>(name, args)?),
        ModuleType::Copy => Box::new(parse_args::<copy::Copy>(name, args)?),
        ModuleType::GetUrl => Box::new(parse_args::<get_url::GetUrl>(name, args)?),
        ModuleType::Service => Box::new(parse_args::<service::Service>(name, args)?),
        ModuleType::AuthorizedKey => {
            Box::new(parse_args::<authorized_key::AuthorizedKey>(name, args)?)
        }
    };

    module.validate()?;
    Ok(module)
}

fn parse_args<T: serde::de::DeserializeOwned>(name: &str, args: &Value) -> Result<T> {
    if !args.is_mapping() {
        bail!("Module {name} expects a mapping of arguments");
    }
    serde_yaml::from_value(args.clone())
        .map_err(|e| anyhow::format_err!("Invalid arguments for module {name}: {e}"))
}

/// `present` / `absent`, shared by modules that only toggle existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

/// An octal file mode such as `0644`, stored the way `stat -c %a` prints it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode(String);

impl Mode {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let digits = raw.strip_prefix("0o").unwrap_or(raw);

        if digits.is_empty()
            || digits.len() > 5
            || !digits.chars().all(|c| ('0'..='7').contains(&c))
        {
            bail!("Invalid file mode '{raw}', expected octal digits such as 0644");
        }

        let trimmed = digits.trim_start_matches('0');
        Ok(Mode(if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let raw = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => return Err(serde::de::Error::custom("file mode must be a string or number")),
        };
        Mode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Accepts either a single string or a list of strings.
pub(crate) fn one_or_many<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        OneOrMany::Many(v) => v,
    })
}

/// Probe prefix turning a missing tool into a precondition failure (exit 127).
pub(crate) fn require_tool(tool: &str) -> String {
    format!("command -v {tool} >/dev/null 2>&1 || exit 127")
}

/// Probe fragments for mode and ownership of `path`.
pub(crate) fn attribute_checks(
    path: &str,
    mode: Option<&Mode>,
    owner: Option<&str>,
    group: Option<&str>,
) -> Result<Vec<String>> {
    let quoted = Sh::quote(path)?;
    let mut checks = Vec::new();

    if let Some(mode) = mode {
        checks.push(format!(
            "[ \"$(stat -c %a {quoted})\" = {} ]",
            Sh::quote(mode.as_str())?
        ));
    }
    if let Some(owner) = owner {
        checks.push(format!("[ \"$(stat -c %U {quoted})\" = {} ]", Sh::quote(owner)?));
    }
    if let Some(group) = group {
        checks.push(format!("[ \"$(stat -c %G {quoted})\" = {} ]", Sh::quote(group)?));
    }

    Ok(checks)
}

/// `chmod` / `chown` commands applying mode and ownership to `path`.
pub(crate) fn attribute_commands(
    path: &str,
    mode: Option<&Mode>,
    owner: Option<&str>,
    group: Option<&str>,
) -> Result<Vec<String>> {
    let quoted = Sh::quote(path)?;
    let mut commands = Vec::new();

    if let Some(mode) = mode {
        commands.push(format!("chmod {} {quoted}", mode.as_str()));
    }

    let ownership = match (owner, group) {
        (Some(owner), Some(group)) => Some(format!("{owner}:{group}")),
        (Some(owner), None) => Some(owner.to_string()),
        (None, Some(group)) => Some(format!(":{group}")),
        (None, None) => None,
    };
    if let Some(ownership) = ownership {
        commands.push(format!("chown {} {quoted}", Sh::quote(&ownership)?));
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("command", ModuleType::Command)]
    #[case("shell", ModuleType::Command)]
    #[case("apt", ModuleType::Package)]
    #[case("systemd", ModuleType::Service)]
    #[case("get_url", ModuleType::GetUrl)]
    fn test_module_type_aliases(#[case] name: &str, #[case] expected: ModuleType) {
        assert_eq!(name.parse::<ModuleType>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_module() {
        let err = build_module("lineinfile", &Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "Module lineinfile not supported");
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        let args: Value = serde_yaml::from_str("name: deploy\ncolour: blue").unwrap();
        let err = build_module("user", &args).unwrap_err();
        assert!(err.to_string().contains("Invalid arguments for module user"));
    }

    #[test]
    fn test_non_mapping_arguments_are_rejected() {
        assert!(build_module("package", &Value::from("nginx")).is_err());
    }

    #[rstest]
    #[case("0644", "644")]
    #[case("644", "644")]
    #[case("0o440", "440")]
    #[case("4755", "4755")]
    #[case("0000", "0")]
    fn test_mode_parse(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Mode::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("rw-r--r--")]
    #[case("0999")]
    #[case("")]
    fn test_mode_parse_invalid(#[case] raw: &str) {
        assert!(Mode::parse(raw).is_err());
    }

    #[test]
    fn test_mode_from_yaml_number() {
        let mode: Mode = serde_yaml::from_str("644").unwrap();
        assert_eq!(mode.as_str(), "644");
    }

    #[test]
    fn test_attribute_commands() {
        let mode = Mode::parse("0440").unwrap();
        let commands =
            attribute_commands("/etc/sudoers.d/deploy", Some(&mode), Some("root"), Some("root"))
                .unwrap();
        assert_eq!(commands[0], "chmod 440 /etc/sudoers.d/deploy");
        assert_eq!(
            shlex::split(&commands[1]).unwrap(),
            vec!["chown", "root:root", "/etc/sudoers.d/deploy"]
        );

        assert!(attribute_commands("/tmp/x", None, None, None).unwrap().is_empty());
    }
}
