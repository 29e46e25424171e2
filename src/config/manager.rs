use crate::constants::{CONFIG_FILE_NAME, ENV_PREFIX};
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use log::debug;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    Default,
    File(PathBuf),
    Environment(String),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Default => write!(f, "default"),
            ConfigOrigin::File(path) => write!(f, "{}", path.display()),
            ConfigOrigin::Environment(var) => write!(f, "env: {var}"),
        }
    }
}

pub struct ConfigManager {
    base_defs: IndexMap<String, Value>,
    origins: IndexMap<String, ConfigOrigin>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        ConfigManager {
            base_defs: IndexMap::new(),
            origins: IndexMap::new(),
        }
    }

    /// Loads defaults, then the config file (explicit or discovered), then
    /// environment overrides.
    pub fn init(&mut self, config_file: Option<&Path>) -> Result<()> {
        let config_map = self.read_config_yaml_file()?;
        for (key, value) in config_map {
            self.origins.insert(key.clone(), ConfigOrigin::Default);
            self.base_defs.insert(key, value);
        }

        match config_file {
            Some(path) => self.load_file(path)?,
            None => {
                if let Some(path) = discover_config_file() {
                    self.load_file(&path)?;
                }
            }
        }

        self.apply_env(std::env::vars());
        Ok(())
    }

    fn read_config_yaml_file(&self) -> Result<IndexMap<String, Value>> {
        let yaml_content = include_str!("base.yaml");
        parse_config_mapping(yaml_content)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        debug!("Loading config file {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config_map = parse_config_mapping(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        for (key, value) in config_map {
            self.origins
                .insert(key.clone(), ConfigOrigin::File(path.to_path_buf()));
            self.base_defs.insert(key, value);
        }

        Ok(())
    }

    /// Applies `CONVERGE_<KEY>` overrides for keys that are already defined.
    /// Values are parsed as YAML scalars, so `CONVERGE_DEFAULT_FORKS=10` is a number.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, raw) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            if !self.base_defs.contains_key(key) {
                continue;
            }

            let value = serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw.clone()));
            debug!("Config {key} overridden by {name}");
            self.origins
                .insert(key.to_string(), ConfigOrigin::Environment(name.clone()));
            self.base_defs.insert(key.to_string(), value);
        }
    }

    /// Returns the typed value and its origin, or `None` when the key is
    /// unknown or explicitly null.
    pub fn get_config_value<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(T, ConfigOrigin)>> {
        let Some(value) = self.base_defs.get(key) else {
            return Ok(None);
        };

        if value.is_null() {
            return Ok(None);
        }

        let typed: T = serde_yaml::from_value(value.clone())
            .with_context(|| format!("Invalid value for config key `{key}`"))?;
        let origin = self
            .origins
            .get(key)
            .cloned()
            .unwrap_or(ConfigOrigin::Default);

        Ok(Some((typed, origin)))
    }
}

fn parse_config_mapping(content: &str) -> Result<IndexMap<String, Value>> {
    let value: Value = serde_yaml::from_str(content)?;

    if value.is_null() {
        return Ok(IndexMap::new());
    }

    value
        .as_mapping()
        .cloned()
        .ok_or_else(|| anyhow!("YAML root is not a mapping"))?
        .into_iter()
        .map(|(key, value)| {
            let key_str = key
                .as_str()
                .ok_or_else(|| anyhow!("YAML key is not a string"))?
                .to_string();
            Ok((key_str, value))
        })
        .collect::<Result<IndexMap<String, Value>>>()
}

fn discover_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(format!("{ENV_PREFIX}CONFIG")) {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::home_dir()
        .map(|home| home.join(format!(".{CONFIG_FILE_NAME}")))
        .filter(|path| path.is_file())
}
