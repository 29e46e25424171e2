use anyhow::{bail, Context, Result};
use log::debug;
use play::Play;
use serde_yaml::Value;
use std::path::Path;

pub mod play;
pub mod play_context;
pub mod task;

pub struct Playbook {
    file_name: String,
    plays: Vec<Play>,
}

impl Playbook {
    pub fn new(file_name: String, plays: &[Play]) -> Self {
        Playbook {
            file_name,
            plays: plays.to_vec(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read playbook {}", path.display()))?;
        Self::parse(&path.to_string_lossy(), &content)
            .with_context(|| format!("Failed to load playbook {}", path.display()))
    }

    /// Parses a YAML list of plays. Module names and non-templated
    /// arguments are validated here, before any host is contacted.
    pub fn parse(file_name: &str, content: &str) -> Result<Self> {
        let data: Value = serde_yaml::from_str(content)?;

        let entries = match data {
            Value::Sequence(entries) => entries,
            Value::Null => Vec::new(),
            _ => bail!("A playbook must be a list of plays"),
        };

        let plays = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                Play::from_value(entry).with_context(|| format!("Invalid play #{}", index + 1))
            })
            .collect::<Result<Vec<Play>>>()?;

        debug!("loaded {} plays from {}", plays.len(), file_name);
        Ok(Playbook::new(file_name.to_string(), &plays))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn plays(&self) -> &[Play] {
        &self.plays
    }
}
