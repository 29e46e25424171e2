use super::{attribute_checks, attribute_commands, require_tool, Mode, Module, Step};
use crate::constants::STAGING_SUFFIX;
use crate::shell::Sh;
use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static CHECKSUM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sha256:([0-9a-fA-F]{64})$").expect("checksum regex is valid"));

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetUrl {
    pub url: String,
    pub dest: String,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// `sha256:<hex>`
    #[serde(default)]
    pub checksum: Option<String>,
}

impl GetUrl {
    fn digest(&self) -> Option<String> {
        self.checksum
            .as_deref()
            .and_then(|c| CHECKSUM_REGEX.captures(c))
            .map(|caps| caps[1].to_lowercase())
    }

    fn checksum_matches(path: &str, digest: &str) -> String {
        format!("[ \"$(sha256sum < {path} | cut -d' ' -f1)\" = {digest} ]")
    }
}

impl Module for GetUrl {
    fn name(&self) -> &'static str {
        "get_url"
    }

    fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://")
            || self.url.starts_with("https://")
            || self.url.starts_with("ftp://"))
        {
            bail!("Module get_url only supports http, https and ftp urls, got '{}'", self.url);
        }
        if self.dest.is_empty() || self.dest.ends_with('/') {
            bail!("Module get_url requires a file path as dest, got '{}'", self.dest);
        }
        if self.checksum.is_some() && self.digest().is_none() {
            bail!("Module get_url checksum must look like sha256:<64 hex digits>");
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let dest = Sh::quote(&self.dest)?;
        let mut checks = vec![format!("test -f {dest}")];

        if let Some(digest) = self.digest() {
            checks.push(Self::checksum_matches(&dest, &digest));
        }
        checks.extend(attribute_checks(
            &self.dest,
            self.mode.as_ref(),
            self.owner.as_deref(),
            self.group.as_deref(),
        )?);

        let probe = Sh::and_all(&checks);
        Ok(Some(match self.digest() {
            Some(_) => format!("{}; {probe}", require_tool("sha256sum")),
            None => probe,
        }))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let staged_path = format!("{}{STAGING_SUFFIX}", self.dest);
        let staged = Sh::quote(&staged_path)?;

        let mut steps = vec![Step::mutation(format!(
            "{}; curl -fsSL -o {staged} {}",
            require_tool("curl"),
            Sh::quote(&self.url)?
        ))];

        if let Some(digest) = self.digest() {
            steps.push(Step::validation(format!(
                "{} || {{ rm -f {staged}; echo 'checksum mismatch' >&2; exit 1; }}",
                Self::checksum_matches(&staged, &digest)
            )));
        }

        steps.extend(
            attribute_commands(
                &staged_path,
                self.mode.as_ref(),
                self.owner.as_deref(),
                self.group.as_deref(),
            )?
            .into_iter()
            .map(Step::mutation),
        );

        steps.push(Step::mutation(format!(
            "mv -f {staged} {}",
            Sh::quote(&self.dest)?
        )));

        Ok(steps)
    }
}
