use super::{attribute_checks, attribute_commands, require_tool, Mode, Module, Step};
use crate::constants::STAGING_SUFFIX;
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Writes inline `content` to `dest` through a staged file, so a failed
/// validation never touches the destination.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Copy {
    pub dest: String,
    pub content: String,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// Command run against the staged file; `%s` is replaced by its path.
    #[serde(default)]
    pub validate: Option<String>,
}

impl Copy {
    fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(self.content.as_bytes()))
    }

    fn staged(&self) -> String {
        format!("{}{STAGING_SUFFIX}", self.dest)
    }
}

impl Module for Copy {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn validate(&self) -> Result<()> {
        if self.dest.is_empty() || self.dest.ends_with('/') {
            bail!("Module copy requires a file path as dest, got '{}'", self.dest);
        }
        if let Some(validate) = &self.validate {
            if !validate.contains("%s") {
                bail!("Module copy validate command must contain %s");
            }
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let dest = Sh::quote(&self.dest)?;

        let mut checks = vec![
            format!("test -f {dest}"),
            format!(
                "[ \"$(sha256sum < {dest} | cut -d' ' -f1)\" = {} ]",
                self.checksum()
            ),
        ];
        checks.extend(attribute_checks(
            &self.dest,
            self.mode.as_ref(),
            self.owner.as_deref(),
            self.group.as_deref(),
        )?);

        Ok(Some(format!(
            "{}; {}",
            require_tool("sha256sum"),
            Sh::and_all(&checks)
        )))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let staged_path = self.staged();
        let staged = Sh::quote(&staged_path)?;

        let mut steps = vec![Step::mutation(format!(
            "printf '%s' {} > {staged}",
            Sh::quote(&self.content)?
        ))];

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

        if let Some(validate) = &self.validate {
            steps.push(Step::validation(format!(
                "{} || {{ rc=$?; rm -f {staged}; exit $rc; }}",
                validate.replace("%s", &staged)
            )));
        }

        steps.push(Step::mutation(format!(
            "mv -f {staged} {}",
            Sh::quote(&self.dest)?
        )));

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::StepKind;

    #[test]
    fn test_probe_compares_checksum() {
        let copy: Copy = serde_yaml::from_str("dest: /etc/motd\ncontent: hello").unwrap();
        let probe = copy.probe().unwrap().unwrap();

        // sha256("hello")
        assert!(probe.contains(
            "= 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824 ]"
        ));
        assert!(probe.starts_with("command -v sha256sum"));
    }

    #[test]
    fn test_steps_stage_validate_then_move() {
        let copy: Copy = serde_yaml::from_str(
            r#"
            dest: /etc/sudoers.d/deploy
            content: "deploy ALL=(ALL) NOPASSWD: ALL\n"
            mode: "0440"
            validate: visudo -cf %s
            "#,
        )
        .unwrap();
        copy.validate().unwrap();

        let steps = copy.steps().unwrap();
        let kinds: Vec<StepKind> = steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Mutation,
                StepKind::Mutation,
                StepKind::Validation,
                StepKind::Mutation
            ]
        );
        assert_eq!(steps[1].command, "chmod 440 /etc/sudoers.d/deploy.converge-tmp");
        assert!(steps[2]
            .command
            .starts_with("visudo -cf /etc/sudoers.d/deploy.converge-tmp || "));
        assert_eq!(
            steps[3].command,
            "mv -f /etc/sudoers.d/deploy.converge-tmp /etc/sudoers.d/deploy"
        );
    }

    #[test]
    fn test_validate_needs_placeholder() {
        let copy: Copy =
            serde_yaml::from_str("dest: /etc/motd\ncontent: hi\nvalidate: 'true'").unwrap();
        assert!(copy.validate().is_err());
    }
}
