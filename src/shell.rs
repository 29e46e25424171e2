use anyhow::Result;
use shlex::Quoter;

/// POSIX `sh` command construction.
pub struct Sh;

impl Sh {
    pub fn quote(value: &str) -> Result<String> {
        let quoted = Quoter::new().allow_nul(false).quote(value)?;
        Ok(quoted.into_owned())
    }

    pub fn shell_and() -> &'static str {
        " && "
    }

    /// Joins commands so the first failing one stops the chain.
    pub fn and_all<S: AsRef<str>>(commands: &[S]) -> String {
        commands
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<&str>>()
            .join(Self::shell_and())
    }

    /// Runs `command` through `sudo` as `user`, non-interactively.
    pub fn wrap_become(command: &str, user: &str) -> Result<String> {
        Ok(format!(
            "sudo -n -H -u {} sh -c {}",
            Self::quote(user)?,
            Self::quote(command)?
        ))
    }

    /// `test -e` for a path, negated when `negate` is set.
    pub fn path_exists(path: &str, negate: bool) -> Result<String> {
        let check = format!("test -e {}", Self::quote(path)?);
        Ok(if negate { format!("! {check}") } else { check })
    }
}
