use super::{require_tool, Module, Presence, Step};
use crate::constants::STAGING_SUFFIX;
use crate::shell::Sh;
use anyhow::{bail, Result};
use serde::Deserialize;

/// One public key line in `~user/.ssh/authorized_keys`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizedKey {
    pub user: String,
    pub key: String,
    #[serde(default)]
    pub state: Presence,
}

impl AuthorizedKey {
    /// Sets `H` to the user's home and `F` to the key file, exiting 126 if
    /// the user does not exist.
    fn locate(&self) -> Result<String> {
        let user = Sh::quote(&self.user)?;
        Ok(format!(
            "H=\"$(getent passwd {user} | cut -d: -f6)\"; \
             [ -n \"$H\" ] || {{ echo 'no such user: {}' >&2; exit 126; }}; \
             F=\"$H/.ssh/authorized_keys\"",
            self.user.replace('\'', "")
        ))
    }

    fn key(&self) -> Result<String> {
        Sh::quote(self.key.trim())
    }
}

impl Module for AuthorizedKey {
    fn name(&self) -> &'static str {
        "authorized_key"
    }

    fn validate(&self) -> Result<()> {
        if self.user.is_empty() {
            bail!("Module authorized_key requires a user");
        }
        let key = self.key.trim();
        if key.is_empty() || key.contains('\n') {
            bail!("Module authorized_key expects exactly one key line");
        }
        Ok(())
    }

    fn probe(&self) -> Result<Option<String>> {
        let found = format!("grep -qxF {} \"$F\" 2>/dev/null", self.key()?);
        let check = match self.state {
            Presence::Present => found,
            Presence::Absent => format!("! {found}"),
        };

        Ok(Some(format!(
            "{}; {}; {check}",
            require_tool("getent"),
            self.locate()?
        )))
    }

    fn steps(&self) -> Result<Vec<Step>> {
        let user = Sh::quote(&self.user)?;
        let key = self.key()?;
        let locate = self.locate()?;

        let script = match self.state {
            Presence::Present => {
                let commands = [
                    format!("install -d -m 700 -o {user} -g \"$(id -gn {user})\" \"$H/.ssh\""),
                    "touch \"$F\"".to_string(),
                    "{ [ ! -s \"$F\" ] || [ -z \"$(tail -c1 \"$F\")\" ] || echo >> \"$F\"; }"
                        .to_string(),
                    format!("printf '%s\\n' {key} >> \"$F\""),
                    "chmod 600 \"$F\"".to_string(),
                    format!("chown {user}:\"$(id -gn {user})\" \"$F\""),
                ];
                format!("{locate}; {}", Sh::and_all(&commands))
            }
            Presence::Absent => {
                let staged = format!("\"$F{STAGING_SUFFIX}\"");
                format!(
                    "{locate}; [ -f \"$F\" ] || exit 0; \
                     grep -vxF {key} \"$F\" > {staged}; \
                     cat {staged} > \"$F\" && rm -f {staged}"
                )
            }
        };

        Ok(vec![Step::mutation(script)])
    }
}
