use crate::constants::DEFAULT_BECOME_USER;

/// Run-wide execution settings a play hands down to its tasks, where a
/// task may override privilege escalation.
#[derive(Clone, Debug)]
pub struct PlayContext {
    pub check_mode: bool,
    pub use_become: bool,
    pub become_user: String,
}

impl Default for PlayContext {
    fn default() -> Self {
        PlayContext {
            check_mode: false,
            use_become: false,
            become_user: DEFAULT_BECOME_USER.to_string(),
        }
    }
}

impl PlayContext {
    pub fn new(check_mode: bool, use_become: bool, become_user: &str) -> Self {
        PlayContext {
            check_mode,
            use_become,
            become_user: become_user.to_string(),
        }
    }

    /// Narrows the run-wide context to one play.
    pub fn for_play(&self, use_become: Option<bool>, become_user: Option<&str>) -> Self {
        PlayContext {
            check_mode: self.check_mode,
            use_become: use_become.unwrap_or(self.use_become),
            become_user: become_user
                .map(String::from)
                .unwrap_or_else(|| self.become_user.clone()),
        }
    }
}
