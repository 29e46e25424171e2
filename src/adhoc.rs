use crate::playbook::play::Play;
use crate::playbook::task::Task;
use crate::playbook::Playbook;
use anyhow::Result;
use log::info;

pub struct AdHoc;

impl AdHoc {
    /// Wraps a single `-m`/`-a` task into a one-play playbook.
    pub fn playbook(
        module_name: &str,
        module_args: Option<&str>,
        pattern: &str,
    ) -> Result<Playbook> {
        info!(
            "Running adhoc module {} with args {}",
            module_name,
            module_args.unwrap_or("")
        );

        let task = Task::adhoc(module_name, module_args)?;
        let play = Play::builder("Converge Ad-Hoc", pattern, &[task]).build();

        Ok(Playbook::new(String::from("__adhoc_playbook__"), &[play]))
    }
}
