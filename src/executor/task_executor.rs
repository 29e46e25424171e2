use crate::connection::{CommandOutput, Connection};
use crate::error::TaskError;
use crate::executor::task_result::{TaskResult, TaskStatus};
use crate::modules::{build_module, Module, StepKind};
use crate::playbook::play_context::PlayContext;
use crate::playbook::task::Task;
use crate::shell::Sh;
use crate::template::Templar;
use crate::vars::Vars;
use anyhow::Result;
use log::{debug, info};

/// Exit statuses of `sh` for a command that is not executable / not found.
const PROBE_PRECONDITION_CODES: [i32; 2] = [126, 127];

/// Applies one task to one host over an open connection.
pub struct TaskExecutor<'a> {
    context: &'a PlayContext,
    templar: Templar,
}

impl<'a> TaskExecutor<'a> {
    pub fn new(context: &'a PlayContext) -> Self {
        Self {
            context,
            templar: Templar::new(),
        }
    }

    /// Never fails: every error ends up in the returned result.
    pub async fn run(
        &self,
        connection: &dyn Connection,
        task: &Task,
        task_vars: &Vars,
    ) -> TaskResult {
        let host = connection.host();
        debug!("executor run() - task '{}', host: {}", task.name(), host);

        let mut result = match self.load_module(task, task_vars) {
            Ok(module) => self.apply(connection, task, module.as_ref()).await,
            Err(e) => TaskResult::failed(
                host,
                task.name(),
                TaskError::precondition(format!("{e:#}")),
                None,
            ),
        };

        if task.is_best_effort() && result.status == TaskStatus::Failed {
            result.ignored = true;
        }

        result
    }

    fn load_module(&self, task: &Task, task_vars: &Vars) -> Result<Box<dyn Module>> {
        let action = task.action();
        let args = self.templar.render_value(&action.args, task_vars)?;
        build_module(&action.module, &args)
    }

    fn wrap(&self, task: &Task, command: &str) -> Result<String> {
        if !task.get_become().unwrap_or(self.context.use_become) {
            return Ok(command.to_string());
        }
        let user = task
            .get_become_user()
            .unwrap_or(self.context.become_user.as_str());
        Sh::wrap_become(command, user)
    }

    async fn apply(
        &self,
        connection: &dyn Connection,
        task: &Task,
        module: &dyn Module,
    ) -> TaskResult {
        let host = connection.host();

        match self.probe(connection, task, module).await {
            Err(error) => return TaskResult::failed(host, task.name(), error, None),
            Ok(Some(output)) => {
                debug!("{host}: '{}' already in desired state", task.name());
                return TaskResult::unchanged(host, task.name(), Some(output));
            }
            Ok(None) => {}
        }

        if self.context.check_mode {
            info!("{host}: '{}' would change, check mode", task.name());
            return TaskResult::changed(host, task.name(), None);
        }

        self.mutate(connection, task, module).await
    }

    /// `Some(output)` when the target state already holds.
    async fn probe(
        &self,
        connection: &dyn Connection,
        task: &Task,
        module: &dyn Module,
    ) -> Result<Option<CommandOutput>, TaskError> {
        let Some(probe) = module.probe().map_err(TaskError::precondition)? else {
            return Ok(None);
        };
        let command = self.wrap(task, &probe).map_err(TaskError::precondition)?;

        debug!("{}: probe `{}`", connection.host(), command);
        let output = connection
            .exec_command(&command)
            .await
            .map_err(|e| TaskError::precondition(format!("{e:#}")))?;

        match output.exit_code {
            0 => Ok(Some(output)),
            code if PROBE_PRECONDITION_CODES.contains(&code) => {
                Err(TaskError::precondition(format!(
                    "{} probe exited with {code}: {}",
                    module.name(),
                    output.stderr.trim()
                )))
            }
            _ => Ok(None),
        }
    }

    async fn mutate(
        &self,
        connection: &dyn Connection,
        task: &Task,
        module: &dyn Module,
    ) -> TaskResult {
        let host = connection.host();

        let steps = match module.steps() {
            Ok(steps) => steps,
            Err(e) => {
                return TaskResult::failed(host, task.name(), TaskError::precondition(e), None)
            }
        };

        let mut last_output = None;
        for step in steps {
            let command = match self.wrap(task, &step.command) {
                Ok(command) => command,
                Err(e) => {
                    return TaskResult::failed(host, task.name(), TaskError::precondition(e), None)
                }
            };

            debug!("{host}: run `{command}`");
            let output = match connection.exec_command(&command).await {
                Ok(output) => output,
                Err(e) => {
                    return TaskResult::failed(
                        host,
                        task.name(),
                        TaskError::connection(host, format!("{e:#}")),
                        last_output,
                    )
                }
            };

            if !output.success() {
                let exit_code = output.exit_code;
                let stderr = output.stderr.trim().to_string();
                let error = match step.kind {
                    StepKind::Mutation => TaskError::Mutation { exit_code, stderr },
                    StepKind::Validation => TaskError::Validation { exit_code, stderr },
                };
                return TaskResult::failed(host, task.name(), error, Some(output));
            }

            last_output = Some(output);
        }

        TaskResult::changed(host, task.name(), last_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::task::Action;
    use async_trait::async_trait;
    use serde_yaml::Value;
    use std::sync::Mutex;

    /// Answers each command with the exit code of the first matching rule.
    struct FakeConnection {
        rules: Vec<(&'static str, i32)>,
        log: Mutex<Vec<String>>,
    }

    impl FakeConnection {
        fn new(rules: Vec<(&'static str, i32)>) -> Self {
            Self {
                rules,
                log: Mutex::new(Vec::new()),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn host(&self) -> &str {
            "web1"
        }

        async fn exec_command(&self, command: &str) -> Result<CommandOutput> {
            self.log.lock().unwrap().push(command.to_string());
            let exit_code = self
                .rules
                .iter()
                .find(|(needle, _)| command.contains(needle))
                .map(|(_, code)| *code)
                .unwrap_or(0);
            Ok(CommandOutput::new(String::new(), format!("rc {exit_code}"), exit_code))
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn task(module: &str, args: &str) -> Task {
        Task::new(
            "test",
            &Action {
                module: module.to_string(),
                args: serde_yaml::from_str(args).unwrap(),
            },
        )
    }

    #[tokio::test]
    async fn test_satisfied_probe_skips_mutation() {
        let connection = FakeConnection::new(vec![]);
        let context = PlayContext::default();
        let task = task("command", "cmd: make install\ncreates: /usr/local/bin/app");

        let result = TaskExecutor::new(&context).run(&connection, &task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Unchanged);
        assert_eq!(connection.commands(), vec!["test -e /usr/local/bin/app"]);
    }

    #[tokio::test]
    async fn test_missing_probe_tool_is_a_precondition_failure() {
        let connection = FakeConnection::new(vec![("dpkg-query", 127)]);
        let context = PlayContext::default();
        let task = task("package", "name: nginx");

        let result = TaskExecutor::new(&context).run(&connection, &task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(matches!(result.error, Some(TaskError::Precondition { .. })));
        assert_eq!(connection.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_step_failure() {
        let connection = FakeConnection::new(vec![("sha256sum <", 1), ("visudo", 1)]);
        let context = PlayContext::default();
        let task = task(
            "copy",
            "dest: /etc/sudoers.d/deploy\ncontent: broken\nvalidate: visudo -cf %s",
        );

        let result = TaskExecutor::new(&context).run(&connection, &task, &Vars::new()).await;
        assert!(matches!(
            result.error,
            Some(TaskError::Validation { exit_code: 1, .. })
        ));
        assert!(!connection.commands().iter().any(|c| c.starts_with("mv -f")));
    }

    #[tokio::test]
    async fn test_check_mode_runs_probe_only() {
        let connection = FakeConnection::new(vec![("id -u", 1)]);
        let context = PlayContext::new(true, false, "root");
        let task = task("user", "name: deploy");

        let result = TaskExecutor::new(&context).run(&connection, &task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Changed);
        assert_eq!(connection.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_become_and_templates() {
        let connection = FakeConnection::new(vec![]);
        let context = PlayContext::new(false, true, "root");
        let task = task("command", "cmd: \"echo {{ greeting }}\"");

        let mut vars = Vars::new();
        vars.insert("greeting".to_string(), Value::from("hello"));

        let result = TaskExecutor::new(&context).run(&connection, &task, &vars).await;
        assert_eq!(result.status, TaskStatus::Changed);

        let words = shlex::split(&connection.commands()[0]).unwrap();
        assert_eq!(words[..5], ["sudo", "-n", "-H", "-u", "root"]);
        assert_eq!(words.last().unwrap(), "echo hello");
    }

    #[tokio::test]
    async fn test_task_become_overrides_play() {
        let connection = FakeConnection::new(vec![]);
        let context = PlayContext::default();
        let task = task("command", "cmd: psql -c 'select 1'")
            .use_become(true)
            .become_user("postgres");

        let result = TaskExecutor::new(&context).run(&connection, &task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Changed);

        let words = shlex::split(&connection.commands()[0]).unwrap();
        assert_eq!(words[..5], ["sudo", "-n", "-H", "-u", "postgres"]);
    }

    #[tokio::test]
    async fn test_templated_bool_argument() {
        let connection = FakeConnection::new(vec![("dpkg-query", 1)]);
        let context = PlayContext::default();
        let task = task("package", "name: \"{{ packages[0] }}\"\nupdate_cache: \"{{ refresh }}\"");

        let mut vars = Vars::new();
        vars.insert("refresh".to_string(), Value::Bool(true));
        vars.insert("packages".to_string(), serde_yaml::from_str("[nginx]").unwrap());

        let result = TaskExecutor::new(&context).run(&connection, &task, &vars).await;
        assert_eq!(result.status, TaskStatus::Changed);

        let commands = connection.commands();
        assert!(commands.iter().any(|c| c.contains("apt-get update -q")));
        assert!(commands.iter().any(|c| c.ends_with("install -y -q nginx")));
    }

    #[tokio::test]
    async fn test_render_error_fails_task_and_best_effort_marks_ignored() {
        let connection = FakeConnection::new(vec![]);
        let context = PlayContext::default();
        let task = task("command", "cmd: \"echo {{ missing }}\"").ignore_errors(true);

        let result = TaskExecutor::new(&context).run(&connection, &task, &Vars::new()).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.ignored);
        assert!(matches!(result.error, Some(TaskError::Precondition { .. })));
        assert!(connection.commands().is_empty());
    }
}
