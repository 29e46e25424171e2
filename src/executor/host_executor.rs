use crate::callback::{CallbackManager, EventType};
use crate::connection::{ConnectionDefaults, ConnectionInfo, Connector};
use crate::error::TaskError;
use crate::executor::task_executor::TaskExecutor;
use crate::executor::task_result::TaskResult;
use crate::playbook::play_context::PlayContext;
use crate::playbook::task::Task;
use crate::vars::Vars;
use log::{debug, info, warn};
use serde_json::json;
use std::sync::Arc;

/// Everything that happened to one host during one play.
#[derive(Debug)]
pub struct HostOutcome {
    pub host: String,
    pub results: Vec<TaskResult>,
    /// Set when the connection could not be opened.
    pub unreachable: Option<TaskError>,
}

impl HostOutcome {
    pub fn has_failed(&self) -> bool {
        self.results.iter().any(TaskResult::is_failed)
    }
}

/// Runs a play's tasks, in order, on one host over a single connection.
pub struct HostExecutor {
    host: String,
    vars: Vars,
    defaults: ConnectionDefaults,
    context: PlayContext,
    callbacks: Arc<CallbackManager>,
}

impl HostExecutor {
    pub fn new(
        host: &str,
        vars: Vars,
        defaults: ConnectionDefaults,
        context: PlayContext,
        callbacks: Arc<CallbackManager>,
    ) -> Self {
        Self {
            host: host.to_string(),
            vars,
            defaults,
            context,
            callbacks,
        }
    }

    pub async fn run(&self, connector: &dyn Connector, tasks: &[Task]) -> HostOutcome {
        let connection = match ConnectionInfo::from_vars(&self.host, &self.vars, &self.defaults) {
            Ok(info) => connector.connect(&info).await,
            Err(e) => Err(e),
        };

        let connection = match connection {
            Ok(connection) => connection,
            Err(e) => {
                let error = TaskError::connection(&self.host, format!("{e:#}"));
                return self.unreachable(error, tasks);
            }
        };
        info!("{}: connected", self.host);

        let executor = TaskExecutor::new(&self.context);
        let mut results = Vec::with_capacity(tasks.len());
        let mut aborted = false;

        for task in tasks {
            let result = if aborted {
                TaskResult::skipped(&self.host, task.name())
            } else {
                executor.run(connection.as_ref(), task, &self.vars).await
            };

            if result.is_failed() {
                debug!("{}: '{}' failed, skipping remaining tasks", self.host, task.name());
                aborted = true;
            }

            self.callbacks
                .emit_event(result.event_type(), Some(result.event_data()));
            results.push(result);
        }

        if let Err(e) = connection.close().await {
            warn!("{}: failed to close connection: {e:#}", self.host);
        }

        HostOutcome {
            host: self.host.clone(),
            results,
            unreachable: None,
        }
    }

    fn unreachable(&self, error: TaskError, tasks: &[Task]) -> HostOutcome {
        warn!("{error}");
        self.callbacks.emit_event(
            EventType::RunnerOnUnreachable,
            Some(json!({"host": self.host, "msg": error.to_string()})),
        );

        let results = tasks
            .iter()
            .map(|task| {
                let result = TaskResult::skipped(&self.host, task.name());
                self.callbacks
                    .emit_event(result.event_type(), Some(result.event_data()));
                result
            })
            .collect();

        HostOutcome {
            host: self.host.clone(),
            results,
            unreachable: Some(error),
        }
    }
}
