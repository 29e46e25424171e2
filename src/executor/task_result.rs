use crate::callback::EventType;
use crate::connection::CommandOutput;
use crate::error::TaskError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Changed,
    Unchanged,
    Failed,
    /// Not attempted: an earlier task failed or the host was unreachable.
    Skipped,
}

/// Outcome of one task on one host.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub host_name: String,
    pub task_name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CommandOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub ignored: bool,
}

impl TaskResult {
    pub fn new(host_name: &str, task_name: &str, status: TaskStatus) -> Self {
        TaskResult {
            host_name: host_name.to_string(),
            task_name: task_name.to_string(),
            status,
            output: None,
            error: None,
            ignored: false,
        }
    }

    pub fn changed(host_name: &str, task_name: &str, output: Option<CommandOutput>) -> Self {
        Self::new(host_name, task_name, TaskStatus::Changed).with_output(output)
    }

    pub fn unchanged(host_name: &str, task_name: &str, output: Option<CommandOutput>) -> Self {
        Self::new(host_name, task_name, TaskStatus::Unchanged).with_output(output)
    }

    pub fn failed(
        host_name: &str,
        task_name: &str,
        error: TaskError,
        output: Option<CommandOutput>,
    ) -> Self {
        let mut result = Self::new(host_name, task_name, TaskStatus::Failed).with_output(output);
        result.error = Some(error);
        result
    }

    pub fn skipped(host_name: &str, task_name: &str) -> Self {
        Self::new(host_name, task_name, TaskStatus::Skipped)
    }

    fn with_output(mut self, output: Option<CommandOutput>) -> Self {
        self.output = output;
        self
    }

    /// A failure that stops the host, i.e. not ignored.
    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed && !self.ignored
    }

    pub fn event_type(&self) -> EventType {
        match self.status {
            TaskStatus::Changed | TaskStatus::Unchanged => EventType::RunnerOnOk,
            TaskStatus::Failed => EventType::RunnerOnFailed,
            TaskStatus::Skipped => EventType::RunnerOnSkipped,
        }
    }

    /// Callback payload: the serialized result plus a readable `msg`.
    pub fn event_data(&self) -> Value {
        let mut data = serde_json::to_value(self).unwrap_or(Value::Null);
        if let (Some(error), Value::Object(map)) = (&self.error, &mut data) {
            map.insert("msg".to_string(), Value::String(error.to_string()));
        }
        data
    }
}
