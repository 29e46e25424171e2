use crate::executor::task_result::{TaskResult, TaskStatus};
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub ok: u32,
    pub changed: u32,
    pub failed: u32,
    pub ignored: u32,
    pub skipped: u32,
    pub unreachable: u32,
}

/// Per-host counters behind the recap and the process exit code.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    hosts: IndexMap<String, HostStats>,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, host: &str) -> &mut HostStats {
        self.hosts.entry(host.to_string()).or_default()
    }

    /// Makes `host` show up in the recap even if it ran no task.
    pub fn touch(&mut self, host: &str) {
        self.entry(host);
    }

    pub fn record(&mut self, result: &TaskResult) {
        let stats = self.entry(&result.host_name);
        match result.status {
            TaskStatus::Changed => {
                stats.ok += 1;
                stats.changed += 1;
            }
            TaskStatus::Unchanged => stats.ok += 1,
            TaskStatus::Failed if result.ignored => stats.ignored += 1,
            TaskStatus::Failed => stats.failed += 1,
            TaskStatus::Skipped => stats.skipped += 1,
        }
    }

    pub fn record_unreachable(&mut self, host: &str) {
        self.entry(host).unreachable += 1;
    }

    pub fn get(&self, host: &str) -> Option<&HostStats> {
        self.hosts.get(host)
    }

    pub fn hosts(&self) -> impl Iterator<Item = (&String, &HostStats)> {
        self.hosts.iter()
    }

    pub fn has_failures(&self) -> bool {
        self.hosts.values().any(|s| s.failed > 0)
    }

    pub fn has_unreachable(&self) -> bool {
        self.hosts.values().any(|s| s.unreachable > 0)
    }

    /// 0 when everything converged, 2 if a task failed, 4 if hosts were
    /// only unreachable.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            2
        } else if self.has_unreachable() {
            4
        } else {
            0
        }
    }
}
