use crate::callback::{CallbackManager, CallbackPlugin, EventType};
use crate::connection::{ConnectionDefaults, Connector, DefaultConnector};
use crate::constants::DEFAULT_FORKS;
use crate::error::TaskError;
use crate::executor::host_executor::{HostExecutor, HostOutcome};
use crate::executor::stats::AggregateStats;
use crate::executor::task_result::TaskResult;
use crate::inventory::manager::InventoryManager;
use crate::playbook::play::Play;
use crate::playbook::play_context::PlayContext;
use crate::playbook::task::Task;
use crate::playbook::Playbook;
use crate::vars::combine_vars;
use anyhow::Result;
use indexmap::IndexSet;
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Results of a whole run, in play order then inventory order.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<TaskResult>,
    pub stats: AggregateStats,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.stats.exit_code()
    }
}

/// Drives plays across hosts: one worker per host, at most `forks` at once.
pub struct TaskQueueManager {
    forks: u32,
    context: PlayContext,
    defaults: ConnectionDefaults,
    connector: Arc<dyn Connector>,
    callbacks: CallbackManager,
    failed_hosts: IndexSet<String>,
    unreachable_hosts: IndexSet<String>,
    stats: AggregateStats,
    results: Vec<TaskResult>,
}

impl TaskQueueManager {
    pub fn new(forks: Option<u32>, context: PlayContext, defaults: ConnectionDefaults) -> Self {
        Self {
            forks: forks.unwrap_or(DEFAULT_FORKS).max(1),
            context,
            defaults,
            connector: Arc::new(DefaultConnector),
            callbacks: CallbackManager::new(),
            failed_hosts: IndexSet::new(),
            unreachable_hosts: IndexSet::new(),
            stats: AggregateStats::new(),
            results: Vec::new(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn register_callback(&mut self, callback: Box<dyn CallbackPlugin>) {
        self.callbacks.register_callback(callback);
    }

    pub fn get_failed_hosts(&self) -> &IndexSet<String> {
        &self.failed_hosts
    }

    pub fn get_unreachable_hosts(&self) -> &IndexSet<String> {
        &self.unreachable_hosts
    }

    pub async fn run(
        &mut self,
        playbook: &Playbook,
        inventory_manager: &InventoryManager,
        limit: Option<&str>,
    ) -> Result<RunReport> {
        self.callbacks.emit_event(
            EventType::PlaybookOnStart,
            Some(json!({"playbook": playbook.file_name()})),
        );

        for play in playbook.plays() {
            self.run_play(play, inventory_manager, limit).await?;
        }

        self.callbacks.emit_event(
            EventType::PlaybookOnStats,
            Some(serde_json::to_value(&self.stats)?),
        );

        Ok(RunReport {
            results: std::mem::take(&mut self.results),
            stats: self.stats.clone(),
        })
    }

    /// Hosts that failed or were unreachable in an earlier play are left out.
    pub async fn run_play(
        &mut self,
        play: &Play,
        inventory_manager: &InventoryManager,
        limit: Option<&str>,
    ) -> Result<()> {
        let hosts: Vec<_> = inventory_manager
            .filter_hosts(play.get_pattern(), limit)?
            .into_iter()
            .filter(|host| !self.is_excluded(&host.name))
            .collect();

        self.callbacks.emit_event(
            EventType::PlaybookOnPlayStart,
            Some(json!({"name": play.name})),
        );

        if hosts.is_empty() {
            warn!("play '{}': no hosts matched '{}'", play.name, play.get_pattern());
            self.callbacks
                .emit_event(EventType::PlaybookOnNoHostsMatched, None);
            return Ok(());
        }
        info!(
            "play '{}': {} tasks on {} hosts, forks={}",
            play.name,
            play.tasks().len(),
            hosts.len(),
            self.forks
        );

        let context = self
            .context
            .for_play(play.use_become(), play.become_user());
        let callbacks = Arc::new(self.callbacks.clone());
        let tasks = Arc::new(play.tasks().to_vec());
        let semaphore = Arc::new(Semaphore::new(self.forks as usize));

        let mut handles = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let mut vars = inventory_manager.get_host_vars(host);
            combine_vars(&mut vars, play.get_vars());

            let executor = HostExecutor::new(
                &host.name,
                vars,
                self.defaults.clone(),
                context.clone(),
                callbacks.clone(),
            );
            let connector = self.connector.clone();
            let tasks = tasks.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                Ok::<HostOutcome, anyhow::Error>(executor.run(connector.as_ref(), &tasks).await)
            }));
        }

        for (host, handle) in hosts.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => self.lost_worker(&host.name, &tasks, format!("{e:#}")),
                Err(e) => {
                    self.lost_worker(&host.name, &tasks, format!("host worker died: {e}"))
                }
            };
            self.record(outcome);
        }

        Ok(())
    }

    fn is_excluded(&self, host: &str) -> bool {
        self.failed_hosts.contains(host) || self.unreachable_hosts.contains(host)
    }

    /// Outcome for a host whose worker ended without reporting: the first task
    /// fails, the rest are skipped.
    fn lost_worker(&self, host: &str, tasks: &[Task], message: String) -> HostOutcome {
        error!("{host}: {message}");

        let results = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| {
                let result = if i == 0 {
                    let error = TaskError::connection(host, &message);
                    TaskResult::failed(host, task.name(), error, None)
                } else {
                    TaskResult::skipped(host, task.name())
                };
                self.callbacks
                    .emit_event(result.event_type(), Some(result.event_data()));
                result
            })
            .collect();

        HostOutcome {
            host: host.to_string(),
            results,
            unreachable: None,
        }
    }

    fn record(&mut self, outcome: HostOutcome) {
        self.stats.touch(&outcome.host);
        for result in &outcome.results {
            self.stats.record(result);
        }

        if outcome.unreachable.is_some() {
            self.stats.record_unreachable(&outcome.host);
            self.unreachable_hosts.insert(outcome.host.clone());
        } else if outcome.has_failed() {
            self.failed_hosts.insert(outcome.host.clone());
        }

        self.results.extend(outcome.results);
    }
}
