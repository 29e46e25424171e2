use anyhow::{bail, Result};
use async_trait::async_trait;
use converge::connection::{
    CommandOutput, Connection, ConnectionDefaults, ConnectionInfo, Connector,
};
use converge::error::TaskError;
use converge::executor::task_queue_manager::{RunReport, TaskQueueManager};
use converge::executor::task_result::TaskStatus;
use converge::inventory::manager::InventoryManager;
use converge::playbook::play_context::PlayContext;
use converge::playbook::Playbook;
use rstest::rstest;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A probe / mutation pair acting on one piece of simulated machine state.
struct Rule {
    probe: &'static str,
    step: &'static str,
    state: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        probe: "id -u deploy",
        step: "useradd",
        state: "user:deploy",
    },
    Rule {
        probe: "dpkg-query -W -f='${Status}' nginx",
        step: "apt-get install -y -q nginx",
        state: "package:nginx",
    },
];

/// Simulated host: commands are interpreted against a set of facts.
#[derive(Default)]
struct Machine {
    state: Mutex<HashSet<String>>,
    failing: Vec<&'static str>,
    panicking: Vec<&'static str>,
    log: Mutex<Vec<String>>,
}

impl Machine {
    fn failing(commands: &[&'static str]) -> Self {
        Machine {
            failing: commands.to_vec(),
            ..Default::default()
        }
    }

    fn panicking(commands: &[&'static str]) -> Self {
        Machine {
            panicking: commands.to_vec(),
            ..Default::default()
        }
    }

    fn exec(&self, command: &str) -> CommandOutput {
        self.log.lock().unwrap().push(command.to_string());

        if self.panicking.iter().any(|p| command.contains(p)) {
            panic!("simulated crash on `{command}`");
        }

        if self.failing.iter().any(|f| command.contains(f)) {
            return CommandOutput::new(String::new(), "simulated failure".to_string(), 1);
        }

        let mut state = self.state.lock().unwrap();
        for rule in RULES {
            if command.contains(rule.step) {
                state.insert(rule.state.to_string());
                return CommandOutput::new(String::new(), String::new(), 0);
            }
            if command.contains(rule.probe) {
                let code = if state.contains(rule.state) { 0 } else { 1 };
                return CommandOutput::new(String::new(), String::new(), code);
            }
        }

        CommandOutput::new(String::new(), String::new(), 0)
    }

    fn ran(&self, needle: &str) -> bool {
        self.log.lock().unwrap().iter().any(|c| c.contains(needle))
    }
}

#[derive(Default)]
struct FakeConnector {
    machines: HashMap<String, Arc<Machine>>,
    unreachable: HashSet<String>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FakeConnector {
    fn with_hosts(hosts: &[&str]) -> Self {
        let mut connector = FakeConnector::default();
        for host in hosts {
            connector.add(host, Machine::default());
        }
        connector
    }

    fn add(&mut self, host: &str, machine: Machine) {
        self.machines.insert(host.to_string(), Arc::new(machine));
    }

    fn machine(&self, host: &str) -> &Machine {
        &self.machines[host]
    }
}

struct FakeConnection {
    host: String,
    machine: Arc<Machine>,
    closed: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn host(&self) -> &str {
        &self.host
    }

    async fn exec_command(&self, command: &str) -> Result<CommandOutput> {
        tokio::task::yield_now().await;
        Ok(self.machine.exec(command))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Box<dyn Connection>> {
        if self.unreachable.contains(&info.host) {
            bail!("ssh: connect to host {} port 22: No route to host", info.address);
        }
        let Some(machine) = self.machines.get(&info.host) else {
            bail!("unknown host {}", info.host);
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(FakeConnection {
            host: info.host.clone(),
            machine: machine.clone(),
            closed: self.closed.clone(),
            active: self.active.clone(),
        }))
    }
}

fn playbook(file_name: &str) -> Playbook {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/playbooks")
        .join(file_name);
    Playbook::from_file(&path).unwrap()
}

fn inventory(hosts: &[&str]) -> InventoryManager {
    let mut yaml = String::from("servers:\n  hosts:\n");
    for host in hosts {
        yaml.push_str(&format!("    {host}:\n"));
    }
    let mut manager = InventoryManager::new();
    manager.parse_yaml(&yaml).unwrap();
    manager
}

fn queue_manager(
    connector: &Arc<FakeConnector>,
    context: PlayContext,
    forks: u32,
) -> TaskQueueManager {
    TaskQueueManager::new(Some(forks), context, ConnectionDefaults::default())
        .with_connector(connector.clone())
}

async fn run(
    connector: &Arc<FakeConnector>,
    playbook: &Playbook,
    inventory: &InventoryManager,
    context: PlayContext,
    forks: u32,
) -> RunReport {
    let mut tqm = queue_manager(connector, context, forks);
    tqm.run(playbook, inventory, None).await.unwrap()
}

/// Runs a playbook fixture with default settings.
async fn run_default(connector: &Arc<FakeConnector>, file_name: &str, hosts: &[&str]) -> RunReport {
    run(
        connector,
        &playbook(file_name),
        &inventory(hosts),
        PlayContext::default(),
        5,
    )
    .await
}

fn statuses(report: &RunReport, host: &str) -> Vec<TaskStatus> {
    report
        .results
        .iter()
        .filter(|r| r.host_name == host)
        .map(|r| r.status)
        .collect()
}

#[tokio::test]
async fn test_second_run_is_unchanged() {
    let connector = Arc::new(FakeConnector::with_hosts(&["host-a", "host-b"]));
    let inventory = inventory(&["host-a", "host-b"]);
    let playbook = playbook("provision.yaml");

    let first = run(&connector, &playbook, &inventory, PlayContext::default(), 5).await;
    for host in ["host-a", "host-b"] {
        assert_eq!(statuses(&first, host), vec![TaskStatus::Changed, TaskStatus::Changed]);
    }
    assert_eq!(first.exit_code(), 0);

    let second = run(&connector, &playbook, &inventory, PlayContext::default(), 5).await;
    for host in ["host-a", "host-b"] {
        assert_eq!(
            statuses(&second, host),
            vec![TaskStatus::Unchanged, TaskStatus::Unchanged]
        );
    }
    assert_eq!(second.stats.get("host-a").unwrap().changed, 0);
    assert_eq!(second.exit_code(), 0);
}

#[tokio::test]
async fn test_failure_on_one_host_does_not_stop_the_other() {
    let mut connector = FakeConnector::with_hosts(&["host-b"]);
    connector.add("host-a", Machine::failing(&["useradd"]));
    let connector = Arc::new(connector);

    let report = run_default(&connector, "provision.yaml", &["host-a", "host-b"]).await;

    assert_eq!(statuses(&report, "host-a"), vec![TaskStatus::Failed, TaskStatus::Skipped]);
    assert_eq!(statuses(&report, "host-b"), vec![TaskStatus::Changed, TaskStatus::Changed]);

    assert!(!connector.machine("host-a").ran("apt-get"));
    assert!(!connector.machine("host-a").ran("dpkg-query"));
    assert!(connector.machine("host-b").ran("apt-get install"));

    let failure = report.results.iter().find(|r| r.status == TaskStatus::Failed).unwrap();
    assert!(matches!(
        failure.error,
        Some(TaskError::Mutation { exit_code: 1, .. })
    ));

    assert_eq!(report.stats.get("host-a").unwrap().failed, 1);
    assert_eq!(report.stats.get("host-a").unwrap().skipped, 1);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_results_follow_inventory_order() {
    let hosts = ["host-c", "host-a", "host-b"];
    let connector = Arc::new(FakeConnector::with_hosts(&hosts));
    let report = run_default(&connector, "provision.yaml", &hosts).await;

    let order: Vec<&str> = report.results.iter().map(|r| r.host_name.as_str()).collect();
    assert_eq!(
        order,
        vec!["host-c", "host-c", "host-a", "host-a", "host-b", "host-b"]
    );
}

#[tokio::test]
async fn test_best_effort_task_does_not_abort() {
    let mut connector = FakeConnector::default();
    connector.add("host-a", Machine::failing(&["sync-caches"]));
    let connector = Arc::new(connector);

    let report = run_default(&connector, "best_effort.yaml", &["host-a"]).await;

    assert_eq!(
        statuses(&report, "host-a"),
        vec![TaskStatus::Failed, TaskStatus::Changed]
    );
    assert!(report.results[0].ignored);

    let stats = report.stats.get("host-a").unwrap();
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_unreachable_host_skips_all_tasks() {
    let mut connector = FakeConnector::with_hosts(&["host-a"]);
    connector.unreachable.insert("host-down".to_string());
    let connector = Arc::new(connector);

    let report = run_default(&connector, "provision.yaml", &["host-down", "host-a"]).await;

    assert_eq!(
        statuses(&report, "host-down"),
        vec![TaskStatus::Skipped, TaskStatus::Skipped]
    );
    assert_eq!(statuses(&report, "host-a"), vec![TaskStatus::Changed, TaskStatus::Changed]);
    assert_eq!(report.stats.get("host-down").unwrap().unreachable, 1);
    assert_eq!(report.exit_code(), 4);
}

#[tokio::test]
async fn test_check_mode_runs_no_mutation() {
    let connector = Arc::new(FakeConnector::with_hosts(&["host-a"]));
    let context = PlayContext::new(true, false, "root");

    let report = run(
        &connector,
        &playbook("provision.yaml"),
        &inventory(&["host-a"]),
        context,
        5,
    )
    .await;

    assert_eq!(statuses(&report, "host-a"), vec![TaskStatus::Changed, TaskStatus::Changed]);
    let machine = connector.machine("host-a");
    assert!(machine.ran("id -u deploy"));
    assert!(!machine.ran("useradd"));
    assert!(!machine.ran("apt-get"));
    assert!(machine.state.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_host_is_excluded_from_later_plays() {
    let mut connector = FakeConnector::with_hosts(&["host-b"]);
    connector.add("host-a", Machine::failing(&["useradd"]));
    let connector = Arc::new(connector);

    let mut tqm = queue_manager(&connector, PlayContext::default(), 5);
    let report = tqm
        .run(&playbook("two_plays.yaml"), &inventory(&["host-a", "host-b"]), None)
        .await
        .unwrap();

    assert_eq!(statuses(&report, "host-a"), vec![TaskStatus::Failed]);
    assert_eq!(
        statuses(&report, "host-b"),
        vec![TaskStatus::Changed, TaskStatus::Changed]
    );
    assert!(connector.machine("host-b").ran("apt-get install -y -q nginx"));
    assert!(!connector.machine("host-a").ran("dpkg-query"));

    let failed: Vec<&String> = tqm.get_failed_hosts().iter().collect();
    assert_eq!(failed, vec!["host-a"]);
    assert!(tqm.get_unreachable_hosts().is_empty());
}

#[tokio::test]
async fn test_unreachable_host_is_excluded_from_later_plays() {
    let mut connector = FakeConnector::with_hosts(&["host-b"]);
    connector.unreachable.insert("host-a".to_string());
    let connector = Arc::new(connector);

    let mut tqm = queue_manager(&connector, PlayContext::default(), 5);
    let report = tqm
        .run(&playbook("two_plays.yaml"), &inventory(&["host-a", "host-b"]), None)
        .await
        .unwrap();

    assert_eq!(statuses(&report, "host-a"), vec![TaskStatus::Skipped]);
    let unreachable: Vec<&String> = tqm.get_unreachable_hosts().iter().collect();
    assert_eq!(unreachable, vec!["host-a"]);
    assert!(tqm.get_failed_hosts().is_empty());
    assert_eq!(report.exit_code(), 4);
}

#[tokio::test]
async fn test_crashed_worker_fails_only_its_host() {
    let mut connector = FakeConnector::with_hosts(&["host-b"]);
    connector.add("host-a", Machine::panicking(&["useradd"]));
    let connector = Arc::new(connector);

    let report = run_default(&connector, "provision.yaml", &["host-a", "host-b"]).await;

    assert_eq!(
        statuses(&report, "host-a"),
        vec![TaskStatus::Failed, TaskStatus::Skipped]
    );
    assert_eq!(
        statuses(&report, "host-b"),
        vec![TaskStatus::Changed, TaskStatus::Changed]
    );
    assert!(matches!(
        report.results[0].error,
        Some(TaskError::Connection { .. })
    ));
    assert_eq!(report.stats.get("host-a").unwrap().failed, 1);
    assert_eq!(report.exit_code(), 2);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forks_bound_parallelism(#[case] forks: u32) {
    let hosts = ["h1", "h2", "h3", "h4", "h5", "h6"];
    let connector = Arc::new(FakeConnector::with_hosts(&hosts));

    let report = run(
        &connector,
        &playbook("provision.yaml"),
        &inventory(&hosts),
        PlayContext::default(),
        forks,
    )
    .await;

    assert_eq!(report.results.len(), 12);
    assert!(connector.max_active.load(Ordering::SeqCst) <= forks as usize);
    assert_eq!(connector.opened.load(Ordering::SeqCst), 6);
    assert_eq!(connector.closed.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_connections_are_closed_after_failures() {
    let mut connector = FakeConnector::default();
    connector.add("host-a", Machine::failing(&["useradd"]));
    connector.add("host-b", Machine::failing(&["apt-get"]));
    let connector = Arc::new(connector);

    let report = run_default(&connector, "provision.yaml", &["host-a", "host-b"]).await;

    assert_eq!(report.exit_code(), 2);
    assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
    assert_eq!(connector.closed.load(Ordering::SeqCst), 2);
}
