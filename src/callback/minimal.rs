use crate::callback::{CallbackPlugin, EventType};
use serde_json::Value;

/// Default stdout callback: one line per host and task, then the recap.
pub struct Minimal;

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

fn banner(title: &str) -> String {
    let stars = 72usize.saturating_sub(title.len() + 1).max(3);
    format!("\n{title} {}", "*".repeat(stars))
}

impl Minimal {
    pub fn format_event(event: &EventType, data: Option<&Value>) -> Option<String> {
        let empty = Value::Null;
        let data = data.unwrap_or(&empty);

        let line = match event {
            EventType::PlaybookOnPlayStart => banner(&format!("PLAY [{}]", field(data, "name"))),
            EventType::PlaybookOnNoHostsMatched => "skipping: no hosts matched".to_string(),
            EventType::RunnerOnOk => {
                let status = match field(data, "status") {
                    "changed" => "CHANGED",
                    _ => "UNCHANGED",
                };
                format!(
                    "{} | {status} | {}",
                    field(data, "host_name"),
                    field(data, "task_name")
                )
            }
            EventType::RunnerOnFailed => {
                let ignored = data.get("ignored").and_then(Value::as_bool).unwrap_or(false);
                let mut line = format!(
                    "{} | {} | {} => {}",
                    field(data, "host_name"),
                    if ignored { "FAILED (ignored)" } else { "FAILED" },
                    field(data, "task_name"),
                    field(data, "msg")
                );
                let stdout = data
                    .pointer("/output/stdout")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .trim_end();
                if !stdout.is_empty() {
                    line.push('\n');
                    line.push_str(stdout);
                }
                line
            }
            EventType::RunnerOnSkipped => format!(
                "{} | SKIPPED | {}",
                field(data, "host_name"),
                field(data, "task_name")
            ),
            EventType::RunnerOnUnreachable => {
                format!("{} | UNREACHABLE! => {}", field(data, "host"), field(data, "msg"))
            }
            EventType::PlaybookOnStats => {
                let mut recap = banner("PLAY RECAP");
                if let Some(hosts) = data.get("hosts").and_then(Value::as_object) {
                    for (host, counters) in hosts {
                        let count =
                            |key: &str| counters.get(key).and_then(Value::as_u64).unwrap_or(0);
                        recap.push_str(&format!(
                            "\n{host:<26} : ok={:<4} changed={:<4} unreachable={:<4} failed={:<4} skipped={:<4} ignored={}",
                            count("ok"),
                            count("changed"),
                            count("unreachable"),
                            count("failed"),
                            count("skipped"),
                            count("ignored"),
                        ));
                    }
                }
                recap
            }
            EventType::PlaybookOnStart => return None,
        };

        Some(line)
    }
}

impl CallbackPlugin for Minimal {
    fn get_interested_events(&self) -> Vec<EventType> {
        vec![
            EventType::PlaybookOnPlayStart,
            EventType::PlaybookOnNoHostsMatched,
            EventType::RunnerOnOk,
            EventType::RunnerOnFailed,
            EventType::RunnerOnSkipped,
            EventType::RunnerOnUnreachable,
            EventType::PlaybookOnStats,
        ]
    }

    fn on_event(&self, event: &EventType, data: Option<&Value>) {
        if let Some(line) = Minimal::format_event(event, data) {
            println!("{line}");
        }
    }
}
