use crate::modules::{build_module, ModuleType};
use crate::template::Templar;
use crate::vars::typed_scalar;
use anyhow::{anyhow, bail, Result};
use serde_yaml::{Mapping, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub module: String,
    /// Raw arguments, rendered per host before the module is built.
    pub args: Value,
}

#[derive(Clone, Debug)]
pub struct Task {
    name: String,
    action: Action,
    ignore_errors: bool,
    use_become: Option<bool>,
    become_user: Option<String>,
}

impl Task {
    pub fn new(name: &str, action: &Action) -> Self {
        Self {
            name: name.to_string(),
            action: action.clone(),
            ignore_errors: false,
            use_become: None,
            become_user: None,
        }
    }

    /// Parses one playbook task: task keywords plus exactly one module key.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mapping = value
            .as_mapping()
            .ok_or_else(|| anyhow!("A task must be a mapping"))?;

        let mut name = None;
        let mut ignore_errors = false;
        let mut use_become = None;
        let mut become_user = None;
        let mut action = None;

        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or_else(|| anyhow!("Task keys must be strings"))?;

            match key {
                "name" => name = Some(expect_string(key, value)?),
                "become" => use_become = Some(expect_bool(key, value)?),
                "become_user" => become_user = Some(expect_string(key, value)?),
                "ignore_errors" | "best_effort" => ignore_errors = expect_bool(key, value)?,
                module => {
                    if let Some(Action { module: previous, .. }) = &action {
                        bail!("Task has more than one module: {previous}, {module}");
                    }
                    action = Some(Action {
                        module: module.to_string(),
                        args: value.clone(),
                    });
                }
            }
        }

        let action = action.ok_or_else(|| anyhow!("Task has no module"))?;
        let name = name.unwrap_or_else(|| action.module.clone());

        let mut task = Task::new(&name, &action).ignore_errors(ignore_errors);
        if let Some(use_become) = use_become {
            task = task.use_become(use_become);
        }
        if let Some(become_user) = &become_user {
            task = task.become_user(become_user);
        }
        task.validate()?;

        Ok(task)
    }

    /// Builds the single task of an ad-hoc run from `-m` and `-a`.
    ///
    /// Arguments are either a YAML/JSON mapping, `k=v` pairs, or for
    /// `command`/`shell` a free-form command line.
    pub fn adhoc(module: &str, args: Option<&str>) -> Result<Self> {
        let module_type: ModuleType = module.parse()?;
        let raw = args.unwrap_or("").trim();

        let args = if module_type == ModuleType::Command {
            if raw.is_empty() {
                bail!("No argument passed to {module} module");
            }
            if raw.starts_with('{') {
                serde_yaml::from_str(raw)?
            } else {
                Value::String(raw.to_string())
            }
        } else if raw.starts_with('{') {
            serde_yaml::from_str(raw)?
        } else {
            parse_kv(raw)?
        };

        let task = Task::new(module, &Action {
            module: module.to_string(),
            args,
        });
        task.validate()?;

        Ok(task)
    }

    /// Rejects unknown modules, and invalid arguments unless they still
    /// contain templates that can only be checked once rendered.
    pub fn validate(&self) -> Result<()> {
        let _: ModuleType = self.action.module.parse()?;

        if !Templar::new().is_template(&self.action.args) {
            build_module(&self.action.module, &self.action.args)?;
        }
        Ok(())
    }

    pub fn ignore_errors(mut self, value: bool) -> Self {
        self.ignore_errors = value;
        self
    }

    pub fn use_become(mut self, value: bool) -> Self {
        self.use_become = Some(value);
        self
    }

    pub fn become_user(mut self, user: &str) -> Self {
        self.become_user = Some(user.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn is_best_effort(&self) -> bool {
        self.ignore_errors
    }

    pub fn get_become(&self) -> Option<bool> {
        self.use_become
    }

    pub fn get_become_user(&self) -> Option<&str> {
        self.become_user.as_deref()
    }
}

fn expect_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => bail!("Task keyword {key} must be a string"),
    }
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow!("Task keyword {key} must be a boolean"))
}

/// `name=nginx state=present` into a mapping, with YAML-typed values.
fn parse_kv(raw: &str) -> Result<Value> {
    let words = shlex::split(raw).ok_or_else(|| anyhow!("Unbalanced quotes in '{raw}'"))?;
    let mut mapping = Mapping::new();

    for word in words {
        let (key, value) = word
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected key=value, got '{word}'"))?;
        mapping.insert(Value::from(key), typed_scalar(value));
    }

    Ok(Value::Mapping(mapping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn task(yaml: &str) -> Result<Task> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        Task::from_value(&value)
    }

    #[test]
    fn test_task_keywords() {
        let task = task(
            r#"
            name: install nginx
            become: true
            become_user: root
            ignore_errors: true
            package:
              name: nginx
            "#,
        )
        .unwrap();

        assert_eq!(task.name(), "install nginx");
        assert_eq!(task.action().module, "package");
        assert!(task.is_best_effort());
        assert_eq!(task.get_become(), Some(true));
        assert_eq!(task.get_become_user(), Some("root"));
    }

    #[test]
    fn test_best_effort_alias() {
        let task = task("best_effort: true\ncommand: /bin/false").unwrap();
        assert!(task.is_best_effort());
        assert_eq!(task.name(), "command");
    }

    #[rstest]
    #[case("name: nothing", "Task has no module")]
    #[case("user: {name: a}\npackage: {name: b}", "Task has more than one module")]
    #[case("frobnicate: {x: 1}", "Module frobnicate not supported")]
    #[case("package: {name: nginx, version: 1}", "Invalid arguments for module package")]
    #[case("ignore_errors: maybe\ncommand: ls", "must be a boolean")]
    fn test_invalid_tasks(#[case] yaml: &str, #[case] message: &str) {
        let err = task(yaml).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn test_templated_args_are_validated_later() {
        // `state` is only known once rendered.
        let task = task("package:\n  name: nginx\n  state: \"{{ pkg_state }}\"").unwrap();
        assert_eq!(task.action().module, "package");
    }

    #[test]
    fn test_adhoc_free_form_command() {
        let task = Task::adhoc("shell", Some("uptime && df -h")).unwrap();
        assert_eq!(task.action().args, Value::from("uptime && df -h"));

        assert!(Task::adhoc("command", None).is_err());
    }

    #[test]
    fn test_adhoc_key_value_args() {
        let task = Task::adhoc("package", Some("name=nginx update_cache=true")).unwrap();
        assert_eq!(task.action().args["name"], Value::from("nginx"));
        assert_eq!(task.action().args["update_cache"], Value::from(true));
    }

    #[test]
    fn test_adhoc_json_args() {
        let args = r#"{"name": "deploy", "shell": "/bin/bash"}"#;
        let task = Task::adhoc("user", Some(args)).unwrap();
        assert_eq!(task.action().args["shell"], Value::from("/bin/bash"));

        assert!(Task::adhoc("user", Some("name")).is_err());
        assert!(Task::adhoc("lineinfile", Some("path=/etc/hosts")).is_err());
    }
}
