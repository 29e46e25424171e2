use crate::playbook::task::Task;
use crate::vars::{vars_from_mapping, Vars};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlayDefinition {
    #[serde(default)]
    name: Option<String>,
    hosts: String,
    #[serde(default)]
    vars: Option<Mapping>,
    #[serde(default, rename = "become")]
    use_become: Option<bool>,
    #[serde(default)]
    become_user: Option<String>,
    #[serde(default)]
    tasks: Vec<Value>,
}

#[derive(Clone, Debug)]
pub struct Play {
    pub name: String,
    pattern: String,
    vars: Vars,
    use_become: Option<bool>,
    become_user: Option<String>,
    tasks: Vec<Task>,
}

impl Play {
    pub fn builder(name: &str, pattern: &str, tasks: &[Task]) -> PlayBuilder {
        PlayBuilder::new(name, pattern, tasks)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let definition: PlayDefinition = serde_yaml::from_value(value.clone())?;

        let tasks = definition
            .tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                Task::from_value(task).with_context(|| format!("Invalid task #{}", index + 1))
            })
            .collect::<Result<Vec<Task>>>()?;

        let name = definition
            .name
            .unwrap_or_else(|| definition.hosts.clone());

        let mut builder = Play::builder(&name, &definition.hosts, &tasks);
        if let Some(vars) = &definition.vars {
            builder = builder.vars(vars_from_mapping(vars));
        }
        if let Some(use_become) = definition.use_become {
            builder = builder.use_become(use_become);
        }
        if let Some(become_user) = definition.become_user {
            builder = builder.become_user(become_user);
        }

        Ok(builder.build())
    }

    pub fn get_pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn get_vars(&self) -> &Vars {
        &self.vars
    }

    pub fn use_become(&self) -> Option<bool> {
        self.use_become
    }

    pub fn become_user(&self) -> Option<&str> {
        self.become_user.as_deref()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

pub struct PlayBuilder {
    name: String,
    pattern: String,
    vars: Vars,
    use_become: Option<bool>,
    become_user: Option<String>,
    tasks: Vec<Task>,
}

impl PlayBuilder {
    pub fn new(name: &str, pattern: &str, tasks: &[Task]) -> PlayBuilder {
        PlayBuilder {
            name: String::from(name),
            pattern: String::from(pattern),
            vars: Vars::new(),
            use_become: None,
            become_user: None,
            tasks: tasks.to_vec(),
        }
    }

    pub fn vars(mut self, vars: Vars) -> Self {
        self.vars = vars;
        self
    }

    pub fn use_become(mut self, value: bool) -> Self {
        self.use_become = Some(value);
        self
    }

    pub fn become_user(mut self, user: String) -> Self {
        self.become_user = Some(user);
        self
    }

    pub fn build(self) -> Play {
        Play {
            name: self.name,
            pattern: self.pattern,
            vars: self.vars,
            use_become: self.use_become,
            become_user: self.become_user,
            tasks: self.tasks,
        }
    }
}
