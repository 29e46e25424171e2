use crate::vars::Vars;
use serde_yaml::Value;

#[derive(Clone, Debug)]
pub struct Host {
    pub name: String,
    implicit: bool,
    vars: Vars,
    groups: Vec<String>,
}

impl Host {
    pub fn new(name: &str) -> Self {
        Host {
            name: name.to_string(),
            groups: Vec::new(),
            vars: Vars::new(),
            implicit: false,
        }
    }

    /// The localhost entry available when the inventory does not define it.
    pub fn implicit_localhost(name: &str) -> Self {
        let mut host = Host::new(name);
        host.implicit = true;
        host.set_var("connection", Value::from("local"));
        host
    }

    pub fn get_vars(&self) -> &Vars {
        &self.vars
    }

    pub fn set_var(&mut self, key: &str, value: Value) {
        self.vars.insert(key.to_string(), value);
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn add_group(&mut self, group: &str) {
        let group_name = group.to_string();
        if !self.groups.contains(&group_name) {
            self.groups.push(group_name);
        }
    }

    /// Groups the host was declared in directly, without ancestors.
    pub fn get_groups(&self) -> &[String] {
        &self.groups
    }
}
