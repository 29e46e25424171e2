use crate::inventory::group::{add_child_group, Group};
use crate::inventory::host::Host;
use crate::inventory::utils::parse_host_pattern;
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use serde_yaml::{Mapping, Value};
use std::path::Path;

fn get_value_type(val: &Value) -> &str {
    match val {
        Value::String(_) => "String",
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(_) => "Number",
        Value::Sequence(_) => "Sequence",
        Value::Mapping(_) => "Mapping",
        Value::Tagged(_) => "Tagged",
    }
}

pub fn parse_yaml_file(
    file_path: &Path,
    groups: &mut IndexMap<String, Group>,
    hosts: &mut IndexMap<String, Host>,
) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read inventory {}", file_path.display()))?;
    parse_yaml_str(&content, groups, hosts)
        .with_context(|| format!("Invalid inventory {}", file_path.display()))
}

pub fn parse_yaml_str(
    content: &str,
    groups: &mut IndexMap<String, Group>,
    hosts: &mut IndexMap<String, Host>,
) -> Result<()> {
    let data: Value = serde_yaml::from_str(content)?;

    match data {
        Value::Null => Ok(()),
        Value::Mapping(group_map) => {
            for (key, val) in group_map {
                let group_name = match key {
                    Value::String(group_name) => group_name,
                    other => bail!(
                        "YAML group name must be a string, got: {}",
                        get_value_type(&other)
                    ),
                };

                match val {
                    Value::Mapping(group_data) => {
                        parse_group(&group_name, group_data, groups, hosts)?
                    }
                    Value::Null => parse_group(&group_name, Mapping::new(), groups, hosts)?,
                    other => bail!(
                        "YAML group '{group_name}' has invalid structure, it should be a dictionary, got: {}",
                        get_value_type(&other)
                    ),
                }
            }
            Ok(())
        }
        other => bail!(
            "YAML inventory has invalid structure, it should be a dictionary, got: {}",
            get_value_type(&other)
        ),
    }
}

fn parse_group(
    group_name: &str,
    data: Mapping,
    groups: &mut IndexMap<String, Group>,
    hosts: &mut IndexMap<String, Host>,
) -> Result<()> {
    debug!("Parsing {group_name} group");

    let mut group_stack: Vec<(String, Mapping, Option<String>)> =
        vec![(group_name.to_string(), data, None)];

    while let Some((current_group_name, current_data, parent_group_name)) = group_stack.pop() {
        groups
            .entry(current_group_name.clone())
            .or_insert_with(|| Group::new(&current_group_name));

        if let Some(parent_group_name) = parent_group_name {
            add_child_group(groups, &parent_group_name, &current_group_name)?;
        }

        for (key, val) in &current_data {
            let Value::String(key) = key else {
                continue;
            };

            match key.as_str() {
                "vars" => parse_group_vars(&current_group_name, val, groups)?,
                "hosts" => parse_group_hosts(&current_group_name, val, groups, hosts)?,
                "children" => parse_group_children(&current_group_name, val, &mut group_stack)?,
                _ => log_unexpected_key(key, &current_group_name),
            }
        }
    }

    Ok(())
}

fn parse_group_vars(
    group_name: &str,
    val: &Value,
    groups: &mut IndexMap<String, Group>,
) -> Result<()> {
    let vars = match val {
        Value::Mapping(vars) => vars,
        Value::Null => return Ok(()),
        other => bail!(
            "YAML group '{group_name}' vars should be a dictionary, got: {}",
            get_value_type(other)
        ),
    };

    if let Some(group) = groups.get_mut(group_name) {
        for (key, value) in vars {
            if let Value::String(key) = key {
                group.set_variable(key, value.clone());
            }
        }
    }

    Ok(())
}

fn parse_group_hosts(
    group_name: &str,
    val: &Value,
    groups: &mut IndexMap<String, Group>,
    hosts: &mut IndexMap<String, Host>,
) -> Result<()> {
    let host_map = match val {
        Value::Mapping(host_map) => host_map,
        Value::Null => return Ok(()),
        other => bail!(
            "YAML group '{group_name}' hosts should be a dictionary, got: {}",
            get_value_type(other)
        ),
    };

    for (host_key, host_vars) in host_map {
        let host_pattern = match host_key {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => bail!("Invalid host name type: {}", get_value_type(other)),
        };

        let host_vars = match host_vars {
            Value::Mapping(vars) => Some(vars),
            Value::Null => None,
            other => bail!(
                "Host '{host_pattern}' vars should be a dictionary, got: {}",
                get_value_type(other)
            ),
        };

        for host_name in parse_host_pattern(&host_pattern)? {
            let host = hosts
                .entry(host_name.clone())
                .or_insert_with(|| Host::new(&host_name));
            host.add_group(group_name);

            if let Some(vars) = host_vars {
                for (key, value) in vars {
                    if let Value::String(key) = key {
                        host.set_var(key, value.clone());
                    }
                }
            }

            if let Some(group) = groups.get_mut(group_name) {
                group.add_host(&host_name);
            }
        }
    }

    Ok(())
}

/// Queues "children" groups for parsing, remembering their parent.
fn parse_group_children(
    group_name: &str,
    val: &Value,
    group_stack: &mut Vec<(String, Mapping, Option<String>)>,
) -> Result<()> {
    let children = match val {
        Value::Mapping(children) => children,
        Value::Null => return Ok(()),
        other => bail!(
            "YAML group '{group_name}' children should be a dictionary, got: {}",
            get_value_type(other)
        ),
    };

    // reversed so the stack pops children in declaration order
    let entries: Vec<(&Value, &Value)> = children.iter().collect();
    for (child_key, child_val) in entries.into_iter().rev() {
        let Value::String(child_group_name) = child_key else {
            continue;
        };

        let child_data = match child_val {
            Value::Mapping(data) => data.clone(),
            Value::Null => Mapping::new(),
            other => bail!(
                "YAML group 'children' field has invalid structure, expected dictionary or null, got: {}",
                get_value_type(other)
            ),
        };

        debug!("Queueing child group: {child_group_name}");
        group_stack.push((
            child_group_name.to_string(),
            child_data,
            Some(group_name.to_string()),
        ));
    }

    Ok(())
}

fn log_unexpected_key(key: &str, group_name: &str) {
    warn!(
        "Skipping unexpected key \"{key}\" in group \"{group_name}\", only \"vars\", \"children\" and \"hosts\" are valid"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<(IndexMap<String, Group>, IndexMap<String, Host>)> {
        let mut groups = IndexMap::new();
        let mut hosts = IndexMap::new();
        parse_yaml_str(content, &mut groups, &mut hosts)?;
        Ok((groups, hosts))
    }

    #[test]
    fn test_hosts_vars_and_children() {
        let (groups, hosts) = parse(
            r#"
            webservers:
              hosts:
                web[1:2].example.com:
                  user: deploy
              vars:
                http_port: 80
            prod:
              children:
                webservers:
                dbservers:
                  hosts:
                    db1.example.com:
            "#,
        )
        .unwrap();

        assert_eq!(
            groups.keys().collect::<Vec<_>>(),
            vec!["webservers", "prod", "dbservers"]
        );
        assert_eq!(
            hosts.keys().collect::<Vec<_>>(),
            vec!["web1.example.com", "web2.example.com", "db1.example.com"]
        );
        assert_eq!(hosts["web2.example.com"].get_vars()["user"], Value::from("deploy"));
        assert_eq!(groups["webservers"].get_vars()["http_port"], Value::from(80));
        assert_eq!(groups["prod"].child_groups(), ["webservers", "dbservers"]);
        assert_eq!(hosts["db1.example.com"].get_groups(), ["dbservers"]);
    }

    #[test]
    fn test_empty_inventory() {
        let (groups, hosts) = parse("").unwrap();
        assert!(groups.is_empty());
        assert!(hosts.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(parse("group1:\n  hosts: { invalid_yaml\n").is_err());
    }

    #[test]
    fn test_non_mapping_root() {
        assert!(parse("This is not an inventory").is_err());
    }

    #[test]
    fn test_invalid_hosts_structure() {
        assert!(parse("web:\n  hosts:\n    - web1\n").is_err());
    }

    #[test]
    fn test_cyclic_children() {
        let result = parse(
            r#"
            a:
              children:
                b:
                  children:
                    a:
            "#,
        );
        assert!(result.is_err());
    }
}
