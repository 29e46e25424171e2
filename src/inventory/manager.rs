use super::group::{add_child_group, Group};
use super::host::Host;
use super::yml::parse_yaml_file;
use crate::constants::LOCALHOST;
use crate::inventory::patterns::PatternResolver;
use crate::inventory::utils::{glob_to_regex, parse_host_pattern, split_subscript};
use crate::vars::{combine_vars, Vars};
use anyhow::{anyhow, Result};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

const ALL_GROUP: &str = "all";
const UNGROUPED_GROUP: &str = "ungrouped";

static EXCLUDE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\.|host_vars|group_vars|vars_plugins)(/|$)").expect("exclude regex is valid")
});

pub struct InventoryManager {
    groups: IndexMap<String, Group>,
    hosts: IndexMap<String, Host>,
}

impl Default for InventoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryManager {
    pub fn new() -> Self {
        let mut groups = IndexMap::new();
        groups.insert(ALL_GROUP.to_string(), Group::new(ALL_GROUP));
        groups.insert(UNGROUPED_GROUP.to_string(), Group::new(UNGROUPED_GROUP));

        InventoryManager {
            groups,
            hosts: IndexMap::new(),
        }
    }

    /// Looks up a host, falling back to an implicit localhost entry.
    pub fn get_host(&self, name: &str) -> Option<Host> {
        match self.hosts.get(name) {
            Some(host) => Some(host.clone()),
            None if LOCALHOST.contains(&name) => Some(Host::implicit_localhost(name)),
            None => None,
        }
    }

    pub fn list_groups(&self) -> Vec<Group> {
        self.groups.values().cloned().collect()
    }

    pub fn parse_sources(&mut self, sources: Option<&[String]>) -> Result<()> {
        if let Some(sources) = sources {
            for source in sources {
                self.parse_source(source)?;
            }
        }

        self.reconcile()
    }

    pub fn parse_yaml(&mut self, content: &str) -> Result<()> {
        super::yml::parse_yaml_str(content, &mut self.groups, &mut self.hosts)?;
        self.reconcile()
    }

    fn parse_source(&mut self, source: &str) -> Result<()> {
        debug!("Examining source {}", source);
        let path = Path::new(source);

        if path.is_dir() {
            self.parse_directory(path)
        } else if path.exists() {
            self.parse_file(path)
        } else if source.contains(',') {
            self.parse_host_list(source)
        } else {
            Err(anyhow!("Inventory source {source} does not exist"))
        }
    }

    /// A comma separated list of hosts, e.g. `web1.example.com,web2.example.com,`.
    fn parse_host_list(&mut self, source: &str) -> Result<()> {
        for entry in source.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            for host_name in parse_host_pattern(entry)? {
                self.hosts
                    .entry(host_name.clone())
                    .or_insert_with(|| Host::new(&host_name));
            }
        }
        Ok(())
    }

    fn parse_directory(&mut self, dir_path: &Path) -> Result<()> {
        debug!(
            "Loading inventory files in directory: {}",
            dir_path.display()
        );

        let mut entries: Vec<_> = fs::read_dir(dir_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        for entry_path in entries {
            let Some(filename) = entry_path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };

            if EXCLUDE_PATTERN.is_match(filename) {
                debug!("Skipping excluded file or directory: {}", entry_path.display());
                continue;
            }

            if entry_path.is_dir() {
                self.parse_directory(&entry_path)?;
            } else {
                self.parse_file(&entry_path)?;
            }
        }

        Ok(())
    }

    fn parse_file(&mut self, file_path: &Path) -> Result<()> {
        debug!("Parsing inventory file: {}", file_path.display());

        match file_path.extension().and_then(|e| e.to_str()) {
            Some("yml" | "yaml") => parse_yaml_file(file_path, &mut self.groups, &mut self.hosts),
            _ => {
                debug!(
                    "Skipping file due to incompatible extension: {}",
                    file_path.display()
                );
                Ok(())
            }
        }
    }

    /// Hangs top-level groups under `all` and collects hosts without a group
    /// into `ungrouped`.
    fn reconcile(&mut self) -> Result<()> {
        let top_level: Vec<String> = self
            .groups
            .values()
            .filter(|g| g.name != ALL_GROUP && g.parent_groups().is_empty())
            .map(|g| g.name.clone())
            .collect();

        for group_name in top_level {
            add_child_group(&mut self.groups, ALL_GROUP, &group_name)?;
        }

        for host in self.hosts.values_mut() {
            let grouped = host
                .get_groups()
                .iter()
                .any(|g| g != ALL_GROUP && g != UNGROUPED_GROUP);

            if !grouped {
                host.add_group(UNGROUPED_GROUP);
                if let Some(ungrouped) = self.groups.get_mut(UNGROUPED_GROUP) {
                    ungrouped.add_host(&host.name);
                }
            }
        }

        Ok(())
    }

    /// Resolves a host pattern, optionally narrowed by a limit pattern.
    /// Hosts are returned in inventory order without duplicates.
    pub fn filter_hosts(&self, pattern: &str, limit: Option<&str>) -> Result<Vec<Host>> {
        let split_pattern = PatternResolver::split_patterns(pattern);

        if self.hosts.is_empty() && !split_pattern.iter().any(|p| LOCALHOST.contains(&p.as_str())) {
            warn!("Provided hosts list is empty, only localhost is available. Note that the implicit localhost does not match 'all'");
        }

        let patterns = PatternResolver::resolve_and_sort_patterns(&split_pattern);
        let mut selected_hosts = self.apply_patterns(&patterns)?;

        if let Some(limit) = limit {
            let limit_patterns =
                PatternResolver::resolve_and_sort_patterns(&PatternResolver::split_patterns(limit));
            let limit_hosts: IndexSet<String> =
                self.apply_patterns(&limit_patterns)?.into_iter().collect();
            selected_hosts.retain(|host| limit_hosts.contains(host));
        }

        let mut hosts: Vec<Host> = selected_hosts
            .iter()
            .filter_map(|name| self.get_host(name))
            .collect();

        hosts.sort_by_key(|host| {
            self.hosts
                .get_index_of(&host.name)
                .unwrap_or(usize::MAX)
        });

        Ok(hosts)
    }

    fn apply_patterns(&self, patterns: &[String]) -> Result<IndexSet<String>> {
        let mut selected_hosts: IndexSet<String> = IndexSet::new();

        for pattern in patterns {
            let matched_hosts = self.match_single_pattern(pattern)?;

            if pattern.starts_with('!') {
                selected_hosts.retain(|host| !matched_hosts.contains(host));
            } else if pattern.starts_with('&') {
                selected_hosts.retain(|host| matched_hosts.contains(host));
            } else {
                selected_hosts.extend(matched_hosts);
            }
        }

        Ok(selected_hosts)
    }

    fn match_single_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let stripped_pattern = pattern
            .strip_prefix('!')
            .or_else(|| pattern.strip_prefix('&'))
            .unwrap_or(pattern);

        let split_pattern = split_subscript(stripped_pattern)?;
        let mut hosts = self.enumerate_matches(&split_pattern.pattern)?;
        if let Some((start, end)) = split_pattern.subscript {
            hosts = self.apply_subscript(&hosts, start, end);
        }

        Ok(hosts)
    }

    fn apply_subscript(&self, hosts: &[String], start: i32, end: Option<i32>) -> Vec<String> {
        if hosts.is_empty() {
            return vec![];
        }

        let len = hosts.len() as i32;
        let start_idx = if start < 0 { len + start } else { start };
        let end_idx = end
            .map(|e| if e < 0 { len + e } else { e })
            .unwrap_or(start_idx);

        if start_idx < 0 || start_idx >= len || end_idx < 0 || start_idx > end_idx {
            return vec![];
        }

        // ranges past the end are clamped
        let end_idx = end_idx.min(len - 1);

        hosts[start_idx as usize..=end_idx as usize].to_vec()
    }

    fn enumerate_matches(&self, pattern: &str) -> Result<Vec<String>> {
        if pattern == ALL_GROUP || pattern == "*" {
            return Ok(self.hosts.keys().cloned().collect());
        }

        let mut matches: IndexSet<String> = IndexSet::new();

        let group_names: Vec<String> = self.groups.keys().cloned().collect();
        let matched_groups = self.match_list(&group_names, pattern)?;
        for group_name in &matched_groups {
            let group = self
                .groups
                .get(group_name)
                .ok_or_else(|| anyhow!("Could not find {group_name} group"))?;
            matches.extend(group.get_hosts(&self.groups, true)?);
        }

        let special_chars = ['.', '?', '*', '['];
        if matched_groups.is_empty()
            || pattern.starts_with('~')
            || pattern.chars().any(|c| special_chars.contains(&c))
        {
            let host_names: Vec<String> = self.hosts.keys().cloned().collect();
            matches.extend(self.match_list(&host_names, pattern)?);
        }

        if matches.is_empty() && LOCALHOST.contains(&pattern) {
            matches.insert(pattern.to_string());
        }

        Ok(matches.into_iter().collect())
    }

    fn match_list(&self, items: &[String], pattern_str: &str) -> Result<Vec<String>> {
        let pattern = match pattern_str.strip_prefix('~') {
            Some(regex) => Regex::new(regex)?,
            None => Regex::new(&glob_to_regex(pattern_str))?,
        };

        Ok(items
            .iter()
            .filter(|item| pattern.is_match(item))
            .cloned()
            .collect())
    }

    /// Resolved variables of a host: `all` vars, then group vars from the
    /// shallowest to the deepest group, then host vars.
    pub fn get_host_vars(&self, host: &Host) -> Vars {
        let mut host_groups: IndexSet<String> = IndexSet::new();
        for group_name in host.get_groups() {
            host_groups.insert(group_name.clone());
            if let Some(group) = self.groups.get(group_name) {
                host_groups.extend(group.get_ancestors(&self.groups));
            }
        }
        host_groups.insert(ALL_GROUP.to_string());

        let mut ordered: Vec<&Group> = host_groups
            .iter()
            .filter_map(|name| self.groups.get(name))
            .collect();
        ordered.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.name.cmp(&b.name)));

        let mut vars = Vars::new();
        for group in ordered {
            combine_vars(&mut vars, group.get_vars());
        }
        combine_vars(&mut vars, host.get_vars());
        vars.insert(
            "inventory_hostname".to_string(),
            Value::from(host.name.clone()),
        );

        vars
    }
}
