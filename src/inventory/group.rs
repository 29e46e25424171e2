use crate::vars::Vars;
use anyhow::{anyhow, bail, Result};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use serde_yaml::Value;

#[derive(Clone, Debug)]
pub struct Group {
    pub name: String,
    depth: u32,
    vars: Vars,
    hosts: Vec<String>,
    child_groups: Vec<String>,
    parent_groups: Vec<String>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Group {
            name: name.to_string(),
            depth: 0,
            vars: Vars::new(),
            hosts: Vec::new(),
            child_groups: Vec::new(),
            parent_groups: Vec::new(),
        }
    }

    pub fn add_host(&mut self, host_name: &str) {
        let name = host_name.to_string();
        if !self.hosts.contains(&name) {
            self.hosts.push(name);
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn get_vars(&self) -> &Vars {
        &self.vars
    }

    pub fn set_variable(&mut self, key: &str, value: Value) {
        self.vars.insert(key.to_string(), value);
    }

    pub fn child_groups(&self) -> &[String] {
        &self.child_groups
    }

    pub fn parent_groups(&self) -> &[String] {
        &self.parent_groups
    }

    /// Host names of this group, optionally including all descendant groups.
    /// Own hosts come first, then descendants in breadth-first order.
    pub fn get_hosts(
        &self,
        groups: &IndexMap<String, Group>,
        include_children: bool,
    ) -> Result<Vec<String>> {
        let mut hosts: IndexSet<String> = self.hosts.iter().cloned().collect();

        if include_children {
            for descendant in self.get_descendants(groups) {
                let group = groups
                    .get(&descendant)
                    .ok_or_else(|| anyhow!("Could not find {descendant} group"))?;
                hosts.extend(group.hosts.iter().cloned());
            }
        }

        Ok(hosts.into_iter().collect())
    }

    fn walk_relationships(&self, groups: &IndexMap<String, Group>, parent: bool) -> Vec<String> {
        let next = |group: &Group| -> Vec<String> {
            if parent {
                group.parent_groups.clone()
            } else {
                group.child_groups.clone()
            }
        };

        let mut relations: IndexSet<String> = IndexSet::new();
        let mut unprocessed = next(self);

        while !unprocessed.is_empty() {
            let mut new_unprocessed = Vec::new();

            for group_name in unprocessed {
                if group_name == self.name || !relations.insert(group_name.clone()) {
                    continue;
                }

                match groups.get(&group_name) {
                    Some(group) => new_unprocessed.extend(next(group)),
                    None => warn!("Group {group_name} was not found in group collection"),
                }
            }

            unprocessed = new_unprocessed;
        }

        relations.into_iter().collect()
    }

    pub fn get_ancestors(&self, groups: &IndexMap<String, Group>) -> Vec<String> {
        self.walk_relationships(groups, true)
    }

    pub fn get_descendants(&self, groups: &IndexMap<String, Group>) -> Vec<String> {
        self.walk_relationships(groups, false)
    }
}

/// Links `child` under `parent`, creating the child group if needed, and
/// pushes the depth of the child subtree below the parent.
pub fn add_child_group(
    groups: &mut IndexMap<String, Group>,
    parent_name: &str,
    child_name: &str,
) -> Result<()> {
    if parent_name == child_name {
        bail!("Can't add group to itself: {child_name}!");
    }

    let parent = groups
        .get(parent_name)
        .ok_or_else(|| anyhow!("Could not find {parent_name} group"))?;

    if parent.child_groups.iter().any(|c| c == child_name) {
        debug!("Group '{child_name}' already exists in '{parent_name}'");
        return Ok(());
    }

    if parent.get_ancestors(groups).iter().any(|a| a == child_name) {
        bail!(
            "Adding group '{child_name}' as child to '{parent_name}' creates recursive dependency loop."
        );
    }

    let parent_depth = parent.depth;

    debug!("Adding child group '{child_name}' to '{parent_name}'");

    if let Some(parent) = groups.get_mut(parent_name) {
        parent.child_groups.push(child_name.to_string());
    }

    let child = groups
        .entry(child_name.to_string())
        .or_insert_with(|| Group::new(child_name));
    if !child.parent_groups.iter().any(|p| p == parent_name) {
        child.parent_groups.push(parent_name.to_string());
    }

    propagate_depth(groups, child_name, parent_depth + 1);

    Ok(())
}

fn propagate_depth(groups: &mut IndexMap<String, Group>, start: &str, depth: u32) {
    let mut unprocessed = vec![(start.to_string(), depth)];

    while let Some((group_name, depth)) = unprocessed.pop() {
        let Some(group) = groups.get_mut(&group_name) else {
            continue;
        };

        if group.depth >= depth {
            continue;
        }

        group.depth = depth;
        for child in &group.child_groups {
            unprocessed.push((child.clone(), depth + 1));
        }
    }
}
