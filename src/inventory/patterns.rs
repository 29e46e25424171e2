use log::warn;
use std::fs;
use std::path::Path;

/// Application order of host pattern terms: plain terms first, then
/// intersections, then exclusions.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum PatternType {
    Include,
    Intersection,
    Exclude,
}

pub struct PatternResolver;

impl PatternResolver {
    pub fn get_pattern_priority(pattern: &str) -> PatternType {
        match pattern.chars().next() {
            Some('!') => PatternType::Exclude,
            Some('&') => PatternType::Intersection,
            _ => PatternType::Include,
        }
    }

    /// Splits a comma separated pattern into trimmed, non-empty terms.
    pub fn split_patterns(pattern: &str) -> Vec<String> {
        pattern
            .trim_start_matches('\'')
            .trim_end_matches('\'')
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Replaces `@file` terms with the patterns listed in that file.
    pub fn resolve_patterns(patterns: &[String]) -> Vec<String> {
        let mut resolved_patterns = Vec::new();

        for pattern in patterns {
            if let Some(file_patterns) = PatternResolver::read_patterns_from_file(pattern) {
                resolved_patterns.extend(file_patterns);
            } else if !pattern.starts_with('@') {
                resolved_patterns.push(pattern.clone());
            }
        }

        resolved_patterns
    }

    /// Resolves files, sorts terms by application order, and adds an implicit
    /// `all` when only intersections and exclusions are given.
    pub fn resolve_and_sort_patterns(patterns: &[String]) -> Vec<String> {
        let mut resolved_patterns = PatternResolver::resolve_patterns(patterns);

        if !resolved_patterns.is_empty()
            && resolved_patterns
                .iter()
                .all(|p| p.starts_with('!') || p.starts_with('&'))
        {
            resolved_patterns.push("all".to_string());
        }

        // stable sort keeps the user's order within a priority class
        resolved_patterns.sort_by_key(|p| PatternResolver::get_pattern_priority(p));

        resolved_patterns
    }

    pub fn read_patterns_from_file(pattern: &str) -> Option<Vec<String>> {
        let filename = pattern.strip_prefix('@')?;
        let path = Path::new(filename);

        if !path.is_file() {
            warn!(
                "Pattern '{}' references a file that doesn't exist: {}",
                pattern, filename
            );
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => Some(
                content
                    .lines()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .collect(),
            ),
            Err(err) => {
                warn!("Could not read file '{}': {}", filename, err);
                None
            }
        }
    }
}
