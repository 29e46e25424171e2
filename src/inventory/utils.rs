use anyhow::{bail, Result};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

static SUBSCRIPT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
            ^
            (.+?)                    # A pattern expression ending with...
            \[(?:                    # A [subscript] expression comprising:
                (-?[0-9]+)|          # A single positive or negative number
                ([0-9]*)([:-])       # Or an x:y or x:- range (start can be empty)
                ([0-9]*)             # End number (can be empty)
            )]
            $
        ",
    )
    .expect("subscript regex is valid")
});

static HOST_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([a-zA-Z0-9]+):([a-zA-Z0-9]+)(?::(\d+))?]").expect("range regex is valid")
});

#[derive(Debug, PartialEq)]
pub struct SplitPattern {
    pub pattern: String,
    /// Inclusive (start, end); `None` end selects a single index.
    pub subscript: Option<(i32, Option<i32>)>,
}

/// Takes a pattern, checks if it has a subscript, and returns the pattern
/// without the subscript and the parsed subscript (or `None`).
pub fn split_subscript(pattern: &str) -> Result<SplitPattern> {
    // regexes are never enumerated
    if pattern.starts_with('~') {
        return Ok(SplitPattern {
            pattern: pattern.to_string(),
            subscript: None,
        });
    }

    let Some(captures) = SUBSCRIPT_REGEX.captures(pattern) else {
        return Ok(SplitPattern {
            pattern: pattern.to_string(),
            subscript: None,
        });
    };

    let trimmed_pattern = captures.get(1).map_or("", |m| m.as_str()).to_string();

    if let Some(idx_match) = captures.get(2) {
        let idx = idx_match.as_str().parse::<i32>()?;
        return Ok(SplitPattern {
            pattern: trimmed_pattern,
            subscript: Some((idx, None)),
        });
    }

    let start = match captures.get(3).map(|m| m.as_str()) {
        Some(s) if !s.is_empty() => s.parse::<i32>()?,
        _ => 0,
    };

    let end = match captures.get(5).map(|m| m.as_str()) {
        Some(s) if !s.is_empty() => s.parse::<i32>()?,
        _ => -1,
    };

    if captures.get(4).map(|m| m.as_str()) == Some("-") {
        warn!("Use [x:y] inclusive subscripts instead of [x-y] in pattern '{pattern}'");
    }

    Ok(SplitPattern {
        pattern: trimmed_pattern,
        subscript: Some((start, Some(end))),
    })
}

pub fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' | '\\' | '+' | '(' | ')' | '|' | '^' | '$' | '[' | ']' | '{' | '}' => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }
    regex.push('$');
    regex
}

/// Expands an inventory host range such as `web[01:03].example.com` or
/// `db-[a:c]`. Numeric ranges keep the zero padding of the start value.
pub fn parse_host_pattern(pattern: &str) -> Result<Vec<String>> {
    let matches: Vec<_> = HOST_RANGE_REGEX.captures_iter(pattern).collect();

    if matches.len() > 1 {
        bail!("Multiple ranges not supported: {}", pattern);
    }

    let Some(captures) = matches.first() else {
        return Ok(vec![pattern.to_string()]);
    };

    let full_match = &captures[0];
    let start = &captures[1];
    let end = &captures[2];
    let stride = captures
        .get(3)
        .map_or(Ok(1), |m| m.as_str().parse::<usize>())?;

    if stride == 0 {
        bail!("Range stride must be positive: {}", pattern);
    }

    let mut hosts = Vec::new();

    if let (Ok(start_num), Ok(end_num)) = (start.parse::<usize>(), end.parse::<usize>()) {
        let width = if start.starts_with('0') { start.len() } else { 0 };
        for i in (start_num..=end_num).step_by(stride) {
            hosts.push(pattern.replace(full_match, &format!("{i:0width$}")));
        }
    } else {
        let mut start_chars = start.chars();
        let mut end_chars = end.chars();
        match (start_chars.next(), end_chars.next()) {
            (Some(start_char), Some(end_char))
                if start_chars.next().is_none()
                    && end_chars.next().is_none()
                    && start_char.is_ascii_alphabetic()
                    && end_char.is_ascii_alphabetic() =>
            {
                for code in (start_char as u32..=end_char as u32).step_by(stride) {
                    if let Some(current_char) = char::from_u32(code) {
                        hosts.push(pattern.replace(full_match, &current_char.to_string()));
                    }
                }
            }
            _ => bail!("Invalid range in pattern: {}", pattern),
        }
    }

    if hosts.is_empty() {
        bail!("Range in pattern {} produces no hosts", pattern);
    }

    Ok(hosts)
}
