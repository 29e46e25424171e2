use indexmap::IndexMap;
use serde_yaml::Value;

/// Ordered variable scope. Later inserts override earlier ones.
pub type Vars = IndexMap<String, Value>;

/// Overlays `other` onto `base`, key by key. Nested mappings are replaced, not merged.
pub fn combine_vars(base: &mut Vars, other: &Vars) {
    for (key, value) in other {
        base.insert(key.clone(), value.clone());
    }
}

/// Converts a YAML mapping with string keys into `Vars`, dropping non-string keys.
pub fn vars_from_mapping(mapping: &serde_yaml::Mapping) -> Vars {
    mapping
        .iter()
        .filter_map(|(key, value)| key.as_str().map(|k| (k.to_string(), value.clone())))
        .collect()
}

/// Reads a string-ish variable; numbers and bools are rendered as text.
pub fn var_as_string(vars: &Vars, key: &str) -> Option<String> {
    match vars.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads `raw` as a YAML bool or number, otherwise keeps it as a string.
pub fn typed_scalar(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}
