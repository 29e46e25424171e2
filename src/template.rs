use crate::vars::{typed_scalar, Vars};
use anyhow::{anyhow, Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde_yaml::Value;

/// Renders `{{ var }}` templates in task arguments against host variables.
pub struct Templar {
    env: Environment<'static>,
}

impl Default for Templar {
    fn default() -> Self {
        Self::new()
    }
}

impl Templar {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Malformed templates are still templates; rendering rejects them.
    pub fn is_jinja_template(&self, data: &str) -> bool {
        data.contains("{{") || data.contains("{%")
    }

    /// True if any string inside `data` looks like a template.
    pub fn is_template(&self, data: &Value) -> bool {
        match data {
            Value::String(s) => self.is_jinja_template(s),
            Value::Sequence(seq) => seq.iter().any(|v| self.is_template(v)),
            Value::Mapping(map) => map.values().any(|v| self.is_template(v)),
            Value::Tagged(tagged) => self.is_template(&tagged.value),
            _ => false,
        }
    }

    pub fn render_str(&self, template: &str, vars: &Vars) -> Result<String> {
        self.env
            .render_str(template, vars)
            .with_context(|| format!("Failed to render template '{template}'"))
    }

    /// Evaluates a lone `{{ expr }}` to a typed value, so `"{{ flag }}"` stays a bool.
    pub fn eval_expression(&self, expr: &str, vars: &Vars) -> Result<Value> {
        let value = self
            .env
            .compile_expression(expr)
            .and_then(|compiled| compiled.eval(vars))
            .with_context(|| format!("Failed to evaluate '{{{{ {expr} }}}}'"))?;

        if value.is_undefined() {
            return Err(anyhow!("'{expr}' is undefined"));
        }
        serde_yaml::to_value(&value).with_context(|| format!("Cannot use the value of '{expr}'"))
    }

    /// Renders every templated string inside `data`, leaving other values as is.
    pub fn render_value(&self, data: &Value, vars: &Vars) -> Result<Value> {
        match data {
            Value::String(s) if self.is_jinja_template(s) => match single_expression(s) {
                Some(expr) => self.eval_expression(expr, vars),
                None => Ok(typed_scalar(&self.render_str(s, vars)?)),
            },
            Value::Sequence(seq) => seq
                .iter()
                .map(|v| self.render_value(v, vars))
                .collect::<Result<Vec<Value>>>()
                .map(Value::Sequence),
            Value::Mapping(map) => {
                let mut rendered = serde_yaml::Mapping::new();
                for (key, value) in map {
                    rendered.insert(key.clone(), self.render_value(value, vars)?);
                }
                Ok(Value::Mapping(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}

/// The inner expression when `template` is exactly one `{{ ... }}` block.
fn single_expression(template: &str) -> Option<&str> {
    let inner = template
        .trim()
        .strip_prefix("{{")?
        .strip_suffix("}}")?
        .trim();

    if inner.is_empty() || inner.contains("{{") || inner.contains("}}") || inner.contains("{%") {
        return None;
    }
    Some(inner)
}
