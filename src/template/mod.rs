//! `{name}` placeholder rendering against an [`ExecutionContext`].
//!
//! Names resolve in a fixed order:
//!
//! 1. `state[name]` (step outputs)
//! 2. `vars[name]` (declared run variables)
//! 3. `input.<path>` (dotted lookup into the input)
//! 4. `input[name]` (direct top-level input field)
//! 5. `env.<NAME>` (resolved secret under that alias, then the environment)
//! 6. `<entry>.<path>` (dotted lookup into a state or vars entry)
//!
//! Unresolved placeholders are left in place verbatim. JSON `null` counts as
//! unresolved at every stage.

use crate::engine::ExecutionContext;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

static WHOLE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([^{}]+)\}$").expect("placeholder pattern is valid"));

// ============================================================================
// Rendering
// ============================================================================

/// Render a single value. Strings are substituted, everything else is
/// returned unchanged.
pub fn render(template: &Value, ctx: &ExecutionContext) -> Value {
    match template {
        Value::String(s) => render_str(s, ctx),
        other => other.clone(),
    }
}

/// Render a template string.
///
/// A string that is exactly one placeholder yields the resolved value
/// itself, so `"{profile}"` can produce an object. Placeholders embedded in
/// surrounding text are stringified.
pub fn render_str(template: &str, ctx: &ExecutionContext) -> Value {
    if !template.contains('{') {
        return Value::String(template.to_string());
    }

    if let Some(caps) = WHOLE_PLACEHOLDER.captures(template) {
        return match resolve_variable(caps[1].trim(), ctx) {
            Some(value) => value,
            None => Value::String(template.to_string()),
        };
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        match resolve_variable(caps[1].trim(), ctx) {
            Some(value) => stringify(&value),
            None => caps[0].to_string(),
        }
    });
    Value::String(rendered.into_owned())
}

/// Render a template string and stringify the result.
pub fn render_string(template: &str, ctx: &ExecutionContext) -> String {
    stringify(&render_str(template, ctx))
}

/// Render a nested structure. Arrays keep order and length, object keys
/// and values are both rendered.
pub fn render_object(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| render_object(v, ctx)).collect()),
        Value::Object(map) => {
            let rendered = map
                .iter()
                .map(|(key, val)| (render_string(key, ctx), render_object(val, ctx)))
                .collect();
            Value::Object(rendered)
        }
        other => render(other, ctx),
    }
}

/// Text form of a value: strings verbatim, everything else as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truth value of a rendered guard.
///
/// `null`, `false`, `0`, `""` and the string `"false"` (any case) are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && !s.eq_ignore_ascii_case("false")
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// Variable Resolution
// ============================================================================

/// Resolve a placeholder name against the context.
pub fn resolve_variable(name: &str, ctx: &ExecutionContext) -> Option<Value> {
    if let Some(value) = defined(ctx.state().get(name)) {
        return Some(value.clone());
    }

    if let Some(value) = defined(ctx.vars().get(name)) {
        return Some(value.clone());
    }

    if let Some(path) = name.strip_prefix("input.") {
        if let Some(value) = lookup_path(ctx.input(), path) {
            return Some(value.clone());
        }
    }

    if let Some(value) = defined(ctx.input().get(name)) {
        return Some(value.clone());
    }

    if let Some(var) = name.strip_prefix("env.") {
        if let Some(secret) = ctx.secret(var) {
            return Some(Value::String(secret.to_string()));
        }
        if let Some(value) = ctx.env().var(var) {
            return Some(Value::String(value));
        }
    }

    if let Some((head, rest)) = name.split_once('.') {
        let root = defined(ctx.state().get(head)).or_else(|| defined(ctx.vars().get(head)));
        if let Some(value) = root.and_then(|root| lookup_path(root, rest)) {
            return Some(value.clone());
        }
    }

    None
}

/// Walk a `.`-separated path through objects (and arrays by index).
/// Stops at the first missing or `null` segment.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = defined(next)?;
    }
    Some(current)
}

fn defined(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
