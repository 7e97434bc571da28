//! `${ENV_VAR}` resolution over a parsed config tree.
//!
//! Strings in required positions fail with [`Error::MissingEnvVar`] when a
//! referenced variable is unset. Anything beneath a key listed in
//! [`OPTIONAL_SECTIONS`] is optional instead: an unresolvable string is
//! dropped from its parent mapping or array.

use {
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::error::{Error, Result};

/// Keys whose whole subtree tolerates unset variables.
pub const OPTIONAL_SECTIONS: &[&str] = &["headers", "env"];

/// Outcome of substituting a single string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    Value(String),
    /// An optional string referenced an unset variable and should be omitted.
    Removed,
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Replace every `${NAME}` in `input` from the process environment.
///
/// Set-but-empty variables count as unset. A `${` without a closing brace is
/// kept literally.
pub fn substitute_env(input: &str, required: bool) -> Result<Substitution> {
    substitute_env_with(input, required, &process_env)
}

/// Resolve placeholders throughout a config tree using the process environment.
pub fn resolve_config(tree: &Value) -> Result<Value> {
    resolve_config_with(tree, &process_env)
}

pub(crate) fn substitute_env_with(
    input: &str,
    required: bool,
    lookup: Lookup<'_>,
) -> Result<Substitution> {
    let mut out = String::with_capacity(input.len());
    let mut missing: Vec<String> = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            out.push(ch);
            continue;
        }
        chars.next();

        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }

        if !closed || name.is_empty() {
            out.push_str("${");
            out.push_str(&name);
            if closed {
                out.push('}');
            }
            continue;
        }

        match lookup(&name).filter(|v| !v.is_empty()) {
            Some(value) => out.push_str(&value),
            None => {
                if !missing.contains(&name) {
                    missing.push(name);
                }
            },
        }
    }

    if missing.is_empty() {
        Ok(Substitution::Value(out))
    } else if required {
        Err(Error::MissingEnvVar { names: missing })
    } else {
        Ok(Substitution::Removed)
    }
}

pub(crate) fn resolve_config_with(tree: &Value, lookup: Lookup<'_>) -> Result<Value> {
    Ok(resolve_value(tree, false, lookup)?.unwrap_or(Value::Null))
}

/// `None` means the value resolved to [`Substitution::Removed`].
fn resolve_value(value: &Value, optional: bool, lookup: Lookup<'_>) -> Result<Option<Value>> {
    match value {
        Value::String(s) => match substitute_env_with(s, !optional, lookup)? {
            Substitution::Value(v) => Ok(Some(Value::String(v))),
            Substitution::Removed => Ok(None),
        },
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = resolve_value(item, optional, lookup)? {
                    resolved.push(v);
                }
            }
            Ok(Some(Value::Array(resolved)))
        },
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, child) in map {
                let child_optional = optional || OPTIONAL_SECTIONS.contains(&key.as_str());
                match resolve_value(child, child_optional, lookup)? {
                    Some(v) => {
                        resolved.insert(key.clone(), v);
                    },
                    None => debug!(key = %key, "dropping config entry with unset variable"),
                }
            }
            Ok(Some(Value::Object(resolved)))
        },
        other => Ok(Some(other.clone())),
    }
}
