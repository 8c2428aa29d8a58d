//! Parsed tool calls and argument canonicalization.

use serde_json::{Map, Value};

use crate::{Error, ToolCall};

/// A tool call with parsed arguments. Lives only for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Parse a model tool call. Empty argument strings are an empty object;
    /// anything that isn't a JSON object is rejected.
    pub fn from_call(call: &ToolCall) -> Result<Self, Error> {
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(Error::tool(
                        &call.function.name,
                        format!("arguments must be a JSON object, got {other}"),
                    ));
                }
                Err(e) => {
                    return Err(Error::tool(
                        &call.function.name,
                        format!("invalid JSON arguments: {e}"),
                    ));
                }
            }
        };
        Ok(Self::new(call.function.name.clone(), arguments))
    }

    pub fn canonical_key(&self) -> String {
        canonicalize(&self.arguments)
    }

    /// String argument by key, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Serialize arguments with object keys sorted at every depth, so equal
/// calls compare equal regardless of key order.
pub fn canonicalize(arguments: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_object(arguments, &mut out);
    out
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(&map[key.as_str()], out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
