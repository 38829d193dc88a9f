//! Tool descriptors and call results (C2).
//!
//! A [`ToolDescriptor`] carries no behavior: it is created by a plugin,
//! registered under a fully-qualified name, and copied freely by the
//! registry and bridge. A [`ToolResult`] is the discriminated outcome of a
//! tool invocation as returned by a plugin's `call_tool`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable, plugin-authored tool description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Identifier unique within the owning plugin (no `.`).
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the call arguments.
    pub parameters: Value,
    /// JSON-Schema object describing the return payload; may be empty.
    #[serde(default = "empty_schema")]
    pub returns: Value,
}

fn empty_schema() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            returns: empty_schema(),
        }
    }

    pub fn with_returns(mut self, returns: Value) -> Self {
        self.returns = returns;
        self
    }
}

/// The result of a tool invocation: either a success payload or an error
/// message. Never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResult {
    Ok { data: Value },
    Err { message: String },
}

impl ToolResult {
    pub fn ok(data: impl Into<Value>) -> Self {
        ToolResult::Ok { data: data.into() }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ToolResult::Err {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok { .. })
    }
}

/// Splits a fully-qualified name `"{plugin}.{tool}"` into its two parts.
///
/// Returns `None` if `fqn` does not contain the reserved `.` separator.
pub fn split_fqn(fqn: &str) -> Option<(&str, &str)> {
    fqn.split_once('.')
}

/// Builds the fully-qualified name for a plugin/tool pair.
pub fn make_fqn(plugin: &str, tool: &str) -> String {
    format!("{plugin}.{tool}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqn_round_trips() {
        let fqn = make_fqn("dummy", "echo");
        assert_eq!(fqn, "dummy.echo");
        assert_eq!(split_fqn(&fqn), Some(("dummy", "echo")));
    }

    #[test]
    fn fqn_without_separator_is_none() {
        assert_eq!(split_fqn("noseparator"), None);
    }

    #[test]
    fn tool_result_discriminates() {
        let ok = ToolResult::ok(serde_json::json!("hi"));
        assert!(ok.is_ok());
        let err = ToolResult::err("boom");
        assert!(!err.is_ok());
    }
}
