//! Thin stand-in for a full Makefile-target-discovery plugin. Exposes a
//! single `build` tool that reports whether a `Makefile` exists at a
//! configured path; it does not parse targets or execute `make`. Its
//! purpose is to demonstrate that the compile-time constructor registry and
//! allow-list support more than one independently-registered plugin kind.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::errors::BrokerResult;
use crate::plugin::Plugin;
use crate::tool::{ToolDescriptor, ToolResult};

pub struct MakefilePlugin {
    config: Map<String, Value>,
    makefile_path: String,
}

impl MakefilePlugin {
    pub fn new(config: Map<String, Value>) -> Box<dyn Plugin> {
        let makefile_path = path_from(&config);
        Box::new(Self {
            config,
            makefile_path,
        })
    }
}

fn path_from(config: &Map<String, Value>) -> String {
    config
        .get("makefile_path")
        .and_then(Value::as_str)
        .unwrap_or("Makefile")
        .to_string()
}

#[async_trait]
impl Plugin for MakefilePlugin {
    fn set_config(&mut self, config: Map<String, Value>) {
        self.makefile_path = path_from(&config);
        self.config = config;
    }

    fn get_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "build",
            "Report whether a Makefile is present at the configured path",
            json!({"type": "object", "properties": {}}),
        )
        .with_returns(json!({"type": "boolean"}))]
    }

    async fn call_tool(&self, name: &str, _args: &Map<String, Value>) -> ToolResult {
        match name {
            "build" => ToolResult::ok(json!(std::path::Path::new(&self.makefile_path).is_file())),
            other => ToolResult::err(format!("Unknown tool: {other}")),
        }
    }

    async fn initialize(&mut self) -> BrokerResult<()> {
        self.makefile_path = path_from(&self.config);
        Ok(())
    }
}
