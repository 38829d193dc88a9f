//! Demonstration plugin exposing three tools: `echo`, `add`, `slow`. Used
//! by this crate's own integration tests as a known-good, always-loadable
//! plugin.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::plugin::Plugin;
use crate::tool::{ToolDescriptor, ToolResult};

pub struct DummyPlugin {
    config: Map<String, Value>,
    prefix: String,
    initialized: bool,
}

impl DummyPlugin {
    pub fn new(config: Map<String, Value>) -> Box<dyn Plugin> {
        let prefix = prefix_from(&config);
        Box::new(Self {
            config,
            prefix,
            initialized: false,
        })
    }
}

fn prefix_from(config: &Map<String, Value>) -> String {
    config
        .get("prefix")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl Plugin for DummyPlugin {
    async fn initialize(&mut self) -> crate::errors::BrokerResult<()> {
        // Re-read the prefix in case it changed across a reload.
        self.prefix = prefix_from(&self.config);
        self.initialized = true;
        Ok(())
    }

    async fn shutdown(&mut self) -> crate::errors::BrokerResult<()> {
        self.initialized = false;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.initialized
    }

    fn set_config(&mut self, config: Map<String, Value>) {
        self.config = config;
    }

    fn get_tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "echo",
                "Echo the input message back",
                json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string", "description": "The message to echo"},
                    },
                    "required": ["message"],
                }),
            )
            .with_returns(json!({"type": "string"})),
            ToolDescriptor::new(
                "add",
                "Add two numbers together",
                json!({
                    "type": "object",
                    "properties": {
                        "a": {"type": "integer", "description": "First number"},
                        "b": {"type": "integer", "description": "Second number"},
                    },
                    "required": ["a", "b"],
                }),
            )
            .with_returns(json!({"type": "integer"})),
            ToolDescriptor::new(
                "slow",
                "Sleep for a specified duration then return",
                json!({
                    "type": "object",
                    "properties": {
                        "seconds": {"type": "number", "description": "Number of seconds to sleep"},
                    },
                    "required": ["seconds"],
                }),
            )
            .with_returns(json!({"type": "string"})),
        ]
    }

    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> ToolResult {
        if !self.initialized {
            return ToolResult::err("Plugin not initialized");
        }
        match name {
            "echo" => self.echo(args),
            "add" => self.add(args),
            "slow" => self.slow(args).await,
            other => ToolResult::err(format!("Unknown tool: {other}")),
        }
    }
}

impl DummyPlugin {
    fn echo(&self, args: &Map<String, Value>) -> ToolResult {
        let message = args.get("message").and_then(Value::as_str).unwrap_or("");
        ToolResult::ok(json!(format!("{}{}", self.prefix, message)))
    }

    fn add(&self, args: &Map<String, Value>) -> ToolResult {
        let a = args.get("a").and_then(Value::as_i64);
        let b = args.get("b").and_then(Value::as_i64);
        match (a, b) {
            (Some(a), Some(b)) => ToolResult::ok(json!(a + b)),
            _ => ToolResult::err("Invalid arguments: a and b must be integers"),
        }
    }

    async fn slow(&self, args: &Map<String, Value>) -> ToolResult {
        let seconds = args.get("seconds").and_then(Value::as_f64).unwrap_or(1.0);
        if seconds < 0.0 {
            return ToolResult::err("Sleep duration must be non-negative");
        }
        tokio::time::sleep(std::time::Duration::from_secs_f64(seconds)).await;
        ToolResult::ok(json!(format!("Slept for {seconds} seconds")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(prefix: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("prefix".to_string(), json!(prefix));
        m
    }

    #[tokio::test]
    async fn echo_applies_prefix() {
        let mut plugin = DummyPlugin::new(cfg("Hi: "));
        plugin.initialize().await.unwrap();
        let mut args = Map::new();
        args.insert("message".to_string(), json!("there"));
        let result = plugin.call_tool("echo", &args).await;
        match result {
            ToolResult::Ok { data } => assert_eq!(data, json!("Hi: there")),
            ToolResult::Err { message } => panic!("unexpected error: {message}"),
        }
    }

    #[tokio::test]
    async fn add_rejects_non_numeric() {
        let mut plugin = DummyPlugin::new(cfg(""));
        plugin.initialize().await.unwrap();
        let mut args = Map::new();
        args.insert("a".to_string(), json!("nope"));
        args.insert("b".to_string(), json!(1));
        let result = plugin.call_tool("add", &args).await;
        assert!(!result.is_ok());
    }

    #[tokio::test]
    async fn uninitialized_plugin_rejects_calls() {
        let plugin = DummyPlugin::new(cfg(""));
        let result = plugin.call_tool("echo", &Map::new()).await;
        assert!(!result.is_ok());
    }

    #[tokio::test]
    async fn reload_picks_up_new_prefix() {
        let mut plugin = DummyPlugin::new(cfg("Old: "));
        plugin.initialize().await.unwrap();
        plugin.on_config_reload(cfg("New: ")).await.unwrap();
        let mut args = Map::new();
        args.insert("message".to_string(), json!("hi"));
        let result = plugin.call_tool("echo", &args).await;
        match result {
            ToolResult::Ok { data } => assert_eq!(data, json!("New: hi")),
            ToolResult::Err { message } => panic!("unexpected error: {message}"),
        }
    }
}
