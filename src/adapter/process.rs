//! Process adapter stub. Present in the type surface so `PluginType::Process`
//! round-trips through configuration validation; instantiation fails
//! `config_invalid` until a real subprocess/JSON-over-stdio transport is
//! implemented.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::adapter::Adapter;
use crate::errors::{BrokerError, BrokerResult};
use crate::tool::{ToolDescriptor, ToolResult};

pub struct ProcessAdapter;

impl ProcessAdapter {
    pub fn new(name: &str, _command: &str) -> BrokerResult<Self> {
        Err(BrokerError::config_invalid(
            "process plugin adapter is not implemented",
        )
        .with_plugin(name.to_string()))
    }
}

#[async_trait]
impl Adapter for ProcessAdapter {
    async fn initialize(&mut self) -> BrokerResult<()> {
        unreachable!("ProcessAdapter::new always fails before an instance can be initialized")
    }

    async fn get_tools(&self) -> BrokerResult<Vec<ToolDescriptor>> {
        unreachable!()
    }

    async fn call_tool(&self, _name: &str, _args: &Map<String, Value>) -> BrokerResult<ToolResult> {
        unreachable!()
    }

    async fn health_check(&self) -> bool {
        false
    }

    async fn shutdown(&mut self) {}

    async fn reload(&mut self, _new_config: Map<String, Value>) -> BrokerResult<()> {
        unreachable!()
    }
}
