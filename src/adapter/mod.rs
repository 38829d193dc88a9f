//! Plugin adapter contract (C3).
//!
//! An adapter mediates between the plugin lifecycle (C7) and a plugin
//! implementation, whatever its transport. All three variants named in the
//! configuration schema (`in_source`, `process`, `http`) expose the same
//! operations; only `in_source` is implemented here, the other two are
//! present in the type surface as stubs that fail `config_invalid`.

pub mod http;
pub mod in_process;
pub mod process;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::BrokerResult;
use crate::tool::{ToolDescriptor, ToolResult};

/// Uniform operations the plugin lifecycle drives, independent of the
/// plugin's transport.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Must be called exactly once before any other operation.
    async fn initialize(&mut self) -> BrokerResult<()>;

    /// Immutable snapshot of the plugin's current tools.
    async fn get_tools(&self) -> BrokerResult<Vec<ToolDescriptor>>;

    /// Dispatches a call to one of the plugin's tools.
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> BrokerResult<ToolResult>;

    /// Liveness probe; returns `false` rather than erroring on plugin-side
    /// failure.
    async fn health_check(&self) -> bool;

    /// Idempotent teardown; swallows and logs plugin-side errors internally
    /// and always reaches a shut-down state.
    async fn shutdown(&mut self);

    /// Reconfigures the plugin, preferring a graceful in-place path.
    async fn reload(&mut self, new_config: Map<String, Value>) -> BrokerResult<()>;
}

pub use in_process::InProcessAdapter;
