//! The plugin-author-facing interface.
//!
//! A plugin implementation provides a constructor taking the merged config
//! map, `get_tools`/`call_tool`, and optionally overrides the lifecycle
//! hooks. The default hooks make a minimal plugin (no init/shutdown logic,
//! always healthy, reload = shutdown + re-init) trivial to write.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::BrokerResult;
use crate::tool::{ToolDescriptor, ToolResult};

/// Interface every in-process plugin implements.
///
/// Constructors are registered into the compile-time registry in
/// [`crate::plugins`] rather than discovered by reflection, so the set of
/// loadable modules is fixed at build time and gated by an explicit
/// namespace allow-list instead of an open `dlopen`/import path.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called exactly once before any tool call. Default is a no-op.
    async fn initialize(&mut self) -> BrokerResult<()> {
        Ok(())
    }

    /// Idempotent teardown. Default is a no-op.
    async fn shutdown(&mut self) -> BrokerResult<()> {
        Ok(())
    }

    /// Liveness probe. Default reports healthy.
    async fn health_check(&self) -> bool {
        true
    }

    /// Returns the plugin's current tool set. Called after `initialize` and
    /// again after any successful reload.
    fn get_tools(&self) -> Vec<ToolDescriptor>;

    /// Dispatches a call to one of this plugin's tools by local name.
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> ToolResult;

    /// Graceful reconfiguration that retains instance identity. The default
    /// implementation shuts down and re-initializes with the new config;
    /// override when the plugin can apply the new config in place.
    ///
    /// `new_config` has already been merged the same way the constructor's
    /// config was (construction config wins on conflicts).
    async fn on_config_reload(&mut self, new_config: Map<String, Value>) -> BrokerResult<()> {
        self.set_config(new_config);
        self.shutdown().await?;
        self.initialize().await
    }

    /// Replaces the plugin's stored config without otherwise acting on it.
    /// Used by the default `on_config_reload` and by adapters that choose
    /// the shutdown-then-initialize path directly.
    fn set_config(&mut self, config: Map<String, Value>);
}

/// Signature every builtin plugin registers under its `module` key: given
/// the merged construction config, produce a boxed plugin instance.
pub type PluginConstructor = fn(Map<String, Value>) -> Box<dyn Plugin>;
