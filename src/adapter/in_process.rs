//! In-process adapter (C4): loads a plugin implementation from the
//! compile-time constructor registry, gated by a namespace allow-list.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::adapter::Adapter;
use crate::errors::{BrokerError, BrokerResult};
use crate::plugin::Plugin;
use crate::plugins;
use crate::tool::{ToolDescriptor, ToolResult};

pub struct InProcessAdapter {
    name: String,
    module: String,
    /// The plugin-specific `config` map from the plugin's settings entry.
    /// Serves as both construction config and per-call config, since this
    /// crate's configuration schema carries only one config source per
    /// plugin (see DESIGN.md).
    config: Map<String, Value>,
    plugin: Option<Box<dyn Plugin>>,
}

impl InProcessAdapter {
    /// Validates `module` against `allowed_prefixes` and returns an adapter
    /// ready for `initialize`. Fails `config_invalid` before any loading if
    /// the module is outside the allow-list.
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        config: Map<String, Value>,
        allowed_prefixes: &[String],
    ) -> BrokerResult<Self> {
        let name = name.into();
        let module = module.into();
        if !plugins::is_allowed(&module, allowed_prefixes) {
            return Err(BrokerError::config_invalid(format!(
                "module path not in allowed namespace: {module}"
            ))
            .with_plugin(name));
        }
        Ok(Self {
            name,
            module,
            config,
            plugin: None,
        })
    }
}

#[async_trait]
impl Adapter for InProcessAdapter {
    async fn initialize(&mut self) -> BrokerResult<()> {
        let ctor = plugins::lookup(&self.module).ok_or_else(|| {
            BrokerError::new(
                crate::errors::ErrorKind::LoadFailed,
                format!("no plugin registered for module: {}", self.module),
            )
            .with_plugin(self.name.clone())
        })?;

        let mut plugin = ctor(self.config.clone());
        plugin.initialize().await.map_err(|e| {
            BrokerError::new(
                crate::errors::ErrorKind::InitFailed,
                format!("failed to initialize plugin: {}", e.message),
            )
            .with_plugin(self.name.clone())
            .with_cause(e)
        })?;
        self.plugin = Some(plugin);
        tracing::info!(plugin = %self.name, module = %self.module, "plugin_loaded");
        Ok(())
    }

    async fn get_tools(&self) -> BrokerResult<Vec<ToolDescriptor>> {
        match &self.plugin {
            Some(p) => Ok(p.get_tools()),
            None => Err(BrokerError::plugin_unhealthy(self.name.clone())),
        }
    }

    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> BrokerResult<ToolResult> {
        match &self.plugin {
            Some(p) => Ok(p.call_tool(name, args).await),
            None => Err(BrokerError::plugin_unhealthy(self.name.clone())),
        }
    }

    async fn health_check(&self) -> bool {
        match &self.plugin {
            Some(p) => p.health_check().await,
            None => false,
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut p) = self.plugin.take() {
            if let Err(e) = p.shutdown().await {
                tracing::error!(plugin = %self.name, error = %e, "plugin_shutdown_error");
            } else {
                tracing::info!(plugin = %self.name, "plugin_shutdown");
            }
        }
    }

    async fn reload(&mut self, new_config: Map<String, Value>) -> BrokerResult<()> {
        let plugin = self.plugin.as_mut().ok_or_else(|| {
            BrokerError::plugin_unhealthy(self.name.clone())
        })?;

        match plugin.on_config_reload(new_config.clone()).await {
            Ok(()) => {
                self.config = new_config;
                tracing::info!(plugin = %self.name, "plugin_reloaded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(plugin = %self.name, error = %e, "plugin_reload_error");
                Err(BrokerError::new(
                    crate::errors::ErrorKind::InitFailed,
                    format!("failed to reload plugin: {}", e.message),
                )
                .with_plugin(self.name.clone())
                .with_cause(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn allowed() -> Vec<String> {
        plugins::DEFAULT_ALLOWED_PREFIXES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn disallowed_module_fails_at_construction() {
        let err = InProcessAdapter::new("bad", "evil.module", Map::new(), &allowed())
            .expect_err("should reject");
        assert_eq!(err.kind, crate::errors::ErrorKind::ConfigInvalid);
    }

    #[tokio::test]
    async fn unregistered_module_fails_load() {
        let mut adapter = InProcessAdapter::new(
            "missing",
            "opencuff.plugins.builtin.nonexistent",
            Map::new(),
            &allowed(),
        )
        .unwrap();
        let err = adapter.initialize().await.expect_err("should fail");
        assert_eq!(err.kind, crate::errors::ErrorKind::LoadFailed);
    }

    #[tokio::test]
    async fn dummy_round_trips_through_adapter() {
        let mut config = Map::new();
        config.insert("prefix".to_string(), json!("Hi: "));
        let mut adapter = InProcessAdapter::new(
            "dummy",
            "opencuff.plugins.builtin.dummy",
            config,
            &allowed(),
        )
        .unwrap();
        adapter.initialize().await.unwrap();
        let tools = adapter.get_tools().await.unwrap();
        assert_eq!(tools.len(), 3);

        let mut args = Map::new();
        args.insert("message".to_string(), json!("there"));
        let result = adapter.call_tool("echo", &args).await.unwrap();
        assert!(result.is_ok());

        adapter.shutdown().await;
        assert!(!adapter.health_check().await);
    }
}
