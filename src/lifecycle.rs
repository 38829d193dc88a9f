//! Plugin lifecycle (C7): the per-plugin state machine driving load, unload,
//! reload, and bounded recovery through a single adapter instance.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::adapter::http::HttpAdapter;
use crate::adapter::in_process::InProcessAdapter;
use crate::adapter::process::ProcessAdapter;
use crate::adapter::Adapter;
use crate::barrier::RequestBarrier;
use crate::config::{PluginConfig, PluginType};
use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use crate::registry::ToolRegistry;
use crate::tool::ToolResult;

/// One of the five states a configured plugin can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Initializing,
    Active,
    Error,
    Recovering,
}

/// A single plugin's state machine, owning its adapter and the request
/// barrier that serializes its tool calls against its own reloads.
pub struct PluginLifecycle {
    name: String,
    config: RwLock<PluginConfig>,
    registry: Arc<ToolRegistry>,
    allowed_prefixes: Arc<Vec<String>>,
    state: RwLock<PluginState>,
    adapter: RwLock<Option<Box<dyn Adapter>>>,
    barrier: RequestBarrier,
    restart_count: RwLock<u32>,
}

impl PluginLifecycle {
    pub fn new(
        name: impl Into<String>,
        config: PluginConfig,
        registry: Arc<ToolRegistry>,
        allowed_prefixes: Arc<Vec<String>>,
        queue_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            config: RwLock::new(config),
            registry,
            allowed_prefixes,
            state: RwLock::new(PluginState::Unloaded),
            adapter: RwLock::new(None),
            barrier: RequestBarrier::new(queue_timeout),
            restart_count: RwLock::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> PluginState {
        *self.state.read().await
    }

    pub async fn config(&self) -> PluginConfig {
        self.config.read().await.clone()
    }

    pub async fn restart_count(&self) -> u32 {
        *self.restart_count.read().await
    }

    fn build_adapter(&self, config: &PluginConfig) -> BrokerResult<Box<dyn Adapter>> {
        match config.plugin_type {
            PluginType::InSource => {
                let module = config.module.clone().ok_or_else(|| {
                    BrokerError::config_invalid("in_source plugin requires 'module'")
                        .with_plugin(self.name.clone())
                })?;
                Ok(Box::new(InProcessAdapter::new(
                    self.name.clone(),
                    module,
                    config.config.clone(),
                    &self.allowed_prefixes,
                )?))
            }
            PluginType::Process => {
                let command = config.command.clone().unwrap_or_default();
                Ok(Box::new(ProcessAdapter::new(&self.name, &command)?))
            }
            PluginType::Http => {
                let endpoint = config.endpoint.clone().unwrap_or_default();
                Ok(Box::new(HttpAdapter::new(&self.name, &endpoint)?))
            }
        }
    }

    /// `unloaded -> initializing -> {active, error}`. Fails if called from
    /// any state other than `unloaded`.
    pub async fn load(&self) -> BrokerResult<()> {
        {
            let mut state = self.state.write().await;
            if *state != PluginState::Unloaded {
                return Err(BrokerError::new(
                    ErrorKind::LoadFailed,
                    format!("cannot load plugin from state {:?}", *state),
                )
                .with_plugin(self.name.clone()));
            }
            *state = PluginState::Initializing;
        }

        let config = self.config.read().await.clone();
        let result = self.do_load(&config).await;
        match &result {
            Ok(()) => {
                *self.state.write().await = PluginState::Active;
                tracing::info!(plugin = %self.name, "plugin_loaded");
            }
            Err(e) => {
                *self.state.write().await = PluginState::Error;
                tracing::error!(plugin = %self.name, error = %e, "plugin_load_failed");
            }
        }
        result
    }

    async fn do_load(&self, config: &PluginConfig) -> BrokerResult<()> {
        let mut adapter = self.build_adapter(config)?;
        adapter.initialize().await?;
        let tools = adapter.get_tools().await?;
        self.registry.register_tools(&self.name, tools).await?;
        *self.adapter.write().await = Some(adapter);
        Ok(())
    }

    /// Unregisters tools, shuts down the adapter, and always reaches
    /// `unloaded` — shutdown errors are logged, never propagated.
    pub async fn unload(&self) {
        self.registry.unregister_plugin(&self.name).await;
        if let Some(mut adapter) = self.adapter.write().await.take() {
            adapter.shutdown().await;
        }
        *self.state.write().await = PluginState::Unloaded;
        tracing::info!(plugin = %self.name, "plugin_unloaded");
    }

    /// Reconfigures the plugin inside the request barrier's reload scope:
    /// unregisters current tools before touching the adapter, then either
    /// calls the adapter's own `reload` or falls back to a fresh load.
    pub async fn reload(&self, new_config: Option<PluginConfig>) -> BrokerResult<()> {
        self.barrier
            .reload_scope(|| async {
                self.registry.unregister_plugin(&self.name).await;

                if let Some(cfg) = new_config {
                    *self.config.write().await = cfg;
                }
                let config = self.config.read().await.clone();

                let result = self.do_reload(&config).await;
                match &result {
                    Ok(()) => {
                        *self.state.write().await = PluginState::Active;
                        tracing::info!(plugin = %self.name, "plugin_reloaded");
                    }
                    Err(e) => {
                        *self.state.write().await = PluginState::Error;
                        tracing::error!(plugin = %self.name, error = %e, "plugin_reload_failed");
                    }
                }
                result
            })
            .await
    }

    async fn do_reload(&self, config: &PluginConfig) -> BrokerResult<()> {
        let mut guard = self.adapter.write().await;
        if let Some(adapter) = guard.as_mut() {
            adapter.reload(config.config.clone()).await?;
            let tools = adapter.get_tools().await?;
            drop(guard);
            self.registry.register_tools(&self.name, tools).await?;
            Ok(())
        } else {
            drop(guard);
            self.do_load(config).await
        }
    }

    /// Dispatches a tool call through the request barrier; fails
    /// `plugin_unhealthy` unless the plugin is `active`.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> BrokerResult<ToolResult> {
        self.barrier
            .request_scope(|| async {
                if *self.state.read().await != PluginState::Active {
                    return Err(BrokerError::plugin_unhealthy(self.name.clone()));
                }
                let guard = self.adapter.read().await;
                match guard.as_ref() {
                    Some(adapter) => adapter.call_tool(tool_name, args).await,
                    None => Err(BrokerError::plugin_unhealthy(self.name.clone())),
                }
            })
            .await?
    }

    /// Liveness probe; only meaningful while `active`.
    pub async fn health_check(&self) -> bool {
        if *self.state.read().await != PluginState::Active {
            return false;
        }
        match self.adapter.read().await.as_ref() {
            Some(adapter) => adapter.health_check().await,
            None => false,
        }
    }

    /// `error -> recovering -> {active, error, unloaded}`. No-op (returns
    /// `true`) if the plugin is not currently in `error`. Increments
    /// `restart_count`; after exceeding `max_restarts` the plugin is retired
    /// to `unloaded` rather than cycling through `error` forever.
    pub async fn recover(&self, max_restarts: u32) -> bool {
        if *self.state.read().await != PluginState::Error {
            return true;
        }
        *self.state.write().await = PluginState::Recovering;

        let attempt = {
            let mut count = self.restart_count.write().await;
            *count += 1;
            *count
        };

        if attempt > max_restarts {
            tracing::error!(
                plugin = %self.name,
                attempt,
                max_restarts,
                "plugin_recovery_exhausted"
            );
            *self.state.write().await = PluginState::Unloaded;
            return false;
        }

        match self.reload(None).await {
            Ok(()) => {
                *self.restart_count.write().await = 0;
                tracing::info!(plugin = %self.name, attempt, "plugin_recovered");
                true
            }
            Err(e) => {
                tracing::error!(plugin = %self.name, error = %e, attempt, "plugin_recovery_failed");
                *self.state.write().await = PluginState::Error;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins;
    use serde_json::json;

    fn allowed() -> Arc<Vec<String>> {
        Arc::new(
            plugins::DEFAULT_ALLOWED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    fn dummy_config() -> PluginConfig {
        let mut config = Map::new();
        config.insert("prefix".to_string(), json!("Hi: "));
        PluginConfig {
            plugin_type: PluginType::InSource,
            enabled: true,
            module: Some("opencuff.plugins.builtin.dummy".to_string()),
            command: None,
            args: Vec::new(),
            endpoint: None,
            config,
            process_settings: None,
            http_settings: None,
        }
    }

    #[tokio::test]
    async fn load_then_call_then_unload() {
        let registry = Arc::new(ToolRegistry::new());
        let lifecycle = PluginLifecycle::new(
            "dummy",
            dummy_config(),
            registry.clone(),
            allowed(),
            Duration::from_secs(1),
        );

        lifecycle.load().await.unwrap();
        assert_eq!(lifecycle.state().await, PluginState::Active);
        assert_eq!(registry.len().await, 3);

        let mut args = Map::new();
        args.insert("message".to_string(), json!("there"));
        let result = lifecycle.call_tool("echo", &args).await.unwrap();
        assert!(result.is_ok());

        lifecycle.unload().await;
        assert_eq!(lifecycle.state().await, PluginState::Unloaded);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn call_before_load_fails_plugin_unhealthy() {
        let registry = Arc::new(ToolRegistry::new());
        let lifecycle = PluginLifecycle::new(
            "dummy",
            dummy_config(),
            registry,
            allowed(),
            Duration::from_secs(1),
        );
        let err = lifecycle
            .call_tool("echo", &Map::new())
            .await
            .expect_err("should fail");
        assert_eq!(err.kind, ErrorKind::PluginUnhealthy);
    }

    #[tokio::test]
    async fn reload_changes_prefix_without_losing_registration() {
        let registry = Arc::new(ToolRegistry::new());
        let lifecycle = PluginLifecycle::new(
            "dummy",
            dummy_config(),
            registry.clone(),
            allowed(),
            Duration::from_secs(1),
        );
        lifecycle.load().await.unwrap();

        let mut new_config = dummy_config();
        new_config
            .config
            .insert("prefix".to_string(), json!("New: "));
        lifecycle.reload(Some(new_config)).await.unwrap();
        assert_eq!(lifecycle.state().await, PluginState::Active);
        assert_eq!(registry.len().await, 3);

        let mut args = Map::new();
        args.insert("message".to_string(), json!("hi"));
        let result = lifecycle.call_tool("echo", &args).await.unwrap();
        match result {
            ToolResult::Ok { data } => assert_eq!(data, json!("New: hi")),
            ToolResult::Err { message } => panic!("unexpected error: {message}"),
        }
    }

    #[tokio::test]
    async fn recover_is_noop_when_not_in_error() {
        let registry = Arc::new(ToolRegistry::new());
        let lifecycle = PluginLifecycle::new(
            "dummy",
            dummy_config(),
            registry,
            allowed(),
            Duration::from_secs(1),
        );
        lifecycle.load().await.unwrap();
        assert!(lifecycle.recover(3).await);
        assert_eq!(lifecycle.state().await, PluginState::Active);
    }

    #[tokio::test]
    async fn recovery_exhausts_after_max_restarts() {
        let registry = Arc::new(ToolRegistry::new());
        // A disallowed module makes every load/reload attempt fail, driving
        // the plugin straight to `error` and keeping it there.
        let config = PluginConfig {
            plugin_type: PluginType::InSource,
            enabled: true,
            module: Some("evil.module".to_string()),
            command: None,
            args: Vec::new(),
            endpoint: None,
            config: Map::new(),
            process_settings: None,
            http_settings: None,
        };
        let lifecycle = PluginLifecycle::new(
            "bad",
            config,
            registry,
            allowed(),
            Duration::from_secs(1),
        );
        lifecycle.load().await.expect_err("should fail to load");
        assert_eq!(lifecycle.state().await, PluginState::Error);

        assert!(!lifecycle.recover(2).await);
        assert_eq!(lifecycle.state().await, PluginState::Error);
        assert!(!lifecycle.recover(2).await);
        assert_eq!(lifecycle.state().await, PluginState::Error);
        assert!(!lifecycle.recover(2).await);
        assert_eq!(lifecycle.state().await, PluginState::Unloaded);
    }
}
