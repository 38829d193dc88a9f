//! Plugin manager (C11): the orchestrator composing the registry (C5),
//! per-plugin lifecycles (C7), the configuration watcher (C9), the health
//! monitor (C10), and the upstream bridge (C12) into diff-reconciled,
//! hot-reloadable plugin hosting.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use crate::bridge::UpstreamBridge;
use crate::config::watcher::ConfigWatcher;
use crate::config::{self, PluginConfig, Settings};
use crate::errors::{BrokerError, BrokerResult};
use crate::health::HealthMonitor;
use crate::lifecycle::PluginLifecycle;
use crate::registry::ToolRegistry;
use crate::tool::ToolResult;

/// Orchestrates the whole plugin-host runtime around one settings document.
pub struct PluginManager {
    settings: RwLock<Arc<Settings>>,
    settings_path: RwLock<Option<PathBuf>>,
    registry: Arc<ToolRegistry>,
    lifecycles: Arc<RwLock<HashMap<String, Arc<PluginLifecycle>>>>,
    allowed_prefixes: Arc<Vec<String>>,
    health: Arc<HealthMonitor>,
    watcher: RwLock<Option<ConfigWatcher>>,
    bridge: Arc<UpstreamBridge>,
    reaction_lock: Mutex<()>,
    started: Mutex<bool>,
}

impl PluginManager {
    pub fn new(allowed_prefixes: Vec<String>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let lifecycles = Arc::new(RwLock::new(HashMap::new()));
            let health = HealthMonitor::new(Duration::ZERO, lifecycles.clone());
            let bridge = UpstreamBridge::new(weak.clone());
            Self {
                settings: RwLock::new(Arc::new(Settings::default())),
                settings_path: RwLock::new(None),
                registry: Arc::new(ToolRegistry::new()),
                lifecycles,
                allowed_prefixes: Arc::new(allowed_prefixes),
                health,
                watcher: RwLock::new(None),
                bridge,
                reaction_lock: Mutex::new(()),
                started: Mutex::new(false),
            }
        })
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> &Arc<UpstreamBridge> {
        &self.bridge
    }

    pub async fn settings(&self) -> Arc<Settings> {
        self.settings.read().await.clone()
    }

    pub async fn plugin_state(&self, name: &str) -> Option<crate::lifecycle::PluginState> {
        match self.lifecycles.read().await.get(name) {
            Some(lc) => Some(lc.state().await),
            None => None,
        }
    }

    /// Loads settings (from `explicit_path`, else `OPENCUFF_SETTINGS`, else
    /// `./settings.yml`), loads every enabled plugin (collecting but not
    /// propagating per-plugin failures), heals the bridge, and — if
    /// `live_reload` is on — starts the watcher and health monitor.
    /// Idempotent: a second call while already started is a logged no-op.
    pub async fn start(self: &Arc<Self>, explicit_path: Option<PathBuf>) -> BrokerResult<()> {
        let mut started = self.started.lock().await;
        if *started {
            tracing::warn!("plugin_manager_already_started");
            return Ok(());
        }

        let path = Settings::resolve_path(explicit_path);
        let settings = config::load_settings(&path)?;

        for (name, cfg) in settings.plugins.iter().filter(|(_, cfg)| cfg.enabled) {
            self.create_and_load(name.clone(), cfg.clone()).await;
        }

        self.bridge.subscribe(&self.registry).await;
        self.bridge.full_sync(&self.registry).await;

        if settings.plugin_settings.live_reload {
            let watcher = ConfigWatcher::new(
                path.clone(),
                Duration::from_secs_f64(settings.plugin_settings.config_poll_interval),
                self.make_change_handler(),
            );
            watcher.start().await;
            *self.watcher.write().await = Some(watcher);
        }

        self.health
            .restart_with_interval(Duration::from_secs_f64(
                settings.plugin_settings.health_check_interval,
            ))
            .await;

        *self.settings_path.write().await = Some(path);
        *self.settings.write().await = Arc::new(settings);
        *started = true;
        tracing::info!("plugin_manager_started");
        Ok(())
    }

    /// Stops the health monitor and watcher, then unloads every plugin in
    /// arbitrary order. Guaranteed to reach a fully quiescent state.
    /// Idempotent: a second call while already stopped is a logged no-op.
    pub async fn stop(&self) {
        let mut started = self.started.lock().await;
        if !*started {
            tracing::warn!("plugin_manager_already_stopped");
            return;
        }

        self.health.stop().await;
        if let Some(watcher) = self.watcher.write().await.take() {
            watcher.stop().await;
        }
        let lifecycles: Vec<Arc<PluginLifecycle>> =
            self.lifecycles.write().await.drain().map(|(_, lc)| lc).collect();
        for lifecycle in lifecycles {
            lifecycle.unload().await;
        }

        *started = false;
        tracing::info!("plugin_manager_stopped");
    }

    /// Looks up `fqn` in the registry and dispatches to the owning
    /// lifecycle with the local tool name. Fails `tool_not_found` if the
    /// FQN is absent from either the registry or the lifecycle table.
    pub async fn call_tool(&self, fqn: &str, args: &Map<String, Value>) -> BrokerResult<ToolResult> {
        let (plugin, tool) = self
            .registry
            .get_tool(fqn)
            .await
            .ok_or_else(|| BrokerError::tool_not_found(fqn))?;

        let lifecycle = self.lifecycles.read().await.get(&plugin).cloned();
        match lifecycle {
            Some(lifecycle) => lifecycle.call_tool(&tool.name, args).await,
            None => Err(BrokerError::tool_not_found(fqn)),
        }
    }

    async fn create_and_load(&self, name: String, cfg: PluginConfig) {
        let queue_timeout = Duration::from_secs_f64(
            self.settings.read().await.plugin_settings.default_timeout,
        );
        let lifecycle = Arc::new(PluginLifecycle::new(
            name.clone(),
            cfg,
            self.registry.clone(),
            self.allowed_prefixes.clone(),
            queue_timeout,
        ));
        if let Err(e) = lifecycle.load().await {
            tracing::error!(plugin = %name, error = %e, "plugin_load_failed");
        }
        self.lifecycles.write().await.insert(name, lifecycle);
    }

    fn make_change_handler(self: &Arc<Self>) -> crate::config::watcher::ChangeHandler {
        let manager = Arc::downgrade(self);
        Arc::new(move |settings: Settings| {
            let manager = manager.clone();
            Box::pin(async move {
                if let Some(manager) = manager.upgrade() {
                    manager.handle_config_change(settings).await;
                }
            })
        })
    }

    /// The diff-reconciliation reaction to an incoming settings snapshot.
    /// Serialized against concurrent reactions by `reaction_lock` so arrival
    /// order is preserved even if the caller fires two changes without
    /// waiting for the first to finish.
    pub async fn handle_config_change(&self, new_settings: Settings) {
        let _guard = self.reaction_lock.lock().await;

        let old_settings = self.settings.read().await.clone();
        let old_enabled = old_settings.enabled_plugin_names();
        let new_enabled = new_settings.enabled_plugin_names();

        for name in old_enabled.difference(&new_enabled) {
            if let Some(lifecycle) = self.lifecycles.write().await.remove(name) {
                lifecycle.unload().await;
                tracing::info!(plugin = %name, "plugin_removed_by_config_change");
            }
        }

        for name in old_enabled.intersection(&new_enabled) {
            let unchanged = old_settings.plugins.get(name) == new_settings.plugins.get(name);
            if unchanged {
                continue;
            }
            let Some(new_cfg) = new_settings.plugins.get(name) else {
                continue;
            };
            let lifecycle = self.lifecycles.read().await.get(name).cloned();
            if let Some(lifecycle) = lifecycle
                && let Err(e) = lifecycle.reload(Some(new_cfg.clone())).await
            {
                tracing::error!(plugin = %name, error = %e, "plugin_reload_failed_during_config_change");
            }
        }

        for name in new_enabled.difference(&old_enabled) {
            if let Some(cfg) = new_settings.plugins.get(name) {
                self.create_and_load(name.clone(), cfg.clone()).await;
            }
        }

        let old_interval = old_settings.plugin_settings.health_check_interval;
        let new_interval = new_settings.plugin_settings.health_check_interval;
        *self.settings.write().await = Arc::new(new_settings);

        if (new_interval - old_interval).abs() > f64::EPSILON {
            tracing::info!(interval = new_interval, "health_monitor_interval_changed");
            self.health
                .restart_with_interval(Duration::from_secs_f64(new_interval))
                .await;
        }
    }
}
