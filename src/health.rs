//! Health monitor (C10): periodic liveness sweep with bounded auto-recovery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::lifecycle::{PluginLifecycle, PluginState};

/// Sweeps every `active` plugin at a fixed interval, handing unhealthy ones
/// to their own `recover()`. An interval of zero disables the sweep
/// entirely.
pub struct HealthMonitor {
    interval: RwLock<Duration>,
    plugins: Arc<RwLock<HashMap<String, Arc<PluginLifecycle>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        interval: Duration,
        plugins: Arc<RwLock<HashMap<String, Arc<PluginLifecycle>>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            interval: RwLock::new(interval),
            plugins,
            task: Mutex::new(None),
        })
    }

    pub async fn interval(&self) -> Duration {
        *self.interval.read().await
    }

    /// Starts the sweep task. A zero interval is a documented no-op.
    /// Idempotent: a second call while running is a no-op (logged).
    pub async fn start(self: &Arc<Self>) {
        if self.interval().await.is_zero() {
            tracing::info!("health_monitor_disabled");
            return;
        }
        let mut guard = self.task.lock().await;
        if guard.is_some() {
            tracing::warn!("health_monitor_already_running");
            return;
        }
        let this = self.clone();
        *guard = Some(tokio::spawn(async move { this.sweep_loop().await }));
        tracing::info!(interval = ?self.interval().await, "health_monitor_started");
    }

    /// Cancels the sweep task and waits for at most one in-flight iteration
    /// to finish draining. Idempotent.
    pub async fn stop(&self) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            let _ = handle.await;
            tracing::info!("health_monitor_stopped");
        }
    }

    /// Restarts the sweep with a new interval, used by the plugin manager's
    /// config-change reaction. A no-op restart (same interval) is skipped by
    /// the caller, not here.
    pub async fn restart_with_interval(self: &Arc<Self>, interval: Duration) {
        self.stop().await;
        *self.interval.write().await = interval;
        self.start().await;
    }

    async fn sweep_loop(&self) {
        loop {
            tokio::time::sleep(self.interval().await).await;
            let snapshot: Vec<Arc<PluginLifecycle>> =
                self.plugins.read().await.values().cloned().collect();
            for lifecycle in snapshot {
                if lifecycle.state().await != PluginState::Active {
                    continue;
                }
                if lifecycle.health_check().await {
                    continue;
                }
                tracing::warn!(plugin = lifecycle.name(), "plugin_health_check_failed");
                let max_restarts = lifecycle.config().await.max_restarts();
                lifecycle.recover(max_restarts).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PluginConfig, PluginType};
    use crate::plugins;
    use crate::registry::ToolRegistry;
    use serde_json::{json, Map};

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
        config.insert("prefix".to_string(), json!(""));
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
    async fn zero_interval_never_starts_a_task() {
        let plugins = Arc::new(RwLock::new(HashMap::new()));
        let monitor = HealthMonitor::new(Duration::ZERO, plugins);
        monitor.start().await;
        // No public accessor for task presence is needed: stop() on a
        // never-started monitor must simply be a harmless no-op.
        monitor.stop().await;
    }

    #[tokio::test]
    async fn restart_with_interval_updates_reported_interval() {
        let plugins = Arc::new(RwLock::new(HashMap::new()));
        let monitor = HealthMonitor::new(Duration::from_secs(30), plugins);
        assert_eq!(monitor.interval().await, Duration::from_secs(30));
        monitor.restart_with_interval(Duration::from_secs(5)).await;
        assert_eq!(monitor.interval().await, Duration::from_secs(5));
        monitor.stop().await;
    }

    #[tokio::test]
    async fn sweep_loop_leaves_a_healthy_active_plugin_active() {
        let registry = Arc::new(ToolRegistry::new());
        let lifecycle = Arc::new(PluginLifecycle::new(
            "dummy",
            dummy_config(),
            registry,
            allowed(),
            Duration::from_secs(1),
        ));
        lifecycle.load().await.unwrap();

        let mut map = HashMap::new();
        map.insert("dummy".to_string(), lifecycle.clone());
        let plugins = Arc::new(RwLock::new(map));
        let monitor = HealthMonitor::new(Duration::from_millis(20), plugins);
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        monitor.stop().await;

        assert_eq!(lifecycle.state().await, PluginState::Active);
    }
}
