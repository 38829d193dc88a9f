//! Upstream bridge (C12): mirrors the tool registry (C5) into the external
//! MCP tool host.
//!
//! The registry's change callbacks (`on_registered`/`on_unregistered`) are
//! synchronous and fire outside the registry lock; this module subscribes to
//! both and keeps a second, independently-locked table of
//! `FQN -> ToolDescriptor` representing exactly what has been published
//! externally. The published set is a tracked table the MCP `ServerHandler`
//! reads from, not a live re-derivation from the registry on every
//! `list_tools` call — re-deriving would let a torn-down plugin's tools
//! reappear mid-call. A plain `std::sync::Mutex` is enough: every critical
//! section here is a bounded map mutation with no `.await` inside it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::errors::BrokerResult;
use crate::manager::PluginManager;
use crate::registry::ToolRegistry;
use crate::tool::{ToolDescriptor, ToolResult, make_fqn};

/// Keeps an external MCP host's published tool set synchronized with the
/// registry. Driven purely by the callbacks the registry invokes on
/// register/unregister; dispatch of a call is routed back through the
/// `PluginManager` this bridge was built for.
pub struct UpstreamBridge {
    published: Mutex<HashMap<String, ToolDescriptor>>,
    manager: Weak<PluginManager>,
}

impl UpstreamBridge {
    pub fn new(manager: Weak<PluginManager>) -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(HashMap::new()),
            manager,
        })
    }

    /// Registers this bridge's callbacks on `registry`. Call once, before
    /// `full_sync`, so no register/unregister racing the subscription itself
    /// is missed.
    pub async fn subscribe(self: &Arc<Self>, registry: &ToolRegistry) {
        let this = self.clone();
        registry
            .subscribe_registered(Arc::new(move |plugin, tools| {
                this.on_registered(plugin, tools);
            }))
            .await;

        let this = self.clone();
        registry
            .subscribe_unregistered(Arc::new(move |plugin| {
                this.on_unregistered(plugin);
            }))
            .await;
    }

    fn on_registered(&self, plugin: &str, tools: &[ToolDescriptor]) {
        let mut guard = self.published.lock().expect("bridge lock poisoned");
        for tool in tools {
            let fqn = make_fqn(plugin, &tool.name);
            guard.insert(fqn.clone(), tool.clone());
            tracing::info!(fqn = %fqn, "tool_published");
        }
    }

    fn on_unregistered(&self, plugin: &str) {
        let prefix = format!("{plugin}.");
        let mut guard = self.published.lock().expect("bridge lock poisoned");
        let removed: Vec<String> = guard
            .keys()
            .filter(|fqn| fqn.starts_with(&prefix))
            .cloned()
            .collect();
        for fqn in removed {
            guard.remove(&fqn);
            tracing::info!(fqn = %fqn, "tool_unpublished");
        }
    }

    /// Startup-time reconciliation: removes published FQNs no longer in the
    /// registry, publishes registry tools not yet external. Needed because
    /// plugins load (and register tools) before the bridge subscribes.
    pub async fn full_sync(&self, registry: &ToolRegistry) {
        let live = registry.list_tools().await;
        let live_fqns: std::collections::HashSet<&str> =
            live.iter().map(|(fqn, _)| fqn.as_str()).collect();

        let mut guard = self.published.lock().expect("bridge lock poisoned");
        let stale: Vec<String> = guard
            .keys()
            .filter(|fqn| !live_fqns.contains(fqn.as_str()))
            .cloned()
            .collect();
        for fqn in stale {
            guard.remove(&fqn);
            tracing::info!(fqn = %fqn, "tool_unpublished_stale");
        }

        for (fqn, tool) in live {
            guard.entry(fqn.clone()).or_insert_with(|| {
                tracing::info!(fqn = %fqn, "tool_published_sync");
                tool
            });
        }
    }

    /// Snapshot of every currently-published `(fqn, tool)` pair, read by the
    /// MCP `ServerHandler::list_tools` implementation.
    pub fn list_published(&self) -> Vec<(String, ToolDescriptor)> {
        self.published
            .lock()
            .expect("bridge lock poisoned")
            .iter()
            .map(|(fqn, tool)| (fqn.clone(), tool.clone()))
            .collect()
    }

    pub fn is_published(&self, fqn: &str) -> bool {
        self.published
            .lock()
            .expect("bridge lock poisoned")
            .contains_key(fqn)
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().expect("bridge lock poisoned").len()
    }

    /// Dispatches a call for `fqn` back through the owning `PluginManager`.
    /// Used by the MCP `ServerHandler::call_tool` implementation so the
    /// bridge, not the handler, is the sole owner of the manager reference.
    pub async fn call_tool(
        &self,
        fqn: &str,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> BrokerResult<ToolResult> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| crate::errors::BrokerError::tool_not_found(fqn.to_string()))?;
        manager.call_tool(fqn, args).await
    }
}
