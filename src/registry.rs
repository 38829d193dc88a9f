//! Tool registry (C5): a namespaced table keyed by FQN, with atomic batch
//! registration and change-propagation callbacks fired outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::errors::{BrokerError, BrokerResult};
use crate::tool::{ToolDescriptor, make_fqn};

#[derive(Clone)]
struct Entry {
    plugin: String,
    tool: ToolDescriptor,
}

/// Invoked after a successful `register_tools`, outside the registry lock.
pub type OnRegistered = Arc<dyn Fn(&str, &[ToolDescriptor]) + Send + Sync>;
/// Invoked after `unregister_plugin` actually removed something, outside
/// the registry lock.
pub type OnUnregistered = Arc<dyn Fn(&str) + Send + Sync>;

/// The in-memory FQN → `(plugin, tool)` table.
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    on_registered: RwLock<Vec<OnRegistered>>,
    on_unregistered: RwLock<Vec<OnUnregistered>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            on_registered: RwLock::new(Vec::new()),
            on_unregistered: RwLock::new(Vec::new()),
        }
    }

    pub async fn subscribe_registered(&self, callback: OnRegistered) {
        self.on_registered.write().await.push(callback);
    }

    pub async fn subscribe_unregistered(&self, callback: OnUnregistered) {
        self.on_unregistered.write().await.push(callback);
    }

    /// Registers every tool in `tools` under `plugin`, or none at all.
    ///
    /// Fails `config_invalid` if two tools in the batch share a local name,
    /// or if any resulting FQN already exists (from this plugin or another).
    pub async fn register_tools(
        &self,
        plugin: &str,
        tools: Vec<ToolDescriptor>,
    ) -> BrokerResult<()> {
        {
            let mut seen = std::collections::HashSet::new();
            for tool in &tools {
                if tool.name.contains('.') {
                    return Err(BrokerError::config_invalid(format!(
                        "tool name must not contain '.': {}",
                        tool.name
                    ))
                    .with_plugin(plugin.to_string()));
                }
                if !seen.insert(tool.name.as_str()) {
                    return Err(BrokerError::config_invalid(format!(
                        "Duplicate tool name: {}",
                        make_fqn(plugin, &tool.name)
                    ))
                    .with_plugin(plugin.to_string()));
                }
            }
        }

        let mut guard = self.entries.write().await;
        for tool in &tools {
            let fqn = make_fqn(plugin, &tool.name);
            if guard.contains_key(&fqn) {
                return Err(BrokerError::config_invalid(format!("Duplicate tool name: {fqn}"))
                    .with_plugin(plugin.to_string()));
            }
        }
        for tool in &tools {
            let fqn = make_fqn(plugin, &tool.name);
            guard.insert(
                fqn,
                Entry {
                    plugin: plugin.to_string(),
                    tool: tool.clone(),
                },
            );
        }
        drop(guard);

        for cb in self.on_registered.read().await.iter() {
            cb(plugin, &tools);
        }
        Ok(())
    }

    /// Removes every FQN with prefix `"{plugin}."`. Idempotent; never fails.
    /// Fires `on_unregistered` only if at least one entry was removed.
    pub async fn unregister_plugin(&self, plugin: &str) {
        let prefix = format!("{plugin}.");
        let mut removed_any = false;
        {
            let mut guard = self.entries.write().await;
            let keys: Vec<String> = guard
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in keys {
                guard.remove(&key);
                removed_any = true;
            }
        }
        if removed_any {
            for cb in self.on_unregistered.read().await.iter() {
                cb(plugin);
            }
        }
    }

    /// Returns the `(plugin, tool)` pair for `fqn`, if registered.
    pub async fn get_tool(&self, fqn: &str) -> Option<(String, ToolDescriptor)> {
        self.entries
            .read()
            .await
            .get(fqn)
            .map(|e| (e.plugin.clone(), e.tool.clone()))
    }

    /// Snapshot of every registered `(fqn, tool)` pair.
    pub async fn list_tools(&self) -> Vec<(String, ToolDescriptor)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(fqn, e)| (fqn.clone(), e.tool.clone()))
            .collect()
    }

    /// Snapshot of tools owned by `plugin`.
    pub async fn tools_for(&self, plugin: &str) -> Vec<(String, ToolDescriptor)> {
        let prefix = format!("{plugin}.");
        self.entries
            .read()
            .await
            .iter()
            .filter(|(fqn, _)| fqn.starts_with(&prefix))
            .map(|(fqn, e)| (fqn.clone(), e.tool.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, fqn: &str) -> bool {
        self.entries.read().await.contains_key(fqn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "d", json!({}))
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = ToolRegistry::new();
        registry
            .register_tools("dummy", vec![tool("echo"), tool("add")])
            .await
            .unwrap();
        assert_eq!(registry.len().await, 2);
        assert!(registry.contains("dummy.echo").await);
        let (plugin, _) = registry.get_tool("dummy.echo").await.unwrap();
        assert_eq!(plugin, "dummy");
    }

    #[tokio::test]
    async fn duplicate_within_batch_rejected() {
        let registry = ToolRegistry::new();
        let err = registry
            .register_tools("dummy", vec![tool("echo"), tool("echo")])
            .await
            .expect_err("should reject duplicate");
        assert_eq!(err.kind, crate::errors::ErrorKind::ConfigInvalid);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn tool_name_with_dot_rejected() {
        let registry = ToolRegistry::new();
        let err = registry
            .register_tools("dummy", vec![tool("bad.name")])
            .await
            .expect_err("should reject '.' in tool name");
        assert_eq!(err.kind, crate::errors::ErrorKind::ConfigInvalid);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn duplicate_against_existing_rejected() {
        let registry = ToolRegistry::new();
        registry.register_tools("dummy", vec![tool("echo")]).await.unwrap();
        let err = registry
            .register_tools("other", vec![tool("echo")])
            .await;
        // same local name, different plugin: distinct FQN, should succeed
        assert!(err.is_ok());
        // same plugin, same tool name again: FQN collision
        let err = registry.register_tools("dummy", vec![tool("echo")]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_prefix_scoped() {
        let registry = ToolRegistry::new();
        registry
            .register_tools("dummy", vec![tool("echo"), tool("add")])
            .await
            .unwrap();
        registry.register_tools("other", vec![tool("echo")]).await.unwrap();

        registry.unregister_plugin("dummy").await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains("other.echo").await);

        // idempotent: unregistering again is a no-op, never fails
        registry.unregister_plugin("dummy").await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn callbacks_fire_outside_lock() {
        let registry = ToolRegistry::new();
        let registered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let r = registered.clone();
        registry
            .subscribe_registered(Arc::new(move |plugin, tools| {
                r.lock().unwrap().push((plugin.to_string(), tools.len()));
            }))
            .await;

        registry.register_tools("dummy", vec![tool("echo")]).await.unwrap();
        assert_eq!(registered.lock().unwrap().as_slice(), &[("dummy".to_string(), 1)]);
    }
}
