//! Closed error taxonomy for the plugin-host runtime.
//!
//! Every fallible operation that crosses a component boundary returns
//! [`BrokerError`], which carries one [`ErrorKind`] from a closed set, an
//! optional attributed plugin name, and an optional chained cause. No raw
//! `anyhow`/`std::io` error ever leaks across the public surface.

use thiserror::Error;

/// The closed set of error kinds a broker operation can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    ConfigMissing,
    LoadFailed,
    InitFailed,
    ShutdownFailed,
    ToolNotFound,
    ToolExecutionFailed,
    Timeout,
    CommunicationError,
    ProtocolError,
    HealthCheckFailed,
    PluginUnhealthy,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::ConfigMissing => "config_missing",
            ErrorKind::LoadFailed => "load_failed",
            ErrorKind::InitFailed => "init_failed",
            ErrorKind::ShutdownFailed => "shutdown_failed",
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::ToolExecutionFailed => "tool_execution_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CommunicationError => "communication_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::HealthCheckFailed => "health_check_failed",
            ErrorKind::PluginUnhealthy => "plugin_unhealthy",
        };
        f.write_str(s)
    }
}

/// An error surfaced by the broker core.
///
/// Carries a `kind` from the closed taxonomy plus a human-readable message,
/// the plugin name when the failure is attributable to one, and an optional
/// boxed cause for chaining.
#[derive(Debug, Error)]
#[error("{kind}: {message}{}", plugin.as_ref().map(|p| format!(" (plugin={p})")).unwrap_or_default())]
pub struct BrokerError {
    pub kind: ErrorKind,
    pub message: String,
    pub plugin: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            plugin: None,
            cause: None,
        }
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigMissing, message)
    }

    pub fn tool_not_found(fqn: impl Into<String>) -> Self {
        let fqn = fqn.into();
        Self::new(ErrorKind::ToolNotFound, format!("no such tool: {fqn}"))
    }

    pub fn plugin_unhealthy(plugin: impl Into<String>) -> Self {
        let plugin = plugin.into();
        Self::new(ErrorKind::PluginUnhealthy, "plugin is not active").with_plugin(plugin)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
