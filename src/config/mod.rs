//! Configuration model + loader (C8): typed settings with env-var expansion.
//!
//! Parses YAML into a generic tree, expands `${NAME}` references against the
//! process environment, then deserializes the expanded tree into the typed
//! [`Settings`] structs and validates type-specific required fields.

pub mod defaults;
pub mod watcher;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;

use crate::errors::{BrokerError, BrokerResult};

/// The kind of adapter a plugin configuration entry is realized through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    InSource,
    Process,
    Http,
}

/// `type_specific_settings` for `process` plugins. Carried in the type even
/// though the process adapter itself is a stub, so configuration round-trips
/// and validates identically to a build that implements it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSettings {
    #[serde(default = "defaults::default_true")]
    pub restart_on_crash: bool,
    #[serde(default = "defaults::default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "defaults::default_restart_delay")]
    pub restart_delay: f64,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            restart_on_crash: defaults::default_true(),
            max_restarts: defaults::default_max_restarts(),
            restart_delay: defaults::default_restart_delay(),
            env: std::collections::HashMap::new(),
        }
    }
}

/// `type_specific_settings` for `http` plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "defaults::default_http_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default = "defaults::default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "defaults::default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default = "defaults::default_true")]
    pub verify_ssl: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: defaults::default_http_timeout(),
            headers: std::collections::HashMap::new(),
            retry_count: defaults::default_retry_count(),
            retry_delay: defaults::default_retry_delay(),
            verify_ssl: defaults::default_true(),
        }
    }
}

/// A single plugin's configuration entry, as found under `plugins.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    #[serde(default = "defaults::default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub process_settings: Option<ProcessSettings>,
    #[serde(default)]
    pub http_settings: Option<HttpSettings>,
}

impl PluginConfig {
    /// Max restart count for bounded recovery, overridable via
    /// `process_settings.max_restarts` regardless of plugin type, defaulting
    /// to 3 when unset.
    pub fn max_restarts(&self) -> u32 {
        self.process_settings
            .as_ref()
            .map(|p| p.max_restarts)
            .unwrap_or_else(defaults::default_max_restarts)
    }
}

/// Global, non-per-plugin knobs under `plugin_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default = "defaults::default_config_poll_interval")]
    pub config_poll_interval: f64,
    #[serde(default = "defaults::default_queue_timeout")]
    pub default_timeout: f64,
    #[serde(default = "defaults::default_true")]
    pub live_reload: bool,
    #[serde(default = "defaults::default_health_check_interval")]
    pub health_check_interval: f64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            config_poll_interval: defaults::default_config_poll_interval(),
            default_timeout: defaults::default_queue_timeout(),
            live_reload: defaults::default_true(),
            health_check_interval: defaults::default_health_check_interval(),
        }
    }
}

/// The root settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "defaults::default_version")]
    pub version: String,
    #[serde(default)]
    pub plugin_settings: PluginSettings,
    #[serde(default)]
    pub plugins: std::collections::HashMap<String, PluginConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: defaults::default_version(),
            plugin_settings: PluginSettings::default(),
            plugins: std::collections::HashMap::new(),
        }
    }
}

impl Settings {
    /// Resolves the settings file path: explicit override, else
    /// `OPENCUFF_SETTINGS` (if it points at a file that exists), else
    /// `./settings.yml`.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        if let Ok(from_env) = std::env::var("OPENCUFF_SETTINGS") {
            let path = PathBuf::from(from_env);
            if path.exists() {
                return path;
            }
        }
        PathBuf::from("./settings.yml")
    }

    /// Names of currently-enabled plugins, used by the manager's diff
    /// reconciliation.
    pub fn enabled_plugin_names(&self) -> std::collections::HashSet<String> {
        self.plugins
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Reads `path`, parses, expands, and validates a settings document.
pub fn load_settings(path: &Path) -> BrokerResult<Settings> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BrokerError::config_missing(format!(
                "settings file not found: {}",
                path.display()
            )));
        }
        Err(e) => {
            return Err(BrokerError::config_invalid(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };
    parse_settings(&text).map_err(|e| {
        let kind = e.kind;
        let plugin = e.plugin.clone();
        let mut wrapped = BrokerError::new(
            kind,
            format!("{} (file: {})", e.message, path.display()),
        )
        .with_cause(e);
        wrapped.plugin = plugin;
        wrapped
    })
}

/// Parses, expands, and validates settings from an in-memory YAML document.
/// An empty (or all-whitespace) document yields [`Settings::default`].
pub fn parse_settings(text: &str) -> BrokerResult<Settings> {
    if text.trim().is_empty() {
        return Ok(Settings::default());
    }

    let raw: Value = parse_yaml_with_diagnostics(text)?;
    if matches!(raw, Value::Null) {
        return Ok(Settings::default());
    }

    let expanded = expand_value(raw)?;
    let settings: Settings = serde_yaml_ng::from_value(expanded)
        .map_err(|e| BrokerError::config_invalid(format!("invalid settings structure: {e}")))?;

    validate(&settings)?;
    Ok(settings)
}

fn parse_yaml_with_diagnostics(text: &str) -> BrokerResult<Value> {
    serde_yaml_ng::from_str(text).map_err(|e| {
        let message = if let Some(loc) = e.location() {
            format!("yaml error at line {}, column {}: {e}", loc.line(), loc.column())
        } else {
            format!("yaml error: {e}")
        };
        BrokerError::config_invalid(message)
    })
}

fn validate(settings: &Settings) -> BrokerResult<()> {
    for (name, cfg) in &settings.plugins {
        if name.contains('.') {
            return Err(BrokerError::config_invalid(format!(
                "plugin name must not contain '.': {name}"
            ))
            .with_plugin(name.clone()));
        }
        match cfg.plugin_type {
            PluginType::InSource if cfg.module.is_none() => {
                return Err(BrokerError::config_invalid(
                    "in_source plugin requires 'module'",
                )
                .with_plugin(name.clone()));
            }
            PluginType::Process if cfg.command.is_none() => {
                return Err(
                    BrokerError::config_invalid("process plugin requires 'command'")
                        .with_plugin(name.clone()),
                );
            }
            PluginType::Http if cfg.endpoint.is_none() => {
                return Err(BrokerError::config_invalid("http plugin requires 'endpoint'")
                    .with_plugin(name.clone()));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Substitutes `${NAME}` with the named environment variable throughout a
/// parsed YAML tree. Recurses into sequences and mappings; non-string
/// scalars are untouched. Fails `config_invalid` naming the first unset
/// variable encountered.
fn expand_value(value: Value) -> BrokerResult<Value> {
    Ok(match value {
        Value::String(s) => Value::String(expand_env_string(&s)?),
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.push(expand_value(item)?);
            }
            Value::Sequence(out)
        }
        Value::Mapping(map) => {
            let mut out = serde_yaml_ng::Mapping::new();
            for (k, v) in map {
                out.insert(k, expand_value(v)?);
            }
            Value::Mapping(out)
        }
        Value::Tagged(tagged) => Value::Tagged(Box::new(serde_yaml_ng::value::TaggedValue {
            tag: tagged.tag,
            value: expand_value(tagged.value)?,
        })),
        other => other,
    })
}

fn expand_env_string(s: &str) -> BrokerResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let value = std::env::var(name).map_err(|_| {
                    BrokerError::config_invalid(format!(
                        "environment variable not set: {name}"
                    ))
                })?;
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings, Settings::default());
        let settings = parse_settings("   \n\n").unwrap();
        assert_eq!(settings, Settings::default());
    }

    // All three `OPENCUFF_SETTINGS`-dependent cases live in one test so they
    // share a single set/remove of the process-wide env var instead of
    // racing other tests' threads over it.
    #[test]
    fn resolve_path_precedence_and_missing_file_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("settings.yml");
        std::fs::write(&existing, "version: \"1\"\n").unwrap();

        unsafe {
            std::env::set_var("OPENCUFF_SETTINGS", &existing);
        }

        let explicit = PathBuf::from("/explicit/settings.yml");
        assert_eq!(Settings::resolve_path(Some(explicit.clone())), explicit);

        assert_eq!(Settings::resolve_path(None), existing);

        unsafe {
            std::env::set_var("OPENCUFF_SETTINGS", "/this/path/does/not/exist.yml");
        }
        assert_eq!(Settings::resolve_path(None), PathBuf::from("./settings.yml"));

        unsafe {
            std::env::remove_var("OPENCUFF_SETTINGS");
        }
    }

    #[test]
    fn env_var_expands_in_string_fields() {
        unsafe {
            std::env::set_var("OPENCUFF_TEST_API", "https://h");
        }
        let yaml = r#"
version: "1"
plugins:
  upstream:
    type: http
    endpoint: "${OPENCUFF_TEST_API}/v1"
"#;
        let settings = parse_settings(yaml).unwrap();
        let plugin = &settings.plugins["upstream"];
        assert_eq!(plugin.endpoint.as_deref(), Some("https://h/v1"));
        unsafe {
            std::env::remove_var("OPENCUFF_TEST_API");
        }
    }

    #[test]
    fn unset_env_var_fails_config_invalid() {
        unsafe {
            std::env::remove_var("OPENCUFF_TEST_MISSING");
        }
        let yaml = r#"
plugins:
  upstream:
    type: http
    endpoint: "${OPENCUFF_TEST_MISSING}/v1"
"#;
        let err = parse_settings(yaml).expect_err("should fail");
        assert_eq!(err.kind, crate::errors::ErrorKind::ConfigInvalid);
        assert!(err.message.contains("OPENCUFF_TEST_MISSING"));
    }

    #[test]
    fn in_source_without_module_is_rejected() {
        let yaml = r#"
plugins:
  dummy:
    type: in_source
"#;
        let err = parse_settings(yaml).expect_err("should fail");
        assert_eq!(err.kind, crate::errors::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn plugin_name_with_dot_is_rejected() {
        let yaml = r#"
plugins:
  "bad.name":
    type: in_source
    module: "opencuff.plugins.builtin.dummy"
"#;
        let err = parse_settings(yaml).expect_err("should fail");
        assert_eq!(err.kind, crate::errors::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn literal_dollar_without_brace_is_untouched() {
        let yaml = r#"
plugins:
  dummy:
    type: in_source
    module: "opencuff.plugins.builtin.dummy"
    config:
      price: "$5 flat"
"#;
        let settings = parse_settings(yaml).unwrap();
        assert_eq!(
            settings.plugins["dummy"].config["price"],
            serde_json::json!("$5 flat")
        );
    }

    #[test]
    fn enabled_plugin_names_filters_disabled() {
        let yaml = r#"
plugins:
  on:
    type: in_source
    module: "opencuff.plugins.builtin.dummy"
    enabled: true
  off:
    type: in_source
    module: "opencuff.plugins.builtin.dummy"
    enabled: false
"#;
        let settings = parse_settings(yaml).unwrap();
        let names = settings.enabled_plugin_names();
        assert!(names.contains("on"));
        assert!(!names.contains("off"));
    }

    #[test]
    fn max_restarts_falls_back_to_default() {
        let cfg = PluginConfig {
            plugin_type: PluginType::InSource,
            enabled: true,
            module: Some("opencuff.plugins.builtin.dummy".to_string()),
            command: None,
            args: Vec::new(),
            endpoint: None,
            config: serde_json::Map::new(),
            process_settings: None,
            http_settings: None,
        };
        assert_eq!(cfg.max_restarts(), 3);
    }
}
