//! Compile-time plugin constructor registry.
//!
//! The in-process adapter loads plugins by a symbolic `module` key rather
//! than a dynamically resolved path — there is no dynamic loading in a
//! statically linked binary. This module is the registry that key is
//! looked up in, plus the namespace allow-list that gates which keys may be
//! used at all.

pub mod dummy;
pub mod makefile;

use crate::plugin::PluginConstructor;

/// Default allowed module-path prefixes: the single project namespace.
pub const DEFAULT_ALLOWED_PREFIXES: &[&str] = &["opencuff.plugins."];

/// `(module key, constructor)` pairs known at compile time.
const BUILTIN_PLUGINS: &[(&str, PluginConstructor)] = &[
    ("opencuff.plugins.builtin.dummy", dummy::DummyPlugin::new),
    (
        "opencuff.plugins.builtin.makefile",
        makefile::MakefilePlugin::new,
    ),
];

/// Returns the constructor registered for `module`, if any.
pub fn lookup(module: &str) -> Option<PluginConstructor> {
    BUILTIN_PLUGINS
        .iter()
        .find(|(key, _)| *key == module)
        .map(|(_, ctor)| *ctor)
}

/// Checks `module` against an allow-list of namespace prefixes.
pub fn is_allowed(module: &str, allowed_prefixes: &[String]) -> bool {
    allowed_prefixes.iter().any(|prefix| module.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_is_registered() {
        assert!(lookup("opencuff.plugins.builtin.dummy").is_some());
    }

    #[test]
    fn unknown_module_is_not_registered() {
        assert!(lookup("opencuff.plugins.builtin.nope").is_none());
    }

    #[test]
    fn allow_list_rejects_outside_namespace() {
        let allowed: Vec<String> = DEFAULT_ALLOWED_PREFIXES.iter().map(|s| s.to_string()).collect();
        assert!(is_allowed("opencuff.plugins.builtin.dummy", &allowed));
        assert!(!is_allowed("evil.module", &allowed));
    }
}
