//! `opencuff` — a hot-reloadable plugin-host runtime fronting an MCP
//! tool-invocation surface.
//!
//! The crate is organized leaf-first: error taxonomy and tool types at the
//! bottom, the adapter and registry above them, the request barrier and
//! per-plugin lifecycle above that, configuration loading/watching and
//! health monitoring alongside, and the plugin manager plus upstream bridge
//! tying everything together at the top, and [`mcp`] binding the bridge to
//! `rmcp`'s `ServerHandler`. `main.rs` wires it all into an MCP stdio
//! server.

pub mod adapter;
pub mod barrier;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod health;
pub mod lifecycle;
pub mod manager;
pub mod mcp;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod tool;
