//! The concrete external tool host for the upstream bridge (C12):
//! `rmcp`'s `ServerHandler` over whatever transport `main.rs` wires up.
//!
//! `list_tools`/`call_tool` read the bridge's tracked published-set, not a
//! live re-derivation from the registry, so this handler is a thin
//! translation layer between MCP's wire types and
//! [`crate::bridge::UpstreamBridge`], never touching the registry directly.

use std::sync::Arc;
use std::time::Instant;

use rmcp::ErrorData;
use rmcp::RoleServer;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolResult, Content, Implementation, ListToolsResult, PaginatedRequestParam, RawContent,
    RawTextContent, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use serde_json::{Map, Value};

use crate::manager::PluginManager;
use crate::tool::{ToolDescriptor, ToolResult};

const SERVER_NAME: &str = "opencuff";
const SERVER_TITLE: &str = "opencuff plugin-host";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Adapts the upstream bridge's published-tool table and `call_tool`
/// dispatch into `rmcp`'s `ServerHandler` trait.
pub struct McpHandler {
    pub manager: Arc<PluginManager>,
}

fn to_rmcp_tool(fqn: String, descriptor: ToolDescriptor) -> Tool {
    let input_schema = match descriptor.parameters {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let output_schema = match descriptor.returns {
        Value::Object(map) if !map.is_empty() => Some(Arc::new(map)),
        _ => None,
    };
    Tool {
        name: fqn.into(),
        title: None,
        description: Some(descriptor.description.into()),
        input_schema: Arc::new(input_schema),
        output_schema,
        annotations: None,
        icons: None,
    }
}

fn text_result(text: String, is_error: bool, structured: Option<Value>) -> CallToolResult {
    CallToolResult {
        content: vec![Content {
            raw: RawContent::Text(RawTextContent { text, meta: None }),
            annotations: None,
        }],
        is_error: Some(is_error),
        meta: None,
        structured_content: structured,
    }
}

impl ServerHandler for McpHandler {
    fn initialize(
        &self,
        _request: rmcp::model::InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<rmcp::model::InitializeResult, ErrorData>> + Send + '_ {
        async move {
            let info = self.get_info();
            Ok(rmcp::model::InitializeResult {
                capabilities: info.capabilities,
                server_info: info.server_info,
                instructions: None,
                protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            })
        }
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities {
                experimental: None,
                logging: None,
                completions: None,
                prompts: None,
                resources: None,
                tools: Some(ToolsCapability {
                    // No `tools/list_changed` notification is emitted on hot
                    // add/remove; clients must re-list to observe changes.
                    list_changed: Some(false),
                }),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_owned(),
                title: Some(SERVER_TITLE.to_owned()),
                version: SERVER_VERSION.to_owned(),
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        let start = Instant::now();
        async move {
            let tools = self
                .manager
                .bridge()
                .list_published()
                .into_iter()
                .map(|(fqn, descriptor)| to_rmcp_tool(fqn, descriptor))
                .collect();
            tracing::debug!(elapsed = ?start.elapsed(), "mcp_list_tools");
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
            })
        }
    }

    fn call_tool(
        &self,
        request: rmcp::model::CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        let start = Instant::now();
        async move {
            let fqn = request.name.as_ref();
            let args = request.arguments.unwrap_or_default();

            let result = match self.manager.bridge().call_tool(fqn, &args).await {
                Ok(ToolResult::Ok { data }) => {
                    let text = serde_json::to_string(&data).unwrap_or_else(|_| data.to_string());
                    text_result(text, false, Some(data))
                }
                Ok(ToolResult::Err { message }) => text_result(message, true, None),
                Err(e) => {
                    tracing::warn!(fqn, error = %e, "mcp_call_tool_failed");
                    text_result(e.to_string(), true, None)
                }
            };

            tracing::debug!(fqn, elapsed = ?start.elapsed(), "mcp_call_tool");
            Ok(result)
        }
    }
}
