//! Model Context Protocol server over stdin/stdout.
//!
//! Newline-delimited JSON-RPC 2.0, one message per line. The
//! [`registry::CapabilityRegistry`] holds the tools, resources and prompts;
//! the [`server::McpServer`] decodes requests, dispatches them to the
//! registry and writes one response per request, in arrival order.

pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod uri_template;

pub use protocol::{
    CallToolResult, Content, GetPromptResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    PromptMessage, ReadResourceResult, ResourceContents, Role, ServerInfo, MCP_PROTOCOL_VERSION,
};
pub use registry::{CapabilityKind, CapabilityRegistry, RegistryError};
pub use server::{McpServer, ServerState, TransportError};
