//! MCP (Model Context Protocol) server implementation
//!
//! # Security
//!
//! JSON deserialization from untrusted input is bounded by:
//! - HTTP transport: 1MB request body limit (RequestBodyLimitLayer)
//! - Stdio transport: trusted client (Claude Code) with reasonable message sizes

mod audit_mode;
mod server;
mod tools;
mod transports;
mod types;
mod validation;

// Public API
pub use server::McpServer;
pub use transports::{serve_http, serve_stdio};
pub use validation::parse_duration;
// Types kept pub(crate) for integration tests; not part of public API
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};


