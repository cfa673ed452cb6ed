//! MCP tool server exposing a [`RetrievalBackend`](philodb_core::traits::RetrievalBackend)
//! over line-delimited JSON-RPC 2.0 on stdio.

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{McpServer, ServerState};
