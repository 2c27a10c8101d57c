//! MCP client: connects to remote tool servers over stdio or HTTP and
//! exposes their tools uniformly (SPEC_FULL §4.4).

pub mod config;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use config::{McpConfig, McpServerConfig, McpTransportKind};
pub use manager::{McpError, McpManager, McpServer};
pub use transport::{HttpTransport, McpTransport, StdioTransport, TransportError};
