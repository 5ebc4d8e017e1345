//! Chrome extension bridge for the Quill agent CLI
//!
//! Relays tool-call requests and results between the agent's tool-serving
//! process and a browser extension, over Chrome's native-messaging mechanism
//! plus a local socket:
//!
//! ```text
//! agent ↔ MCP endpoint ↔ RelayClient ↔ socket ↔ RelayServer ↔ stdio ↔ extension
//! ```
//!
//! # Module structure
//! - `envelope` - the correlated JSON message unit both transports carry
//! - `framing` - length-prefixed native-messaging wire codec
//! - `relay` - the two ends of the local socket bridge
//! - `service` - tool catalog validation and outcome normalization
//! - `mcp_endpoint` - the stdio protocol surface the agent calls
//! - `catalog` - static browser tool descriptors
//! - `config` - persisted bridge settings
//! - `native_host` - platform paths and manifest installation
//! - `events` - lifecycle subscriber lists

pub mod catalog;
pub mod config;
pub mod envelope;
pub mod events;
pub mod framing;
pub mod mcp_endpoint;
pub mod native_host;
pub mod relay;
pub mod service;

// Re-exports
pub use catalog::{ToolCatalog, ToolDescriptor};
pub use config::{BridgeSettings, ConfigError};
pub use envelope::{Envelope, EnvelopeKind, ErrorInfo, BRIDGE_DISCONNECTED};
pub use events::{BridgeEvent, EventBus};
pub use framing::{FrameCodec, FrameDecoder, FrameError, DEFAULT_MAX_FRAME_SIZE};
pub use mcp_endpoint::McpEndpoint;
pub use native_host::{
    get_platform, is_configured, is_supported, setup_native_host, socket_path,
    uninstall_native_host, InstallError, Platform, SetupResult, INSTALL_URL, NATIVE_HOST_NAME,
};
pub use relay::client::{RelayClient, RelayError};
#[cfg(unix)]
pub use relay::server::{RelayServer, ServerConfig, ServerError, ServerState};
pub use service::{InvokeOutcome, ServiceError, ToolService};
