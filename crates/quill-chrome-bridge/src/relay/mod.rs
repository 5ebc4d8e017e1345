//! 本地 socket 桥的两端
//!
//! - `server` - 运行在 Native Host 进程中,桥接 stdio 与 socket
//! - `client` - 运行在 Agent 的工具服务进程中

pub mod client;
#[cfg(unix)]
pub mod server;

pub use client::{RelayClient, RelayError};
#[cfg(unix)]
pub use server::{RelayServer, ServerConfig, ServerError, ServerState};
