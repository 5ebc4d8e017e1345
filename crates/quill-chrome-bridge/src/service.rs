//! Tool Service core
//!
//! The surface the agent's reasoning loop actually calls: list the static
//! catalog, invoke a tool by name. Every transport failure is normalized into
//! one `{success: false, error}` shape here so that raw protocol detail never
//! leaks upward — the reasoning loop has a single failure contract regardless
//! of which layer failed.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{ToolCatalog, ToolDescriptor};
use crate::native_host::INSTALL_URL;
use crate::relay::client::{RelayClient, RelayError};

/// Protocol-surface validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ServiceError {
    /// The requested name is not in the catalog
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// The single result shape every invocation resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvokeOutcome {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Tool Service Endpoint core
pub struct ToolService {
    catalog: ToolCatalog,
    client: Arc<RelayClient>,
    call_timeout: Duration,
}

impl ToolService {
    pub fn new(catalog: ToolCatalog, client: Arc<RelayClient>, call_timeout: Duration) -> Self {
        Self {
            catalog,
            client,
            call_timeout,
        }
    }

    /// The static catalog; sourced from configuration, never computed.
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        self.catalog.tools()
    }

    /// Validate the name, relay the call, normalize the outcome.
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> InvokeOutcome {
        if !self.catalog.contains(name) {
            return InvokeOutcome::fail(ServiceError::UnknownTool(name.to_string()).to_string());
        }

        if !self.client.is_connected().await {
            if let Err(e) = self.client.connect().await {
                tracing::warn!("Bridge connect failed during invoke of {name}: {e}");
                return InvokeOutcome::fail(describe_relay_error(&e));
            }
        }

        tracing::debug!("Invoking browser tool {name}");
        match self.client.call(name, args, self.call_timeout).await {
            Ok(output) => InvokeOutcome::ok(output),
            Err(e) => {
                tracing::warn!("Browser tool {name} failed: {e}");
                InvokeOutcome::fail(describe_relay_error(&e))
            }
        }
    }
}

/// Map a transport-layer failure to the one human-readable sentence the
/// reasoning loop sees.
fn describe_relay_error(error: &RelayError) -> String {
    match error {
        RelayError::TransportNotPresent(_) => format!(
            "Browser extension is not running. Install the extension and keep the browser open ({INSTALL_URL})."
        ),
        RelayError::ConnectionRefused(_) | RelayError::Connect { .. } => {
            "Browser bridge is not accepting connections. Restart the browser to relaunch it."
                .to_string()
        }
        RelayError::ConnectTimeout(timeout) => format!(
            "Timed out connecting to the browser bridge after {}ms.",
            timeout.as_millis()
        ),
        RelayError::ConnectionLost => {
            "Connection to the browser extension was lost. Retry once it reconnects.".to_string()
        }
        RelayError::CallTimeout(timeout) => format!(
            "Tool call timed out after {}s with no response from the browser.",
            timeout.as_secs()
        ),
        RelayError::Tool { code, message } => format!("Tool failed ({code}): {message}"),
        RelayError::Send(reason) => format!("Failed to send the tool request: {reason}"),
    }
}
