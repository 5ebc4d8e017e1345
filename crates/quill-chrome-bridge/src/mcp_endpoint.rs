//! MCP 端点 - 推理循环与桥之间的协议面
//!
//! 架构:
//! CLI ↔ stdio (JSON-RPC) ↔ MCP 端点 ↔ Relay Client ↔ Socket ↔ Relay Server ↔ 浏览器扩展
//!
//! 按行读取 JSON-RPC 2.0 请求,支持 initialize / tools/list / tools/call。
//! 工具结果以 MCP content 形式返回;所有失败都已被 ToolService 归一成
//! 单一形状,这里不再区分失败来自哪一层。

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::service::{InvokeOutcome, ToolService};

/// MCP 协议版本
const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP 请求
#[derive(Debug, Deserialize)]
struct McpRequest {
    id: serde_json::Value,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// MCP 工具调用结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    pub content: Vec<McpContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// MCP 内容项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl McpContent {
    fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

/// MCP 端点
pub struct McpEndpoint {
    service: ToolService,
    server_name: String,
}

impl McpEndpoint {
    pub fn new(service: ToolService, server_name: impl Into<String>) -> Self {
        Self {
            service,
            server_name: server_name.into(),
        }
    }

    /// 在真实 stdio 上运行
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// 读取循环;reader/writer 泛型化以便测试驱动
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<McpRequest>(&line) {
                Ok(request) => self.handle_request(request, &mut writer).await?,
                Err(e) => tracing::error!("Failed to parse MCP request: {e}"),
            }
        }
        tracing::info!("MCP endpoint input closed");
        Ok(())
    }

    async fn handle_request<W>(&self, request: McpRequest, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        tracing::debug!("MCP request: {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&request.params).await,
            _ => Err(format!("Method not found: {}", request.method)),
        };

        match result {
            Ok(value) => write_response(writer, &request.id, value).await,
            Err(message) => write_error(writer, &request.id, -32601, &message).await,
        }
    }

    fn handle_initialize(&self) -> serde_json::Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn handle_tools_list(&self) -> serde_json::Value {
        json!({ "tools": self.service.list_tools() })
    }

    async fn handle_tools_call(
        &self,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing tool name".to_string())?;
        let args = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let outcome = self.service.invoke(name, args).await;
        serde_json::to_value(to_tool_result(outcome)).map_err(|e| e.to_string())
    }
}

/// 把归一化的调用结果转成 MCP content
fn to_tool_result(outcome: InvokeOutcome) -> McpToolResult {
    if outcome.success {
        let output = outcome.output.unwrap_or(json!({}));
        let text = match &output {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        McpToolResult {
            content: vec![McpContent::text(text)],
            is_error: Some(false),
        }
    } else {
        McpToolResult {
            content: vec![McpContent::text(
                outcome.error.unwrap_or_else(|| "Tool execution failed".to_string()),
            )],
            is_error: Some(true),
        }
    }
}

async fn write_response<W>(
    writer: &mut W,
    id: &serde_json::Value,
    result: serde_json::Value,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    });
    writer.write_all(response.to_string().as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn write_error<W>(
    writer: &mut W,
    id: &serde_json::Value,
    code: i32,
    message: &str,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    });
    writer.write_all(response.to_string().as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
