//! 桥接协议信封类型定义
//!
//! 两条传输通道(stdio 与本地 socket)共用同一种 JSON 消息单元,
//! 通过请求 id 关联请求与响应。

use serde::{Deserialize, Serialize};

/// 合成错误码:Socket 端在调用途中消失时,由 Relay Server 代为回应
pub const BRIDGE_DISCONNECTED: &str = "BRIDGE_DISCONNECTED";

/// 信封类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
    Error,
}

/// 信封携带的错误信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// 协议信封
///
/// 每个请求信封的 id 在其连接生命周期内唯一;每个响应/错误信封的 id
/// 恰好对应一个未完成的请求。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Envelope {
    /// 构造请求信封
    pub fn request(
        id: impl Into<String>,
        tool: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeKind::Request,
            tool: Some(tool.into()),
            args: Some(args),
            result: None,
            error: None,
        }
    }

    /// 构造响应信封
    pub fn response(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeKind::Response,
            tool: None,
            args: None,
            result: Some(result),
            error: None,
        }
    }

    /// 构造错误信封
    pub fn error(
        id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EnvelopeKind::Error,
            tool: None,
            args: None,
            result: None,
            error: Some(ErrorInfo {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// 构造 BRIDGE_DISCONNECTED 合成错误信封
    pub fn bridge_disconnected(id: impl Into<String>) -> Self {
        Self::error(
            id,
            BRIDGE_DISCONNECTED,
            "Relay client disconnected before a response arrived",
        )
    }

    pub fn is_request(&self) -> bool {
        self.kind == EnvelopeKind::Request
    }

    /// 响应或错误信封都会终结一个未完成请求
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Response | EnvelopeKind::Error)
    }
}
