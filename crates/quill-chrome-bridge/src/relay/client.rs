//! Relay Client - 桥接 socket 的 Agent 侧
//!
//! 架构:
//! MCP 端点 (持有此 Relay Client) → Socket → Relay Server → Native Messaging → 浏览器扩展
//!
//! 一条连接上可以有任意多个并发调用,每个调用由自己的 id 关联;
//! 响应乱序到达是正常情况。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

use crate::config::BridgeSettings;
use crate::envelope::{Envelope, EnvelopeKind, ErrorInfo};
use crate::framing::{FrameCodec, FrameDecoder, FrameError};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 传输层错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    /// 传输地址不存在 —— Relay Server 从未启动
    #[error("Bridge transport not present at {0}")]
    TransportNotPresent(String),

    /// 地址存在但无人接受连接
    #[error("Bridge refused connection at {0}")]
    ConnectionRefused(String),

    /// 其余连接失败
    #[error("Failed to connect to bridge at {path}: {message}")]
    Connect { path: String, message: String },

    #[error("Timed out connecting to bridge after {0:?}")]
    ConnectTimeout(Duration),

    /// 连接丢失;未重连前所有调用快速失败
    #[error("Bridge connection lost")]
    ConnectionLost,

    #[error("Tool call timed out after {0:?}")]
    CallTimeout(Duration),

    /// 对端以错误信封回应;内容原样透传
    #[error("{code}: {message}")]
    Tool { code: String, message: String },

    #[error("Failed to send request: {0}")]
    Send(String),
}

/// 等待响应的调用
struct PendingCall {
    sender: oneshot::Sender<Result<serde_json::Value, RelayError>>,
    submitted_at: Instant,
}

struct ClientState {
    connected: bool,
    pending_calls: HashMap<String, PendingCall>,
}

/// Relay Client - 连接 Relay Server 的 socket 端点
pub struct RelayClient {
    address: String,
    codec: FrameCodec,
    connect_timeout: Duration,
    call_seq: AtomicU64,
    state: Arc<Mutex<ClientState>>,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    shutdown_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    connect_lock: Mutex<()>,
}

impl RelayClient {
    pub fn new(address: impl Into<String>, codec: FrameCodec, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            codec,
            connect_timeout,
            call_seq: AtomicU64::new(0),
            state: Arc::new(Mutex::new(ClientState {
                connected: false,
                pending_calls: HashMap::new(),
            })),
            writer: Arc::new(Mutex::new(None)),
            shutdown_tx: Arc::new(Mutex::new(None)),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self::new(
            settings.resolved_socket_path(),
            FrameCodec::new(settings.max_frame_size),
            settings.connect_timeout(),
        )
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// 当前等待响应的调用数
    pub async fn pending_calls(&self) -> usize {
        self.state.lock().await.pending_calls.len()
    }

    /// 连接 Relay Server
    ///
    /// 失败时区分"传输地址不存在"与"连接被拒绝";内部不重试,
    /// 重试策略由调用方决定。
    pub async fn connect(&self) -> Result<(), RelayError> {
        let _guard = self.connect_lock.lock().await;
        if self.state.lock().await.connected {
            return Ok(());
        }

        let (reader, writer) = self.open_stream().await?;
        *self.writer.lock().await = Some(writer);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let state = Arc::clone(&self.state);
        let writer_slot = Arc::clone(&self.writer);
        let decoder = self.codec.decoder();
        tokio::spawn(async move {
            Self::read_loop(reader, decoder, state, writer_slot, shutdown_rx).await;
        });

        self.state.lock().await.connected = true;
        tracing::info!("Connected to bridge socket at {}", self.address);
        Ok(())
    }

    #[cfg(unix)]
    async fn open_stream(&self) -> Result<(BoxedReader, BoxedWriter), RelayError> {
        match timeout(
            self.connect_timeout,
            tokio::net::UnixStream::connect(&self.address),
        )
        .await
        {
            Err(_) => Err(RelayError::ConnectTimeout(self.connect_timeout)),
            Ok(Err(e)) => Err(classify_connect_error(&self.address, &e)),
            Ok(Ok(stream)) => {
                let (reader, writer) = tokio::io::split(stream);
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }

    #[cfg(windows)]
    async fn open_stream(&self) -> Result<(BoxedReader, BoxedWriter), RelayError> {
        use tokio::net::windows::named_pipe::ClientOptions;

        match ClientOptions::new().open(&self.address) {
            Ok(pipe) => {
                let (reader, writer) = tokio::io::split(pipe);
                Ok((Box::new(reader), Box::new(writer)))
            }
            Err(e) => Err(classify_connect_error(&self.address, &e)),
        }
    }

    /// 读取循环:解帧并结算匹配的挂起调用
    async fn read_loop(
        mut reader: BoxedReader,
        mut decoder: FrameDecoder,
        state: Arc<Mutex<ClientState>>,
        writer_slot: Arc<Mutex<Option<BoxedWriter>>>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut read_buf = [0u8; 4096];

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Relay client read loop shutting down");
                    break;
                }
                result = reader.read(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            tracing::info!("Bridge socket closed by server");
                            Self::handle_disconnect(&state, &writer_slot).await;
                            break;
                        }
                        Ok(n) => {
                            decoder.extend(&read_buf[..n]);
                            loop {
                                match decoder.next() {
                                    Ok(Some(envelope)) => {
                                        Self::handle_envelope(envelope, &state).await;
                                    }
                                    Ok(None) => break,
                                    Err(FrameError::Malformed(reason)) => {
                                        tracing::warn!(
                                            "Skipping malformed frame from bridge: {reason}"
                                        );
                                    }
                                    Err(e) => {
                                        tracing::error!("Fatal framing error from bridge: {e}");
                                        Self::handle_disconnect(&state, &writer_slot).await;
                                        return;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!("Bridge socket read error: {e}");
                            Self::handle_disconnect(&state, &writer_slot).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_envelope(envelope: Envelope, state: &Arc<Mutex<ClientState>>) {
        match envelope.kind {
            EnvelopeKind::Request => {
                // Agent 侧不暴露入站工具面;见 DESIGN.md
                tracing::warn!(
                    "Ignoring request envelope {} from bridge: no inbound tool surface",
                    envelope.id
                );
            }
            EnvelopeKind::Response | EnvelopeKind::Error => {
                let mut state = state.lock().await;
                match state.pending_calls.remove(&envelope.id) {
                    Some(pending) => {
                        tracing::debug!(
                            "Call {} settled after {:?}",
                            envelope.id,
                            pending.submitted_at.elapsed()
                        );
                        let outcome = match envelope.kind {
                            EnvelopeKind::Error => {
                                let info = envelope.error.unwrap_or(ErrorInfo {
                                    code: "UNKNOWN".to_string(),
                                    message: "error envelope without error payload".to_string(),
                                });
                                Err(RelayError::Tool {
                                    code: info.code,
                                    message: info.message,
                                })
                            }
                            _ => Ok(envelope.result.unwrap_or(serde_json::Value::Null)),
                        };
                        let _ = pending.sender.send(outcome);
                    }
                    None => {
                        tracing::debug!(
                            "Discarding response for unknown or timed-out call {}",
                            envelope.id
                        );
                    }
                }
            }
        }
    }

    /// 发起一次工具调用并等待其关联响应
    pub async fn call(
        &self,
        tool: &str,
        args: serde_json::Value,
        call_timeout: Duration,
    ) -> Result<serde_json::Value, RelayError> {
        let id = format!(
            "call_{}_{}",
            self.call_seq.fetch_add(1, Ordering::SeqCst),
            nanoid::nanoid!(8)
        );

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if !state.connected {
                return Err(RelayError::ConnectionLost);
            }
            state.pending_calls.insert(
                id.clone(),
                PendingCall {
                    sender: tx,
                    submitted_at: Instant::now(),
                },
            );
        }

        let envelope = Envelope::request(&id, tool, args);
        if let Err(e) = self.send_envelope(&envelope).await {
            self.state.lock().await.pending_calls.remove(&id);
            return Err(e);
        }

        match timeout(call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RelayError::ConnectionLost),
            Err(_) => {
                // 超时即移除挂起项;此后迟到的响应只会被记录并丢弃
                self.state.lock().await.pending_calls.remove(&id);
                Err(RelayError::CallTimeout(call_timeout))
            }
        }
    }

    async fn send_envelope(&self, envelope: &Envelope) -> Result<(), RelayError> {
        let frame = self
            .codec
            .encode(envelope)
            .map_err(|e| RelayError::Send(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                w.write_all(&frame)
                    .await
                    .map_err(|e| RelayError::Send(e.to_string()))?;
                w.flush()
                    .await
                    .map_err(|e| RelayError::Send(e.to_string()))?;
                Ok(())
            }
            None => Err(RelayError::ConnectionLost),
        }
    }

    /// 主动断开连接,结算所有挂起调用
    pub async fn disconnect(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
        Self::handle_disconnect(&self.state, &self.writer).await;
    }

    async fn handle_disconnect(
        state: &Arc<Mutex<ClientState>>,
        writer_slot: &Arc<Mutex<Option<BoxedWriter>>>,
    ) {
        *writer_slot.lock().await = None;

        let mut state = state.lock().await;
        state.connected = false;
        if !state.pending_calls.is_empty() {
            tracing::warn!(
                "Resolving {} pending calls after connection loss",
                state.pending_calls.len()
            );
        }
        for (_, pending) in state.pending_calls.drain() {
            let _ = pending.sender.send(Err(RelayError::ConnectionLost));
        }
    }
}

fn classify_connect_error(path: &str, e: &std::io::Error) -> RelayError {
    match e.kind() {
        std::io::ErrorKind::NotFound => RelayError::TransportNotPresent(path.to_string()),
        std::io::ErrorKind::ConnectionRefused => RelayError::ConnectionRefused(path.to_string()),
        _ => RelayError::Connect {
            path: path.to_string(),
            message: e.to_string(),
        },
    }
}
