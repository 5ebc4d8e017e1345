//! Relay Server - 运行在 Native Host 进程中
//!
//! 架构:
//! 浏览器扩展 → Native Messaging (stdio) → Relay Server ← Socket ← Relay Client
//!
//! Server 是纯粹的保持关联关系的转发器:不解释任何工具语义,只按
//! 信封 id 在两条通道间转发请求与响应,并为两个方向各自维护一张
//! 在途请求表,用于检测孤儿响应与在连接断开时合成错误回应。
//!
//! 整个桥在单个 select 驱动的任务里运行:stdio 读、连接接受、socket
//! 读共用一个事件循环,两张在途表只被这一个任务改写。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::config::BridgeSettings;
use crate::envelope::{Envelope, EnvelopeKind};
use crate::events::{BridgeEvent, EventBus};
use crate::framing::{FrameCodec, FrameDecoder, FrameError};

/// Relay Server 状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    AwaitingClient,
    Bridging,
    Draining,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Starting => write!(f, "Starting"),
            ServerState::AwaitingClient => write!(f, "AwaitingClient"),
            ServerState::Bridging => write!(f, "Bridging"),
            ServerState::Draining => write!(f, "Draining"),
            ServerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Relay Server 配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket_path: String,
    pub max_frame_size: u32,
}

impl ServerConfig {
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            socket_path: settings.resolved_socket_path(),
            max_frame_size: settings.max_frame_size,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    /// 启动期唯一的致命错误
    #[error("Failed to bind bridge socket {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on native messaging stream: {0}")]
    Io(#[from] std::io::Error),
}

/// 当前已连接的 Relay Client
struct ClientConn {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    decoder: FrameDecoder,
}

/// Relay Server - stdio 与 socket 之间的关联转发器
pub struct RelayServer {
    config: ServerConfig,
    listener: UnixListener,
    codec: FrameCodec,
    state_tx: watch::Sender<ServerState>,
    events: Arc<EventBus>,
}

impl RelayServer {
    /// 绑定监听 socket;先移除上次不干净退出留下的文件
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let _ = std::fs::remove_file(&config.socket_path);

        let listener = UnixListener::bind(&config.socket_path).map_err(|e| ServerError::Bind {
            path: config.socket_path.clone(),
            source: e,
        })?;

        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&config.socket_path, perms);
        }

        tracing::info!("Bridge socket listening at {}", config.socket_path);

        let (state_tx, _) = watch::channel(ServerState::Starting);
        Ok(Self {
            codec: FrameCodec::new(config.max_frame_size),
            config,
            listener,
            state_tx,
            events: Arc::new(EventBus::new()),
        })
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// 状态观察通道
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    pub fn socket_path(&self) -> &str {
        &self.config.socket_path
    }

    /// 运行桥接主循环,直到 stdin 关闭
    ///
    /// stdio 两端是泛型句柄:二进制入口传入真实的 stdin/stdout,
    /// 测试用内存管道驱动同一条路径。
    pub async fn run<I, O>(self, stdin: I, stdout: O) -> Result<(), ServerError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let RelayServer {
            config,
            listener,
            codec,
            state_tx,
            events,
        } = self;

        let mut bridge = Bridge {
            codec,
            stdout,
            client: None,
            stdio_pending: HashMap::new(),
            socket_pending: HashMap::new(),
            events,
            state_tx,
        };

        bridge.set_state(ServerState::AwaitingClient);
        let result = run_loop(stdin, &listener, &mut bridge).await;

        // Draining:不再读 stdio,不再发帧,关闭监听并移除 socket 文件
        bridge.set_state(ServerState::Draining);
        bridge.events.emit(BridgeEvent::Draining);
        drop(listener);
        let _ = std::fs::remove_file(&config.socket_path);
        bridge.set_state(ServerState::Stopped);
        tracing::info!("Relay server stopped");
        result
    }
}

async fn run_loop<I, O>(
    mut stdin: I,
    listener: &UnixListener,
    bridge: &mut Bridge<O>,
) -> Result<(), ServerError>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut stdin_decoder = bridge.codec.decoder();
    let mut stdin_buf = vec![0u8; 8192];
    let mut sock_buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            result = stdin.read(&mut stdin_buf) => {
                match result {
                    Ok(0) => {
                        tracing::info!("Native messaging stream closed by browser");
                        return Ok(());
                    }
                    Ok(n) => {
                        stdin_decoder.extend(&stdin_buf[..n]);
                        loop {
                            match stdin_decoder.next() {
                                Ok(Some(envelope)) => {
                                    bridge.on_stdio_envelope(envelope).await?;
                                }
                                Ok(None) => break,
                                Err(FrameError::Malformed(reason)) => {
                                    tracing::warn!("Skipping malformed frame from stdio: {reason}");
                                }
                                Err(e) => {
                                    // 长度前缀越界后,stdio 流位置已不可信
                                    tracing::error!("Fatal framing error on stdio: {e}");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Native messaging read error: {e}");
                        return Ok(());
                    }
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => bridge.attach_client(stream).await?,
                    Err(e) => tracing::warn!("Accept error on bridge socket: {e}"),
                }
            }
            result = async {
                match bridge.client.as_mut() {
                    Some(conn) => conn.reader.read(&mut sock_buf).await,
                    None => std::future::pending().await,
                }
            }, if bridge.client.is_some() => {
                match result {
                    Ok(0) => bridge.drop_client("connection closed").await?,
                    Ok(n) => {
                        if let Some(conn) = bridge.client.as_mut() {
                            conn.decoder.extend(&sock_buf[..n]);
                        }
                        loop {
                            let next = match bridge.client.as_mut() {
                                Some(conn) => conn.decoder.next(),
                                None => break,
                            };
                            match next {
                                Ok(Some(envelope)) => bridge.on_socket_envelope(envelope).await?,
                                Ok(None) => break,
                                Err(FrameError::Malformed(reason)) => {
                                    tracing::warn!("Skipping malformed frame from client: {reason}");
                                }
                                Err(e) => {
                                    tracing::error!("Fatal framing error from client: {e}");
                                    bridge.drop_client("oversized frame").await?;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => bridge.drop_client(&format!("read error: {e}")).await?,
                }
            }
        }
    }
}

/// 桥接循环的共享状态;只被 run_loop 这一个任务改写
struct Bridge<O> {
    codec: FrameCodec,
    stdout: O,
    client: Option<ClientConn>,
    /// stdio 侧发起的请求,等待 socket 侧响应
    stdio_pending: HashMap<String, Instant>,
    /// socket 侧发起的请求,等待 stdio 侧响应
    socket_pending: HashMap<String, Instant>,
    events: Arc<EventBus>,
    state_tx: watch::Sender<ServerState>,
}

impl<O> Bridge<O>
where
    O: AsyncWrite + Unpin,
{
    fn set_state(&self, state: ServerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!("Relay server state: {previous} -> {state}");
        }
    }

    /// 处理来自 stdio(浏览器扩展)的信封
    async fn on_stdio_envelope(&mut self, envelope: Envelope) -> Result<(), ServerError> {
        match envelope.kind {
            EnvelopeKind::Request => {
                if self.client.is_none() {
                    tracing::warn!(
                        "Request {} arrived with no relay client connected",
                        envelope.id
                    );
                    let reply = Envelope::bridge_disconnected(&envelope.id);
                    return self.write_stdout(&reply).await;
                }
                if self
                    .stdio_pending
                    .insert(envelope.id.clone(), Instant::now())
                    .is_some()
                {
                    tracing::warn!("Duplicate request id {} from stdio", envelope.id);
                }
                if !self.write_client(&envelope).await {
                    self.drop_client("write failure").await?;
                }
                Ok(())
            }
            EnvelopeKind::Response | EnvelopeKind::Error => {
                match self.socket_pending.remove(&envelope.id) {
                    Some(submitted_at) => {
                        tracing::debug!(
                            "Relaying settlement for {} after {:?}",
                            envelope.id,
                            submitted_at.elapsed()
                        );
                        if self.client.is_some() {
                            if !self.write_client(&envelope).await {
                                self.drop_client("write failure").await?;
                            }
                        } else {
                            tracing::warn!(
                                "Dropping settlement for {}: its client disconnected",
                                envelope.id
                            );
                        }
                    }
                    None => {
                        tracing::warn!(
                            "Orphaned envelope {} from stdio matches no pending request",
                            envelope.id
                        );
                    }
                }
                Ok(())
            }
        }
    }

    /// 处理来自 socket(Relay Client)的信封
    async fn on_socket_envelope(&mut self, envelope: Envelope) -> Result<(), ServerError> {
        match envelope.kind {
            EnvelopeKind::Request => {
                if self
                    .socket_pending
                    .insert(envelope.id.clone(), Instant::now())
                    .is_some()
                {
                    tracing::warn!("Duplicate request id {} from client", envelope.id);
                }
                self.write_stdout(&envelope).await
            }
            EnvelopeKind::Response | EnvelopeKind::Error => {
                match self.stdio_pending.remove(&envelope.id) {
                    Some(_) => self.write_stdout(&envelope).await,
                    None => {
                        tracing::warn!(
                            "Orphaned envelope {} from client matches no pending request",
                            envelope.id
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    /// 接入新的 Relay Client;已有连接时执行替换策略
    async fn attach_client(&mut self, stream: UnixStream) -> Result<(), ServerError> {
        if self.client.is_some() {
            tracing::info!("New relay client supersedes the active connection");
            self.drop_client("superseded by a new client").await?;
        }

        let (reader, writer) = stream.into_split();
        self.client = Some(ClientConn {
            reader,
            writer,
            decoder: self.codec.decoder(),
        });
        tracing::info!("Relay client connected");
        self.set_state(ServerState::Bridging);
        self.events.emit(BridgeEvent::ClientConnected);
        self.events.emit(BridgeEvent::Bridging);
        Ok(())
    }

    /// 断开当前客户端:stdio 侧在途请求全部合成 BRIDGE_DISCONNECTED
    async fn drop_client(&mut self, reason: &str) -> Result<(), ServerError> {
        if self.client.take().is_none() {
            return Ok(());
        }
        tracing::info!("Relay client disconnected ({reason})");
        self.events.emit(BridgeEvent::ClientDisconnected);

        if !self.socket_pending.is_empty() {
            tracing::warn!(
                "Dropping {} client-originated pending requests",
                self.socket_pending.len()
            );
            self.socket_pending.clear();
        }

        let ids: Vec<String> = self.stdio_pending.drain().map(|(id, _)| id).collect();
        if !ids.is_empty() {
            tracing::warn!(
                "Resolving {} browser-originated pending requests as disconnected",
                ids.len()
            );
        }
        for id in ids {
            self.write_stdout(&Envelope::bridge_disconnected(&id)).await?;
        }

        self.set_state(ServerState::AwaitingClient);
        Ok(())
    }

    async fn write_stdout(&mut self, envelope: &Envelope) -> Result<(), ServerError> {
        match self.codec.encode(envelope) {
            Ok(frame) => {
                self.stdout.write_all(&frame).await?;
                self.stdout.flush().await?;
                Ok(())
            }
            Err(e) => {
                // 编码失败只影响这一条消息
                tracing::error!("Failed to encode envelope {} for stdout: {e}", envelope.id);
                Ok(())
            }
        }
    }

    /// 写入当前客户端;返回 false 表示连接已不可用
    async fn write_client(&mut self, envelope: &Envelope) -> bool {
        let Some(conn) = self.client.as_mut() else {
            return false;
        };
        let frame = match self.codec.encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode envelope {} for client: {e}", envelope.id);
                return true;
            }
        };
        conn.writer.write_all(&frame).await.is_ok() && conn.writer.flush().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::BRIDGE_DISCONNECTED;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn test_config(path: &Path) -> ServerConfig {
        ServerConfig {
            socket_path: path.to_string_lossy().to_string(),
            max_frame_size: 65536,
        }
    }

    fn codec() -> FrameCodec {
        FrameCodec::new(65536)
    }

    /// 启动一座桥:返回扩展侧的 stdio 两端与状态观察通道
    fn spawn_server(
        path: &Path,
    ) -> (
        DuplexStream,
        DuplexStream,
        watch::Receiver<ServerState>,
        tokio::task::JoinHandle<Result<(), ServerError>>,
    ) {
        let (ext_out, host_in) = tokio::io::duplex(65536);
        let (host_out, ext_in) = tokio::io::duplex(65536);
        let server = RelayServer::bind(test_config(path)).unwrap();
        let state = server.state();
        let handle = tokio::spawn(server.run(host_in, host_out));
        (ext_out, ext_in, state, handle)
    }

    async fn write_raw<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) {
        writer.write_all(bytes).await.unwrap();
        writer.flush().await.unwrap();
    }

    async fn write_env<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) {
        let frame = codec().encode(envelope).unwrap();
        write_raw(writer, &frame).await;
    }

    async fn read_env<R: AsyncRead + Unpin>(reader: &mut R, decoder: &mut FrameDecoder) -> Envelope {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(envelope) = decoder.next().unwrap() {
                return envelope;
            }
            let n = tokio::time::timeout(Duration::from_secs(2), reader.read(&mut buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            assert!(n > 0, "stream closed while a frame was expected");
            decoder.extend(&buf[..n]);
        }
    }

    async fn read_sock_env(stream: &mut UnixStream, decoder: &mut FrameDecoder) -> Envelope {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(envelope) = decoder.next().unwrap() {
                return envelope;
            }
            let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            assert!(n > 0, "socket closed while a frame was expected");
            decoder.extend(&buf[..n]);
        }
    }

    async fn write_sock_env(stream: &mut UnixStream, envelope: &Envelope) {
        let frame = codec().encode(envelope).unwrap();
        stream.write_all(&frame).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_removes_stale_socket_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let server = RelayServer::bind(test_config(&path)).unwrap();
        assert_eq!(server.socket_path(), path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_relays_in_both_directions_with_matching_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (mut ext_out, mut ext_in, mut state, _handle) = spawn_server(&path);
        let mut ext_decoder = codec().decoder();

        let mut client = UnixStream::connect(&path).await.unwrap();
        let mut client_decoder = codec().decoder();
        state
            .wait_for(|s| *s == ServerState::Bridging)
            .await
            .unwrap();

        // 浏览器发起的请求穿过 socket,响应原路返回
        write_env(&mut ext_out, &Envelope::request("b1", "form_input", json!({"value": "x"})))
            .await;
        let relayed = read_sock_env(&mut client, &mut client_decoder).await;
        assert_eq!(relayed.id, "b1");
        assert_eq!(relayed.tool.as_deref(), Some("form_input"));

        write_sock_env(&mut client, &Envelope::response("b1", json!({"done": true}))).await;
        let settled = read_env(&mut ext_in, &mut ext_decoder).await;
        assert_eq!(settled.id, "b1");
        assert_eq!(settled.result, Some(json!({"done": true})));

        // Agent 发起的请求穿过 stdio,响应原路返回
        write_sock_env(&mut client, &Envelope::request("c1", "screenshot", json!({}))).await;
        let relayed = read_env(&mut ext_in, &mut ext_decoder).await;
        assert_eq!(relayed.id, "c1");

        write_env(&mut ext_out, &Envelope::response("c1", json!({"ok": true}))).await;
        let settled = read_sock_env(&mut client, &mut client_decoder).await;
        assert_eq!(settled.id, "c1");
        assert_eq!(settled.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_request_without_client_resolves_bridge_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (mut ext_out, mut ext_in, _state, _handle) = spawn_server(&path);
        let mut ext_decoder = codec().decoder();

        write_env(&mut ext_out, &Envelope::request("b1", "navigate", json!({"tabId": 1}))).await;
        let reply = read_env(&mut ext_in, &mut ext_decoder).await;
        assert_eq!(reply.id, "b1");
        assert_eq!(reply.kind, EnvelopeKind::Error);
        assert_eq!(reply.error.unwrap().code, BRIDGE_DISCONNECTED);
    }

    #[tokio::test]
    async fn test_client_drop_resolves_all_pending_and_server_reaccepts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (mut ext_out, mut ext_in, mut state, _handle) = spawn_server(&path);
        let mut ext_decoder = codec().decoder();

        let mut client = UnixStream::connect(&path).await.unwrap();
        let mut client_decoder = codec().decoder();
        state
            .wait_for(|s| *s == ServerState::Bridging)
            .await
            .unwrap();

        // K 个在途请求全部已转发给客户端
        let ids = ["k1", "k2", "k3"];
        for id in ids {
            write_env(&mut ext_out, &Envelope::request(id, "find", json!({"query": "q"}))).await;
            let relayed = read_sock_env(&mut client, &mut client_decoder).await;
            assert_eq!(relayed.id, id);
        }

        drop(client);

        let mut seen: Vec<String> = Vec::new();
        for _ in 0..ids.len() {
            let reply = read_env(&mut ext_in, &mut ext_decoder).await;
            assert_eq!(reply.kind, EnvelopeKind::Error);
            assert_eq!(reply.error.as_ref().unwrap().code, BRIDGE_DISCONNECTED);
            seen.push(reply.id);
        }
        seen.sort();
        assert_eq!(seen, vec!["k1", "k2", "k3"]);

        // 回到接受状态,新的客户端可以接入并继续桥接
        state
            .wait_for(|s| *s == ServerState::AwaitingClient)
            .await
            .unwrap();
        let mut client2 = UnixStream::connect(&path).await.unwrap();
        let mut client2_decoder = codec().decoder();
        state
            .wait_for(|s| *s == ServerState::Bridging)
            .await
            .unwrap();
        write_env(&mut ext_out, &Envelope::request("k4", "find", json!({"query": "q"}))).await;
        let relayed = read_sock_env(&mut client2, &mut client2_decoder).await;
        assert_eq!(relayed.id, "k4");
    }

    #[tokio::test]
    async fn test_orphan_settlement_from_client_is_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (_ext_out, mut ext_in, mut state, _handle) = spawn_server(&path);
        let mut ext_decoder = codec().decoder();

        let mut client = UnixStream::connect(&path).await.unwrap();
        state
            .wait_for(|s| *s == ServerState::Bridging)
            .await
            .unwrap();

        // 无人等待的响应必须被丢弃;其后的请求照常转发
        write_sock_env(&mut client, &Envelope::response("ghost", json!({"ok": true}))).await;
        write_sock_env(&mut client, &Envelope::request("q1", "screenshot", json!({}))).await;

        let first = read_env(&mut ext_in, &mut ext_decoder).await;
        assert_eq!(first.id, "q1");
        assert!(first.is_request());
    }

    #[tokio::test]
    async fn test_second_client_supersedes_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (mut ext_out, mut ext_in, mut state, _handle) = spawn_server(&path);
        let mut ext_decoder = codec().decoder();

        let mut client1 = UnixStream::connect(&path).await.unwrap();
        let mut client1_decoder = codec().decoder();
        state
            .wait_for(|s| *s == ServerState::Bridging)
            .await
            .unwrap();

        write_env(&mut ext_out, &Envelope::request("r1", "navigate", json!({"tabId": 1}))).await;
        let relayed = read_sock_env(&mut client1, &mut client1_decoder).await;
        assert_eq!(relayed.id, "r1");

        // 新连接替换旧连接;旧连接的在途请求合成断开错误
        let mut client2 = UnixStream::connect(&path).await.unwrap();
        let mut client2_decoder = codec().decoder();

        let reply = read_env(&mut ext_in, &mut ext_decoder).await;
        assert_eq!(reply.id, "r1");
        assert_eq!(reply.error.unwrap().code, BRIDGE_DISCONNECTED);

        // 旧连接被服务器关闭
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), client1.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap();
        assert_eq!(n, 0);

        // 新连接正常桥接
        write_env(&mut ext_out, &Envelope::request("r2", "navigate", json!({"tabId": 2}))).await;
        let relayed = read_sock_env(&mut client2, &mut client2_decoder).await;
        assert_eq!(relayed.id, "r2");
    }

    #[tokio::test]
    async fn test_malformed_stdio_frame_does_not_poison_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (mut ext_out, mut ext_in, _state, _handle) = spawn_server(&path);
        let mut ext_decoder = codec().decoder();

        let garbage = b"{broken";
        let mut frame = Vec::new();
        frame.extend_from_slice(&(garbage.len() as u32).to_le_bytes());
        frame.extend_from_slice(garbage);
        write_raw(&mut ext_out, &frame).await;

        // 后续请求照常处理(无客户端 → 合成断开错误)
        write_env(&mut ext_out, &Envelope::request("b1", "navigate", json!({"tabId": 1}))).await;
        let reply = read_env(&mut ext_in, &mut ext_decoder).await;
        assert_eq!(reply.id, "b1");
        assert_eq!(reply.error.unwrap().code, BRIDGE_DISCONNECTED);
    }

    #[tokio::test]
    async fn test_stdin_eof_drains_and_removes_socket_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let (ext_out, _ext_in, mut state, handle) = spawn_server(&path);

        state
            .wait_for(|s| *s == ServerState::AwaitingClient)
            .await
            .unwrap();
        assert!(path.exists());

        drop(ext_out);

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not drain")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(*state.borrow(), ServerState::Stopped);
        assert!(!path.exists());
    }
}
