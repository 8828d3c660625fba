//! TCP 行式传输实现
//!
//! 主动连接 HAN 控制器，按行收发。读取由调用方在套接字可读时驱动，
//! 不会阻塞调用方；部分行跨多次可读事件持续累积。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let mut link = TcpLineTransport::connect("localhost", 1129).await?;
//! link.write_line("CA01120300000000").await?;
//! link.readable().await?;
//! if let LineRead::Complete(line) = link.read_line() {
//!     println!("{line}");
//! }
//! ```

use crate::error::ProtocolError;
use crate::line::LineFramer;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 64;

/// 默认建连超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// 一次非阻塞读行的结果
#[derive(Debug)]
pub enum LineRead {
    /// 读到完整一行（已去掉 `\r\n`）
    Complete(String),
    /// 暂无更多数据
    Incomplete,
    /// 对端关闭连接
    Closed,
    /// 读错误，连接不可再用
    ReadError(io::Error),
}

/// 已建立的设备链路
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// 等待链路可读
    async fn readable(&self) -> io::Result<()>;

    /// 非阻塞读取一行
    fn read_line(&mut self) -> LineRead;

    /// 写出一行（自动追加 `\n`），直到全部写完或出错
    async fn write_line(&mut self, line: &str) -> Result<(), ProtocolError>;
}

/// 设备链路工厂
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DeviceLink>, ProtocolError>;
}

/// TCP 行式链路
pub struct TcpLineTransport {
    stream: TcpStream,
    peer: SocketAddr,
    framer: LineFramer,
    backlog: VecDeque<u8>,
}

impl TcpLineTransport {
    /// 解析并连接控制器；同时存在 IPv6 与 IPv4 结果时优先 IPv6。
    ///
    /// 失败直接返回，不在内部重试。
    pub async fn connect(host: &str, port: u16) -> Result<Self, ProtocolError> {
        Self::connect_with_timeout(host, port, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// 同 [`Self::connect`]，解析与建连合计不超过 `limit`。
    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        limit: Duration,
    ) -> Result<Self, ProtocolError> {
        let (stream, addr) = timeout(limit, async {
            let addr = resolve(host, port).await?;
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|err| ProtocolError::Connection(format!("{addr}: {err}")))?;
            Ok::<_, ProtocolError>((stream, addr))
        })
        .await
        .map_err(|_| {
            ProtocolError::Connection(format!(
                "{host}:{port}: connect timed out after {}ms",
                limit.as_millis()
            ))
        })??;
        info!(target: "han.protocol", peer = %addr, "device_connected");
        Ok(Self::from_stream(stream, addr))
    }

    pub fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            framer: LineFramer::default(),
            backlog: VecDeque::new(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl DeviceLink for TcpLineTransport {
    async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    fn read_line(&mut self) -> LineRead {
        loop {
            while let Some(byte) = self.backlog.pop_front() {
                if let Some(line) = self.framer.push(byte) {
                    debug!(
                        target: "han.protocol",
                        peer = %self.peer,
                        line = %line,
                        "line_received"
                    );
                    return LineRead::Complete(line);
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    info!(target: "han.protocol", peer = %self.peer, "device_closed_connection");
                    return LineRead::Closed;
                }
                Ok(n) => self.backlog.extend(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return LineRead::Incomplete,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(
                        target: "han.protocol",
                        peer = %self.peer,
                        error = %err,
                        "device_read_failed"
                    );
                    self.framer.reset();
                    self.backlog.clear();
                    return LineRead::ReadError(err);
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        self.stream.write_all(&frame).await.map_err(write_error)?;
        self.stream.flush().await.map_err(write_error)?;
        debug!(target: "han.protocol", peer = %self.peer, line = %line, "line_sent");
        Ok(())
    }
}

/// 基于 TCP 的链路工厂
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// 设置建连超时（建连在引擎任务内进行，不能无限等待）。
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn open(&self) -> Result<TcpLineTransport, ProtocolError> {
        TcpLineTransport::connect_with_timeout(&self.host, self.port, self.connect_timeout).await
    }

    /// 试连接一次后立即关闭，用于启动前检查控制器可达。
    pub async fn probe(&self) -> Result<(), ProtocolError> {
        let link = self.open().await?;
        debug!(target: "han.protocol", peer = %link.peer_addr(), "device_probe_ok");
        Ok(())
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn DeviceLink>, ProtocolError> {
        let link = self.open().await?;
        Ok(Box::new(link))
    }
}

fn write_error(err: io::Error) -> ProtocolError {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::WriteZero => {
            ProtocolError::Closed
        }
        _ => ProtocolError::Io(err),
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ProtocolError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|err| ProtocolError::Resolve(format!("{host}:{port}: {err}")))?
        .collect();
    prefer_ipv6(&addrs)
        .ok_or_else(|| ProtocolError::Resolve(format!("no usable address for {host}:{port}")))
}

/// 从解析结果中挑选目标地址：优先第一个 IPv6，其次第一个 IPv4。
pub fn prefer_ipv6(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv6())
        .or_else(|| addrs.iter().find(|addr| addr.is_ipv4()))
        .copied()
}
