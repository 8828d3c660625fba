//! 协议错误类型定义

/// 设备协议与传输错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 地址解析错误
    #[error("resolve error: {0}")]
    Resolve(String),

    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 对端关闭连接
    #[error("connection closed by peer")]
    Closed,

    /// 响应帧格式错误
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
