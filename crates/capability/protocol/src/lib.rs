//! # HAN 设备协议能力模块
//!
//! 负责与 HAN 控制器之间的字节流：
//! - **行式传输**：TCP 连接、非阻塞读行、完整写出
//! - **帧编解码**：`CA...` 命令帧与 `RS...` 响应帧
//!
//! ## 架构设计
//!
//! ```text
//! CommandFrame ──encode──▶ "CA01120300000000" ──write_line──▶ TCP
//!                                                                 │
//! ResponseFrame ◀──decode── "RS0112020A00E803" ◀──read_line──────┘
//! ```

mod codec;
mod error;
mod line;
mod transport;

pub use codec::{
    COMMAND_PREFIX, RESPONSE_PREFIX, decode_response, encode_command, encode_frame, hex2,
};
pub use error::ProtocolError;
pub use line::{LineFramer, MAX_LINE_LEN};
pub use transport::{
    DEFAULT_CONNECT_TIMEOUT, DeviceConnector, DeviceLink, LineRead, TcpConnector, TcpLineTransport,
    prefer_ipv6,
};
