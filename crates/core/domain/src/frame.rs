use crate::service::ServiceId;

/// 单条响应最多携带的参数字节数。
pub const MAX_RESPONSE_PARAMS: usize = 16;

/// 下发给设备的命令帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub address: u8,
    pub command: u8,
    pub params: Vec<u8>,
    /// 等待该命令响应的服务（无则为单向命令）。
    pub service: Option<ServiceId>,
}

/// 设备返回的响应帧，仅存活于一次解码/分发周期。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub address: u8,
    pub command: u8,
    pub params: Vec<u8>,
}

impl ResponseFrame {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}
