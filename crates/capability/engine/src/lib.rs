//! # HAN 网关引擎
//!
//! 把总线请求翻译成设备命令，把设备响应翻译回总线状态事件：
//!
//! ```text
//! BusRequest ─▶ ServiceRegistry ─▶ build_command ─▶ WorkQueue
//!                                                      │ tick
//!                                                      ▼
//! StatusPublisher ◀── decode ◀── 待响应关联 ◀── DeviceLink
//! ```
//!
//! 同一时刻最多一条命令在途，[`Gateway`] 是唯一持有可变状态的对象。

mod decode;
mod gateway;
mod queue;
mod registry;
mod request;

pub use decode::{DecodeError, STATUS_CLASS, STATUS_TYPE, decode};
pub use gateway::{
    DrainOutcome, Gateway, GatewayConfig, GatewayEvent, LinkState, PublishError, StatusPublisher,
};
pub use queue::{QueuedCommand, WorkQueue};
pub use registry::{MAX_ADDRESS, RegistryError, ServiceRegistry};
pub use request::{MAX_DEVICE, OUTPUT_STATUS_QUERY, RequestError, build_command};
