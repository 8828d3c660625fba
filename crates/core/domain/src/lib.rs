//! HAN 网关领域模型：服务、命令/响应帧与总线消息。

pub mod frame;
pub mod message;
pub mod service;

pub use frame::{CommandFrame, MAX_RESPONSE_PARAMS, ResponseFrame};
pub use message::{BusRequest, MessageType, Schema, StatusEvent};
pub use service::{
    CommandType, Service, ServiceDescriptor, ServiceId, Units, identity_hash,
};
