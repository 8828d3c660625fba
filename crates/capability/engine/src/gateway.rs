//! 网关引擎
//!
//! 持有注册表、工作队列与设备链路，按事件驱动：
//! - 总线请求：查找服务、校验、构建命令并入队
//! - 定时 tick：（可选）过期待响应槽，然后发出队首一条命令
//! - 设备可读：读出当前可用的全部完整行并逐行关联、解码、上报
//!
//! 所有处理都在同一个任务内串行执行，处理函数内部不会触发新的出队。

use crate::decode::decode;
use crate::queue::WorkQueue;
use crate::registry::ServiceRegistry;
use crate::request::{RequestError, build_command};
use async_trait::async_trait;
use domain::{BusRequest, MessageType, Service, StatusEvent};
use han_protocol::{DeviceConnector, DeviceLink, LineRead, decode_response, encode_frame};
use han_telemetry::{
    record_command_send_failure, record_command_sent, record_command_timed_out,
    record_connect_failure, record_decode_failure, record_request_accepted,
    record_request_rejected, record_response_dispatched, record_response_unmatched,
    record_status_publish_failure, record_status_published,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 引擎输入事件。
#[derive(Debug)]
pub enum GatewayEvent {
    BusRequest(BusRequest),
    /// 已由外部读出的一行设备响应
    DeviceLine(String),
    /// 设备链路可读
    DeviceReadable,
    Tick,
}

/// 状态上报错误。
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// 状态事件发布器抽象（总线侧实现）。
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, event: &StatusEvent) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// 等待响应的超时；`None` 表示一直等到下一次出队覆盖槽位。
    pub response_timeout: Option<Duration>,
}

/// 设备链路状态。
///
/// 建连发生在 [`Gateway::drain_one`] 内的一次 `connect` 等待中（受连接超时约束），
/// 期间引擎任务不处理其他事件，因此“连接中”不会被外部观察到，不单独建模。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// 一次出队的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Idle,
    Sent,
    ConnectFailed,
    WriteFailed,
}

pub struct Gateway {
    registry: ServiceRegistry,
    queue: WorkQueue,
    connector: Arc<dyn DeviceConnector>,
    link: Option<Box<dyn DeviceLink>>,
    publisher: Arc<dyn StatusPublisher>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        registry: ServiceRegistry,
        connector: Arc<dyn DeviceConnector>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self::new_with_config(registry, connector, publisher, GatewayConfig::default())
    }

    pub fn new_with_config(
        registry: ServiceRegistry,
        connector: Arc<dyn DeviceConnector>,
        publisher: Arc<dyn StatusPublisher>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            queue: WorkQueue::new(),
            connector,
            link: None,
            publisher,
            config,
        }
    }

    /// 单一入口：消费一个事件。
    pub async fn handle(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::BusRequest(request) => {
                // 校验失败已在内部记录，发起方不会收到失败通知
                let _ = self.on_bus_request(&request);
            }
            GatewayEvent::DeviceLine(line) => {
                self.on_response_line(&line).await;
            }
            GatewayEvent::DeviceReadable => self.on_readable().await,
            GatewayEvent::Tick => {
                self.on_tick().await;
            }
        }
    }

    /// 处理总线请求。
    ///
    /// 返回 `Ok(true)` 表示已入队；`Ok(false)` 表示请求不是发给本网关的（被静默忽略）。
    pub fn on_bus_request(&mut self, request: &BusRequest) -> Result<bool, RequestError> {
        if request.is_broadcast() || request.message_type != MessageType::Command {
            return Ok(false);
        }
        let Some(instance) = request.target_instance() else {
            return Ok(false);
        };
        let Some(service) = self.registry.find_by_instance(instance) else {
            return Ok(false);
        };
        if request.schema.class != service.class || request.schema.kind != service.type_tag {
            debug!(
                target: "han.engine",
                instance = %service.instance_id,
                schema = %request.schema,
                "request_schema_mismatch"
            );
            return Ok(false);
        }

        let frame = match build_command(service, request) {
            Ok(frame) => frame,
            Err(err) => {
                record_request_rejected();
                warn!(
                    target: "han.engine",
                    instance = %service.instance_id,
                    error = %err,
                    "request_rejected"
                );
                return Err(err);
            }
        };

        let line = encode_frame(&frame);
        info!(
            target: "han.engine",
            instance = %service.instance_id,
            command = %service.command,
            line = %line,
            queue_len = self.queue.len() + 1,
            "command_enqueued"
        );
        self.queue.enqueue(frame.service, line);
        record_request_accepted();
        Ok(true)
    }

    /// 处理一行设备响应，返回上报的状态事件（若有）。
    ///
    /// 只有地址与待响应服务一致的响应才会结束本次交互；
    /// 无关联或地址不符的响应直接丢弃，槽位保持不变。
    pub async fn on_response_line(&mut self, line: &str) -> Option<StatusEvent> {
        let frame = match decode_response(line) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(target: "han.engine", line = %line, "line_ignored");
                return None;
            }
            Err(err) => {
                record_decode_failure();
                warn!(target: "han.engine", error = %err, "response_malformed");
                return None;
            }
        };

        let Some(pending) = self.queue.pending() else {
            record_response_unmatched();
            debug!(
                target: "han.engine",
                address = frame.address,
                "response_without_pending_command"
            );
            return None;
        };
        let Some(service) = self.registry.get(pending) else {
            self.queue.take_pending();
            return None;
        };
        if service.address != frame.address {
            record_response_unmatched();
            debug!(
                target: "han.engine",
                expected = service.address,
                actual = frame.address,
                "response_address_mismatch"
            );
            return None;
        }

        self.queue.take_pending();
        record_response_dispatched();
        let event = match decode(service, &frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(
                    target: "han.engine",
                    instance = %service.instance_id,
                    "response_not_reported"
                );
                return None;
            }
            Err(err) => {
                record_decode_failure();
                warn!(
                    target: "han.engine",
                    instance = %service.instance_id,
                    error = %err,
                    "response_decode_failed"
                );
                return None;
            }
        };

        match self.publisher.publish(&event).await {
            Ok(()) => {
                record_status_published();
                info!(
                    target: "han.engine",
                    instance = %event.source_instance,
                    current = event.value("current").unwrap_or_default(),
                    "status_published"
                );
            }
            Err(err) => {
                record_status_publish_failure();
                warn!(
                    target: "han.engine",
                    instance = %event.source_instance,
                    error = %err,
                    "status_publish_failed"
                );
            }
        }
        Some(event)
    }

    /// 读出当前可用的全部完整行；对端关闭或读错误时拆除链路（队列保留）。
    pub async fn on_readable(&mut self) {
        loop {
            let Some(link) = self.link.as_mut() else {
                return;
            };
            match link.read_line() {
                LineRead::Complete(line) => {
                    self.on_response_line(&line).await;
                }
                LineRead::Incomplete => return,
                LineRead::Closed => {
                    info!(target: "han.engine", queue_len = self.queue.len(), "device_closed");
                    self.link = None;
                    return;
                }
                LineRead::ReadError(err) => {
                    warn!(target: "han.engine", error = %err, "device_read_failed");
                    self.link = None;
                    return;
                }
            }
        }
    }

    pub async fn on_tick(&mut self) -> DrainOutcome {
        if let Some(timeout) = self.config.response_timeout {
            self.expire_pending(timeout, Instant::now());
        }
        self.drain_one().await
    }

    /// 待响应等待超过 `timeout` 时清空槽位。
    pub fn expire_pending(&mut self, timeout: Duration, now: Instant) -> Option<&Service> {
        let expired = self.queue.expire_pending(timeout, now)?;
        record_command_timed_out();
        let service = self.registry.get(expired)?;
        warn!(
            target: "han.engine",
            instance = %service.instance_id,
            timeout_ms = timeout.as_millis() as u64,
            "command_timed_out"
        );
        Some(service)
    }

    /// 发出队首一条命令。
    ///
    /// 按需建立连接；连接或写出失败都会丢弃该条目且不重试，
    /// 其余条目保留到下一次 tick。无论成败，待响应槽都被覆盖。
    pub async fn drain_one(&mut self) -> DrainOutcome {
        let Some(entry) = self.queue.pop_next() else {
            return DrainOutcome::Idle;
        };

        let mut link = match self.link.take() {
            Some(link) => link,
            None => match self.connector.connect().await {
                Ok(link) => link,
                Err(err) => {
                    record_connect_failure();
                    self.queue.set_pending(None);
                    warn!(
                        target: "han.engine",
                        error = %err,
                        dropped = %entry.line,
                        queue_len = self.queue.len(),
                        "device_connect_failed"
                    );
                    return DrainOutcome::ConnectFailed;
                }
            },
        };

        match link.write_line(&entry.line).await {
            Ok(()) => {
                self.link = Some(link);
                self.queue.set_pending(entry.service);
                record_command_sent();
                info!(
                    target: "han.engine",
                    line = %entry.line,
                    awaiting_response = entry.service.is_some(),
                    queue_len = self.queue.len(),
                    "command_sent"
                );
                DrainOutcome::Sent
            }
            Err(err) => {
                record_command_send_failure();
                self.queue.set_pending(None);
                warn!(
                    target: "han.engine",
                    error = %err,
                    dropped = %entry.line,
                    "command_send_failed"
                );
                DrainOutcome::WriteFailed
            }
        }
    }

    /// 等待设备链路可读；未连接时永不就绪。
    pub async fn readable(&self) -> io::Result<()> {
        match &self.link {
            Some(link) => link.readable().await,
            None => std::future::pending().await,
        }
    }

    pub fn link_state(&self) -> LinkState {
        if self.link.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    /// 当前等待响应的服务。
    pub fn pending_service(&self) -> Option<&Service> {
        self.queue.pending().and_then(|id| self.registry.get(id))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// 关闭设备链路（退出时调用）。
    pub fn disconnect(&mut self) {
        if self.link.take().is_some() {
            info!(target: "han.engine", queue_len = self.queue.len(), "device_link_closed");
        }
    }
}
