//! 工作队列
//!
//! 严格 FIFO 的待发命令队列，外加单槽的“待响应”关联：
//! 同一时刻最多一条命令在途，因此只需记录一个等待响应的服务。

use domain::ServiceId;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 已编码、等待发送的命令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// 等待响应的服务（单向命令为 `None`）
    pub service: Option<ServiceId>,
    /// 已编码的命令行（不含换行）
    pub line: String,
}

#[derive(Debug, Clone, Copy)]
struct PendingResponse {
    service: ServiceId,
    since: Instant,
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    entries: VecDeque<QueuedCommand>,
    pending: Option<PendingResponse>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, service: Option<ServiceId>, line: String) {
        self.entries.push_back(QueuedCommand { service, line });
    }

    /// 取出最早入队的命令。
    pub fn pop_next(&mut self) -> Option<QueuedCommand> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 覆盖待响应槽（每次出队都调用，不做合并），返回被覆盖的旧值。
    pub fn set_pending(&mut self, service: Option<ServiceId>) -> Option<ServiceId> {
        self.set_pending_at(service, Instant::now())
    }

    pub fn set_pending_at(
        &mut self,
        service: Option<ServiceId>,
        now: Instant,
    ) -> Option<ServiceId> {
        let previous = self.pending();
        self.pending = service.map(|service| PendingResponse { service, since: now });
        previous
    }

    pub fn pending(&self) -> Option<ServiceId> {
        self.pending.map(|pending| pending.service)
    }

    /// 清空待响应槽并返回原值。
    pub fn take_pending(&mut self) -> Option<ServiceId> {
        self.pending.take().map(|pending| pending.service)
    }

    /// 待响应等待超过 `timeout` 时清空槽位并返回该服务。
    pub fn expire_pending(&mut self, timeout: Duration, now: Instant) -> Option<ServiceId> {
        let pending = self.pending?;
        if now.saturating_duration_since(pending.since) < timeout {
            return None;
        }
        self.pending = None;
        Some(pending.service)
    }
}
