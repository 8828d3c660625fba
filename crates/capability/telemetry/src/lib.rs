//! 日志初始化与网关计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_accepted: u64,
    pub requests_rejected: u64,
    pub commands_sent: u64,
    pub command_send_failures: u64,
    pub connect_failures: u64,
    pub responses_dispatched: u64,
    pub responses_unmatched: u64,
    pub decode_failures: u64,
    pub status_published: u64,
    pub status_publish_failures: u64,
    pub commands_timed_out: u64,
}

/// 网关计数指标。
pub struct TelemetryMetrics {
    requests_accepted: AtomicU64,
    requests_rejected: AtomicU64,
    commands_sent: AtomicU64,
    command_send_failures: AtomicU64,
    connect_failures: AtomicU64,
    responses_dispatched: AtomicU64,
    responses_unmatched: AtomicU64,
    decode_failures: AtomicU64,
    status_published: AtomicU64,
    status_publish_failures: AtomicU64,
    commands_timed_out: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            requests_accepted: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            command_send_failures: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            responses_dispatched: AtomicU64::new(0),
            responses_unmatched: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            status_published: AtomicU64::new(0),
            status_publish_failures: AtomicU64::new(0),
            commands_timed_out: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_accepted: self.requests_accepted.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            command_send_failures: self.command_send_failures.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            responses_dispatched: self.responses_dispatched.load(Ordering::Relaxed),
            responses_unmatched: self.responses_unmatched.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            status_published: self.status_published.load(Ordering::Relaxed),
            status_publish_failures: self.status_publish_failures.load(Ordering::Relaxed),
            commands_timed_out: self.commands_timed_out.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录已入队的总线请求。
pub fn record_request_accepted() {
    metrics().requests_accepted.fetch_add(1, Ordering::Relaxed);
}

/// 记录校验失败被丢弃的总线请求。
pub fn record_request_rejected() {
    metrics().requests_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录成功写出的命令。
pub fn record_command_sent() {
    metrics().commands_sent.fetch_add(1, Ordering::Relaxed);
}

/// 记录写出失败的命令。
pub fn record_command_send_failure() {
    metrics().command_send_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录连接控制器失败。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录与待响应服务关联上的响应。
pub fn record_response_dispatched() {
    metrics().responses_dispatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录没有待响应关联（或地址不符）的响应。
pub fn record_response_unmatched() {
    metrics().responses_unmatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录帧或载荷解码失败。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_status_published() {
    metrics().status_published.fetch_add(1, Ordering::Relaxed);
}

pub fn record_status_publish_failure() {
    metrics()
        .status_publish_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录等待响应超时的命令。
pub fn record_command_timed_out() {
    metrics().commands_timed_out.fetch_add(1, Ordering::Relaxed);
}
