//! 总线适配层（MQTT）
//!
//! - 入站：订阅 `{prefix}/cmnd/#`，`{prefix}/cmnd/{target}` 指定目标实例，
//!   无目标段或目标为 `*` 视为广播
//! - 出站：状态事件发布到 `{prefix}/stat/{instance}`
//!
//! 引擎只通过 [`StatusPublisher`] 与 [`BusRequest`] 接触总线，不解析线格式。

use async_trait::async_trait;
use domain::{BusRequest, MessageType, Schema, StatusEvent};
use han_engine::{PublishError, StatusPublisher};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const COMMAND_SEGMENT: &str = "cmnd";
const STATUS_SEGMENT: &str = "stat";
const BROADCAST_TARGET: &str = "*";
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// 总线错误。
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus client error: {0}")]
    Client(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// MQTT 总线配置。
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub qos: u8,
}

/// MQTT 总线（发布状态事件；入站请求经 channel 交给事件循环）。
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    topic_prefix: String,
    qos: QoS,
}

impl MqttBus {
    /// 建立客户端并在后台驱动 eventloop。
    ///
    /// 每次（重）连接成功后重新订阅请求 topic；解析出的请求按到达顺序送入返回的 channel。
    pub fn connect(
        config: MqttBusConfig,
    ) -> Result<(Self, mpsc::Receiver<BusRequest>, tokio::task::JoinHandle<()>), BusError> {
        let client_id = format!("han-gateway-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let qos = qos_from_u8(config.qos);
        let topic_prefix = config.topic_prefix.trim_matches('/').to_string();
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        let subscriber = client.clone();
        let prefix = topic_prefix.clone();
        let handle = tokio::spawn(async move {
            let filter = format!("{}/{}/#", prefix, COMMAND_SEGMENT);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(target: "han.bus", filter = %filter, "bus_connected");
                        if let Err(err) = subscriber.try_subscribe(filter.clone(), qos) {
                            warn!(target: "han.bus", error = %err, "bus_subscribe_failed");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let parsed = parse_request(&prefix, &publish.topic, &publish.payload);
                        let request = match parsed {
                            Ok(Some(request)) => request,
                            Ok(None) => {
                                debug!(
                                    target: "han.bus",
                                    topic = %publish.topic,
                                    "bus_topic_skipped"
                                );
                                continue;
                            }
                            Err(err) => {
                                warn!(
                                    target: "han.bus",
                                    topic = %publish.topic,
                                    error = %err,
                                    "bus_request_invalid"
                                );
                                continue;
                            }
                        };
                        if tx.send(request).await.is_err() {
                            info!(target: "han.bus", "bus_request_channel_closed");
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(target: "han.bus", error = %err, "bus_eventloop_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok((
            Self {
                client,
                topic_prefix,
                qos,
            },
            rx,
            handle,
        ))
    }

    fn status_topic(&self, instance: &str) -> String {
        status_topic(&self.topic_prefix, instance)
    }

    /// 断开总线连接（退出时调用）。
    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.client
            .disconnect()
            .await
            .map_err(|err| BusError::Client(err.to_string()))
    }
}

#[async_trait]
impl StatusPublisher for MqttBus {
    async fn publish(&self, event: &StatusEvent) -> Result<(), PublishError> {
        let topic = self.status_topic(&event.source_instance);
        let payload = status_payload(event).map_err(|err| PublishError::Payload(err.to_string()))?;
        debug!(
            target: "han.bus",
            topic = %topic,
            payload_size = payload.len(),
            "status_publish"
        );
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|err| PublishError::Bus(err.to_string()))
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestEnvelope {
    #[serde(alias = "type", alias = "msg_type")]
    msg_type: String,
    schema: String,
    #[serde(default)]
    body: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusEnvelope<'a> {
    msg_type: &'static str,
    source: &'a str,
    schema: String,
    body: serde_json::Map<String, serde_json::Value>,
}

/// 解析入站请求。
///
/// topic 不在 `{prefix}/cmnd` 之下时返回 `Ok(None)`。
pub fn parse_request(
    prefix: &str,
    topic: &str,
    payload: &[u8],
) -> Result<Option<BusRequest>, BusError> {
    let Some(target) = extract_target(prefix, topic) else {
        return Ok(None);
    };
    let envelope: RequestEnvelope =
        serde_json::from_slice(payload).map_err(|err| BusError::Payload(err.to_string()))?;
    let message_type = MessageType::parse(&envelope.msg_type)
        .ok_or_else(|| BusError::Payload(format!("unknown message type: {}", envelope.msg_type)))?;
    let schema = Schema::parse(&envelope.schema)
        .ok_or_else(|| BusError::Payload(format!("invalid schema: {}", envelope.schema)))?;
    let values = envelope
        .body
        .into_iter()
        .map(|(key, value)| (key, scalar_to_string(value)))
        .collect();

    Ok(Some(BusRequest {
        message_type,
        target,
        schema,
        values,
    }))
}

/// 返回 `Some(target)`；`Some(None)` 为广播，`None` 表示不是请求 topic。
fn extract_target(prefix: &str, topic: &str) -> Option<Option<String>> {
    let prefix = prefix.trim_matches('/');
    let topic = topic.trim_matches('/');
    let rest = if prefix.is_empty() {
        topic
    } else {
        strip_segment(topic, prefix)?.trim_start_matches('/')
    };
    let target = strip_segment(rest, COMMAND_SEGMENT)?.trim_start_matches('/');
    if target.is_empty() || target == BROADCAST_TARGET {
        return Some(None);
    }
    Some(Some(target.to_string()))
}

/// 去掉开头的完整 topic 段（`xpl` 不匹配 `xplx/...`）。
fn strip_segment<'a>(topic: &'a str, segment: &str) -> Option<&'a str> {
    let rest = topic.strip_prefix(segment)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn scalar_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

pub fn status_topic(prefix: &str, instance: &str) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), STATUS_SEGMENT, instance)
}

/// 序列化状态事件。
pub fn status_payload(event: &StatusEvent) -> Result<Vec<u8>, BusError> {
    let body = event
        .values
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
        .collect();
    let envelope = StatusEnvelope {
        msg_type: MessageType::Status.as_str(),
        source: &event.source_instance,
        schema: event.schema.to_string(),
        body,
    };
    serde_json::to_vec(&envelope).map_err(|err| BusError::Payload(err.to_string()))
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_topic_carries_target() {
        let payload = br#"{"msgType":"command","schema":"sensor.basic","body":{"device":2,
            "request":"current"}}"#;
        let request = parse_request("xpl", "xpl/cmnd/kitchen", payload)
            .expect("parsed")
            .expect("request");
        assert_eq!(request.message_type, MessageType::Command);
        assert_eq!(request.target_instance(), Some("kitchen"));
        assert_eq!(request.schema, Schema::new("sensor", "basic"));
        assert_eq!(request.value("request"), Some("current"));
        assert_eq!(request.value("device"), Some("2"));
    }

    #[test]
    fn missing_or_wildcard_target_is_broadcast() {
        let payload = br#"{"msgType":"cmnd","schema":"control.basic"}"#;
        for topic in ["xpl/cmnd", "xpl/cmnd/*", "xpl/cmnd/"] {
            let request = parse_request("xpl", topic, payload)
                .expect("parsed")
                .expect("request");
            assert!(request.is_broadcast(), "{topic}");
        }
    }

    #[test]
    fn foreign_topics_are_skipped() {
        let payload = br#"{"msgType":"command","schema":"sensor.basic"}"#;
        assert!(parse_request("xpl", "xpl/stat/kitchen", payload).expect("ok").is_none());
        assert!(parse_request("xpl", "xpl/cmndx/kitchen", payload).expect("ok").is_none());
        assert!(parse_request("xpl", "other/cmnd/kitchen", payload).expect("ok").is_none());
        assert!(parse_request("xpl", "xplcmnd/kitchen", payload).expect("ok").is_none());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse_request("xpl", "xpl/cmnd/kitchen", b"not json").is_err());
        assert!(
            parse_request("xpl", "xpl/cmnd/kitchen", br#"{"msgType":"poke","schema":"a.b"}"#)
                .is_err()
        );
        assert!(
            parse_request("xpl", "xpl/cmnd/kitchen", br#"{"msgType":"command","schema":"ab"}"#)
                .is_err()
        );
    }

    #[test]
    fn status_payload_shape() {
        let event = StatusEvent::new("kitchen", Schema::new("sensor", "basic"))
            .with_value("type", "temp")
            .with_value("current", "21");
        let payload = status_payload(&event).expect("payload");
        let value: serde_json::Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(value["msgType"], "status");
        assert_eq!(value["source"], "kitchen");
        assert_eq!(value["schema"], "sensor.basic");
        assert_eq!(value["body"]["current"], "21");
        assert_eq!(status_topic("xpl/", "kitchen"), "xpl/stat/kitchen");
    }

    #[test]
    fn qos_falls_back_to_at_least_once() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_u8(9), QoS::AtLeastOnce);
    }
}
