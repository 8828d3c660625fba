//! xPL-HAN 网关进程：总线请求 ⇄ HAN 控制器。

mod runtime;

use han_bus::{MqttBus, MqttBusConfig};
use han_config::{AppConfig, load_services};
use han_engine::{Gateway, GatewayConfig, ServiceRegistry};
use han_protocol::TcpConnector;
use han_telemetry::init_tracing;
use std::sync::Arc;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 服务定义：语法错误与语义错误都是致命的
    let descriptors = load_services(&config.services_file)?;
    let registry = ServiceRegistry::build(&descriptors)?;
    for service in registry.all() {
        info!(
            target: "han.gateway",
            name = %service.name,
            instance = %service.instance_id,
            address = service.address,
            command = %service.command,
            units = %service.units,
            "service_registered"
        );
    }

    let connector = TcpConnector::new(config.han_host.clone(), config.han_port)
        .with_connect_timeout(config.connect_timeout());
    if config.startup_probe {
        connector.probe().await?;
        info!(
            target: "han.gateway",
            host = %config.han_host,
            port = config.han_port,
            "device_probe_ok"
        );
    }

    let (bus, requests, bus_task) = MqttBus::connect(MqttBusConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_prefix: config.mqtt_topic_prefix.clone(),
        qos: config.mqtt_qos,
    })?;
    let bus = Arc::new(bus);

    let gateway = Gateway::new_with_config(
        registry,
        Arc::new(connector),
        bus.clone(),
        GatewayConfig {
            response_timeout: config.response_timeout(),
        },
    );

    info!(
        target: "han.gateway",
        services = gateway.registry().len(),
        tick_ms = config.tick_interval_ms,
        "gateway_started"
    );
    runtime::run(gateway, requests, config.tick_interval()).await;

    if let Err(err) = bus.disconnect().await {
        tracing::warn!(target: "han.gateway", error = %err, "bus_disconnect_failed");
    }
    bus_task.abort();
    info!(target: "han.gateway", "gateway_stopped");
    Ok(())
}
