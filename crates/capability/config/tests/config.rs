use han_config::{AppConfig, ConfigError, load_services, parse_services};
use std::path::Path;
use std::time::Duration;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("HAN_HOST", "han.local");
        std::env::set_var("HAN_PORT", "2000");
        std::env::set_var("HAN_RESPONSE_TIMEOUT_MS", "1500");
        std::env::set_var("HAN_STARTUP_PROBE", "off");
        std::env::set_var("HAN_MQTT_USERNAME", "");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.han_host, "han.local");
    assert_eq!(config.han_port, 2000);
    assert_eq!(config.tick_interval(), Duration::from_secs(1));
    assert_eq!(config.response_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    assert!(!config.startup_probe);
    assert_eq!(config.mqtt_username, None);
    assert_eq!(config.mqtt_topic_prefix, "xpl");
    assert_eq!(config.mqtt_qos, 1);

    unsafe {
        std::env::set_var("HAN_MQTT_QOS", "3");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "HAN_MQTT_QOS"
    ));
    unsafe {
        std::env::remove_var("HAN_MQTT_QOS");
        std::env::set_var("HAN_CONNECT_TIMEOUT_MS", "0");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "HAN_CONNECT_TIMEOUT_MS"
    ));
    unsafe {
        std::env::set_var("HAN_CONNECT_TIMEOUT_MS", "750");
    }
    assert_eq!(
        AppConfig::from_env().expect("config").connect_timeout(),
        Duration::from_millis(750)
    );
    unsafe {
        std::env::set_var("HAN_PORT", "not-a-port");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, value)) if key == "HAN_PORT" && value == "not-a-port"
    ));
}

#[test]
fn parse_service_definitions() {
    let services = parse_services(
        r#"{
            "services": [
                {"name": "temp", "instance": "kitchen", "address": 1, "class": "sensor",
                 "type": "basic", "han_command": "gtmp", "units": "celsius"},
                {"name": "relay", "instance": "porch", "address": 7, "class": "control",
                 "type": "basic", "han-command": "gout"}
            ]
        }"#,
    )
    .expect("services");

    assert_eq!(services.len(), 2);
    assert_eq!(services[0].instance, "kitchen");
    assert_eq!(services[0].type_tag, "basic");
    assert_eq!(services[0].units.as_deref(), Some("celsius"));
    assert_eq!(services[1].han_command, "gout");
    assert_eq!(services[1].units, None);
}

#[test]
fn missing_field_is_rejected() {
    let result = parse_services(
        r#"{"services": [{"name": "temp", "address": 1, "class": "sensor",
            "type": "basic", "han_command": "gtmp"}]}"#,
    );
    assert!(matches!(result, Err(ConfigError::Services(message)) if message.contains("instance")));
    assert!(matches!(parse_services("{"), Err(ConfigError::Services(_))));
}

#[test]
fn load_services_from_file() {
    let path = std::env::temp_dir().join(format!("han-services-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{"services": [{"name": "mains", "instance": "panel", "address": 2,
            "class": "sensor", "type": "basic", "han_command": "gacd", "units": "volts"}]}"#,
    )
    .expect("write");
    let services = load_services(&path).expect("services");
    std::fs::remove_file(&path).expect("cleanup");
    assert_eq!(services[0].name, "mains");
    assert_eq!(services[0].address, 2);

    assert!(matches!(
        load_services(Path::new("/nonexistent/han/services.json")),
        Err(ConfigError::ServicesFile(..))
    ));
}
