//! 网关运行配置加载。
//!
//! 标量配置来自环境变量（`HAN_*`），服务定义来自 JSON 文件。

use domain::ServiceDescriptor;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("cannot read services file {0}: {1}")]
    ServicesFile(String, String),
    #[error("invalid services definition: {0}")]
    Services(String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub han_host: String,
    pub han_port: u16,
    pub services_file: PathBuf,
    pub tick_interval_ms: u64,
    pub connect_timeout_ms: u64,
    /// 0 表示不启用待响应超时
    pub response_timeout_ms: u64,
    pub startup_probe: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_qos: u8,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let han_host = env::var("HAN_HOST").unwrap_or_else(|_| "localhost".to_string());
        let han_port = read_u16_with_default("HAN_PORT", 1129)?;
        let services_file = env::var("HAN_SERVICES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/xplhan/services.json"));
        let tick_interval_ms = read_u64_with_default("HAN_TICK_INTERVAL_MS", 1000)?;
        if tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "HAN_TICK_INTERVAL_MS".to_string(),
                "0".to_string(),
            ));
        }
        let connect_timeout_ms = read_u64_with_default("HAN_CONNECT_TIMEOUT_MS", 3000)?;
        if connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "HAN_CONNECT_TIMEOUT_MS".to_string(),
                "0".to_string(),
            ));
        }
        let response_timeout_ms = read_u64_with_default("HAN_RESPONSE_TIMEOUT_MS", 0)?;
        let startup_probe = read_bool_with_default("HAN_STARTUP_PROBE", true);
        let mqtt_host = env::var("HAN_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("HAN_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("HAN_MQTT_USERNAME");
        let mqtt_password = read_optional("HAN_MQTT_PASSWORD");
        let mqtt_topic_prefix =
            env::var("HAN_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "xpl".to_string());
        let mqtt_qos = read_u8_with_default("HAN_MQTT_QOS", 1)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "HAN_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }

        Ok(Self {
            han_host,
            han_port,
            services_file,
            tick_interval_ms,
            connect_timeout_ms,
            response_timeout_ms,
            startup_probe,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            mqtt_qos,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_ms > 0).then(|| Duration::from_millis(self.response_timeout_ms))
    }
}

#[derive(Debug, serde::Deserialize)]
struct ServicesDocument {
    services: Vec<ServiceStanza>,
}

/// 服务定义文件中的一项。
#[derive(Debug, serde::Deserialize)]
struct ServiceStanza {
    name: String,
    instance: String,
    address: u32,
    class: String,
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(alias = "han-command")]
    han_command: String,
    #[serde(default)]
    units: Option<String>,
}

impl From<ServiceStanza> for ServiceDescriptor {
    fn from(stanza: ServiceStanza) -> Self {
        Self {
            name: stanza.name,
            instance: stanza.instance,
            address: stanza.address,
            class: stanza.class,
            type_tag: stanza.type_tag,
            han_command: stanza.han_command,
            units: stanza.units,
        }
    }
}

/// 读取并解析服务定义文件。
pub fn load_services(path: &Path) -> Result<Vec<ServiceDescriptor>, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::ServicesFile(path.display().to_string(), err.to_string()))?;
    parse_services(&raw)
}

/// 解析服务定义（语法层面；语义校验由注册表负责）。
pub fn parse_services(raw: &str) -> Result<Vec<ServiceDescriptor>, ConfigError> {
    let document: ServicesDocument =
        serde_json::from_str(raw).map_err(|err| ConfigError::Services(err.to_string()))?;
    Ok(document.services.into_iter().map(Into::into).collect())
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
