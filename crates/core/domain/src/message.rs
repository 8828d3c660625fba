use std::fmt;

/// 总线消息类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Command,
    Status,
    Trigger,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Status => "status",
            Self::Trigger => "trigger",
        }
    }

    /// 兼容长短两种写法（`command` / `cmnd` / `xpl-cmnd`）。
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "command" | "cmnd" | "xpl-cmnd" => Some(Self::Command),
            "status" | "stat" | "xpl-stat" => Some(Self::Status),
            "trigger" | "trig" | "xpl-trig" => Some(Self::Trigger),
            _ => None,
        }
    }
}

/// 消息 schema：`class.type`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub class: String,
    pub kind: String,
}

impl Schema {
    pub fn new(class: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            kind: kind.into(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (class, kind) = value.split_once('.')?;
        if class.is_empty() || kind.is_empty() {
            return None;
        }
        Some(Self::new(class, kind))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.kind)
    }
}

/// 总线入站请求（总线适配层解析后的不透明消息）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRequest {
    pub message_type: MessageType,
    /// 目标实例；`None` 表示广播。
    pub target: Option<String>,
    pub schema: Schema,
    pub values: Vec<(String, String)>,
}

impl BusRequest {
    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    pub fn target_instance(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// 读取命名字段（同名取第一个）。
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// 发往总线的状态事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub source_instance: String,
    pub schema: Schema,
    pub values: Vec<(String, String)>,
}

impl StatusEvent {
    pub fn new(source_instance: impl Into<String>, schema: Schema) -> Self {
        Self {
            source_instance: source_instance.into(),
            schema,
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}
