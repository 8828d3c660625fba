use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// HAN 命令类型（协议中的命令字节）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// 空操作（0x00），不对应任何配置关键字。
    Nop,
    /// 读取温度（0x12，关键字 `gtmp`）。
    ReadTemperature,
    /// 读取输出状态 / 写输出（0x13，关键字 `gout`）。
    Output,
    /// 读取交流电压与频率（0x15，关键字 `gacd`）。
    ReadAc,
}

impl CommandType {
    /// 协议命令字节。
    pub const fn code(self) -> u8 {
        match self {
            Self::Nop => 0x00,
            Self::ReadTemperature => 0x12,
            Self::Output => 0x13,
            Self::ReadAc => 0x15,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Nop),
            0x12 => Some(Self::ReadTemperature),
            0x13 => Some(Self::Output),
            0x15 => Some(Self::ReadAc),
            _ => None,
        }
    }

    /// 配置文件中的命令关键字（`Nop` 无关键字）。
    pub const fn keyword(self) -> Option<&'static str> {
        match self {
            Self::Nop => None,
            Self::ReadTemperature => Some("gtmp"),
            Self::Output => Some("gout"),
            Self::ReadAc => Some("gacd"),
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "gtmp" => Some(Self::ReadTemperature),
            "gout" => Some(Self::Output),
            "gacd" => Some(Self::ReadAc),
            _ => None,
        }
    }

    /// 命令与单位的静态兼容表。
    pub const fn compatible_units(self) -> &'static [Units] {
        match self {
            Self::Nop => &[],
            Self::ReadTemperature => &[Units::Fahrenheit, Units::Celsius],
            Self::Output => &[Units::Output],
            Self::ReadAc => &[Units::Volts, Units::Hertz],
        }
    }

    pub fn accepts(self, units: Units) -> bool {
        self.compatible_units().contains(&units)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.keyword() {
            Some(keyword) => f.write_str(keyword),
            None => write!(f, "{:02X}", self.code()),
        }
    }
}

/// 工程单位选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Units {
    #[default]
    None,
    Fahrenheit,
    Celsius,
    Volts,
    Amps,
    Hertz,
    Output,
}

impl Units {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fahrenheit => "fahrenheit",
            Self::Celsius => "celsius",
            Self::Volts => "volts",
            Self::Amps => "amps",
            Self::Hertz => "hertz",
            Self::Output => "output",
        }
    }

    /// 解析配置关键字；`none` 不是合法的配置值。
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "fahrenheit" => Some(Self::Fahrenheit),
            "celsius" => Some(Self::Celsius),
            "volts" => Some(Self::Volts),
            "amps" => Some(Self::Amps),
            "hertz" => Some(Self::Hertz),
            "output" => Some(Self::Output),
            _ => None,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// 服务句柄：注册表内的顺序下标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub usize);

/// 配置层产出的服务描述（已通过语法校验，语义校验由注册表负责）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub instance: String,
    pub address: u32,
    pub class: String,
    pub type_tag: String,
    pub han_command: String,
    pub units: Option<String>,
}

/// 网关中的一个逻辑设备。
///
/// 构造后不可变；等待响应的关联关系由工作队列单独记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub instance_id: String,
    pub instance_hash: u64,
    pub address: u8,
    pub command: CommandType,
    pub units: Units,
    pub class: String,
    pub type_tag: String,
    pub is_sensor: bool,
}

impl Service {
    /// 先比较哈希，再精确比较实例标识（哈希不保证唯一）。
    pub fn matches_identity(&self, hash: u64, instance: &str) -> bool {
        self.instance_hash == hash && self.instance_id == instance
    }
}

/// 总线实例标识的哈希，仅在进程内保持稳定。
pub fn identity_hash(instance: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    instance.hash(&mut hasher);
    hasher.finish()
}
