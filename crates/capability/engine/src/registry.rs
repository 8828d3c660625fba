//! 服务注册表
//!
//! 启动前由配置一次性构建，运行期只读。按注册顺序保存，`ServiceId` 即下标。

use domain::{CommandType, Service, ServiceDescriptor, ServiceId, Units, identity_hash};
use std::collections::HashSet;

/// 协议地址上限（含）。
pub const MAX_ADDRESS: u32 = 254;

/// 服务配置错误（均为致命错误，进程不启动）。
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("at least one service must be defined")]
    Empty,
    #[error("service name {0} is already defined")]
    DuplicateName(String),
    #[error("instance id {0} is already defined")]
    DuplicateInstance(String),
    #[error("{field} missing in service {service}")]
    MissingField {
        service: String,
        field: &'static str,
    },
    #[error("in service {service}, the address must be between 0 and 254, got {address}")]
    AddressOutOfRange { service: String, address: u32 },
    #[error("unrecognized han-command {keyword} in service {service}")]
    UnknownCommand { service: String, keyword: String },
    #[error("unrecognized units {keyword} in service {service}")]
    UnknownUnits { service: String, keyword: String },
    #[error("units missing in sensor service {0}")]
    MissingUnits(String),
    #[error("instance {instance} fails sanity check of han command {command} to units {units}")]
    IncompatibleUnits {
        instance: String,
        command: CommandType,
        units: Units,
    },
}

/// 服务注册表。
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<Service>,
}

impl ServiceRegistry {
    /// 校验并构建注册表：重名、重复实例、地址范围、关键字与命令/单位兼容性。
    pub fn build(descriptors: &[ServiceDescriptor]) -> Result<Self, RegistryError> {
        if descriptors.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut names = HashSet::new();
        let mut instances = HashSet::new();
        let mut services = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if !names.insert(descriptor.name.as_str()) {
                return Err(RegistryError::DuplicateName(descriptor.name.clone()));
            }
            require(&descriptor.name, "instance", &descriptor.instance)?;
            if !instances.insert(descriptor.instance.as_str()) {
                return Err(RegistryError::DuplicateInstance(descriptor.instance.clone()));
            }
            let service = build_service(ServiceId(services.len()), descriptor)?;
            services.push(service);
        }

        Ok(Self { services })
    }

    /// 按总线实例标识查找：先比哈希，再精确比较字符串。
    pub fn find_by_identity(&self, hash: u64, instance: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|service| service.matches_identity(hash, instance))
    }

    pub fn find_by_instance(&self, instance: &str) -> Option<&Service> {
        self.find_by_identity(identity_hash(instance), instance)
    }

    pub fn get(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(id.0)
    }

    /// 按注册顺序返回全部服务。
    pub fn all(&self) -> &[Service] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn build_service(id: ServiceId, descriptor: &ServiceDescriptor) -> Result<Service, RegistryError> {
    let name = &descriptor.name;
    require(name, "class", &descriptor.class)?;
    require(name, "type", &descriptor.type_tag)?;
    require(name, "han-command", &descriptor.han_command)?;

    if descriptor.address > MAX_ADDRESS {
        return Err(RegistryError::AddressOutOfRange {
            service: name.clone(),
            address: descriptor.address,
        });
    }
    let address = descriptor.address as u8;

    let command = CommandType::from_keyword(&descriptor.han_command).ok_or_else(|| {
        RegistryError::UnknownCommand {
            service: name.clone(),
            keyword: descriptor.han_command.clone(),
        }
    })?;

    let is_sensor = descriptor.class == "sensor";
    let units = match descriptor.units.as_deref() {
        Some(keyword) => Units::from_keyword(keyword).ok_or_else(|| RegistryError::UnknownUnits {
            service: name.clone(),
            keyword: keyword.to_string(),
        })?,
        None if is_sensor => return Err(RegistryError::MissingUnits(name.clone())),
        None => Units::None,
    };

    // 控制类服务可以不声明单位；一旦声明就必须兼容。
    if units != Units::None && !command.accepts(units) {
        return Err(RegistryError::IncompatibleUnits {
            instance: descriptor.instance.clone(),
            command,
            units,
        });
    }

    Ok(Service {
        id,
        name: name.clone(),
        instance_id: descriptor.instance.clone(),
        instance_hash: identity_hash(&descriptor.instance),
        address,
        command,
        units,
        class: descriptor.class.clone(),
        type_tag: descriptor.type_tag.clone(),
        is_sensor,
    })
}

fn require(service: &str, field: &'static str, value: &str) -> Result<(), RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::MissingField {
            service: service.to_string(),
            field,
        });
    }
    Ok(())
}
