//! 总线请求校验与命令构建。

use domain::{BusRequest, CommandFrame, CommandType, Service};

/// 设备编号上限（含）。
pub const MAX_DEVICE: u8 = 16;

/// 输出类命令中的“状态查询”子功能码。
pub const OUTPUT_STATUS_QUERY: u8 = 2;

/// 请求校验错误：记录日志后丢弃请求，不入队。
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("{0} missing, {0} required")]
    Missing(&'static str),
    #[error("bad device number: {0}")]
    BadDevice(String),
    #[error("only the current request is supported, got {0}")]
    UnsupportedRequest(String),
    #[error("sensor type must be 'output', got {0}")]
    BadType(String),
    #[error("current must be one of: high, low; got {0}")]
    BadState(String),
    #[error("han command {0} does not accept requests")]
    UnsupportedCommand(CommandType),
}

/// 按服务的命令类型校验请求字段并构建命令帧。
pub fn build_command(
    service: &Service,
    request: &BusRequest,
) -> Result<CommandFrame, RequestError> {
    let params = match service.command {
        CommandType::ReadTemperature => temperature_params(request)?,
        CommandType::ReadAc => ac_params(request)?,
        CommandType::Output => output_params(service, request)?,
        CommandType::Nop => return Err(RequestError::UnsupportedCommand(service.command)),
    };
    Ok(CommandFrame {
        address: service.address,
        command: service.command.code(),
        params,
        service: Some(service.id),
    })
}

fn temperature_params(request: &BusRequest) -> Result<Vec<u8>, RequestError> {
    let current = require(request, "request")?;
    let device = parse_device(require(request, "device")?)?;
    require_current(current)?;
    Ok(vec![device, 0, 0, 0])
}

fn ac_params(request: &BusRequest) -> Result<Vec<u8>, RequestError> {
    require_current(require(request, "request")?)?;
    Ok(vec![0, 0, 0])
}

fn output_params(service: &Service, request: &BusRequest) -> Result<Vec<u8>, RequestError> {
    let device = parse_device(require(request, "device")?)?;

    if service.is_sensor {
        require_current(require(request, "request")?)?;
        return Ok(vec![device, OUTPUT_STATUS_QUERY]);
    }

    let kind = require(request, "type")?;
    let current = require(request, "current")?;
    if kind != "output" {
        return Err(RequestError::BadType(kind.to_string()));
    }
    let state = match current {
        "high" => 1,
        "low" => 0,
        other => return Err(RequestError::BadState(other.to_string())),
    };
    Ok(vec![device, state])
}

fn require<'a>(request: &'a BusRequest, key: &'static str) -> Result<&'a str, RequestError> {
    request.value(key).ok_or(RequestError::Missing(key))
}

fn require_current(request: &str) -> Result<(), RequestError> {
    if request != "current" {
        return Err(RequestError::UnsupportedRequest(request.to_string()));
    }
    Ok(())
}

/// 设备编号：仅十进制数字，范围 `0..=MAX_DEVICE`。
fn parse_device(value: &str) -> Result<u8, RequestError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RequestError::BadDevice(value.to_string()));
    }
    match value.parse::<u32>() {
        Ok(device) if device <= u32::from(MAX_DEVICE) => Ok(device as u8),
        _ => Err(RequestError::BadDevice(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MessageType, Schema, ServiceId, Units, identity_hash};

    fn service(command: CommandType, is_sensor: bool) -> Service {
        Service {
            id: ServiceId(4),
            name: "svc".to_string(),
            instance_id: "inst".to_string(),
            instance_hash: identity_hash("inst"),
            address: 0x21,
            command,
            units: Units::None,
            class: if is_sensor { "sensor" } else { "control" }.to_string(),
            type_tag: "basic".to_string(),
            is_sensor,
        }
    }

    fn request(values: &[(&str, &str)]) -> BusRequest {
        BusRequest {
            message_type: MessageType::Command,
            target: Some("inst".to_string()),
            schema: Schema::new("sensor", "basic"),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn temperature_request_builds_frame() {
        let frame = build_command(
            &service(CommandType::ReadTemperature, true),
            &request(&[("request", "current"), ("device", "3")]),
        )
        .expect("frame");
        assert_eq!(frame.address, 0x21);
        assert_eq!(frame.command, 0x12);
        assert_eq!(frame.params, vec![3, 0, 0, 0]);
        assert_eq!(frame.service, Some(ServiceId(4)));
    }

    #[test]
    fn temperature_request_requires_device_and_current() {
        let svc = service(CommandType::ReadTemperature, true);
        assert_eq!(
            build_command(&svc, &request(&[("device", "1")])),
            Err(RequestError::Missing("request"))
        );
        assert_eq!(
            build_command(&svc, &request(&[("request", "current")])),
            Err(RequestError::Missing("device"))
        );
        assert_eq!(
            build_command(&svc, &request(&[("request", "max"), ("device", "1")])),
            Err(RequestError::UnsupportedRequest("max".to_string()))
        );
    }

    #[test]
    fn device_index_is_bounded_decimal() {
        let svc = service(CommandType::ReadTemperature, true);
        for bad in ["17", "-1", "0x1", "", "1a"] {
            assert_eq!(
                build_command(&svc, &request(&[("request", "current"), ("device", bad)])),
                Err(RequestError::BadDevice(bad.to_string())),
                "{bad}"
            );
        }
        assert!(build_command(&svc, &request(&[("request", "current"), ("device", "16")])).is_ok());
        assert!(build_command(&svc, &request(&[("request", "current"), ("device", "0")])).is_ok());
    }

    #[test]
    fn ac_request_needs_only_current() {
        let frame = build_command(
            &service(CommandType::ReadAc, true),
            &request(&[("request", "current")]),
        )
        .expect("frame");
        assert_eq!(frame.command, 0x15);
        assert_eq!(frame.params, vec![0, 0, 0]);
    }

    #[test]
    fn output_sensor_queries_status() {
        let frame = build_command(
            &service(CommandType::Output, true),
            &request(&[("request", "current"), ("device", "12")]),
        )
        .expect("frame");
        assert_eq!(frame.params, vec![12, OUTPUT_STATUS_QUERY]);
    }

    #[test]
    fn output_control_sets_state() {
        let svc = service(CommandType::Output, false);
        let high = build_command(
            &svc,
            &request(&[("device", "2"), ("type", "output"), ("current", "high")]),
        )
        .expect("high");
        assert_eq!(high.params, vec![2, 1]);
        let low = build_command(
            &svc,
            &request(&[("device", "2"), ("type", "output"), ("current", "low")]),
        )
        .expect("low");
        assert_eq!(low.params, vec![2, 0]);

        assert_eq!(
            build_command(
                &svc,
                &request(&[("device", "2"), ("type", "output"), ("current", "toggle")])
            ),
            Err(RequestError::BadState("toggle".to_string()))
        );
        assert_eq!(
            build_command(
                &svc,
                &request(&[("device", "2"), ("type", "input"), ("current", "high")])
            ),
            Err(RequestError::BadType("input".to_string()))
        );
        assert_eq!(
            build_command(&svc, &request(&[("device", "2"), ("type", "output")])),
            Err(RequestError::Missing("current"))
        );
    }
}
