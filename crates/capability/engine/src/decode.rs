//! 响应载荷解码
//!
//! 按响应帧的命令字节分派到各类型解码器，产出一条 `sensor.basic` 状态事件。
//! 解码器是纯函数，关联与清槽由 [`crate::Gateway`] 负责。

use domain::{CommandType, ResponseFrame, Schema, Service, StatusEvent, Units};

const TEMPERATURE_PARAMS: usize = 5;
const AC_PARAMS: usize = 4;
const OUTPUT_PARAMS: usize = 3;

/// 状态事件使用的 schema。
pub const STATUS_CLASS: &str = "sensor";
pub const STATUS_TYPE: &str = "basic";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{command} response carries {actual} parameters, need {expected}")]
    ParamCount {
        command: CommandType,
        expected: usize,
        actual: usize,
    },
    #[error("counts per degree is zero")]
    ZeroScale,
    #[error("unexpected output state {0}")]
    BadState(u8),
    #[error("invalid units {0} for temperature conversion")]
    UnitsMismatch(Units),
    #[error("unknown response command 0x{0:02X}")]
    UnknownCommand(u8),
}

/// 解码一帧已关联到 `service` 的响应。
///
/// `Ok(None)` 表示合法但无需上报（输出类的非查询子功能）。
pub fn decode(
    service: &Service,
    response: &ResponseFrame,
) -> Result<Option<StatusEvent>, DecodeError> {
    match CommandType::from_code(response.command) {
        Some(CommandType::ReadTemperature) => decode_temperature(service, response).map(Some),
        Some(CommandType::ReadAc) => decode_ac(service, response).map(Some),
        Some(CommandType::Output) => decode_output(service, response),
        Some(CommandType::Nop) | None => Err(DecodeError::UnknownCommand(response.command)),
    }
}

fn status(service: &Service) -> StatusEvent {
    StatusEvent::new(
        service.instance_id.clone(),
        Schema::new(STATUS_CLASS, STATUS_TYPE),
    )
}

fn expect_params(
    command: CommandType,
    response: &ResponseFrame,
    expected: usize,
) -> Result<(), DecodeError> {
    let actual = response.param_count();
    if actual != expected {
        return Err(DecodeError::ParamCount {
            command,
            expected,
            actual,
        });
    }
    Ok(())
}

/// `{channel, counts_per_degree, reserved, lo, hi}`，温度为有符号 16 位小端。
fn decode_temperature(
    service: &Service,
    response: &ResponseFrame,
) -> Result<StatusEvent, DecodeError> {
    expect_params(CommandType::ReadTemperature, response, TEMPERATURE_PARAMS)?;
    let p = &response.params;
    let channel = p[0];
    let counts = i32::from(p[1]);
    let raw = i32::from(i16::from_le_bytes([p[3], p[4]]));

    if counts == 0 {
        return Err(DecodeError::ZeroScale);
    }
    let degrees = match service.units {
        Units::Celsius => raw / counts,
        Units::Fahrenheit => (9 * raw) / (5 * counts) + 32,
        other => return Err(DecodeError::UnitsMismatch(other)),
    };

    Ok(status(service)
        .with_value("device", channel.to_string())
        .with_value("type", "temp")
        .with_value("current", degrees.to_string())
        .with_value("units", service.units.keyword()))
}

/// `{volts_lo, volts_hi, freq_lo, freq_hi}`，电压 ×10、频率 ×100。
fn decode_ac(service: &Service, response: &ResponseFrame) -> Result<StatusEvent, DecodeError> {
    expect_params(CommandType::ReadAc, response, AC_PARAMS)?;
    let p = &response.params;
    let volts = f64::from(u16::from_le_bytes([p[0], p[1]])) / 10.0;
    let hertz = f64::from(u16::from_le_bytes([p[2], p[3]])) / 100.0;

    let event = status(service);
    if service.units == Units::Volts {
        Ok(event
            .with_value("type", "volts")
            .with_value("current", format!("{volts:.1}"))
            .with_value("units", Units::Volts.keyword()))
    } else {
        Ok(event
            .with_value("type", "frequency")
            .with_value("current", format!("{hertz:.2}"))
            .with_value("units", Units::Hertz.keyword()))
    }
}

/// `{device, sub_function, state}`，仅状态查询（子功能 2）上报。
fn decode_output(
    service: &Service,
    response: &ResponseFrame,
) -> Result<Option<StatusEvent>, DecodeError> {
    expect_params(CommandType::Output, response, OUTPUT_PARAMS)?;
    let p = &response.params;
    if p[1] != crate::request::OUTPUT_STATUS_QUERY {
        return Ok(None);
    }
    let state = match p[2] {
        1 => "high",
        0 => "low",
        other => return Err(DecodeError::BadState(other)),
    };

    Ok(Some(
        status(service)
            .with_value("device", p[0].to_string())
            .with_value("type", "output")
            .with_value("current", state),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ServiceId, identity_hash};

    fn service(command: CommandType, units: Units) -> Service {
        Service {
            id: ServiceId(0),
            name: "svc".to_string(),
            instance_id: "lounge".to_string(),
            instance_hash: identity_hash("lounge"),
            address: 1,
            command,
            units,
            class: "sensor".to_string(),
            type_tag: "basic".to_string(),
            is_sensor: true,
        }
    }

    fn response(command: u8, params: &[u8]) -> ResponseFrame {
        ResponseFrame {
            address: 1,
            command,
            params: params.to_vec(),
        }
    }

    #[test]
    fn temperature_in_celsius_and_fahrenheit() {
        let frame = response(0x12, &[0x02, 0x0A, 0x00, 0xE8, 0x03]);

        let event = decode(&service(CommandType::ReadTemperature, Units::Celsius), &frame)
            .expect("decode")
            .expect("event");
        assert_eq!(event.source_instance, "lounge");
        assert_eq!(event.schema.to_string(), "sensor.basic");
        assert_eq!(event.value("device"), Some("2"));
        assert_eq!(event.value("type"), Some("temp"));
        assert_eq!(event.value("current"), Some("100"));
        assert_eq!(event.value("units"), Some("celsius"));

        let event = decode(&service(CommandType::ReadTemperature, Units::Fahrenheit), &frame)
            .expect("decode")
            .expect("event");
        assert_eq!(event.value("current"), Some("212"));
        assert_eq!(event.value("units"), Some("fahrenheit"));
    }

    #[test]
    fn negative_temperature_is_signed() {
        // -100 counts / 10 = -10 C
        let frame = response(0x12, &[0x00, 0x0A, 0x00, 0x9C, 0xFF]);
        let event = decode(&service(CommandType::ReadTemperature, Units::Celsius), &frame)
            .expect("decode")
            .expect("event");
        assert_eq!(event.value("current"), Some("-10"));
    }

    #[test]
    fn temperature_rejects_bad_payloads() {
        let svc = service(CommandType::ReadTemperature, Units::Celsius);
        assert_eq!(
            decode(&svc, &response(0x12, &[0x02, 0x0A, 0x00, 0xE8])),
            Err(DecodeError::ParamCount {
                command: CommandType::ReadTemperature,
                expected: 5,
                actual: 4,
            })
        );
        assert_eq!(
            decode(&svc, &response(0x12, &[0x02, 0x00, 0x00, 0xE8, 0x03])),
            Err(DecodeError::ZeroScale)
        );
        assert_eq!(
            decode(
                &service(CommandType::ReadTemperature, Units::Volts),
                &response(0x12, &[0x02, 0x0A, 0x00, 0xE8, 0x03])
            ),
            Err(DecodeError::UnitsMismatch(Units::Volts))
        );
    }

    #[test]
    fn ac_emits_only_configured_quantity() {
        let frame = response(0x15, &[0x64, 0x00, 0x68, 0x01]);

        let volts = decode(&service(CommandType::ReadAc, Units::Volts), &frame)
            .expect("decode")
            .expect("event");
        assert_eq!(volts.value("type"), Some("volts"));
        assert_eq!(volts.value("current"), Some("10.0"));
        assert_eq!(volts.value("units"), Some("volts"));
        assert_eq!(volts.value("device"), None);

        let hertz = decode(&service(CommandType::ReadAc, Units::Hertz), &frame)
            .expect("decode")
            .expect("event");
        assert_eq!(hertz.value("type"), Some("frequency"));
        assert_eq!(hertz.value("current"), Some("36.80"));
        assert_eq!(hertz.value("units"), Some("hertz"));
    }

    #[test]
    fn output_status_query_reports_state() {
        let svc = service(CommandType::Output, Units::Output);
        let event = decode(&svc, &response(0x13, &[0x0C, 0x02, 0x01]))
            .expect("decode")
            .expect("event");
        assert_eq!(event.value("device"), Some("12"));
        assert_eq!(event.value("type"), Some("output"));
        assert_eq!(event.value("current"), Some("high"));

        let low = decode(&svc, &response(0x13, &[0x0C, 0x02, 0x00]))
            .expect("decode")
            .expect("event");
        assert_eq!(low.value("current"), Some("low"));
    }

    #[test]
    fn output_ignores_other_sub_functions_and_rejects_bad_state() {
        let svc = service(CommandType::Output, Units::Output);
        assert_eq!(decode(&svc, &response(0x13, &[0x0C, 0x01, 0x01])), Ok(None));
        assert_eq!(
            decode(&svc, &response(0x13, &[0x0C, 0x02, 0x07])),
            Err(DecodeError::BadState(7))
        );
    }

    #[test]
    fn unknown_command_byte_is_an_error() {
        let svc = service(CommandType::Output, Units::Output);
        assert_eq!(
            decode(&svc, &response(0x99, &[])),
            Err(DecodeError::UnknownCommand(0x99))
        );
        assert_eq!(
            decode(&svc, &response(0x00, &[])),
            Err(DecodeError::UnknownCommand(0x00))
        );
    }
}
