//! HAN 帧编解码
//!
//! 命令帧：`CA<addr><cmd><params...>00`，响应帧：`RS<addr><cmd><params...>`，
//! 每个字节两位大写十六进制，无分隔符，行终止符由传输层负责。

use crate::error::ProtocolError;
use domain::{CommandFrame, MAX_RESPONSE_PARAMS, ResponseFrame};

/// 命令帧前缀
pub const COMMAND_PREFIX: &str = "CA";
/// 响应帧前缀
pub const RESPONSE_PREFIX: &str = "RS";
/// 命令帧结尾的协议终止字节
const FRAME_TERMINATOR: &str = "00";
/// 前缀 + 地址 + 命令字节
const HEADER_LEN: usize = 6;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// 编码命令帧（不含换行）。
pub fn encode_command(address: u8, command: u8, params: &[u8]) -> String {
    let mut line = String::with_capacity(HEADER_LEN + params.len() * 2 + FRAME_TERMINATOR.len());
    line.push_str(COMMAND_PREFIX);
    push_hex(&mut line, address);
    push_hex(&mut line, command);
    for byte in params {
        push_hex(&mut line, *byte);
    }
    line.push_str(FRAME_TERMINATOR);
    line
}

pub fn encode_frame(frame: &CommandFrame) -> String {
    encode_command(frame.address, frame.command, &frame.params)
}

/// 解码响应行。
///
/// 不以 `RS` 开头的行不是响应，返回 `Ok(None)`；
/// 头部不完整或参数超过 16 字节视为格式错误。
/// 奇数长度时末尾落单的字符被忽略。
pub fn decode_response(line: &str) -> Result<Option<ResponseFrame>, ProtocolError> {
    let bytes = line.as_bytes();
    if !bytes.starts_with(RESPONSE_PREFIX.as_bytes()) {
        return Ok(None);
    }
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "response header truncated: {line}"
        )));
    }

    let count = (bytes.len() - HEADER_LEN) / 2;
    if count > MAX_RESPONSE_PARAMS {
        return Err(ProtocolError::MalformedFrame(format!(
            "response carries {count} parameters, at most {MAX_RESPONSE_PARAMS} allowed"
        )));
    }

    let params = bytes[HEADER_LEN..HEADER_LEN + count * 2]
        .chunks_exact(2)
        .map(hex2)
        .collect();

    Ok(Some(ResponseFrame {
        address: hex2(&bytes[2..4]),
        command: hex2(&bytes[4..6]),
        params,
    }))
}

/// 两位十六进制转字节。
///
/// 只接受 `0-9` 与大写 `A-F`；遇到非法字符即停止，保留已移位的高位结果
/// （例如 `"5G"` 得到 `0x50`，`"G5"` 得到 `0x00`）。
pub fn hex2(digits: &[u8]) -> u8 {
    let mut value = 0u8;
    for &c in digits.iter().take(2) {
        value <<= 4;
        match hex_value(c) {
            Some(nibble) => value |= nibble,
            None => break,
        }
    }
    value
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn push_hex(line: &mut String, byte: u8) {
    line.push(HEX_DIGITS[usize::from(byte >> 4)] as char);
    line.push(HEX_DIGITS[usize::from(byte & 0x0F)] as char);
}
