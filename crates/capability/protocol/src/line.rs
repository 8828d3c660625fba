//! 行分帧
//!
//! 逐字节累积：丢弃 `\r`，`\n` 结束一行；超长的字节被丢弃但不终止该行。

use tracing::warn;

/// 单行最大字节数（不含行终止符）
pub const MAX_LINE_LEN: usize = 255;

/// 跨多次可读事件持续累积的行缓冲。
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len),
            max_len,
        }
    }

    /// 送入一个字节；遇到换行时返回完整的一行。
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let line = self.buf.iter().map(|&b| wire_char(b)).collect();
                self.buf.clear();
                Some(line)
            }
            _ => {
                if self.buf.len() < self.max_len {
                    self.buf.push(byte);
                } else {
                    warn!(target: "han.protocol", max_len = self.max_len, "line_buffer_overrun");
                }
                None
            }
        }
    }

    /// 丢弃未完成的部分行（读错误后调用）。
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// 当前已累积但未完成的字节数。
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// 每个线上字节对应一个字符，非 ASCII 字节替换为 `?`，
/// 保证后续按两字符一组解码时与线上字节位置对齐。
fn wire_char(byte: u8) -> char {
    if byte.is_ascii() { byte as char } else { '?' }
}
