//! 元素格式码与小端打包/解包编解码器。
//!
//! # 模块架构（Why）
//! - 单字符格式码（`B,b,h,H,i,I,l,L,q,Q,n,N,f,d,?,c,P`）构成一张封闭表，
//!   条目不可扩展：任何未知码值必须在进入视图之前被拒绝。
//! - 同一张表同时服务于单元素读写（`get_item`/`set_item`）与批量递归序列化
//!   （`to_list`），保证两条路径的数值语义一致。
//!
//! # 设计总览（How）
//! - [`BufferFormat`] 保存原始码字符与语义表示：`'l'` 与 `'q'` 在 64 位目标上
//!   共享同一表示，结构比较只看表示、不看字符。
//! - 所有多字节格式一律按小端字节序编解码；无符号格式在打包时执行
//!   `[0, 2^(8*itemsize)-1]` 区间检查，有符号格式检查二进制补码窗口。

use crate::error::ViewError;
use alloc::vec::Vec;
use core::fmt;

/// 默认格式码：省略格式时按无符号字节处理。
pub const DEFAULT_FORMAT_CODE: char = 'B';

/// 格式的语义表示：决定元素宽度与编解码行为。
///
/// 码字符到表示的归并关系（64 位目标）：`l`/`q`/`n` 均为 8 字节有符号，
/// `L`/`Q`/`N` 均为 8 字节无符号，`P` 为 8 字节指针宽无符号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FormatRepr {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    Char,
    Pointer,
}

impl FormatRepr {
    fn itemsize(self) -> usize {
        match self {
            FormatRepr::U8 | FormatRepr::I8 | FormatRepr::Bool | FormatRepr::Char => 1,
            FormatRepr::U16 | FormatRepr::I16 => 2,
            FormatRepr::U32 | FormatRepr::I32 | FormatRepr::F32 => 4,
            FormatRepr::U64 | FormatRepr::I64 | FormatRepr::F64 | FormatRepr::Pointer => 8,
        }
    }
}

/// 单字符格式码的解析结果，贯穿元素访问与序列化两条路径。
///
/// # 契约说明（What）
/// - **构造**：仅能通过 [`BufferFormat::from_code`]（未知码值报 `format.unknown`）
///   或 [`BufferFormat::default`]（等价于 `'B'`）获得。
/// - **相等性**：按语义表示比较。`'l'` 与 `'q'` 相等，`'B'` 与 `'b'` 不等；
///   切片赋值的结构检查依赖该语义。
/// - **后置条件**：`itemsize()` 恒为正且与编解码使用的字节数一致。
#[derive(Debug, Clone, Copy)]
pub struct BufferFormat {
    code: char,
    repr: FormatRepr,
}

impl BufferFormat {
    /// 解析单字符格式码；未知码值返回 `format.unknown`。
    pub fn from_code(code: char) -> Result<Self, ViewError> {
        let repr = match code {
            'B' => FormatRepr::U8,
            'b' => FormatRepr::I8,
            'h' => FormatRepr::I16,
            'H' => FormatRepr::U16,
            'i' => FormatRepr::I32,
            'I' => FormatRepr::U32,
            'l' | 'q' | 'n' => FormatRepr::I64,
            'L' | 'Q' | 'N' => FormatRepr::U64,
            'f' => FormatRepr::F32,
            'd' => FormatRepr::F64,
            '?' => FormatRepr::Bool,
            'c' => FormatRepr::Char,
            'P' => FormatRepr::Pointer,
            _ => return Err(ViewError::unknown_format(code)),
        };
        Ok(Self { code, repr })
    }

    /// 原始格式码字符。
    pub fn code(&self) -> char {
        self.code
    }

    /// 单个元素占用的字节数。
    pub fn itemsize(&self) -> usize {
        self.repr.itemsize()
    }

    /// 是否为字节宽格式（`B`/`b`/`c`）。跨宽度重解释要求至少一侧满足该条件。
    pub fn is_byte_sized(&self) -> bool {
        matches!(self.code, 'B' | 'b' | 'c')
    }

    /// 从小端字节序解包一个元素；`bytes` 长度必须等于 `itemsize()`。
    pub fn unpack(&self, bytes: &[u8]) -> PackedValue {
        debug_assert_eq!(bytes.len(), self.itemsize());
        match self.repr {
            FormatRepr::U8 => PackedValue::UInt(bytes[0] as u64),
            FormatRepr::I8 => PackedValue::Int(bytes[0] as i8 as i64),
            FormatRepr::U16 => {
                PackedValue::UInt(u16::from_le_bytes([bytes[0], bytes[1]]) as u64)
            }
            FormatRepr::I16 => PackedValue::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            FormatRepr::U32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                PackedValue::UInt(u32::from_le_bytes(raw) as u64)
            }
            FormatRepr::I32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                PackedValue::Int(i32::from_le_bytes(raw) as i64)
            }
            FormatRepr::U64 | FormatRepr::Pointer => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                PackedValue::UInt(u64::from_le_bytes(raw))
            }
            FormatRepr::I64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                PackedValue::Int(i64::from_le_bytes(raw))
            }
            FormatRepr::F32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                PackedValue::Float(f32::from_le_bytes(raw) as f64)
            }
            FormatRepr::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                PackedValue::Float(f64::from_le_bytes(raw))
            }
            FormatRepr::Bool => PackedValue::Bool(bytes[0] != 0),
            FormatRepr::Char => PackedValue::Bytes(alloc::vec![bytes[0]]),
        }
    }

    /// 将值按小端字节序打包到 `out`（长度必须等于 `itemsize()`）。
    ///
    /// 无符号格式对负值与超界值报 `format.pack_range`；与格式类型不符的值
    /// （例如向整数格式写浮点）报 `format.invalid_value`。
    pub fn pack(&self, value: &PackedValue, out: &mut [u8]) -> Result<(), ViewError> {
        debug_assert_eq!(out.len(), self.itemsize());
        match self.repr {
            FormatRepr::U8 | FormatRepr::U16 | FormatRepr::U32 | FormatRepr::U64
            | FormatRepr::Pointer => {
                let raw = self.integral_value(value)?;
                let bits = 8 * self.itemsize() as u32;
                let max = if bits == 64 { u64::MAX as i128 } else { (1i128 << bits) - 1 };
                if raw < 0 || raw > max {
                    return Err(ViewError::pack_range(self.code));
                }
                write_le(out, raw as u128);
            }
            FormatRepr::I8 | FormatRepr::I16 | FormatRepr::I32 | FormatRepr::I64 => {
                let raw = self.integral_value(value)?;
                let bits = 8 * self.itemsize() as u32;
                let min = -(1i128 << (bits - 1));
                let max = (1i128 << (bits - 1)) - 1;
                if raw < min || raw > max {
                    return Err(ViewError::pack_range(self.code));
                }
                write_le(out, raw as u128);
            }
            FormatRepr::F32 => {
                let raw = self.float_value(value)?;
                out.copy_from_slice(&(raw as f32).to_le_bytes());
            }
            FormatRepr::F64 => {
                let raw = self.float_value(value)?;
                out.copy_from_slice(&raw.to_le_bytes());
            }
            FormatRepr::Bool => {
                let truthy = match value {
                    PackedValue::Bool(v) => *v,
                    PackedValue::Int(v) => *v != 0,
                    PackedValue::UInt(v) => *v != 0,
                    _ => return Err(ViewError::invalid_value(self.code)),
                };
                out[0] = truthy as u8;
            }
            FormatRepr::Char => match value {
                PackedValue::Bytes(bytes) if bytes.len() == 1 => out[0] = bytes[0],
                _ => return Err(ViewError::invalid_value(self.code)),
            },
        }
        Ok(())
    }

    fn integral_value(&self, value: &PackedValue) -> Result<i128, ViewError> {
        match value {
            PackedValue::Int(v) => Ok(*v as i128),
            PackedValue::UInt(v) => Ok(*v as i128),
            PackedValue::Bool(v) => Ok(*v as i128),
            _ => Err(ViewError::invalid_value(self.code)),
        }
    }

    fn float_value(&self, value: &PackedValue) -> Result<f64, ViewError> {
        match value {
            PackedValue::Float(v) => Ok(*v),
            PackedValue::Int(v) => Ok(*v as f64),
            PackedValue::UInt(v) => Ok(*v as f64),
            PackedValue::Bool(v) => Ok(*v as u8 as f64),
            _ => Err(ViewError::invalid_value(self.code)),
        }
    }
}

impl Default for BufferFormat {
    fn default() -> Self {
        Self {
            code: DEFAULT_FORMAT_CODE,
            repr: FormatRepr::U8,
        }
    }
}

impl PartialEq for BufferFormat {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl Eq for BufferFormat {}

impl fmt::Display for BufferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

fn write_le(out: &mut [u8], raw: u128) {
    let bytes = raw.to_le_bytes();
    out.copy_from_slice(&bytes[..out.len()]);
}

/// 解包后的标量值，是引擎与宿主之间交换元素的统一载体。
///
/// # 契约说明（What）
/// - `Int`/`UInt` 承载整数格式，`Float` 承载 `f`/`d`，`Bool` 承载 `?`，
///   `Bytes`（长度恒为 1）承载 `c`。
/// - 相等比较带数值提升：`Int(2)`、`UInt(2)`、`Float(2.0)`、`Bool` 与 `0/1`
///   按数值语义互等，`Bytes` 仅与内容相同的 `Bytes` 相等。
#[derive(Debug, Clone)]
pub enum PackedValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl PackedValue {
    fn as_i128(&self) -> Option<i128> {
        match self {
            PackedValue::Int(v) => Some(*v as i128),
            PackedValue::UInt(v) => Some(*v as i128),
            PackedValue::Bool(v) => Some(*v as i128),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            PackedValue::Int(v) => Some(*v as f64),
            PackedValue::UInt(v) => Some(*v as f64),
            PackedValue::Float(v) => Some(*v),
            PackedValue::Bool(v) => Some(*v as u8 as f64),
            PackedValue::Bytes(_) => None,
        }
    }
}

impl PartialEq for PackedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PackedValue::Bytes(lhs), PackedValue::Bytes(rhs)) => lhs == rhs,
            (PackedValue::Bytes(_), _) | (_, PackedValue::Bytes(_)) => false,
            (PackedValue::Float(_), _) | (_, PackedValue::Float(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(lhs), Some(rhs)) => lhs == rhs,
                    _ => false,
                }
            }
            _ => self.as_i128() == other.as_i128(),
        }
    }
}
