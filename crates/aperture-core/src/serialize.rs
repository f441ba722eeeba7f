//! 元素读写与递归序列化：`get_item`/`set_item`、`to_bytes`/`to_list`、`hex` 与哈希。
//!
//! # 模块架构（Why）
//! - 批量导出与单元素访问共享逐维寻址语义（含子偏移间接跳转），差别仅在叶子动作：
//!   复制原始 `itemsize` 字节，或调用格式表解包。
//! - C 序与 Fortran 序导出使用同一递归骨架：前者目标游标单调前进，
//!   后者以“先前各维扩展度之积”为目标步长散布写入。
//!
//! # 设计总览（How）
//! - 所有导出都先走 [`BufferView::check_released`]，再克隆字节源句柄；
//!   递归过程中任何一次源访问失败都立即中止并上抛。
//! - 哈希仅对只读视图开放，结果经 `-1` 哨兵位缓存，至多计算一次。

use crate::{
    error::{ViewError, ViewErrorKind, codes},
    format::PackedValue,
    index::{ResolvedItem, ViewIndex},
    source::BufferSource,
    view::BufferView,
};
use alloc::string::String;
use alloc::vec::Vec;

/// 字节导出顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// 行主序：最内维变化最快。
    C,
    /// 列主序：最外维在目标布局中变化最快。
    Fortran,
    /// 任意：等价于 C 序。
    Any,
}

/// `to_list` 的结果：每剩余一维嵌套一层序列，叶子为解包后的标量。
#[derive(Debug, Clone, PartialEq)]
pub enum NestedList {
    Item(PackedValue),
    List(Vec<NestedList>),
}

impl BufferView {
    /// 读取单个元素并按格式表解包。
    pub fn get_item(&self, index: impl Into<ViewIndex>) -> Result<PackedValue, ViewError> {
        let item = self.resolve(&index.into())?;
        self.read_packed(&item)
    }

    /// 将值按格式表打包后写入单个元素。
    pub fn set_item(
        &self,
        index: impl Into<ViewIndex>,
        value: &PackedValue,
    ) -> Result<(), ViewError> {
        self.check_released()?;
        if self.readonly {
            return Err(ViewError::not_writable());
        }
        let item = self.resolve(&index.into())?;
        let mut raw = alloc::vec![0u8; self.itemsize];
        self.format.pack(value, &mut raw)?;
        item.source.write_range(item.offset, &raw)
    }

    pub(crate) fn read_packed(&self, item: &ResolvedItem) -> Result<PackedValue, ViewError> {
        let mut raw = alloc::vec![0u8; self.itemsize];
        item.source.read_range(item.offset, &mut raw)?;
        Ok(self.format.unpack(&raw))
    }

    /// 将窗口内容导出为一段连续字节。
    ///
    /// # 契约说明（What）
    /// - C 连续视图满足 `to_bytes(C) == to_bytes(Any)`，且结果与底层存储区间逐字节一致；
    /// - Fortran 序导出按列主序重排：目标维步长为先前各维扩展度的运行乘积；
    /// - 0 维视图恰好导出 `itemsize` 个字节。
    pub fn to_bytes(&self, order: ByteOrder) -> Result<Vec<u8>, ViewError> {
        self.check_released()?;
        let source = self.source()?;
        let mut out = alloc::vec![0u8; self.length_bytes];
        if self.ndim() == 0 {
            source.read_range(self.offset, &mut out[..self.itemsize])?;
            return Ok(out);
        }
        match order {
            ByteOrder::C | ByteOrder::Any => {
                let mut cursor = 0usize;
                self.copy_c_order(0, &source, self.offset, &mut out, &mut cursor)?;
            }
            ByteOrder::Fortran => {
                self.copy_fortran_order(0, &source, self.offset, &mut out, 0, self.itemsize)?;
            }
        }
        Ok(out)
    }

    /// 将窗口内容导出为嵌套序列，叶子元素逐个解包。
    pub fn to_list(&self) -> Result<NestedList, ViewError> {
        self.check_released()?;
        let source = self.source()?;
        if self.ndim() == 0 {
            let item = ResolvedItem {
                source,
                offset: self.offset,
            };
            return Ok(NestedList::Item(self.read_packed(&item)?));
        }
        self.collect_list(0, &source, self.offset)
    }

    /// 十六进制渲染（小写），语义与 `bytes.hex(sep, bytes_per_sep)` 对齐。
    ///
    /// - `bytes_per_sep > 0`：分组自右端对齐；`< 0`：自左端对齐；`0` 或无分隔符时
    ///   退化为整段渲染。
    pub fn hex_with(&self, sep: Option<u8>, bytes_per_sep: i32) -> Result<String, ViewError> {
        let bytes = self.to_bytes(ByteOrder::C)?;
        if bytes.is_empty() {
            return Ok(String::new());
        }
        let Some(sep) = sep else {
            return Ok(hex::encode(&bytes));
        };
        if bytes_per_sep == 0 {
            return Ok(hex::encode(&bytes));
        }
        const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
        let group = bytes_per_sep.unsigned_abs() as usize;
        let from_right = bytes_per_sep > 0;
        let mut rendered = String::with_capacity(bytes.len() * 3);
        for (i, byte) in bytes.iter().enumerate() {
            let at_boundary = if from_right {
                (bytes.len() - i) % group == 0
            } else {
                i % group == 0
            };
            if i > 0 && at_boundary {
                rendered.push(sep as char);
            }
            rendered.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            rendered.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
        }
        Ok(rendered)
    }

    /// 无分隔符的十六进制渲染。
    pub fn hex(&self) -> Result<String, ViewError> {
        self.hex_with(None, 1)
    }

    /// 内容哈希：仅只读视图可用，结果缓存一次。
    ///
    /// 可写视图报 `view.hash_writable`——内容可变时哈希无法保持稳定。
    pub fn hash(&self) -> Result<i64, ViewError> {
        let cached = self.load_cached_hash();
        if cached != -1 {
            return Ok(cached);
        }
        self.check_released()?;
        if !self.readonly {
            return Err(ViewError::new(
                ViewErrorKind::NotWritable,
                codes::VIEW_HASH_WRITABLE,
                "不能对可写缓冲视图求哈希",
            ));
        }
        let bytes = self.to_bytes(ByteOrder::C)?;
        let mut hash = fnv1a_64(&bytes) as i64;
        if hash == -1 {
            // -1 被哈希缓存用作“未计算”哨兵。
            hash = -2;
        }
        self.store_cached_hash(hash);
        Ok(hash)
    }

    /// 结构加内容等价：维数与形状一致且逐元素按数值语义相等。
    ///
    /// 任一侧已释放即判不等（释放后的视图不再代表任何内容）。
    pub fn content_eq(&self, other: &BufferView) -> bool {
        if self.is_released() || other.is_released() {
            return false;
        }
        if self.ndim() != other.ndim() || self.shape != other.shape {
            return false;
        }
        match (self.to_list(), other.to_list()) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    /// 该维存在非负子偏移时执行间接跳转，返回新的（源，偏移）对。
    fn apply_suboffset(
        &self,
        dim: usize,
        source: &BufferSource,
        offset: isize,
    ) -> Result<(BufferSource, isize), ViewError> {
        if let Some(suboffsets) = &self.suboffsets
            && suboffsets[dim] >= 0
        {
            let derefed = source.dereference(offset, suboffsets[dim], self.length_bytes)?;
            return Ok((derefed, 0));
        }
        Ok((source.clone(), offset))
    }

    fn copy_c_order(
        &self,
        dim: usize,
        source: &BufferSource,
        offset: isize,
        out: &mut [u8],
        cursor: &mut usize,
    ) -> Result<(), ViewError> {
        let mut offset = offset;
        for _ in 0..self.shape[dim] {
            let (item_source, item_offset) = self.apply_suboffset(dim, source, offset)?;
            if dim == self.ndim() - 1 {
                let end = *cursor + self.itemsize;
                item_source.read_range(item_offset, &mut out[*cursor..end])?;
                *cursor = end;
            } else {
                self.copy_c_order(dim + 1, &item_source, item_offset, out, cursor)?;
            }
            offset += self.strides[dim];
        }
        Ok(())
    }

    fn copy_fortran_order(
        &self,
        dim: usize,
        source: &BufferSource,
        offset: isize,
        out: &mut [u8],
        dest_offset: usize,
        dest_stride: usize,
    ) -> Result<(), ViewError> {
        let mut offset = offset;
        let mut dest_offset = dest_offset;
        for _ in 0..self.shape[dim] {
            let (item_source, item_offset) = self.apply_suboffset(dim, source, offset)?;
            if dim == self.ndim() - 1 {
                let end = dest_offset + self.itemsize;
                item_source.read_range(item_offset, &mut out[dest_offset..end])?;
            } else {
                self.copy_fortran_order(
                    dim + 1,
                    &item_source,
                    item_offset,
                    out,
                    dest_offset,
                    dest_stride * self.shape[dim],
                )?;
            }
            dest_offset += dest_stride;
            offset += self.strides[dim];
        }
        Ok(())
    }

    fn collect_list(
        &self,
        dim: usize,
        source: &BufferSource,
        offset: isize,
    ) -> Result<NestedList, ViewError> {
        let mut offset = offset;
        let mut items = Vec::with_capacity(self.shape[dim]);
        for _ in 0..self.shape[dim] {
            let (item_source, item_offset) = self.apply_suboffset(dim, source, offset)?;
            if dim == self.ndim() - 1 {
                let resolved = ResolvedItem {
                    source: item_source,
                    offset: item_offset,
                };
                items.push(NestedList::Item(self.read_packed(&resolved)?));
            } else {
                items.push(self.collect_list(dim + 1, &item_source, item_offset)?);
            }
            offset += self.strides[dim];
        }
        Ok(NestedList::List(items))
    }
}

/// FNV-1a 64 位哈希：实现简单且无额外依赖，满足“只读视图内容稳定指纹”的需求。
fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
