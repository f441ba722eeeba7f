//! 索引与指针解析：把多维索引转换为字节源上的最终读写位置。
//!
//! # 模块架构（Why）
//! - 元素访问、切片赋值与递归序列化共用同一条逐维解析路径：
//!   负索引归一化、边界检查、步长累加与子偏移间接跳转的语义必须只实现一处。
//! - 诊断约定：越界消息中的维度编号从 1 开始计数。
//!
//! # 设计总览（How）
//! - [`ViewIndex`] 区分标量索引（仅限一维视图）与定长元组索引（长度必须等于维数）。
//! - [`ResolvedItem`] 即“指针 + 偏移”对：间接跳转会替换指针并把偏移清零，
//!   解析结束后可直接进行 `itemsize` 字节的读写。

use crate::{error::ViewError, source::BufferSource, view::BufferView};
use alloc::vec::Vec;

/// 元素索引：标量或与维数等长的元组。
///
/// # 契约说明（What）
/// - `Scalar` 仅对一维视图合法；0 维视图报 `index.zero_dim`，更高维报
///   `index.sub_views`（部分索引派生子视图不受支持）。
/// - `Tuple` 长度必须与维数严格相等：更长报 `index.dimension_mismatch`，
///   更短报 `index.sub_views`；空元组对 0 维视图合法（定位标量本体）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewIndex {
    Scalar(i64),
    Tuple(Vec<i64>),
}

impl From<i64> for ViewIndex {
    fn from(index: i64) -> Self {
        ViewIndex::Scalar(index)
    }
}

impl From<Vec<i64>> for ViewIndex {
    fn from(indices: Vec<i64>) -> Self {
        ViewIndex::Tuple(indices)
    }
}

impl From<&[i64]> for ViewIndex {
    fn from(indices: &[i64]) -> Self {
        ViewIndex::Tuple(indices.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for ViewIndex {
    fn from(indices: [i64; N]) -> Self {
        ViewIndex::Tuple(indices.to_vec())
    }
}

/// 解析完成的读写位置：字节源句柄 + 最终偏移。
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub source: BufferSource,
    pub offset: isize,
}

impl BufferView {
    /// 将索引解析为可直接读写 `itemsize` 字节的位置。
    ///
    /// # 逻辑解析（How）
    /// - 逐维执行：负索引加一次扩展度归一化（仅一次，二次环绕视为越界）、
    ///   边界检查、`offset += strides[i] * index[i]`；
    /// - 若该维子偏移非负，立即以“当前偏移 + 子偏移”经字节源做一次间接解引用，
    ///   并把游标偏移清零后进入下一维。
    pub fn resolve(&self, index: &ViewIndex) -> Result<ResolvedItem, ViewError> {
        self.check_released()?;
        let source = self.source()?;
        let mut item = ResolvedItem {
            source,
            offset: self.offset,
        };
        match index {
            ViewIndex::Scalar(scalar) => match self.ndim() {
                1 => self.lookup_dimension(&mut item, 0, *scalar)?,
                0 => return Err(ViewError::zero_dim_index()),
                _ => return Err(ViewError::sub_views_unsupported()),
            },
            ViewIndex::Tuple(indices) => {
                let ndim = self.ndim();
                if indices.len() != ndim {
                    if ndim == 0 {
                        return Err(ViewError::zero_dim_index());
                    }
                    if indices.len() > ndim {
                        return Err(ViewError::too_many_indices(ndim, indices.len()));
                    }
                    return Err(ViewError::sub_views_unsupported());
                }
                for (dim, scalar) in indices.iter().enumerate() {
                    self.lookup_dimension(&mut item, dim, *scalar)?;
                }
            }
        }
        Ok(item)
    }

    /// 单维解析步骤；`dim` 为 0 基，诊断消息中按 1 基呈现。
    pub(crate) fn lookup_dimension(
        &self,
        item: &mut ResolvedItem,
        dim: usize,
        index: i64,
    ) -> Result<(), ViewError> {
        let extent = self.shape[dim] as i64;
        let mut index = index;
        if index < 0 {
            index += extent;
        }
        if index < 0 || index >= extent {
            return Err(ViewError::index_out_of_bounds(dim + 1));
        }
        item.offset += self.strides[dim] * index as isize;
        if let Some(suboffsets) = &self.suboffsets
            && suboffsets[dim] >= 0
        {
            item.source =
                item.source
                    .dereference(item.offset, suboffsets[dim], self.length_bytes)?;
            item.offset = 0;
        }
        Ok(())
    }
}
