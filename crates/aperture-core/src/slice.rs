//! 派生操作：切片、切片赋值、重解释转换与只读化。
//!
//! # 模块架构（Why）
//! - 所有派生视图都是同一释放契约上的新登记：它们复用宿主句柄与字节源，
//!   在共享 [`ManagedBuffer`](crate::lifecycle::ManagedBuffer) 上追加一个导出，
//!   因此任何单个派生视图的释放都不会提前触发底层回收。
//! - 切片限定在一维视图（多维切片与部分索引子视图同属契约明确不支持的范围）；
//!   重解释转换限定 C 连续源且维度变换仅允许 1 维↔N 维。
//!
//! # 设计总览（How）
//! - [`SliceSpec`] 按 Python 切片语义归一化（负索引回折、越界截断、负步长反向）。
//! - 切片赋值经由中间字节副本完成：源与目标可能是同一底层缓冲的重叠窗口，
//!   先整体导出源内容再逐元素写入可消除别名风险。

use crate::{
    error::{ViewError, ViewErrorKind, codes},
    format::BufferFormat,
    index::ViewIndex,
    layout::{self, MAX_DIM},
    serialize::ByteOrder,
    view::BufferView,
};
use alloc::vec::Vec;

/// Python 风格切片描述：`None` 字段取方向相关的默认值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// 完整窗口（等价于 `[:]`）。
    pub fn full() -> Self {
        Self::default()
    }

    /// `[start:stop]` 形式。
    pub fn between(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// `[start:stop:step]` 形式。
    pub fn with_step(start: i64, stop: i64, step: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: Some(step),
        }
    }

    /// 对长度为 `len` 的维度归一化切片参数。
    ///
    /// # 契约说明（What）
    /// - 步长为零报 `slice.step_zero`；
    /// - 负索引加一次长度回折，仍越界则按步长方向截断到边界；
    /// - 返回的 `slice_length` 恰为迭代产生的元素个数，可为 0。
    pub fn resolve(&self, len: usize) -> Result<SliceInfo, ViewError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(ViewError::slice_step_zero());
        }
        let len = len as i64;
        let clamp = |value: i64| -> i64 {
            let mut value = value;
            if value < 0 {
                value += len;
                if value < 0 {
                    value = if step < 0 { -1 } else { 0 };
                }
            } else if value >= len {
                value = if step < 0 { len - 1 } else { len };
            }
            value
        };
        let start = self.start.map_or(if step < 0 { len - 1 } else { 0 }, clamp);
        let stop = self.stop.map_or(if step < 0 { -1 } else { len }, clamp);
        let slice_length = if step > 0 {
            if start < stop {
                ((stop - start - 1) / step + 1) as usize
            } else {
                0
            }
        } else if stop < start {
            ((start - stop - 1) / -step + 1) as usize
        } else {
            0
        };
        Ok(SliceInfo {
            start,
            stop,
            step,
            slice_length,
        })
    }
}

/// 归一化后的切片参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceInfo {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
    pub slice_length: usize,
}

impl BufferView {
    /// 派生一维切片视图：共享字节源与释放契约的新窗口。
    ///
    /// # 契约说明（What）
    /// - 仅一维视图支持切片：0 维报 `index.zero_dim`，多维报 `index.sub_views`；
    /// - 派生视图 `shape[0] = slice_length`、`strides[0] *= step`、
    ///   基偏移前移 `start * 原步长`，字节长度按元素数等比缩减；
    /// - 连续性标志按新布局重新计算（步长不为 1 的切片丧失连续性）。
    pub fn get_slice(&self, spec: &SliceSpec) -> Result<BufferView, ViewError> {
        self.check_released()?;
        match self.ndim() {
            1 => {}
            0 => return Err(ViewError::zero_dim_index()),
            _ => return Err(ViewError::sub_views_unsupported()),
        }
        let info = spec.resolve(self.shape[0])?;
        self.derive(|mut parts| {
            let old_stride = parts.strides[0];
            parts.offset += info.start as isize * old_stride;
            parts.shape[0] = info.slice_length;
            parts.strides[0] = old_stride * info.step as isize;
            parts.length_bytes = info.slice_length * parts.format.itemsize();
            Ok(parts)
        })
    }

    /// 切片赋值：把 `src` 的内容写入本视图的 `spec` 窗口。
    ///
    /// # 逻辑解析（How）
    /// - 先派生目标切片视图，再做结构校验（维数、首维扩展度、格式语义一致），
    ///   不一致报 `slice.structure_mismatch`；
    /// - 源内容先整体导出为中间字节副本：源与目标允许是同一缓冲的重叠窗口。
    pub fn set_slice(&self, spec: &SliceSpec, src: &BufferView) -> Result<(), ViewError> {
        self.check_released()?;
        if self.readonly {
            return Err(ViewError::not_writable());
        }
        if self.ndim() != 1 {
            return Err(ViewError::new(
                ViewErrorKind::Unsupported,
                codes::SLICE_ASSIGN_DIM,
                "切片赋值仅支持一维视图",
            ));
        }
        src.check_released()?;
        let dest = self.get_slice(spec)?;
        let copied = copy_into_slice_view(&dest, src);
        let released = dest.release();
        copied?;
        released
    }

    /// 重解释转换：以新的元素格式（及可选的新形状）重新解释同一段字节。
    ///
    /// # 契约说明（What）
    /// - 源必须 C 连续；非字节格式之间的跨宽度转换被拒绝（至少一侧须为 `B`/`b`/`c`）；
    /// - 总字节数必须是新 `itemsize` 的整数倍；显式形状的元素数乘 `itemsize`
    ///   必须恰等于总字节数；维度变换仅允许 1 维→N 维或 N 维→1 维；
    /// - 源形状含零扩展度时（除一维平铺的恒等情形外）拒绝转换；
    /// - `shape = Some(&[])` 表示 0 维目标：要求总字节数恰为一个元素并置 `SCALAR`。
    pub fn cast(&self, format_code: char, shape: Option<&[usize]>) -> Result<BufferView, ViewError> {
        self.check_released()?;
        if !self.is_c_contiguous() {
            return Err(ViewError::cast("重解释转换仅支持 C 连续视图"));
        }
        let format = BufferFormat::from_code(format_code)?;
        let itemsize = format.itemsize();
        if !format.is_byte_sized() && !self.format.is_byte_sized() {
            return Err(ViewError::cast("非字节格式之间不允许跨宽度重解释"));
        }
        if self.length_bytes % itemsize != 0 {
            return Err(ViewError::cast("视图总字节数不是新元素宽度的整数倍"));
        }
        if (shape.is_some() || self.ndim() != 1) && self.shape.contains(&0) {
            return Err(ViewError::cast("形状或步长含零的视图不能转换"));
        }
        let new_shape: Vec<usize> = match shape {
            None => alloc::vec![self.length_bytes / itemsize],
            Some([]) => {
                if self.length_bytes != itemsize {
                    return Err(ViewError::cast("0 维目标要求总字节数恰为一个元素"));
                }
                Vec::new()
            }
            Some(requested) => {
                if requested.len() != 1 && self.ndim() != 1 {
                    return Err(ViewError::cast("维度变换仅允许 1 维到 N 维或 N 维到 1 维"));
                }
                if requested.len() > MAX_DIM {
                    return Err(ViewError::cast("目标维数超过上限"));
                }
                if requested.contains(&0) {
                    return Err(ViewError::cast("目标形状的每个扩展度必须为正整数"));
                }
                let elements: usize = requested.iter().product();
                if elements * itemsize != self.length_bytes {
                    return Err(ViewError::cast("目标形状与视图总字节数不匹配"));
                }
                requested.to_vec()
            }
        };
        let new_strides = layout::init_strides_from_shape(&new_shape, itemsize);
        self.derive(|mut parts| {
            parts.format = format;
            parts.shape = new_shape;
            parts.strides = new_strides;
            parts.suboffsets = None;
            Ok(parts)
        })
    }

    /// 派生只读视图：除 `readonly = true` 外逐字段相同。
    pub fn to_readonly(&self) -> Result<BufferView, ViewError> {
        self.derive(|mut parts| {
            parts.readonly = true;
            Ok(parts)
        })
    }
}

fn copy_into_slice_view(dest: &BufferView, src: &BufferView) -> Result<(), ViewError> {
    if src.ndim() != dest.ndim()
        || src.shape()[0] != dest.shape()[0]
        || src.format() != dest.format()
    {
        return Err(ViewError::structure_mismatch());
    }
    // 中间副本保证源与目标重叠时的写入正确性。
    let staged = src.to_bytes(ByteOrder::C)?;
    let itemsize = dest.itemsize();
    for i in 0..dest.shape()[0] {
        let item = dest.resolve(&ViewIndex::Scalar(i as i64))?;
        item.source
            .write_range(item.offset, &staged[i * itemsize..(i + 1) * itemsize])?;
    }
    Ok(())
}
