//! `BufferView`：覆盖在外部内存之上的多维只读/可写窗口。
//!
//! # 模块架构（Why）
//! - 视图是纯描述符：形状、步长、子偏移与基偏移共同决定元素寻址，字节本体始终
//!   留在字节源一侧。除释放位、绑定清空与哈希缓存外，视图构造后不再变更，
//!   因此兄弟视图间的并发读取无需加锁。
//! - 释放协议与终结化兜底的对接点在本模块：显式 `release` 走前台路径，
//!   析构而未释放的视图把配对记录移交终结化登记队列（`std`）或就地补偿（`no_std`）。
//!
//! # 设计总览（How）
//! - 绑定（宿主句柄 + 字节源）放入读写锁保护的 `Option`：释放时一次性清空，
//!   读路径只持共享锁克隆出字节源句柄。
//! - 几何属性（形状/步长/维数等）不检查释放状态——它们不触碰内存；
//!   一切字节访问路径在进入前必须通过 `check_released`。

use crate::{
    error::ViewError,
    format::BufferFormat,
    layout::{self, ViewFlags},
    lifecycle::{FinalizationRecord, ManagedBuffer},
    source::{BufferSource, OwnerHandle},
};
use alloc::{sync::Arc, vec::Vec};
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// 视图与供给方之间的绑定：释放时整体清空。
pub(crate) struct ViewBinding {
    pub(crate) owner: Option<OwnerHandle>,
    pub(crate) source: BufferSource,
}

/// 构造视图所需的全部描述信息（crate 内部使用）。
pub(crate) struct ViewParts {
    pub(crate) owner: Option<OwnerHandle>,
    pub(crate) source: BufferSource,
    pub(crate) managed: Option<Arc<ManagedBuffer>>,
    pub(crate) length_bytes: usize,
    pub(crate) readonly: bool,
    pub(crate) format: BufferFormat,
    pub(crate) offset: isize,
    pub(crate) shape: Vec<usize>,
    pub(crate) strides: Vec<isize>,
    pub(crate) suboffsets: Option<Vec<isize>>,
}

/// 多维步长缓冲视图。
///
/// # 契约说明（What）
/// - **不变量**：`byte_offset(indices) = offset + Σ indices[i] * strides[i]`，
///   自左向右求值；若第 `i` 维存在非负子偏移，则在该维累加完成后立即经字节源
///   做一次间接解引用并把游标偏移清零。
/// - **生命周期**：视图恰好在一次“获取”中诞生（派生视图同样算一次新的获取登记），
///   逻辑销毁由 [`release`](Self::release) 完成；物理析构若发生在释放之前，
///   终结化兜底负责补偿共享计数。
/// - **可变性**：构造后仅 `released` 位、绑定清空与哈希缓存三处可变。
pub struct BufferView {
    binding: spin::RwLock<Option<ViewBinding>>,
    record: Option<Arc<FinalizationRecord>>,
    pub(crate) length_bytes: usize,
    pub(crate) itemsize: usize,
    pub(crate) readonly: bool,
    pub(crate) format: BufferFormat,
    pub(crate) offset: isize,
    pub(crate) shape: Vec<usize>,
    pub(crate) strides: Vec<isize>,
    pub(crate) suboffsets: Option<Vec<isize>>,
    flags: ViewFlags,
    released: AtomicBool,
    view_exports: AtomicUsize,
    cached_hash: AtomicI64,
}

impl BufferView {
    /// 由完整描述构造视图：连续性标志在此一次性计算，之后不再变更。
    ///
    /// 若描述携带 [`ManagedBuffer`]，则同时在其上登记一个导出并生成配对的
    /// 终结化记录——这是共享计数唯一的增长入口。
    pub(crate) fn build(parts: ViewParts) -> BufferView {
        let flags = layout::compute_flags(
            parts.format.itemsize(),
            &parts.shape,
            &parts.strides,
            parts.suboffsets.as_deref(),
        );
        let record = parts.managed.map(FinalizationRecord::register);
        BufferView {
            binding: spin::RwLock::new(Some(ViewBinding {
                owner: parts.owner,
                source: parts.source,
            })),
            record,
            length_bytes: parts.length_bytes,
            itemsize: parts.format.itemsize(),
            readonly: parts.readonly,
            format: parts.format,
            offset: parts.offset,
            shape: parts.shape,
            strides: parts.strides,
            suboffsets: parts.suboffsets,
            flags,
            released: AtomicBool::new(false),
            view_exports: AtomicUsize::new(0),
            cached_hash: AtomicI64::new(-1),
        }
    }

    /// 以当前视图为模板派生兄弟视图：共享宿主句柄、字节源与释放契约。
    pub(crate) fn derive(
        &self,
        rewrite: impl FnOnce(ViewParts) -> Result<ViewParts, ViewError>,
    ) -> Result<BufferView, ViewError> {
        self.check_released()?;
        let guard = self.binding.read();
        let binding = guard.as_ref().ok_or_else(ViewError::released)?;
        let parts = ViewParts {
            owner: binding.owner.clone(),
            source: binding.source.clone(),
            managed: self
                .record
                .as_ref()
                .map(|record| Arc::clone(record.managed())),
            length_bytes: self.length_bytes,
            readonly: self.readonly,
            format: self.format,
            offset: self.offset,
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            suboffsets: self.suboffsets.clone(),
        };
        Ok(Self::build(rewrite(parts)?))
    }

    /// 释放位检查：一切字节访问路径的守门人。
    pub(crate) fn check_released(&self) -> Result<(), ViewError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ViewError::released());
        }
        Ok(())
    }

    /// 克隆出当前绑定的字节源句柄。
    pub(crate) fn source(&self) -> Result<BufferSource, ViewError> {
        self.check_released()?;
        let guard = self.binding.read();
        guard
            .as_ref()
            .map(|binding| binding.source.clone())
            .ok_or_else(ViewError::released)
    }

    pub(crate) fn load_cached_hash(&self) -> i64 {
        self.cached_hash.load(Ordering::Acquire)
    }

    pub(crate) fn store_cached_hash(&self, hash: i64) {
        self.cached_hash.store(hash, Ordering::Release);
    }

    /// 显式释放：对共享契约结算本视图的导出，最后一个归零者触发释放回调。
    ///
    /// # 契约说明（What）
    /// - 重复释放报 `view.double_release`——静默幂等会掩盖调用方的记账错误；
    /// - 视图自身仍有未归还导出（见 [`export_guard`](Self::export_guard)）时报
    ///   `lifecycle.exports_outstanding`；
    /// - 释放成功后绑定被清空，`obj()` 返回 `None`，任何字节访问报 `view.released`；
    /// - 释放回调失败时错误原样上抛，但视图仍进入已释放状态（计数已递减，
    ///   不存在可安全重试的中间态）。
    pub fn release(&self) -> Result<(), ViewError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ViewError::double_release());
        }
        let outstanding = self.view_exports.load(Ordering::Acquire);
        if outstanding != 0 {
            return Err(ViewError::exports_outstanding(outstanding));
        }
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(ViewError::double_release());
        }
        let settled = match &self.record {
            Some(record) => record.settle().map(|_| ()),
            None => Ok(()),
        };
        *self.binding.write() = None;
        settled
    }

    /// 视图是否已释放。
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// 为下游消费者登记一次视图级导出，返回 RAII 守卫；守卫存续期间禁止释放。
    pub fn export_guard(&self) -> Result<ViewExportGuard<'_>, ViewError> {
        self.check_released()?;
        self.view_exports.fetch_add(1, Ordering::AcqRel);
        Ok(ViewExportGuard {
            counter: &self.view_exports,
        })
    }

    /// 视图自身未归还的导出数量。
    pub fn outstanding_exports(&self) -> usize {
        self.view_exports.load(Ordering::Acquire)
    }

    /// 共享释放契约上的导出总数（无契约时为 `None`），供测试与诊断观测。
    pub fn shared_exports(&self) -> Option<usize> {
        self.record
            .as_ref()
            .map(|record| record.managed().exports())
    }

    /// 视图窗口的总字节数。
    pub fn nbytes(&self) -> usize {
        self.length_bytes
    }

    /// 单元素字节宽度。
    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    /// 元素格式。
    pub fn format(&self) -> BufferFormat {
        self.format
    }

    /// 维数。
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// 各维扩展度。
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// 各维步长（字节）。
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// 各维子偏移；非间接视图返回 `None`。
    pub fn suboffsets(&self) -> Option<&[isize]> {
        self.suboffsets.as_deref()
    }

    /// 视图是否只读。
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// 是否行主序连续。
    pub fn is_c_contiguous(&self) -> bool {
        self.flags.contains(ViewFlags::C_CONTIGUOUS)
    }

    /// 是否列主序连续。
    pub fn is_fortran_contiguous(&self) -> bool {
        self.flags.contains(ViewFlags::F_CONTIGUOUS)
    }

    /// 是否任一方向连续。
    pub fn is_contiguous(&self) -> bool {
        self.is_c_contiguous() || self.is_fortran_contiguous()
    }

    /// 当前标志位集；已释放视图会合成 `RELEASED` 位。
    pub fn flags(&self) -> ViewFlags {
        if self.is_released() {
            self.flags.union(ViewFlags::RELEASED)
        } else {
            self.flags
        }
    }

    /// 供给内存的宿主对象句柄；释放后返回 `None`。
    pub fn obj(&self) -> Option<OwnerHandle> {
        self.binding
            .read()
            .as_ref()
            .and_then(|binding| binding.owner.clone())
    }

    /// 首维长度；0 维视图按单元素序列处理返回 1。
    pub fn len(&self) -> usize {
        if self.shape.is_empty() {
            1
        } else {
            self.shape[0]
        }
    }

    /// 首维是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for BufferView {
    fn drop(&mut self) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let Some(record) = self.record.take() else {
            return;
        };
        if record.is_released() {
            return;
        }
        // 视图被遗忘而未显式释放：std 下移交后台清扫补偿，no_std 下就地结算。
        #[cfg(feature = "std")]
        crate::registry::global().enqueue(record);
        #[cfg(not(feature = "std"))]
        if let Err(err) = record.settle() {
            crate::observability::logger().error("视图析构补偿释放失败", Some(&err));
        }
    }
}

impl fmt::Debug for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_released() {
            return f.write_str("<released memory view>");
        }
        f.debug_struct("BufferView")
            .field("format", &self.format)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("suboffsets", &self.suboffsets)
            .field("offset", &self.offset)
            .field("length_bytes", &self.length_bytes)
            .field("readonly", &self.readonly)
            .field("flags", &self.flags)
            .finish()
    }
}

impl fmt::Display for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_released() {
            return f.write_str("<released memory view>");
        }
        write!(
            f,
            "<memory view format='{}' shape={:?} readonly={}>",
            self.format, self.shape, self.readonly
        )
    }
}

/// 视图级导出的 RAII 守卫：构造时计数加一，析构时归还。
///
/// # 契约说明（What）
/// - 守卫存续期间 [`BufferView::release`] 报 `lifecycle.exports_outstanding`；
///   守卫析构后方可释放。
/// - 守卫不延长视图生命周期，仅表达“缓冲协议消费者仍持有本视图”的事实。
pub struct ViewExportGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for ViewExportGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
