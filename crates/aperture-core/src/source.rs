//! 字节源契约：视图所覆盖内存的真正拥有者。
//!
//! # 模块架构（Why）
//! - 视图引擎自身不拥有内存，所有字节级读写都委托给外部协作者完成；
//!   本模块定义该协作边界，并将“原生指针”与“托管容器”两类后端收敛为一个二元标签联合。
//! - 间接缓冲（“行指针数组”式布局）要求按维做一次额外指针跳转，
//!   该能力同样归属字节源：只有源知道指针槽里的内容指向何处。
//!
//! # 设计总览（How）
//! - [`ByteStore`] 是对象安全的托管源契约（读区间/写区间/间接解引用）。
//! - [`NativeRegion`] 以裸指针+长度描述外部原生内存，构造函数 `unsafe`，
//!   之后所有访问都经边界检查。
//! - [`BufferSource`] 以 `match` 静态分发两类后端，克隆代价为一次 `Arc` 计数或指针拷贝。

use crate::{
    error::{ViewError, ViewErrorKind, codes},
    sealed::Sealed,
};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

/// 供给内存的宿主对象句柄：视图释放时清空，属性 `obj` 原样返回。
pub type OwnerHandle = Arc<dyn Any + Send + Sync>;

/// `ByteStore` 定义对象安全的托管字节源契约。
///
/// # 设计背景（Why）
/// - 可增长数组、文件映射、外部运行时托管内存等后端的差异必须被隔离在视图引擎之外；
///   引擎只依赖“按偏移读写一段字节”的最小能力。
/// - 视图可跨线程共享，因此读写方法取 `&self`：实现者自行决定内部同步策略。
///
/// # 契约说明（What）
/// - **输入参数**：`offset + dst.len()`（或 `src.len()`）不得超过 `len()`，
///   越界必须返回 `source.out_of_range` 而非截断。
/// - **前置条件**：实现必须 `Send + Sync`；对只读源的 `write_range` 必须失败。
/// - **后置条件**：`read_range` 成功后 `dst` 被完整填充；`write_range` 成功后
///   写入立即对后续读取可见。
/// - **并发边界**：引擎不对同一源上的不相交区间写入做内部同步，该责任归实现者。
///
/// # 风险提示（Trade-offs）
/// - 契约刻意不提供“返回内部切片”的零拷贝接口：托管源的存储可能随时搬移，
///   以复制换取生命周期安全。
pub trait ByteStore: Send + Sync + 'static + Sealed {
    /// 源的总字节长度。
    fn len(&self) -> usize;

    /// 源是否为空。
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 源是否只读。
    fn is_readonly(&self) -> bool;

    /// 从 `offset` 起读取 `dst.len()` 个字节。
    fn read_range(&self, offset: usize, dst: &mut [u8]) -> Result<(), ViewError>;

    /// 从 `offset` 起写入 `src` 的全部字节。
    fn write_range(&self, offset: usize, src: &[u8]) -> Result<(), ViewError>;

    /// 间接解引用：以当前偏移定位指针槽，再叠加 `suboffset` 得到新的字节源。
    ///
    /// 仅“行指针数组”式的间接源需要实现；平坦源保留默认实现即可。
    fn dereference(
        &self,
        offset: usize,
        suboffset: usize,
    ) -> Result<Arc<dyn ByteStore>, ViewError> {
        let _ = (offset, suboffset);
        Err(ViewError::new(
            ViewErrorKind::Unsupported,
            codes::SOURCE_NO_INDIRECTION,
            "该字节源不支持子偏移间接寻址",
        ))
    }
}

/// 外部原生内存区段：裸指针 + 长度 + 只读标记。
///
/// # 契约说明（What）
/// - **构造前置条件**（`unsafe` 的全部理由）：`ptr` 在区段存续期内有效、
///   至少覆盖 `len` 字节，且在只读标记为假时允许写入；
///   调用方必须保证该内存的生命周期长于使用它的全部视图。
/// - **后置条件**：构造之后的所有读写都经过边界检查，越界返回 `source.out_of_range`。
///
/// # 风险提示（Trade-offs）
/// - 本类型自身不参与释放协议：原生内存的回收由获取时登记的释放回调完成。
#[derive(Debug, Clone, Copy)]
pub struct NativeRegion {
    ptr: *mut u8,
    len: usize,
    readonly: bool,
}

// 指针仅在边界检查后按字节复制访问，跨线程安全性由构造前置条件保证。
unsafe impl Send for NativeRegion {}
unsafe impl Sync for NativeRegion {}

impl NativeRegion {
    /// 包装一段外部原生内存。
    ///
    /// # Safety
    /// 调用方必须保证 `ptr` 指向至少 `len` 字节的有效内存、生命周期覆盖所有
    /// 派生视图，且 `readonly == false` 时该内存允许写入。
    pub unsafe fn new(ptr: *mut u8, len: usize, readonly: bool) -> Self {
        Self { ptr, len, readonly }
    }

    /// 区段长度。
    pub fn len(&self) -> usize {
        self.len
    }

    /// 区段是否为空。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 区段是否只读。
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn check_range(&self, offset: isize, len: usize) -> Result<usize, ViewError> {
        let start = usize::try_from(offset)
            .map_err(|_| ViewError::source_range(offset, len, self.len))?;
        if start.checked_add(len).is_none_or(|end| end > self.len) {
            return Err(ViewError::source_range(offset, len, self.len));
        }
        Ok(start)
    }

    fn read(&self, offset: isize, dst: &mut [u8]) -> Result<(), ViewError> {
        let start = self.check_range(offset, dst.len())?;
        // SAFETY: 构造前置条件保证 [ptr, ptr+len) 有效，上方已做边界检查。
        unsafe {
            core::ptr::copy_nonoverlapping(self.ptr.add(start), dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn write(&self, offset: isize, src: &[u8]) -> Result<(), ViewError> {
        if self.readonly {
            return Err(ViewError::not_writable());
        }
        let start = self.check_range(offset, src.len())?;
        // SAFETY: 同 `read`，且只读分支已被拒绝。
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(start), src.len());
        }
        Ok(())
    }

    fn deref_pointer(&self, offset: isize, suboffset: isize, len_hint: usize) -> Result<Self, ViewError> {
        let slot = self.check_range(offset, core::mem::size_of::<usize>())?;
        let mut raw = [0u8; core::mem::size_of::<usize>()];
        // SAFETY: 指针槽区间已做边界检查。
        unsafe {
            core::ptr::copy_nonoverlapping(self.ptr.add(slot), raw.as_mut_ptr(), raw.len());
        }
        let base = usize::from_le_bytes(raw);
        let target = (base as isize + suboffset) as usize;
        Ok(Self {
            ptr: target as *mut u8,
            len: len_hint,
            readonly: self.readonly,
        })
    }
}

/// 视图背后的字节源：原生区段或托管容器的二元标签联合。
///
/// # 设计背景（Why）
/// - 两类后端的访问路径差异（裸指针复制 vs 契约方法调用）用 `match` 静态分发，
///   替代按节点特化的动态派发层级；引擎其余部分对后端种类保持无感。
///
/// # 契约说明（What）
/// - 克隆语义：`Native` 按位拷贝描述符，`Managed` 递增 `Arc` 计数；
///   两者都不复制底层内存。
/// - 偏移参数取 `isize`：负步长切片会产生负的中间偏移，最终绝对偏移必须非负，
///   否则报 `source.out_of_range`。
#[derive(Clone)]
pub enum BufferSource {
    /// 外部原生内存。
    Native(NativeRegion),
    /// 托管容器。
    Managed(Arc<dyn ByteStore>),
}

impl BufferSource {
    /// 源的总字节长度。
    pub fn len(&self) -> usize {
        match self {
            BufferSource::Native(region) => region.len(),
            BufferSource::Managed(store) => store.len(),
        }
    }

    /// 源是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 源是否只读。
    pub fn is_readonly(&self) -> bool {
        match self {
            BufferSource::Native(region) => region.is_readonly(),
            BufferSource::Managed(store) => store.is_readonly(),
        }
    }

    /// 从 `offset` 起读取 `dst.len()` 个字节。
    pub fn read_range(&self, offset: isize, dst: &mut [u8]) -> Result<(), ViewError> {
        match self {
            BufferSource::Native(region) => region.read(offset, dst),
            BufferSource::Managed(store) => {
                let start = usize::try_from(offset)
                    .map_err(|_| ViewError::source_range(offset, dst.len(), store.len()))?;
                store.read_range(start, dst)
            }
        }
    }

    /// 从 `offset` 起写入 `src` 的全部字节。
    pub fn write_range(&self, offset: isize, src: &[u8]) -> Result<(), ViewError> {
        match self {
            BufferSource::Native(region) => region.write(offset, src),
            BufferSource::Managed(store) => {
                let start = usize::try_from(offset)
                    .map_err(|_| ViewError::source_range(offset, src.len(), store.len()))?;
                store.write_range(start, src)
            }
        }
    }

    /// 按维执行一次间接解引用，返回新的字节源；`len_hint` 为新区段的长度上界。
    pub fn dereference(
        &self,
        offset: isize,
        suboffset: isize,
        len_hint: usize,
    ) -> Result<BufferSource, ViewError> {
        match self {
            BufferSource::Native(region) => region
                .deref_pointer(offset, suboffset, len_hint)
                .map(BufferSource::Native),
            BufferSource::Managed(store) => {
                let start = usize::try_from(offset)
                    .map_err(|_| ViewError::source_range(offset, 0, store.len()))?;
                let sub = usize::try_from(suboffset)
                    .map_err(|_| ViewError::source_range(suboffset, 0, store.len()))?;
                store.dereference(start, sub).map(BufferSource::Managed)
            }
        }
    }
}

impl core::fmt::Debug for BufferSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BufferSource::Native(region) => f
                .debug_struct("Native")
                .field("len", &region.len())
                .field("readonly", &region.is_readonly())
                .finish(),
            BufferSource::Managed(store) => f
                .debug_struct("Managed")
                .field("len", &store.len())
                .field("readonly", &store.is_readonly())
                .finish(),
        }
    }
}

/// 堆上 `Vec<u8>` 后端的托管字节源，测试、基准与轻量调用方的默认实现。
///
/// # 逻辑解析（How）
/// - 内部以读写锁保护存储：视图层的并发读取只需共享锁，写入取独占锁。
/// - 只读实例在构造时固定；运行期不提供只读位翻转，派生只读视图由视图层完成。
#[derive(Debug)]
pub struct VecStore {
    bytes: spin::RwLock<Vec<u8>>,
    readonly: bool,
}

impl VecStore {
    /// 以可写模式包装一段堆内存。
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: spin::RwLock::new(bytes),
            readonly: false,
        }
    }

    /// 以只读模式包装一段堆内存。
    pub fn readonly(bytes: Vec<u8>) -> Self {
        Self {
            bytes: spin::RwLock::new(bytes),
            readonly: true,
        }
    }

    /// 复制出当前全部字节，供断言与调试使用。
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl ByteStore for VecStore {
    fn len(&self) -> usize {
        self.bytes.read().len()
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn read_range(&self, offset: usize, dst: &mut [u8]) -> Result<(), ViewError> {
        let bytes = self.bytes.read();
        let end = offset
            .checked_add(dst.len())
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| ViewError::source_range(offset as isize, dst.len(), bytes.len()))?;
        dst.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    fn write_range(&self, offset: usize, src: &[u8]) -> Result<(), ViewError> {
        if self.readonly {
            return Err(ViewError::not_writable());
        }
        let mut bytes = self.bytes.write();
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| ViewError::source_range(offset as isize, src.len(), bytes.len()))?;
        bytes[offset..end].copy_from_slice(src);
        Ok(())
    }
}
