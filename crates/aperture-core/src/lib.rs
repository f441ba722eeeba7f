#![cfg_attr(not(feature = "std"), no_std)]
#![doc = "aperture-core: 多维步长缓冲视图引擎的核心契约与实现。"]
#![doc = ""]
#![doc = "本 Crate 对外提供四层能力："]
#![doc = "1. `BufferView`：覆盖在外部内存之上的只读/可写多维窗口（形状/步长/子偏移）。"]
#![doc = "2. `ManagedBuffer` 与导出计数：跨兄弟视图共享的释放契约，回调严格只触发一次。"]
#![doc = "3. 终结化兜底：视图被遗忘时经由进程级登记队列与后台清扫线程补偿释放。"]
#![doc = "4. 元素编解码与递归序列化：单字符格式码的小端打包/解包、C/Fortran 序字节导出。"]
#![doc = ""]
#![doc = "== 兼容性与版本治理 =="]
#![doc = "本 Crate 遵守语义化版本 2.0 (SemVer)；破坏性变更仅允许出现在 MAJOR 版本中，"]
#![doc = "契约行为的变更必须同步更新 `tests/contracts` 下的契约测试并确保全部通过。"]

extern crate alloc;

pub mod acquire;
pub mod error;
pub mod format;
pub mod index;
pub mod layout;
pub mod lifecycle;
pub mod observability;
#[cfg(feature = "std")]
pub mod registry;
mod sealed;
pub mod serialize;
pub mod slice;
pub mod source;
pub mod view;

pub use acquire::{AcquireFlags, BufferDescriptor, acquire, acquire_bytes};
pub use error::{ErrorCause, ViewError, ViewErrorKind, codes};
pub use format::{BufferFormat, PackedValue};
pub use index::{ResolvedItem, ViewIndex};
pub use layout::{MAX_DIM, ViewFlags, compute_flags, init_strides_from_shape};
pub use lifecycle::{FinalizationRecord, ManagedBuffer, ReleaseFn, SettleOutcome};
pub use observability::{LogSeverity, Logger, NoopLogger, logger, set_logger};
#[cfg(feature = "std")]
pub use registry::{FinalizationRegistry, RegistryStats, SweepConfig, configure};
pub use serialize::{ByteOrder, NestedList};
pub use slice::{SliceInfo, SliceSpec};
pub use source::{BufferSource, ByteStore, NativeRegion, OwnerHandle, VecStore};
pub use view::{BufferView, ViewExportGuard};

use alloc::boxed::Box;
use core::fmt;

/// 统一的 `Result` 别名，默认错误类型为 [`ViewError`]。
pub type Result<T, E = ViewError> = core::result::Result<T, E>;

/// 本 Crate 中所有错误必须实现的 `no_std` 基础 Trait。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 环境中不可用，因此需要一个对象安全、与平台无关的
///   错误抽象来串联底层错误链（例如字节源回收失败时附带的宿主错误）。
/// - 该 Trait 作为所有错误类型的“最小公共接口”，帮助引擎在 `alloc` 场景下完成跨模块错误传递。
///
/// # 逻辑解析（How）
/// - 约束实现者提供 `Debug` 与 `Display`，便于日志与可观测性收集。
/// - 通过 `source` 方法递归返回链路上的上游错误，保持与 `std::error::Error::source`
///   一致的语义，从而兼容现有生态的错误处理约定。
///
/// # 契约说明（What）
/// - **输入/前置条件**：实现类型必须是 `'static` 生命周期并可安全跨线程共享（若需包装进 [`ErrorCause`]）。
/// - **返回/后置条件**：`source` 返回的引用生命周期受限于 `self`，以防悬垂引用。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未引入 `Send + Sync` 约束，避免对 `no_std` 设备强加多余负担；需要线程安全时请使用
///   [`ErrorCause`] 类型别名。
/// - 若底层错误不提供 `source`，错误链会在此处终止，这是设计上允许的边界情况。
pub trait Error: fmt::Debug + fmt::Display {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}
