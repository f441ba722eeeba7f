//! 共享释放契约：导出计数、释放回调与一次性终结化记录。
//!
//! # 模块架构（Why）
//! - 同一次缓冲获取可以派生出多个兄弟视图（切片、转换、只读化），它们必须共享
//!   一个释放契约：任何一个视图的释放只递减共享计数，最后一个归零者触发回调。
//! - 显式释放与后台清扫是两条并发路径，回调“恰好一次”的保证必须建立在单一的
//!   原子递减判零点之上，而不是依赖调用方自律。
//!
//! # 设计总览（How）
//! - [`ManagedBuffer`]：回调槽（互斥保护的 `Option`，触发时取走）+ 共享导出计数。
//! - [`FinalizationRecord`]：每视图一条，`released` 一次性标记保证同一视图的
//!   显式释放与清扫补偿不会重复递减。
//! - 计数递减采用比较交换循环：递减前显式判零，任何下溢以 `lifecycle.exports_underflow`
//!   上报而不是环绕，使“计数永不为负”成为可观测性质。

use crate::error::{ViewError, ViewErrorKind, codes};
use alloc::{boxed::Box, sync::Arc};
use core::fmt;

//
// 教案级说明：启用 `--cfg loom` 时切换到 Loom 的原子类型，让模型检查器穷举
// 显式释放与清扫补偿的全部调度交错；`Arc` 与自旋互斥保持真实实现——回调槽
// 只会被唯一的归零胜者锁定，不存在竞争路径。
#[cfg(not(any(loom, aperture_loom)))]
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
#[cfg(any(loom, aperture_loom))]
use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 释放回调：在最后一个导出归还时执行宿主侧的真实回收。
///
/// 回调允许阻塞（由调用线程或清扫线程承担），失败时错误沿释放路径向外传播。
pub type ReleaseFn = Box<dyn FnOnce() -> Result<(), ViewError> + Send + 'static>;

/// 一次导出归还的结算结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// 该记录此前已结算过，本次为无操作（并发补偿路径的正常分支）。
    AlreadyReleased,
    /// 共享计数递减但未归零，回调未触发。
    Decremented,
    /// 本次递减使计数归零，释放回调（若有）已执行。
    Released,
}

/// `ManagedBuffer` 是一次缓冲获取的共享释放契约。
///
/// # 设计背景（Why）
/// - 只有需要真实回收动作的源才会产生本对象；纯托管、随宿主生命周期回收的源
///   返回 `None`，视图便不参与导出记账。
/// - 派生视图**不会**创建新的 `ManagedBuffer`：它们经 [`FinalizationRecord::register`]
///   在同一契约上登记新导出，因此任何单个视图的释放都不可能提前触发回收。
///
/// # 契约说明（What）
/// - **不变量**：`exports` 等于尚未结算的兄弟视图数量；回调至多执行一次。
/// - **前置条件**：每次 [`FinalizationRecord::register`] 对应且仅对应一个视图。
/// - **后置条件**：`settle_export` 返回 [`SettleOutcome::Released`] 当且仅当本次
///   调用将计数从 1 递减到 0；此时回调已被取走并执行完毕。
///
/// # 设计取舍与风险（Trade-offs）
/// - 回调以 `FnOnce` 装箱存放：取走即消费，类型系统层面杜绝二次调用。
/// - 回调在持有计数归零事实之后、不持任何锁的情况下执行（互斥锁仅保护取走动作），
///   阻塞回调不会阻塞其他缓冲的记账。
pub struct ManagedBuffer {
    callback: spin::Mutex<Option<ReleaseFn>>,
    exports: AtomicUsize,
}

impl ManagedBuffer {
    /// 创建新的释放契约；`callback` 为 `None` 时归零仅做记账。
    pub fn new(callback: Option<ReleaseFn>) -> Arc<Self> {
        Arc::new(Self {
            callback: spin::Mutex::new(callback),
            exports: AtomicUsize::new(0),
        })
    }

    /// 登记一个新的导出（新视图构造时调用）。
    pub fn register_export(&self) {
        self.exports.fetch_add(1, Ordering::AcqRel);
    }

    /// 当前未结算的导出数量，供测试与诊断观测。
    pub fn exports(&self) -> usize {
        self.exports.load(Ordering::Acquire)
    }

    /// 结算一个导出：原子递减判零，归零者执行回调。
    ///
    /// # 契约说明（What）
    /// - **后置条件**：无论调用来自显式释放还是后台清扫，同一契约的回调至多执行一次；
    ///   回调失败以 `lifecycle.release_failed` 包装上抛，计数递减不回滚。
    pub fn settle_export(&self) -> Result<SettleOutcome, ViewError> {
        let mut current = self.exports.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(ViewError::exports_underflow());
            }
            match self.exports.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        if current != 1 {
            return Ok(SettleOutcome::Decremented);
        }
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback().map_err(|err| {
                ViewError::new(
                    ViewErrorKind::Lifecycle,
                    codes::LIFECYCLE_RELEASE_FAILED,
                    "释放回调执行失败",
                )
                .with_cause(err)
            })?;
        }
        Ok(SettleOutcome::Released)
    }
}

impl fmt::Debug for ManagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBuffer")
            .field("exports", &self.exports())
            .finish_non_exhaustive()
    }
}

/// `FinalizationRecord` 把单个视图的身份与其共享释放契约配对。
///
/// # 设计背景（Why）
/// - 视图可能被调用方遗忘而未显式释放；此时析构路径把记录移交给终结化登记队列，
///   由后台清扫补偿结算。显式释放与清扫补偿都必须经过同一条一次性闸门，
///   否则同一视图会被重复记账进而引发提前回收。
///
/// # 契约说明（What）
/// - **不变量**：`released` 从假翻真至多一次；翻转的胜者独占一次共享计数递减权。
/// - **后置条件**：[`settle`](Self::settle) 返回 [`SettleOutcome::AlreadyReleased`]
///   表示另一条路径已经完成结算，本次调用没有任何副作用。
pub struct FinalizationRecord {
    managed: Arc<ManagedBuffer>,
    released: AtomicBool,
}

impl FinalizationRecord {
    /// 在共享契约上登记一个新导出并生成配对记录（视图构造时调用）。
    pub fn register(managed: Arc<ManagedBuffer>) -> Arc<Self> {
        managed.register_export();
        Arc::new(Self {
            managed,
            released: AtomicBool::new(false),
        })
    }

    /// 该记录是否已结算。
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// 访问共享释放契约。
    pub fn managed(&self) -> &Arc<ManagedBuffer> {
        &self.managed
    }

    /// 结算本记录：一次性闸门 + 共享计数递减判零。
    pub fn settle(&self) -> Result<SettleOutcome, ViewError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(SettleOutcome::AlreadyReleased);
        }
        self.managed.settle_export()
    }
}

impl fmt::Debug for FinalizationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizationRecord")
            .field("released", &self.is_released())
            .field("managed", &self.managed)
            .finish()
    }
}
