//! 终结化安全网：进程级登记队列与后台清扫线程。
//!
//! # 模块架构（Why）
//! - 调用方可能单纯忘记调用 `release`：视图析构而未释放时，其配对记录被移交到
//!   本模块的登记队列，由后台清扫线程补偿结算共享导出计数——缓冲最终一定被释放，
//!   且与显式释放共用同一条一次性闸门，不存在二次回收。
//! - 本安全网只负责释放路径，不做任何错误抑制：清扫中释放回调的失败经
//!   [`Logger`](crate::observability::Logger) 外观上报，同步排空接口则把失败
//!   原样抛给调用方。
//!
//! # 设计总览（How）
//! - 进程级单例按需初始化（首次使用时），清扫线程在首条记录入队时惰性启动；
//! - [`drain_pending`](FinalizationRegistry::drain_pending) 是显式的排空/停机步骤：
//!   同步结算全部积压记录，适合测试与受控停机场景。

use crate::{
    error::ViewError,
    lifecycle::{FinalizationRecord, SettleOutcome},
    observability,
};
use alloc::sync::Arc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};

/// 清扫线程配置。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SweepConfig {
    /// 每次持锁批量取出的记录数上限。
    pub drain_batch: usize,
    /// 清扫线程名称。
    pub thread_name: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            drain_batch: 32,
            thread_name: String::from("aperture-sweep"),
        }
    }
}

/// 登记队列的累计统计快照。
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegistryStats {
    /// 累计入队的记录数。
    pub enqueued: u64,
    /// 累计完成结算的记录数（含显式释放抢先完成的空结算）。
    pub drained: u64,
    /// 清扫路径触发释放回调的次数。
    pub callbacks_fired: u64,
    /// 释放回调执行失败的次数。
    pub callback_failures: u64,
    /// 当前仍在队列中等待的记录数。
    pub pending: usize,
}

/// 进程级终结化登记队列。
///
/// # 契约说明（What）
/// - **不变量**：每条记录至多被结算一次；清扫与显式释放的竞争由记录自身的
///   一次性闸门收敛，本队列不提供额外互斥。
/// - **后置条件**：入队的记录最终必然被结算——由后台线程异步完成，
///   或由 [`drain_pending`](Self::drain_pending) 同步完成。
pub struct FinalizationRegistry {
    config: SweepConfig,
    queue: Mutex<VecDeque<Arc<FinalizationRecord>>>,
    wakeup: Condvar,
    sweeper_started: AtomicBool,
    enqueued: AtomicU64,
    drained: AtomicU64,
    callbacks_fired: AtomicU64,
    callback_failures: AtomicU64,
}

static GLOBAL: OnceLock<FinalizationRegistry> = OnceLock::new();

/// 在首次使用之前注入自定义配置；已初始化时返回 `false` 且不产生影响。
pub fn configure(config: SweepConfig) -> bool {
    GLOBAL.set(FinalizationRegistry::new(config)).is_ok()
}

/// 获取进程级登记队列（按需以默认配置初始化）。
pub fn global() -> &'static FinalizationRegistry {
    GLOBAL.get_or_init(|| FinalizationRegistry::new(SweepConfig::default()))
}

impl FinalizationRegistry {
    fn new(config: SweepConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
            sweeper_started: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            callbacks_fired: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
        }
    }

    /// 登记一条待补偿的记录（视图析构路径调用）。
    pub(crate) fn enqueue(&'static self, record: Arc<FinalizationRecord>) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.push_back(record);
        }
        self.enqueued.fetch_add(1, Ordering::AcqRel);
        self.ensure_sweeper();
        self.wakeup.notify_one();
    }

    /// 同步排空当前积压：返回本次结算的记录数，首个回调失败原样上抛。
    ///
    /// 即便中途出现失败，剩余记录仍会继续结算完毕——释放不能因个别宿主故障而搁置。
    pub fn drain_pending(&self) -> Result<usize, ViewError> {
        let pending: Vec<Arc<FinalizationRecord>> = {
            let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.drain(..).collect()
        };
        let mut settled = 0usize;
        let mut first_failure = None;
        for record in pending {
            match self.settle_record(&record) {
                Ok(()) => settled += 1,
                Err(err) => {
                    settled += 1;
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(settled),
        }
    }

    /// 当前统计快照。
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            enqueued: self.enqueued.load(Ordering::Acquire),
            drained: self.drained.load(Ordering::Acquire),
            callbacks_fired: self.callbacks_fired.load(Ordering::Acquire),
            callback_failures: self.callback_failures.load(Ordering::Acquire),
            pending: self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len(),
        }
    }

    fn settle_record(&self, record: &FinalizationRecord) -> Result<(), ViewError> {
        let outcome = record.settle();
        self.drained.fetch_add(1, Ordering::AcqRel);
        match outcome {
            Ok(SettleOutcome::Released) => {
                self.callbacks_fired.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                self.callback_failures.fetch_add(1, Ordering::AcqRel);
                Err(err)
            }
        }
    }

    fn ensure_sweeper(&'static self) {
        if self.sweeper_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let spawned = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || self.sweep_loop());
        if spawned.is_err() {
            // 线程启动失败时回退标记，下一次入队重试；积压仍可经 drain_pending 排空。
            self.sweeper_started.store(false, Ordering::Release);
            observability::logger().warn("终结化清扫线程启动失败", None);
        }
    }

    fn sweep_loop(&self) {
        loop {
            let batch = self.wait_batch();
            for record in batch {
                if let Err(err) = self.settle_record(&record) {
                    observability::logger().error("终结化清扫中释放回调失败", Some(&err));
                }
            }
        }
    }

    fn wait_batch(&self) -> Vec<Arc<FinalizationRecord>> {
        let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if !queue.is_empty() {
                let take = self.config.drain_batch.min(queue.len());
                return queue.drain(..take).collect();
            }
            queue = self
                .wakeup
                .wait(queue)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}
