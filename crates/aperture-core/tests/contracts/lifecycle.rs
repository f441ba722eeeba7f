//! 释放协议与终结化兜底的契约测试。
//!
//! # 测试目标（Why）
//! - 共享导出计数是释放协议唯一的同步点：兄弟视图逐个释放时，回调必须且只能
//!   在最后一个导出归还时触发一次；
//! - 显式释放之外的一切路径（视图析构、后台清扫、同步排空）都必须收敛到同一条
//!   一次性闸门，不存在重复回收或计数为负的观测窗口。

use aperture_core::{
    AcquireFlags, BufferDescriptor, BufferSource, ByteOrder, VecStore, ViewError, ViewErrorKind,
    acquire, acquire_bytes, codes,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// 构造带计数释放回调的一维字节视图。
fn view_with_release_counter(
    bytes: Vec<u8>,
) -> (aperture_core::BufferView, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let callback_hits = Arc::clone(&hits);
    let store = Arc::new(VecStore::new(bytes));
    let descriptor = BufferDescriptor::new(BufferSource::Managed(store), false)
        .with_release(Box::new(move || {
            callback_hits.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }));
    let view = acquire(descriptor, AcquireFlags::FULL).expect("获取视图不应失败");
    (view, hits)
}

/// 验证两兄弟视图共享一个释放契约：先释放者只递减计数，后释放者触发回调。
///
/// # 测试步骤（How）
/// 1. 一次获取产生首个视图（共享计数 1），再派生只读兄弟（共享计数 2）；
/// 2. 释放兄弟视图：回调不得触发，计数降为 1；
/// 3. 释放原视图：回调恰好触发一次，计数归零。
#[test]
fn sibling_release_fires_callback_exactly_once() {
    let (view, hits) = view_with_release_counter(vec![0u8; 16]);
    let sibling = view.to_readonly().expect("派生只读兄弟视图");
    assert_eq!(view.shared_exports(), Some(2), "派生视图必须登记在同一契约上");

    sibling.release().expect("释放兄弟视图");
    assert_eq!(hits.load(Ordering::Acquire), 0, "计数未归零前回调不得触发");
    assert_eq!(view.shared_exports(), Some(1));

    view.release().expect("释放最后一个视图");
    assert_eq!(hits.load(Ordering::Acquire), 1, "回调必须恰好触发一次");
}

/// 重复释放必须显式报错，而不是静默幂等。
#[test]
fn double_release_is_reported() {
    let (view, _hits) = view_with_release_counter(vec![0u8; 4]);
    view.release().expect("首次释放");
    let err = view.release().expect_err("重复释放必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Released);
    assert_eq!(err.code(), codes::VIEW_DOUBLE_RELEASE);
}

/// 已释放视图上的任何字节访问都必须在触碰内存之前失败。
#[test]
fn access_after_release_is_rejected() {
    let (view, _hits) = view_with_release_counter(vec![1, 2, 3, 4]);
    view.release().expect("释放视图");
    assert!(view.is_released());
    assert!(view.obj().is_none(), "释放后宿主句柄必须被清空");

    let read = view.get_item(0i64).expect_err("读取必须失败");
    assert_eq!(read.code(), codes::VIEW_RELEASED);
    let bytes = view.to_bytes(ByteOrder::C).expect_err("导出必须失败");
    assert_eq!(bytes.code(), codes::VIEW_RELEASED);
    let sliced = view
        .get_slice(&aperture_core::SliceSpec::full())
        .expect_err("切片必须失败");
    assert_eq!(sliced.code(), codes::VIEW_RELEASED);
}

/// 视图级导出未归还时禁止释放；守卫析构后释放恢复可用。
#[test]
fn outstanding_view_exports_block_release() {
    let (view, hits) = view_with_release_counter(vec![0u8; 8]);
    let guard = view.export_guard().expect("登记视图级导出");
    assert_eq!(view.outstanding_exports(), 1);

    let err = view.release().expect_err("导出未归还时释放必须失败");
    assert_eq!(err.kind(), ViewErrorKind::ExportsOutstanding);
    assert_eq!(err.code(), codes::LIFECYCLE_EXPORTS_OUTSTANDING);
    assert_eq!(hits.load(Ordering::Acquire), 0);

    drop(guard);
    assert_eq!(view.outstanding_exports(), 0);
    view.release().expect("守卫归还后释放应成功");
    assert_eq!(hits.load(Ordering::Acquire), 1);
}

/// 释放回调失败时错误沿显式释放路径上抛，并保留宿主根因。
#[test]
fn failing_release_callback_propagates() {
    #[derive(Debug, thiserror::Error)]
    #[error("宿主拒绝归还缓冲")]
    struct HostRefusal;

    impl aperture_core::Error for HostRefusal {
        fn source(&self) -> Option<&(dyn aperture_core::Error + 'static)> {
            None
        }
    }

    let store = Arc::new(VecStore::new(vec![0u8; 4]));
    let descriptor = BufferDescriptor::new(BufferSource::Managed(store), false)
        .with_release(Box::new(|| {
            Err(ViewError::new(
                ViewErrorKind::Lifecycle,
                codes::LIFECYCLE_RELEASE_FAILED,
                "释放回调执行失败",
            )
            .with_cause(HostRefusal))
        }));
    let view = acquire(descriptor, AcquireFlags::FULL).expect("获取视图");
    let err = view.release().expect_err("回调失败必须上抛");
    assert_eq!(err.code(), codes::LIFECYCLE_RELEASE_FAILED);
    assert!(view.is_released(), "回调失败不产生可重试的中间态");
}

/// 被遗忘的视图经终结化安全网补偿释放：回调最终恰好触发一次。
///
/// # 输入/输出契约（What）
/// - **前置条件**：视图带释放回调且从未显式释放；
/// - **后置条件**：析构把记录移交登记队列，后台清扫（或同步排空）在有限时间内
///   触发回调一次；统计中入队计数随之增长。
#[test]
fn forgotten_view_is_swept_eventually() {
    let (view, hits) = view_with_release_counter(vec![0u8; 8]);
    let baseline = aperture_core::registry::global().stats().enqueued;
    drop(view);

    let registry = aperture_core::registry::global();
    assert!(registry.stats().enqueued > baseline, "析构必须把记录移交登记队列");

    // 后台清扫线程与同步排空共享同一闸门；先主动排空，再容忍清扫线程抢先。
    let _ = registry.drain_pending().expect("排空不应失败");
    let deadline = Instant::now() + Duration::from_secs(5);
    while hits.load(Ordering::Acquire) == 0 && Instant::now() < deadline {
        std::thread::yield_now();
    }
    assert_eq!(hits.load(Ordering::Acquire), 1, "补偿释放必须恰好触发回调一次");
}

/// 显式释放之后的析构不得产生第二次结算。
#[test]
fn explicit_release_then_drop_is_inert() {
    let (view, hits) = view_with_release_counter(vec![0u8; 8]);
    view.release().expect("显式释放");
    drop(view);
    let _ = aperture_core::registry::global().drain_pending().expect("排空不应失败");
    assert_eq!(hits.load(Ordering::Acquire), 1, "析构不得重复触发回调");
}

/// 无释放回调的获取不参与导出记账，释放仅做状态翻转。
#[test]
fn acquisition_without_callback_has_no_contract() {
    let view = acquire_bytes(vec![1, 2, 3], AcquireFlags::SIMPLE).expect("获取视图");
    assert_eq!(view.shared_exports(), None);
    view.release().expect("无契约释放仅做状态翻转");
    assert!(view.is_released());
}
