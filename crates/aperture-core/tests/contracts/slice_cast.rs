//! 切片、切片赋值与重解释转换的契约测试。
//!
//! # 测试目标（Why）
//! - 切片派生的几何重写（形状、步长、基偏移、字节长度）与连续性重算必须与
//!   文档一致，且派生视图登记在同一释放契约上；
//! - 重解释转换的全部拒绝分支（非连续、跨宽度、长度不整除、形状不匹配、
//!   含零扩展度、维度变换受限）各自稳定可观测。

use aperture_core::{
    AcquireFlags, BufferDescriptor, BufferSource, ByteOrder, PackedValue, SliceSpec, VecStore,
    ViewErrorKind, acquire, acquire_bytes, codes,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn byte_view_0_to_9() -> aperture_core::BufferView {
    acquire_bytes((0u8..10).collect(), AcquireFlags::FULL).expect("获取 10 字节视图")
}

/// 文档场景：`[2:8:2]` 切片导出 `[2,4,6]`。
#[test]
fn stepped_slice_roundtrip() {
    let view = byte_view_0_to_9();
    let sliced = view.get_slice(&SliceSpec::with_step(2, 8, 2)).expect("切片 [2:8:2]");
    assert_eq!(sliced.shape(), &[3]);
    assert_eq!(sliced.strides(), &[2]);
    assert_eq!(sliced.nbytes(), 3);
    assert!(!sliced.is_c_contiguous(), "步长为 2 的切片丧失连续性");
    assert_eq!(sliced.to_bytes(ByteOrder::C).unwrap(), vec![2, 4, 6]);
}

/// 负步长切片反向遍历。
#[test]
fn negative_step_reverses() {
    let view = byte_view_0_to_9();
    let reversed = view
        .get_slice(&SliceSpec {
            step: Some(-1),
            ..SliceSpec::default()
        })
        .expect("切片 [::-1]");
    assert_eq!(reversed.shape(), &[10]);
    assert_eq!(reversed.strides(), &[-1]);
    assert_eq!(
        reversed.to_bytes(ByteOrder::C).unwrap(),
        (0u8..10).rev().collect::<Vec<_>>()
    );
}

/// 越界切片参数按方向截断，不报错。
#[test]
fn slice_bounds_are_clamped() {
    let view = byte_view_0_to_9();
    let clamped = view.get_slice(&SliceSpec::between(-100, 100)).expect("截断切片");
    assert_eq!(clamped.shape(), &[10]);
    let empty = view.get_slice(&SliceSpec::between(8, 2)).expect("空切片");
    assert_eq!(empty.shape(), &[0]);
    assert_eq!(empty.nbytes(), 0);
    assert!(empty.to_bytes(ByteOrder::C).unwrap().is_empty());
}

/// 步长为零是切片参数错误。
#[test]
fn zero_step_is_rejected() {
    let view = byte_view_0_to_9();
    let err = view
        .get_slice(&SliceSpec::with_step(0, 10, 0))
        .expect_err("步长为零必须失败");
    assert_eq!(err.kind(), ViewErrorKind::InvalidSlice);
    assert_eq!(err.code(), codes::SLICE_STEP_ZERO);
}

/// 切片视图与原视图登记在同一释放契约上：先释放切片不触发回调。
#[test]
fn slices_share_the_release_contract() {
    let hits = Arc::new(AtomicUsize::new(0));
    let callback_hits = Arc::clone(&hits);
    let store = Arc::new(VecStore::new((0u8..10).collect()));
    let descriptor = BufferDescriptor::new(BufferSource::Managed(store), false)
        .with_release(Box::new(move || {
            callback_hits.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }));
    let view = acquire(descriptor, AcquireFlags::FULL).expect("获取视图");
    let sliced = view.get_slice(&SliceSpec::between(2, 8)).expect("派生切片");
    assert_eq!(view.shared_exports(), Some(2));

    sliced.release().expect("释放切片");
    assert_eq!(hits.load(Ordering::Acquire), 0, "切片释放只递减共享计数");
    view.release().expect("释放原视图");
    assert_eq!(hits.load(Ordering::Acquire), 1);
}

/// 切片赋值：结构一致时逐元素写入，结构不一致报 `slice.structure_mismatch`。
#[test]
fn slice_assignment_checks_structure() {
    let dest = acquire_bytes(vec![0u8; 10], AcquireFlags::FULL).expect("目标视图");
    let src = acquire_bytes(vec![7u8, 8, 9], AcquireFlags::FULL).expect("源视图");
    dest.set_slice(&SliceSpec::with_step(2, 8, 2), &src).expect("切片赋值");
    assert_eq!(
        dest.to_bytes(ByteOrder::C).unwrap(),
        vec![0, 0, 7, 0, 8, 0, 9, 0, 0, 0]
    );

    let short = acquire_bytes(vec![1u8], AcquireFlags::FULL).expect("长度不符的源");
    let err = dest
        .set_slice(&SliceSpec::with_step(2, 8, 2), &short)
        .expect_err("首维扩展度不一致必须失败");
    assert_eq!(err.kind(), ViewErrorKind::StructureMismatch);

    let wide = acquire_bytes(vec![0u8; 12], AcquireFlags::FULL)
        .expect("宽格式源")
        .cast('i', None)
        .expect("转换为 i32");
    let err = dest
        .set_slice(&SliceSpec::with_step(2, 8, 2), &wide)
        .expect_err("格式不一致必须失败");
    assert_eq!(err.kind(), ViewErrorKind::StructureMismatch);
}

/// 重叠窗口的切片赋值经中间副本完成，语义等价于 memmove。
#[test]
fn overlapping_slice_assignment_is_safe() {
    let view = acquire_bytes((0u8..10).collect(), AcquireFlags::FULL).expect("获取视图");
    let src = view.get_slice(&SliceSpec::between(1, 5)).expect("源窗口 [1,5)");
    view.set_slice(&SliceSpec::between(0, 4), &src).expect("重叠赋值");
    assert_eq!(
        view.to_bytes(ByteOrder::C).unwrap(),
        vec![1, 2, 3, 4, 4, 5, 6, 7, 8, 9]
    );
}

/// 只读视图拒绝切片赋值。
#[test]
fn readonly_views_refuse_slice_assignment() {
    let view = byte_view_0_to_9().to_readonly().expect("派生只读视图");
    let src = acquire_bytes(vec![1u8; 10], AcquireFlags::FULL).expect("源视图");
    let err = view
        .set_slice(&SliceSpec::full(), &src)
        .expect_err("只读视图必须拒绝写入");
    assert_eq!(err.kind(), ViewErrorKind::NotWritable);
}

/// 文档场景：8 字节 `B` 视图转换为 `I` 得到 shape=[2]。
#[test]
fn cast_to_wider_format_divides_length() {
    let view = acquire_bytes(vec![1, 0, 0, 0, 2, 0, 0, 0], AcquireFlags::FULL).expect("8 字节视图");
    let cast = view.cast('I', None).expect("B → I");
    assert_eq!(cast.shape(), &[2]);
    assert_eq!(cast.itemsize(), 4);
    assert_eq!(cast.strides(), &[4]);
    assert_eq!(cast.get_item(0i64).unwrap(), PackedValue::UInt(1));
    assert_eq!(cast.get_item(1i64).unwrap(), PackedValue::UInt(2));
}

/// 显式形状的元素数乘元素宽度必须恰等于总字节数。
#[test]
fn cast_shape_must_match_length() {
    let view = acquire_bytes(vec![0u8; 8], AcquireFlags::FULL).expect("8 字节视图");
    let err = view.cast('I', Some(&[3])).expect_err("3*4 != 8 必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Cast);
    let err = view.cast('I', Some(&[2, 0])).expect_err("零扩展度必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Cast);
    let ok = view.cast('I', Some(&[2])).expect("2*4 == 8");
    assert_eq!(ok.shape(), &[2]);
}

/// 1 维 → N 维与 N 维 → 1 维之外的维度变换被拒绝。
#[test]
fn cast_dimensionality_transforms_are_limited() {
    let view = acquire_bytes((0u8..12).collect(), AcquireFlags::FULL).expect("12 字节视图");
    let matrix = view.cast('B', Some(&[3, 4])).expect("1 维 → 2 维");
    assert_eq!(matrix.shape(), &[3, 4]);
    assert_eq!(matrix.strides(), &[4, 1]);

    let err = matrix.cast('B', Some(&[2, 6])).expect_err("2 维 → 2 维必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Cast);

    let flat = matrix.cast('B', None).expect("N 维 → 1 维");
    assert_eq!(flat.shape(), &[12]);
}

/// 非 C 连续源与跨宽度转换被拒绝；未知格式报封闭表错误。
#[test]
fn cast_rejections() {
    let view = byte_view_0_to_9();
    let strided = view.get_slice(&SliceSpec::with_step(0, 10, 2)).expect("跨步切片");
    let err = strided.cast('B', None).expect_err("非连续源必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Cast);

    let shorts = acquire_bytes(vec![0u8; 8], AcquireFlags::FULL)
        .expect("8 字节视图")
        .cast('h', None)
        .expect("B → h 合法（源为字节格式）");
    let err = shorts.cast('i', None).expect_err("h → i 两侧皆非字节格式");
    assert_eq!(err.kind(), ViewErrorKind::Cast);

    let err = view.cast('x', None).expect_err("未知格式码");
    assert_eq!(err.code(), codes::FORMAT_UNKNOWN);

    let err = acquire_bytes(vec![0u8; 9], AcquireFlags::FULL)
        .expect("9 字节视图")
        .cast('I', None)
        .expect_err("长度不整除必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Cast);
}

/// 0 维目标：总字节数必须恰为一个元素，结果携带 `SCALAR` 标志。
#[test]
fn cast_to_scalar_requires_exact_length() {
    let view = acquire_bytes(vec![5, 0, 0, 0], AcquireFlags::FULL).expect("4 字节视图");
    let scalar = view.cast('I', Some(&[])).expect("转换为 0 维");
    assert_eq!(scalar.ndim(), 0);
    assert!(scalar.flags().contains(aperture_core::ViewFlags::SCALAR));
    assert_eq!(scalar.nbytes(), 4);

    let err = acquire_bytes(vec![0u8; 8], AcquireFlags::FULL)
        .expect("8 字节视图")
        .cast('I', Some(&[]))
        .expect_err("8 字节不能充当单个 I 元素");
    assert_eq!(err.kind(), ViewErrorKind::Cast);
}

/// 只读化派生：仅 `readonly` 位不同，原视图保持可写。
#[test]
fn to_readonly_is_field_for_field() {
    let view = byte_view_0_to_9();
    let frozen = view.to_readonly().expect("只读化");
    assert!(frozen.readonly());
    assert_eq!(frozen.shape(), view.shape());
    assert_eq!(frozen.strides(), view.strides());
    assert_eq!(frozen.nbytes(), view.nbytes());

    let err = frozen
        .set_item(0i64, &PackedValue::UInt(1))
        .expect_err("只读视图拒绝写入");
    assert_eq!(err.kind(), ViewErrorKind::NotWritable);

    view.set_item(0i64, &PackedValue::UInt(9)).expect("原视图仍可写");
    assert_eq!(frozen.get_item(0i64).unwrap(), PackedValue::UInt(9), "兄弟视图共享底层字节");
}

/// 多维视图的切片与切片赋值受限。
#[test]
fn multi_dimensional_slicing_is_unsupported() {
    let matrix = acquire_bytes((0u8..12).collect(), AcquireFlags::FULL)
        .expect("12 字节视图")
        .cast('B', Some(&[3, 4]))
        .expect("转换为 3x4");
    let err = matrix.get_slice(&SliceSpec::full()).expect_err("多维切片不支持");
    assert_eq!(err.kind(), ViewErrorKind::Unsupported);

    let src = acquire_bytes(vec![0u8; 12], AcquireFlags::FULL).expect("源视图");
    let err = matrix
        .set_slice(&SliceSpec::full(), &src)
        .expect_err("多维切片赋值不支持");
    assert_eq!(err.code(), codes::SLICE_ASSIGN_DIM);
}
