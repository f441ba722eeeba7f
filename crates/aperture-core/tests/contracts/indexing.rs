//! 索引解析与子偏移间接寻址的契约测试。
//!
//! # 测试目标（Why）
//! - 逐维解析的三段语义（负索引归一化、边界检查、步长累加）必须与文档一致，
//!   越界消息按 1 基维度编号呈现；
//! - 元组索引长度与维数的全部错配分支（过长、过短、0 维）各自映射到稳定错误码；
//! - “行指针数组”式间接缓冲在解析与序列化两条路径上行为一致。

use aperture_core::{
    AcquireFlags, BufferDescriptor, BufferSource, ByteStore, PackedValue, VecStore, ViewError,
    ViewErrorKind, ViewIndex, acquire, acquire_bytes, codes,
};
use std::sync::Arc;

fn matrix_3x4() -> aperture_core::BufferView {
    // 行主序 3x4 字节矩阵：元素值等于线性偏移。
    let store = Arc::new(VecStore::new((0u8..12).collect()));
    let descriptor = BufferDescriptor::new(BufferSource::Managed(store), true)
        .with_shape(vec![3, 4])
        .with_strides(vec![4, 1]);
    acquire(descriptor, AcquireFlags::FULL_RO).expect("获取 3x4 视图")
}

/// 文档场景：shape=[3,4]、strides=[4,1] 时 `(1,2)` 解析为偏移 6。
#[test]
fn tuple_resolution_accumulates_strides() {
    let view = matrix_3x4();
    let resolved = view.resolve(&ViewIndex::from([1, 2])).expect("解析 (1,2)");
    assert_eq!(resolved.offset, 6, "1*4 + 2*1 = 6");
    assert_eq!(view.get_item([1, 2]).unwrap(), PackedValue::UInt(6));
}

/// 文档场景：越界索引 `(3,0)` 报第 1 维越界。
#[test]
fn out_of_range_names_the_dimension() {
    let view = matrix_3x4();
    let err = view.get_item([3, 0]).expect_err("(3,0) 必须越界");
    assert_eq!(err.kind(), ViewErrorKind::IndexOutOfBounds);
    assert_eq!(err.code(), codes::INDEX_OUT_OF_BOUNDS);
    assert!(err.message().contains('1'), "消息必须点名第 1 维：{}", err.message());

    let err = view.get_item([0, 4]).expect_err("(0,4) 必须越界");
    assert!(err.message().contains('2'), "消息必须点名第 2 维：{}", err.message());
}

/// 负索引恰好回折一次；二次环绕视为越界。
#[test]
fn negative_indices_fold_exactly_once() {
    let view = acquire_bytes((10u8..20).collect(), AcquireFlags::SIMPLE).expect("获取一维视图");
    let last = view.get_item(-1i64).expect("末元素");
    let expected = view.get_item(9i64).expect("正向末元素");
    assert_eq!(last, expected);

    let err = view.get_item(-11i64).expect_err("-len-1 必须越界");
    assert_eq!(err.kind(), ViewErrorKind::IndexOutOfBounds);
}

/// 标量索引仅对一维视图合法。
#[test]
fn scalar_index_requires_one_dimension() {
    let view = matrix_3x4();
    let err = view.get_item(0i64).expect_err("二维视图不接受标量索引");
    assert_eq!(err.kind(), ViewErrorKind::Unsupported);
    assert_eq!(err.code(), codes::INDEX_SUB_VIEWS);
}

/// 元组长度错配的三个分支各自命中稳定错误码。
#[test]
fn tuple_arity_mismatches_are_distinguished() {
    let view = matrix_3x4();

    let err = view.get_item([0, 0, 0]).expect_err("过长元组");
    assert_eq!(err.kind(), ViewErrorKind::DimensionMismatch);
    assert_eq!(err.code(), codes::INDEX_DIMENSION_MISMATCH);

    let err = view.get_item([0]).expect_err("过短元组（部分索引）");
    assert_eq!(err.kind(), ViewErrorKind::Unsupported);
    assert_eq!(err.code(), codes::INDEX_SUB_VIEWS);
}

/// 0 维视图：空元组定位标量本体，标量与非空索引报维度错误。
#[test]
fn zero_dim_indexing_contract() {
    let view = acquire_bytes(vec![42, 0, 0, 0], AcquireFlags::FULL)
        .expect("获取一维视图")
        .cast('I', Some(&[]))
        .expect("转换为 0 维");
    assert_eq!(view.ndim(), 0);

    let value = view.get_item(Vec::<i64>::new()).expect("空元组读取标量");
    assert_eq!(value, PackedValue::UInt(42));

    let err = view.get_item(0i64).expect_err("0 维不接受标量索引");
    assert_eq!(err.code(), codes::INDEX_ZERO_DIM);
    let err = view.get_item([0]).expect_err("0 维不接受非空元组");
    assert_eq!(err.code(), codes::INDEX_ZERO_DIM);
}

/// “行指针数组”式的间接字节源：指针表本身不可读写，仅支持按槽位解引用。
#[derive(Debug)]
struct RowTableStore {
    rows: Vec<Arc<VecStore>>,
}

impl RowTableStore {
    const SLOT: usize = core::mem::size_of::<usize>();
}

impl ByteStore for RowTableStore {
    fn len(&self) -> usize {
        self.rows.len() * Self::SLOT
    }

    fn is_readonly(&self) -> bool {
        false
    }

    fn read_range(&self, offset: usize, dst: &mut [u8]) -> Result<(), ViewError> {
        Err(ViewError::source_range(offset as isize, dst.len(), self.len()))
    }

    fn write_range(&self, offset: usize, src: &[u8]) -> Result<(), ViewError> {
        Err(ViewError::source_range(offset as isize, src.len(), self.len()))
    }

    fn dereference(
        &self,
        offset: usize,
        suboffset: usize,
    ) -> Result<Arc<dyn ByteStore>, ViewError> {
        if !offset.is_multiple_of(Self::SLOT) || suboffset != 0 {
            return Err(ViewError::source_range(offset as isize, suboffset, self.len()));
        }
        let row = offset / Self::SLOT;
        self.rows
            .get(row)
            .map(|store| Arc::clone(store) as Arc<dyn ByteStore>)
            .ok_or_else(|| ViewError::source_range(offset as isize, 0, self.len()))
    }
}

fn indirect_2x3() -> aperture_core::BufferView {
    let rows = vec![
        Arc::new(VecStore::new(vec![0, 1, 2])),
        Arc::new(VecStore::new(vec![10, 11, 12])),
    ];
    let table = Arc::new(RowTableStore { rows });
    let descriptor = BufferDescriptor::new(BufferSource::Managed(table), false)
        .with_shape(vec![2, 3])
        .with_strides(vec![RowTableStore::SLOT as isize, 1])
        .with_suboffsets(vec![0, -1]);
    acquire(descriptor, AcquireFlags::FULL).expect("获取间接视图")
}

/// 间接视图：解析在首维之后经指针表跳转，偏移清零后继续累加。
#[test]
fn suboffset_indirection_resolves_through_rows() {
    let view = indirect_2x3();
    assert!(view.flags().contains(aperture_core::ViewFlags::INDIRECT));
    assert!(!view.is_c_contiguous(), "间接视图的连续性无定义，一律为假");

    assert_eq!(view.get_item([0, 2]).unwrap(), PackedValue::UInt(2));
    assert_eq!(view.get_item([1, 0]).unwrap(), PackedValue::UInt(10));
    assert_eq!(view.get_item([-1, -1]).unwrap(), PackedValue::UInt(12));
}

/// 间接视图的写路径与序列化路径同样经过指针跳转。
#[test]
fn suboffset_indirection_serializes_and_writes() {
    let view = indirect_2x3();
    view.set_item([1, 1], &PackedValue::UInt(99)).expect("写入间接视图");
    assert_eq!(view.get_item([1, 1]).unwrap(), PackedValue::UInt(99));

    let bytes = view
        .to_bytes(aperture_core::ByteOrder::C)
        .expect("C 序导出间接视图");
    assert_eq!(bytes, vec![0, 1, 2, 10, 99, 12]);
}

/// 未声明 `INDIRECT` 的请求不得获得间接缓冲。
#[test]
fn indirect_buffers_require_opt_in() {
    let rows = vec![Arc::new(VecStore::new(vec![0u8; 2]))];
    let table = Arc::new(RowTableStore { rows });
    let descriptor = BufferDescriptor::new(BufferSource::Managed(table), true)
        .with_shape(vec![1, 2])
        .with_strides(vec![RowTableStore::SLOT as isize, 1])
        .with_suboffsets(vec![0, -1]);
    let err = acquire(
        descriptor,
        AcquireFlags::SHAPE
            .union(AcquireFlags::STRIDES)
            .union(AcquireFlags::FORMAT),
    )
    .expect_err("缺少 INDIRECT 声明必须失败");
    assert_eq!(err.kind(), ViewErrorKind::Acquire);
    assert_eq!(err.code(), codes::ACQUIRE_CONTRACT);
}
