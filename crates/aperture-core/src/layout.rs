//! 形状/步长代数与连续性判定。
//!
//! # 模块架构（Why）
//! - 连续性标志是派生操作（切片、重解释转换）与能力协商（获取视图）的公共判定依据，
//!   必须在视图构造时一次性计算，之后保持不可变。
//! - 行主序（C）默认步长生成与连续性扫描共用同一套期望步长推导，避免两处逻辑漂移。
//!
//! # 设计总览（How）
//! - [`ViewFlags`] 以手写位集表达，不引入第三方 bitflags：位值参与跨语言诊断输出，
//!   必须保持稳定。
//! - [`compute_flags`] 的扫描方向：C 连续性自最高维向最低维推进，Fortran 连续性反向；
//!   扩展度（extent）不超过 1 的维度天然不破坏连续性，跳过判定。

use alloc::vec::Vec;
use core::fmt;

/// 单个视图允许的最大维数。
pub const MAX_DIM: usize = 64;

/// 视图状态与布局标志位集。
///
/// # 契约说明（What）
/// - `RELEASED`：视图已释放（由释放路径动态合成，布局计算永不设置）。
/// - `C_CONTIGUOUS`/`F_CONTIGUOUS`：行主序/列主序连续。
/// - `SCALAR`：0 维视图。
/// - `INDIRECT`：存在子偏移间接寻址；间接视图的连续性一律视为假。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewFlags(u32);

impl ViewFlags {
    pub const RELEASED: ViewFlags = ViewFlags(1);
    pub const C_CONTIGUOUS: ViewFlags = ViewFlags(1 << 1);
    pub const F_CONTIGUOUS: ViewFlags = ViewFlags(1 << 2);
    pub const SCALAR: ViewFlags = ViewFlags(1 << 3);
    pub const INDIRECT: ViewFlags = ViewFlags(1 << 4);

    /// 空标志位集。
    pub const fn empty() -> Self {
        ViewFlags(0)
    }

    /// 原始位值。
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// 判断是否包含 `other` 的全部位。
    pub const fn contains(self, other: ViewFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// 置入位。
    pub const fn union(self, other: ViewFlags) -> Self {
        ViewFlags(self.0 | other.0)
    }

    /// 清除位。
    pub const fn difference(self, other: ViewFlags) -> Self {
        ViewFlags(self.0 & !other.0)
    }
}

impl fmt::Debug for ViewFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (bit, name) in [
            (ViewFlags::RELEASED, "RELEASED"),
            (ViewFlags::C_CONTIGUOUS, "C_CONTIGUOUS"),
            (ViewFlags::F_CONTIGUOUS, "F_CONTIGUOUS"),
            (ViewFlags::SCALAR, "SCALAR"),
            (ViewFlags::INDIRECT, "INDIRECT"),
        ] {
            if self.contains(bit) {
                list.entry(&name);
            }
        }
        list.finish()
    }
}

/// 按行主序（C 序）从形状推导默认步长。
///
/// # 契约说明（What）
/// - **输入**：`shape` 的每个扩展度非负；`itemsize` 为正。
/// - **输出**：`strides[ndim-1] = itemsize`，`strides[i] = strides[i+1] * shape[i+1]`；
///   0 维形状返回空向量。
pub fn init_strides_from_shape(shape: &[usize], itemsize: usize) -> Vec<isize> {
    let ndim = shape.len();
    let mut strides = alloc::vec![0isize; ndim];
    if ndim == 0 {
        return strides;
    }
    strides[ndim - 1] = itemsize as isize;
    for i in (0..ndim.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as isize;
    }
    strides
}

/// 依据布局计算连续性标志。
///
/// # 逻辑解析（How）
/// - 0 维：`C | F | SCALAR`。
/// - 存在子偏移：仅 `INDIRECT`，连续性对间接缓冲无定义。
/// - 其余：两个连续性位先全部置上，再分别按期望步长扫描；
///   扩展度大于 1 且实际步长与期望不符的维度清除对应位。
///
/// # 契约说明（What）
/// - **前置条件**：`shape`/`strides` 长度一致，`suboffsets` 若存在长度亦一致。
/// - **后置条件**：返回值不含 `RELEASED` 位。
pub fn compute_flags(
    itemsize: usize,
    shape: &[usize],
    strides: &[isize],
    suboffsets: Option<&[isize]>,
) -> ViewFlags {
    debug_assert_eq!(shape.len(), strides.len());
    let ndim = shape.len();
    if ndim == 0 {
        return ViewFlags::C_CONTIGUOUS
            .union(ViewFlags::F_CONTIGUOUS)
            .union(ViewFlags::SCALAR);
    }
    if suboffsets.is_some() {
        return ViewFlags::INDIRECT;
    }
    let mut flags = ViewFlags::C_CONTIGUOUS.union(ViewFlags::F_CONTIGUOUS);
    let mut expected = itemsize as isize;
    for i in (0..ndim).rev() {
        let dim = shape[i];
        if dim > 1 && strides[i] != expected {
            flags = flags.difference(ViewFlags::C_CONTIGUOUS);
            break;
        }
        expected *= dim as isize;
    }
    expected = itemsize as isize;
    for i in 0..ndim {
        let dim = shape[i];
        if dim > 1 && strides[i] != expected {
            flags = flags.difference(ViewFlags::F_CONTIGUOUS);
            break;
        }
        expected *= dim as isize;
    }
    flags
}
