//! 获取入口：缓冲描述符、能力请求标志与协商校验。
//!
//! # 模块架构（Why）
//! - “获取”是视图诞生的唯一入口：字节源交出一份描述符（几何信息 + 可选释放回调），
//!   消费者交出一份能力请求，两者在此处完成协商；任何一条未满足的要求都是获取错误，
//!   不存在部分成功。
//! - 只有声明了释放回调的源才产生共享释放契约（[`ManagedBuffer`](crate::lifecycle::ManagedBuffer)）；
//!   纯托管、随宿主生命周期回收的源不参与导出记账。
//!
//! # 设计总览（How）
//! - 描述符先做自洽校验（秩一致、几何边界、只读一致性），再对照请求标志逐项检查；
//!   全部通过后才构造视图并登记导出——失败路径不会触碰释放回调。

use crate::{
    error::ViewError,
    format::BufferFormat,
    layout::{self, MAX_DIM, ViewFlags},
    lifecycle::{ManagedBuffer, ReleaseFn},
    source::{BufferSource, OwnerHandle, VecStore},
    view::{BufferView, ViewParts},
};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

/// 获取请求的能力标志位集。
///
/// # 契约说明（What）
/// - `WRITABLE`：要求可写视图；对只读描述符报 `view.not_writable`。
/// - `C_CONTIGUOUS`/`F_CONTIGUOUS`/`ANY_CONTIGUOUS`：对应连续性要求。
/// - `INDIRECT`：声明接受子偏移间接缓冲；未声明而描述符携带子偏移时协商失败。
/// - `STRIDES`：声明消费者理解步长信息；未声明时仅接受 C 连续布局。
/// - `SHAPE`：声明消费者理解多维形状；未声明时仅接受维数不超过 1 的视图。
/// - `FORMAT`：声明消费者理解元素格式；未声明时仅接受字节格式（`B`）。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AcquireFlags(u32);

impl AcquireFlags {
    pub const WRITABLE: AcquireFlags = AcquireFlags(1);
    pub const C_CONTIGUOUS: AcquireFlags = AcquireFlags(1 << 1);
    pub const F_CONTIGUOUS: AcquireFlags = AcquireFlags(1 << 2);
    pub const ANY_CONTIGUOUS: AcquireFlags = AcquireFlags(1 << 3);
    pub const INDIRECT: AcquireFlags = AcquireFlags(1 << 4);
    pub const STRIDES: AcquireFlags = AcquireFlags(1 << 5);
    pub const SHAPE: AcquireFlags = AcquireFlags(1 << 6);
    pub const FORMAT: AcquireFlags = AcquireFlags(1 << 7);

    /// 最简请求：一维、C 连续、字节格式的只读访问。
    pub const SIMPLE: AcquireFlags = AcquireFlags(0);

    /// 完整请求：接受全部布局信息（含间接缓冲）并要求可写。
    pub const FULL: AcquireFlags = AcquireFlags(
        Self::WRITABLE.0 | Self::INDIRECT.0 | Self::STRIDES.0 | Self::SHAPE.0 | Self::FORMAT.0,
    );

    /// 完整只读请求。
    pub const FULL_RO: AcquireFlags =
        AcquireFlags(Self::INDIRECT.0 | Self::STRIDES.0 | Self::SHAPE.0 | Self::FORMAT.0);

    /// 空标志位集。
    pub const fn empty() -> Self {
        AcquireFlags(0)
    }

    /// 原始位值。
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// 判断是否包含 `other` 的全部位。
    pub const fn contains(self, other: AcquireFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// 合并标志位。
    pub const fn union(self, other: AcquireFlags) -> Self {
        AcquireFlags(self.0 | other.0)
    }
}

impl fmt::Debug for AcquireFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (bit, name) in [
            (AcquireFlags::WRITABLE, "WRITABLE"),
            (AcquireFlags::C_CONTIGUOUS, "C_CONTIGUOUS"),
            (AcquireFlags::F_CONTIGUOUS, "F_CONTIGUOUS"),
            (AcquireFlags::ANY_CONTIGUOUS, "ANY_CONTIGUOUS"),
            (AcquireFlags::INDIRECT, "INDIRECT"),
            (AcquireFlags::STRIDES, "STRIDES"),
            (AcquireFlags::SHAPE, "SHAPE"),
            (AcquireFlags::FORMAT, "FORMAT"),
        ] {
            if self.contains(bit) {
                list.entry(&name);
            }
        }
        list.finish()
    }
}

/// 字节源交出的缓冲描述符。
///
/// # 契约说明（What）
/// - **默认几何**：未提供形状时按 `源长度 / itemsize` 的一维布局处理；
///   未提供步长时按行主序推导。
/// - **释放回调**：提供即表示该源需要真实回收动作，获取成功后生成共享释放契约；
///   获取失败时回调原样丢弃、不会被调用（源仍然拥有缓冲）。
pub struct BufferDescriptor {
    owner: Option<OwnerHandle>,
    source: BufferSource,
    readonly: bool,
    format: BufferFormat,
    offset: isize,
    shape: Option<Vec<usize>>,
    strides: Option<Vec<isize>>,
    suboffsets: Option<Vec<isize>>,
    release: Option<ReleaseFn>,
}

impl BufferDescriptor {
    /// 以字节源与只读标记创建描述符，其余字段取默认值。
    pub fn new(source: BufferSource, readonly: bool) -> Self {
        Self {
            owner: None,
            source,
            readonly,
            format: BufferFormat::default(),
            offset: 0,
            shape: None,
            strides: None,
            suboffsets: None,
            release: None,
        }
    }

    /// 附带供给方宿主句柄（视图属性 `obj` 原样返回）。
    pub fn with_owner(mut self, owner: OwnerHandle) -> Self {
        self.owner = Some(owner);
        self
    }

    /// 指定元素格式。
    pub fn with_format(mut self, format: BufferFormat) -> Self {
        self.format = format;
        self
    }

    /// 指定基偏移。
    pub fn with_offset(mut self, offset: isize) -> Self {
        self.offset = offset;
        self
    }

    /// 指定多维形状。
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = Some(shape);
        self
    }

    /// 指定各维步长（字节）。
    pub fn with_strides(mut self, strides: Vec<isize>) -> Self {
        self.strides = Some(strides);
        self
    }

    /// 指定各维子偏移（负值表示该维无间接寻址）。
    pub fn with_suboffsets(mut self, suboffsets: Vec<isize>) -> Self {
        self.suboffsets = Some(suboffsets);
        self
    }

    /// 登记释放回调：最后一个导出归还时恰好执行一次。
    pub fn with_release(mut self, release: ReleaseFn) -> Self {
        self.release = Some(release);
        self
    }
}

fn descriptor_error(message: &'static str) -> ViewError {
    ViewError::new(
        crate::error::ViewErrorKind::Acquire,
        crate::error::codes::ACQUIRE_DESCRIPTOR,
        message,
    )
}

/// 以能力请求获取缓冲视图。
///
/// # 逻辑解析（How）
/// 1. 补全默认几何并做自洽校验（秩一致、维数上限、非间接布局的可达区间在源边界内）；
/// 2. 只读一致性：向只读源请求可写描述符直接失败；
/// 3. 依据计算出的连续性标志逐项核对请求；
/// 4. 全部通过后构造视图；若描述符携带释放回调，则生成共享释放契约并登记首个导出。
pub fn acquire(descriptor: BufferDescriptor, request: AcquireFlags) -> Result<BufferView, ViewError> {
    let BufferDescriptor {
        owner,
        source,
        readonly,
        format,
        offset,
        shape,
        strides,
        suboffsets,
        release,
    } = descriptor;

    let itemsize = format.itemsize();
    let shape = match shape {
        Some(shape) => shape,
        None => {
            if source.len() % itemsize != 0 {
                return Err(descriptor_error("源长度不是元素宽度的整数倍"));
            }
            alloc::vec![source.len() / itemsize]
        }
    };
    if shape.len() > MAX_DIM {
        return Err(descriptor_error("维数超过上限"));
    }
    let strides = match strides {
        Some(strides) => strides,
        None => layout::init_strides_from_shape(&shape, itemsize),
    };
    if strides.len() != shape.len() {
        return Err(descriptor_error("步长与形状的秩不一致"));
    }
    if let Some(suboffsets) = &suboffsets
        && suboffsets.len() != shape.len()
    {
        return Err(descriptor_error("子偏移与形状的秩不一致"));
    }
    let elements: usize = shape.iter().product();
    let length_bytes = elements * itemsize;
    if suboffsets.is_none() {
        validate_reachable_range(&source, offset, &shape, &strides, itemsize)?;
    }

    if !readonly && source.is_readonly() {
        return Err(ViewError::not_writable());
    }

    let flags = layout::compute_flags(itemsize, &shape, &strides, suboffsets.as_deref());
    check_request(request, flags, readonly, &shape, format)?;

    let managed = release.map(|callback| ManagedBuffer::new(Some(callback)));
    Ok(BufferView::build(ViewParts {
        owner,
        source,
        managed,
        length_bytes,
        readonly,
        format,
        offset,
        shape,
        strides,
        suboffsets,
    }))
}

/// 便捷入口：把一段堆字节包装为一维 `B` 格式视图。
pub fn acquire_bytes(bytes: Vec<u8>, request: AcquireFlags) -> Result<BufferView, ViewError> {
    let store = Arc::new(VecStore::new(bytes));
    let readonly = !request.contains(AcquireFlags::WRITABLE);
    acquire(
        BufferDescriptor::new(BufferSource::Managed(store), readonly),
        request,
    )
}

fn check_request(
    request: AcquireFlags,
    flags: ViewFlags,
    readonly: bool,
    shape: &[usize],
    format: BufferFormat,
) -> Result<(), ViewError> {
    if request.contains(AcquireFlags::WRITABLE) && readonly {
        return Err(ViewError::not_writable());
    }
    let c_contiguous = flags.contains(ViewFlags::C_CONTIGUOUS);
    let f_contiguous = flags.contains(ViewFlags::F_CONTIGUOUS);
    if request.contains(AcquireFlags::C_CONTIGUOUS) && !c_contiguous {
        return Err(ViewError::acquire_contract("请求要求 C 连续，缓冲不满足"));
    }
    if request.contains(AcquireFlags::F_CONTIGUOUS) && !f_contiguous {
        return Err(ViewError::acquire_contract("请求要求 Fortran 连续，缓冲不满足"));
    }
    if request.contains(AcquireFlags::ANY_CONTIGUOUS) && !c_contiguous && !f_contiguous {
        return Err(ViewError::acquire_contract("请求要求任一方向连续，缓冲不满足"));
    }
    if !request.contains(AcquireFlags::INDIRECT) && flags.contains(ViewFlags::INDIRECT) {
        return Err(ViewError::acquire_contract("请求未声明接受间接缓冲"));
    }
    if !request.contains(AcquireFlags::STRIDES) && !c_contiguous {
        return Err(ViewError::acquire_contract("请求未声明理解步长信息，仅接受 C 连续布局"));
    }
    if !request.contains(AcquireFlags::SHAPE) && shape.len() > 1 {
        return Err(ViewError::acquire_contract("请求未声明理解多维形状"));
    }
    if !request.contains(AcquireFlags::FORMAT) && format.code() != crate::format::DEFAULT_FORMAT_CODE
    {
        return Err(ViewError::acquire_contract("请求未声明理解元素格式，仅接受字节格式"));
    }
    Ok(())
}

/// 校验非间接布局的全部可达偏移落在源边界内。
fn validate_reachable_range(
    source: &BufferSource,
    offset: isize,
    shape: &[usize],
    strides: &[isize],
    itemsize: usize,
) -> Result<(), ViewError> {
    if shape.contains(&0) {
        // 空视图不产生任何访问。
        return Ok(());
    }
    let mut lowest = offset;
    let mut highest = offset;
    for (extent, stride) in shape.iter().zip(strides) {
        let span = stride * (*extent as isize - 1);
        if span >= 0 {
            highest += span;
        } else {
            lowest += span;
        }
    }
    if lowest < 0 || (highest + itemsize as isize) as usize > source.len() {
        return Err(descriptor_error("布局的可达区间超出源边界"));
    }
    Ok(())
}
