use crate::Error;
use alloc::{borrow::Cow, boxed::Box, format};
use core::fmt;

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 表征视图引擎错误的类别，帮助调用方在不解析错误码字符串的情况下完成分支处理。
///
/// # 契约说明（What）
/// - 每个类别与 [`codes`] 中的一个或多个稳定错误码对应；类别用于程序化分支，
///   错误码用于日志聚合与跨语言诊断。
/// - 所有类别均为本地同步错误：不存在瞬态故障，不应重试，必须立即反馈给调用方修正用法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewErrorKind {
    /// 视图已释放后仍被访问，或对同一视图重复释放。
    Released,
    /// 对只读视图执行写入、切片赋值，或向只读源请求可写视图。
    NotWritable,
    /// 某一维度上的索引越界（消息中维度编号从 1 开始）。
    IndexOutOfBounds,
    /// 元组索引长度与维数不符，或对 0 维视图做标量索引。
    DimensionMismatch,
    /// 视图自身仍有未归还的导出时尝试释放。
    ExportsOutstanding,
    /// 切片赋值两侧的形状/格式不兼容。
    StructureMismatch,
    /// 重解释转换失败：非连续源、未知格式、总长不匹配、维度变换不受支持或形状含零。
    Cast,
    /// 待打包的数值超出目标格式的可表示区间。
    PackRange,
    /// 切片参数本身非法（如步长为零）。
    InvalidSlice,
    /// 获取视图时请求的能力与缓冲实际能力不符。
    Acquire,
    /// 按契约不支持的操作（如部分索引派生多维子视图）。
    Unsupported,
    /// 生命周期记账异常：导出计数下溢、终结化登记失败等内部违例。
    Lifecycle,
}

/// 框架内置的错误码常量集合，确保可观测性系统具有稳定识别符。
///
/// # 设计背景（Why）
/// - 错误码遵循 `<领域>.<语义>` 命名约定，方便在跨组件日志中检索与聚合。
/// - 码值一经发布即冻结：调用方可能将其写入告警规则或自动化兜底策略。
///
/// # 契约说明（What）
/// - 错误码只描述“发生了什么”，不附带上下文；维度编号、格式字符等细节由消息承载。
pub mod codes {
    /// 已释放视图被再次访问。
    pub const VIEW_RELEASED: &str = "view.released";
    /// 对同一视图重复调用释放。
    pub const VIEW_DOUBLE_RELEASE: &str = "view.double_release";
    /// 写入只读视图。
    pub const VIEW_NOT_WRITABLE: &str = "view.not_writable";
    /// 对可写视图求哈希。
    pub const VIEW_HASH_WRITABLE: &str = "view.hash_writable";
    /// 索引超出某一维度边界。
    pub const INDEX_OUT_OF_BOUNDS: &str = "index.out_of_bounds";
    /// 元组索引长度与维数不匹配。
    pub const INDEX_DIMENSION_MISMATCH: &str = "index.dimension_mismatch";
    /// 0 维视图不接受标量或非空索引。
    pub const INDEX_ZERO_DIM: &str = "index.zero_dim";
    /// 部分索引派生子视图未实现。
    pub const INDEX_SUB_VIEWS: &str = "index.sub_views";
    /// 视图仍有未归还导出时尝试释放。
    pub const LIFECYCLE_EXPORTS_OUTSTANDING: &str = "lifecycle.exports_outstanding";
    /// 共享导出计数下溢（内部违例）。
    pub const LIFECYCLE_EXPORTS_UNDERFLOW: &str = "lifecycle.exports_underflow";
    /// 释放回调自身执行失败。
    pub const LIFECYCLE_RELEASE_FAILED: &str = "lifecycle.release_failed";
    /// 切片赋值两侧结构不兼容。
    pub const SLICE_STRUCTURE_MISMATCH: &str = "slice.structure_mismatch";
    /// 切片步长为零。
    pub const SLICE_STEP_ZERO: &str = "slice.step_zero";
    /// 多维视图的切片赋值受限于一维。
    pub const SLICE_ASSIGN_DIM: &str = "slice.assign_restricted_to_dim_1";
    /// 重解释转换被拒绝。
    pub const CAST_INVALID: &str = "cast.invalid";
    /// 未知或不受支持的格式码。
    pub const FORMAT_UNKNOWN: &str = "format.unknown";
    /// 数值超出目标格式可表示区间。
    pub const FORMAT_PACK_RANGE: &str = "format.pack_range";
    /// 提供的值与目标格式类型不符。
    pub const FORMAT_INVALID_VALUE: &str = "format.invalid_value";
    /// 获取视图时的能力协商失败。
    pub const ACQUIRE_CONTRACT: &str = "acquire.contract_unsatisfied";
    /// 缓冲描述符自身不一致（形状、步长、长度互相矛盾）。
    pub const ACQUIRE_DESCRIPTOR: &str = "acquire.descriptor_invalid";
    /// 字节源访问越界。
    pub const SOURCE_RANGE: &str = "source.out_of_range";
    /// 字节源不支持子偏移间接寻址。
    pub const SOURCE_NO_INDIRECTION: &str = "source.no_indirection";
}

/// `ViewError` 是 `aperture-core` 跨模块共享的稳定错误载体。
///
/// # 设计背景（Why）
/// - 索引、切片、转换、生命周期各层产生的故障需要合流为统一的错误码与类别，
///   以便日志、指标与调用方分支逻辑执行精确处理。
/// - 引擎需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，而是复用
///   crate 内部定义的轻量 [`Error`] 抽象。
///
/// # 逻辑解析（How）
/// - 结构体携带稳定错误码（`'static` 字符串）、类别判别值与人类可读消息；
///   `with_cause` 以 Builder 风格附加底层原因，并经 `source()` 暴露完整链路。
///
/// # 契约说明（What）
/// - **前置条件**：构造时必须使用 [`codes`] 模块中的码值或遵循 `<域>.<语义>` 约定；
/// - **返回值**：实例拥有所有权，`Send + Sync + 'static`，可安全跨线程移动；
/// - **后置条件**：除非显式调用 `with_cause`，错误不包含底层原因。
///
/// # 设计取舍与风险（Trade-offs）
/// - 消息采用 `Cow<'static, str>`，静态文案零分配，动态文案（如维度编号）按需落堆。
/// - 本类型不区分“域层/实现层”：引擎所有错误均为调用方用法错误，单层结构已经足够。
#[derive(Debug)]
pub struct ViewError {
    kind: ViewErrorKind,
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

impl ViewError {
    /// 使用类别、稳定错误码与消息构造错误。
    pub fn new(
        kind: ViewErrorKind,
        code: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的错误，形成 `操作错误 → 宿主原因` 的链路。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取错误类别。
    pub fn kind(&self) -> ViewErrorKind {
        self.kind
    }

    /// 获取稳定错误码，供日志聚合或自动化兜底策略使用。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取人类可读的错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取可选的底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 已释放视图被访问。
    pub fn released() -> Self {
        Self::new(
            ViewErrorKind::Released,
            codes::VIEW_RELEASED,
            "禁止对已释放的缓冲视图执行任何操作",
        )
    }

    /// 对同一视图重复释放：这是调用方记账错误，必须显式上报而非静默幂等。
    pub fn double_release() -> Self {
        Self::new(
            ViewErrorKind::Released,
            codes::VIEW_DOUBLE_RELEASE,
            "缓冲视图已释放，重复释放属于调用方错误",
        )
    }

    /// 写入只读视图。
    pub fn not_writable() -> Self {
        Self::new(
            ViewErrorKind::NotWritable,
            codes::VIEW_NOT_WRITABLE,
            "不能修改只读缓冲视图",
        )
    }

    /// 索引超出 `dimension`（编号从 1 开始）维度边界。
    pub fn index_out_of_bounds(dimension: usize) -> Self {
        Self::new(
            ViewErrorKind::IndexOutOfBounds,
            codes::INDEX_OUT_OF_BOUNDS,
            format!("索引超出第 {dimension} 维边界"),
        )
    }

    /// 0 维视图不接受该索引形式。
    pub fn zero_dim_index() -> Self {
        Self::new(
            ViewErrorKind::DimensionMismatch,
            codes::INDEX_ZERO_DIM,
            "0 维缓冲视图不支持该索引形式",
        )
    }

    /// 元组索引长度超过维数。
    pub fn too_many_indices(ndim: usize, given: usize) -> Self {
        Self::new(
            ViewErrorKind::DimensionMismatch,
            codes::INDEX_DIMENSION_MISMATCH,
            format!("不能用 {given} 个索引访问 {ndim} 维视图"),
        )
    }

    /// 部分索引派生多维子视图，契约明确不支持。
    pub fn sub_views_unsupported() -> Self {
        Self::new(
            ViewErrorKind::Unsupported,
            codes::INDEX_SUB_VIEWS,
            "不支持以部分索引派生多维子视图",
        )
    }

    /// 视图自身导出未归零时尝试释放。
    pub fn exports_outstanding(count: usize) -> Self {
        Self::new(
            ViewErrorKind::ExportsOutstanding,
            codes::LIFECYCLE_EXPORTS_OUTSTANDING,
            format!("视图仍有 {count} 个未归还的导出，禁止释放"),
        )
    }

    /// 共享导出计数下溢，属于内部记账违例。
    pub fn exports_underflow() -> Self {
        Self::new(
            ViewErrorKind::Lifecycle,
            codes::LIFECYCLE_EXPORTS_UNDERFLOW,
            "共享导出计数在递减前已为零",
        )
    }

    /// 重解释转换被拒绝。
    pub fn cast(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ViewErrorKind::Cast, codes::CAST_INVALID, message)
    }

    /// 未知格式码。
    pub fn unknown_format(code: char) -> Self {
        Self::new(
            ViewErrorKind::Cast,
            codes::FORMAT_UNKNOWN,
            format!("不支持的格式码 '{code}'"),
        )
    }

    /// 数值超出目标格式可表示区间。
    pub fn pack_range(format_code: char) -> Self {
        Self::new(
            ViewErrorKind::PackRange,
            codes::FORMAT_PACK_RANGE,
            format!("数值超出格式 '{format_code}' 的可表示区间"),
        )
    }

    /// 提供的值与目标格式类型不符。
    pub fn invalid_value(format_code: char) -> Self {
        Self::new(
            ViewErrorKind::PackRange,
            codes::FORMAT_INVALID_VALUE,
            format!("该值无法按格式 '{format_code}' 打包"),
        )
    }

    /// 切片步长为零。
    pub fn slice_step_zero() -> Self {
        Self::new(
            ViewErrorKind::InvalidSlice,
            codes::SLICE_STEP_ZERO,
            "切片步长不能为零",
        )
    }

    /// 切片赋值两侧结构不兼容。
    pub fn structure_mismatch() -> Self {
        Self::new(
            ViewErrorKind::StructureMismatch,
            codes::SLICE_STRUCTURE_MISMATCH,
            "切片赋值两侧的视图结构不一致",
        )
    }

    /// 获取视图时能力协商失败。
    pub fn acquire_contract(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ViewErrorKind::Acquire, codes::ACQUIRE_CONTRACT, message)
    }

    /// 字节源访问越界。
    pub fn source_range(offset: isize, len: usize, capacity: usize) -> Self {
        Self::new(
            ViewErrorKind::IndexOutOfBounds,
            codes::SOURCE_RANGE,
            format!("字节源访问越界：offset={offset} len={len} capacity={capacity}"),
        )
    }
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for ViewError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}
