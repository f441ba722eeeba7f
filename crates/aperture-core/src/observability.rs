//! 可观测性外观：对象安全的日志契约与全局注入点。
//!
//! # 模块架构（Why）
//! - 引擎自身不绑定任何日志后端：宿主可以把 `tracing`、OpenTelemetry Logger 或
//!   自研实现适配到 [`Logger`] 契约后经 [`set_logger`] 注入。
//! - 后台清扫线程是唯一无法把错误返回给调用方的执行位置，释放回调在该路径上的
//!   失败必须经本外观上报，而不是被吞没。
//!
//! # 契约说明（What）
//! - 默认实现为 [`NoopLogger`]：未注入时所有日志调用为空操作。
//! - 注入的实现必须 `Send + Sync` 且 `'static`；注入可以发生多次，以最后一次为准。

use crate::Error;

/// 日志级别，取 `tracing` 与 OpenTelemetry `SeverityNumber` 的交集。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    Debug,
    Info,
    Warn,
    Error,
}

/// 日志接口的核心契约。
///
/// # 逻辑解析（How）
/// - `log` 为唯一必需方法；`info`/`warn`/`error` 便捷方法内部统一转发，
///   确保所有路径共享相同逻辑。
/// - `error` 参数允许携带实现 [`Error`] 的对象，用于根因追溯。
pub trait Logger: Send + Sync {
    /// 提交一条日志。
    fn log(&self, severity: LogSeverity, message: &str, error: Option<&dyn Error>);

    /// 输出 INFO 日志。
    fn info(&self, message: &str) {
        self.log(LogSeverity::Info, message, None);
    }

    /// 输出 WARN 日志。
    fn warn(&self, message: &str, error: Option<&dyn Error>) {
        self.log(LogSeverity::Warn, message, error);
    }

    /// 输出 ERROR 日志。
    fn error(&self, message: &str, error: Option<&dyn Error>) {
        self.log(LogSeverity::Error, message, error);
    }
}

/// 空实现：丢弃所有日志。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _severity: LogSeverity, _message: &str, _error: Option<&dyn Error>) {}
}

static LOGGER: spin::RwLock<&'static dyn Logger> = spin::RwLock::new(&NoopLogger);

/// 注入全局日志实现；以最后一次注入为准。
pub fn set_logger(logger: &'static dyn Logger) {
    *LOGGER.write() = logger;
}

/// 获取当前全局日志实现。
pub fn logger() -> &'static dyn Logger {
    *LOGGER.read()
}
