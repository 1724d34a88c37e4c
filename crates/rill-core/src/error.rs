use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::fmt;

use crate::Error;

/// `CoreError` 是 rill 各层共享的稳定错误域，所有可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 通道状态机、缓冲段链与池实现会在不同层次产生故障，需要合流为统一的错误码，
///   以便调用方与可观测系统执行精确分类，而不是解析自由文本。
/// - 框架需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，而是复用
///   crate 内部定义的轻量 [`Error`] 抽象。
///
/// # 逻辑解析（How）
/// - 错误码 `code` 始终为 `'static` 字符串并遵循 `<域>.<语义>` 约定，承载稳定语义；
///   `message` 面向排障人员；`cause` 通过 `source()` 暴露完整链路。
/// - Builder 风格的 `with_cause` 允许在不破坏所有权语义的情况下叠加底层原因。
///
/// # 契约说明（What）
/// - **前置条件**：调用方必须使用 [`codes`] 模块或遵循同一命名约定的自定义码值。
/// - **返回值**：构造函数返回拥有所有权的 `CoreError`，满足 `Send + Sync + 'static`，
///   可安全跨线程移动。
/// - **后置条件**：除非显式调用 `with_cause`，错误不含底层原因。
///
/// # 设计取舍（Trade-offs）
/// - 采用 `Cow<'static, str>` 保存消息：静态文案零分配，动态描述付出一次堆分配，
///   换取跨层传递与日志拼接时的灵活性。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

impl CoreError {
    /// 构造核心错误。
    ///
    /// # 契约定义（What）
    /// - `code`：遵循 `<域>.<语义>` 约定的稳定错误码，见 [`codes`]；
    /// - `message`：面向排障人员的自然语言描述，可为静态或堆分配字符串。
    ///
    /// # 示例（Examples）
    /// ```rust
    /// use rill_core::{CoreError, codes};
    ///
    /// let err = CoreError::new(codes::INVALID_ADVANCE, "consumed 越过了本次读取的末尾");
    /// assert_eq!(err.code(), codes::INVALID_ADVANCE);
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `Result` 为框架统一的返回值别名，默认错误类型为 [`CoreError`]。
///
/// - 集中约定默认错误类型，避免各处重复书写 `Result<_, CoreError>`；
/// - 与标准库 `Result` 行为完全一致，可直接配合 `?` 与模式匹配使用。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

/// 框架内置的错误码常量集合，确保可观测系统具有稳定识别符。
///
/// # 设计背景（Why）
/// - 读取确认协议（examined/consumed）、借用段生命周期与生产者故障是本通道的
///   高频故障模式，必须提供标准化标识以便调用方实施兜底策略。
/// - 错误码遵循 `<域>.<语义>` 命名约定，方便在跨组件日志中检索与聚合。
///
/// # 契约说明（What）
/// - 错误码应由实现者封装进 [`CoreError`]，并在日志、断言中携带完整上下文；
/// - 码值一经发布即视为稳定契约，重命名属于破坏性变更。
pub mod codes {
    /// 上一次读取尚未通过 `advance` 确认时再次发起读取。
    pub const READ_WITHOUT_ADVANCE: &str = "channel.read_without_advance";
    /// consumed/examined 游标乱序、越过读取末尾或回退到通道起点之前。
    pub const INVALID_ADVANCE: &str = "channel.invalid_advance";
    /// 访问已随生产者释放或 consumed 推进而失效的数据视图。
    pub const USE_AFTER_RELEASE: &str = "buffer.use_after_release";
    /// 写端以错误完成，通道进入 Faulted 终态。
    pub const PRODUCER_FAULT: &str = "channel.producer_fault";
    /// 读端已拆除后写端仍尝试写入或刷新。
    pub const READER_COMPLETED: &str = "channel.reader_completed";
    /// 写端已完成后再次写入或刷新。
    pub const WRITER_COMPLETED: &str = "channel.writer_completed";
    /// 游标前移越过了当前已写入的末尾，或在不相关的段链上求距离。
    pub const CURSOR_OUT_OF_RANGE: &str = "cursor.out_of_range";
    /// 块池无法满足本次容量请求。
    pub const POOL_EXHAUSTED: &str = "pool.exhausted";
}
