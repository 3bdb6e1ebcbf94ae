use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务key不能为空")]
    EmptyJobKey,

    #[error("任务类型不能为空")]
    EmptyJobType,

    #[error("触发器key不能为空")]
    EmptyTriggerKey,

    #[error("CRON表达式不能为空")]
    EmptyCronSpec,

    #[error("无效的时区: {location} - {message}")]
    InvalidLocation { location: String, message: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("触发器已耗尽，不会再触发: {key}")]
    AlreadyExhausted { key: String },

    #[error("任务已存在: {key}")]
    JobAlreadyExists { key: String },

    #[error("触发器已存在: {key}")]
    TriggerAlreadyExists { key: String },

    #[error("任务未找到: {key}")]
    JobNotFound { key: String },

    #[error("触发器未找到: {key}")]
    TriggerNotFound { key: String },

    #[error("负载数据为空")]
    NoData,

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("任务执行超时 ({timeout_ms}ms)")]
    DeadlineExceeded { timeout_ms: u64 },

    #[error("任务执行错误: {0}")]
    JobExecution(String),

    #[error("任务执行发生panic: {0}")]
    JobPanicked(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("关闭超时，仍有 {remaining} 个任务在执行")]
    ShutdownTimeout { remaining: usize },

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 构建/调度阶段同步返回给调用方的校验错误，不应重试
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::EmptyJobKey
                | SchedulerError::EmptyJobType
                | SchedulerError::EmptyTriggerKey
                | SchedulerError::EmptyCronSpec
                | SchedulerError::InvalidLocation { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::AlreadyExhausted { .. }
        )
    }

    /// 存储后端的瞬时错误，执行器在下一次轮询时重试
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::Store(_))
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
