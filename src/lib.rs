//! 基于 CRON 的周期任务调度器
//!
//! 多个调度器实例可以共享同一个存储，各自定期认领尚未被认领的触发器，
//! 在触发时间到达后执行注册的任务处理器。

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerBuilder};
pub use scheduler_core::{
    decode_payload, encode_payload, executor_fn, models, traits, AppConfig, ExecutorConfig,
    Job, JobBuilder, JobContext, JsonCodec, PayloadCodec, Repeats, SchedulerError,
    SchedulerResult, Trigger, TriggerBuilder, TriggerState,
};
pub use scheduler_dispatcher::RuntimeExecutor;
pub use scheduler_infrastructure::InMemoryStore;
