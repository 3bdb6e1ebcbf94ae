//! 持久化契约
//!
//! 所有操作都以调度器实例名 `scheduler` 作为命名空间，多个独立的调度器可以共享同一个
//! 存储而不会发生 key 冲突。
//!
//! ## 触发器认领
//!
//! [`JobStore::acquire_triggers`] 是多实例协作的核心：它原子地把命名空间内所有
//! `Scheduled` 的触发器转为 `Acquired` 并返回。并发调用者（可能来自共享同一存储的
//! 不同进程）拿到的集合必须互不相交，每个实例周期性地“偷取”当前无人认领的触发器，
//! 从而实现水平扩展。
//!
//! ## 错误语义
//!
//! 内存实现不会产生 I/O 错误；持久化实现可以返回 [`SchedulerError::Store`] 表示瞬时
//! 故障，执行器会在下一次轮询时重试。
//!
//! [`SchedulerError::Store`]: crate::SchedulerError::Store

use async_trait::async_trait;

use crate::models::{Job, Trigger};
use crate::SchedulerResult;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// key 已存在时返回 `JobAlreadyExists`
    async fn insert_job(&self, scheduler: &str, job: &Job) -> SchedulerResult<()>;

    /// key 已存在时返回 `TriggerAlreadyExists`
    async fn insert_trigger(&self, scheduler: &str, trigger: &Trigger) -> SchedulerResult<()>;

    /// 不存在时返回 `Ok(None)`
    async fn get_job(&self, scheduler: &str, key: &str) -> SchedulerResult<Option<Job>>;

    /// 不存在时返回 `Ok(None)`
    async fn get_trigger(&self, scheduler: &str, key: &str) -> SchedulerResult<Option<Trigger>>;

    /// 整体替换，不存在时返回 `JobNotFound`
    async fn update_job(&self, scheduler: &str, job: &Job) -> SchedulerResult<()>;

    /// 整体替换，不存在时返回 `TriggerNotFound`
    async fn update_trigger(&self, scheduler: &str, trigger: &Trigger) -> SchedulerResult<()>;

    /// 幂等删除，返回记录是否存在
    async fn delete_job(&self, scheduler: &str, key: &str) -> SchedulerResult<bool>;

    /// 幂等删除，返回记录是否存在
    async fn delete_trigger(&self, scheduler: &str, key: &str) -> SchedulerResult<bool>;

    /// 删除引用 `job_key` 的所有触发器，返回被删除的触发器 key
    async fn delete_triggers_by_job_key(
        &self,
        scheduler: &str,
        job_key: &str,
    ) -> SchedulerResult<Vec<String>>;

    /// 命名空间内所有任务的快照，不保证顺序
    async fn get_jobs(&self, scheduler: &str) -> SchedulerResult<Vec<Job>>;

    /// 命名空间内所有触发器的快照，不保证顺序
    async fn get_triggers(&self, scheduler: &str) -> SchedulerResult<Vec<Trigger>>;

    /// 原子认领所有 `Scheduled` 的触发器，返回认领后（`Acquired`）的快照
    async fn acquire_triggers(&self, scheduler: &str) -> SchedulerResult<Vec<Trigger>>;

    /// 删除所有 `Exhausted` 的触发器，返回删除数量
    async fn delete_exhausted_triggers(&self, scheduler: &str) -> SchedulerResult<usize>;
}
