//! 任务执行接口
//!
//! - [`JobExecutor`]: 按任务类型注册的处理器，真正执行业务逻辑
//! - [`TriggerExecutor`]: 运行时执行器，把认领到的触发器变成定时的任务调用

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::job_context::JobContext;
use crate::SchedulerResult;

/// 任务处理器
///
/// 返回错误或发生 panic 都只会被记录，触发器照常推进到下一次触发；
/// 是否重试由处理器自己决定。
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<()>;
}

/// 把异步闭包适配为 [`JobExecutor`]
pub struct FnExecutor<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> JobExecutor for FnExecutor<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
{
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<()> {
        (self.f)(ctx).await
    }
}

/// ```rust
/// use scheduler_core::traits::executor_fn;
///
/// let executor = executor_fn(|ctx| async move {
///     println!("running job {}", ctx.job().key());
///     Ok(())
/// });
/// ```
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn JobExecutor>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
{
    Arc::new(FnExecutor { f })
}

/// 运行时执行器
#[async_trait]
pub trait TriggerExecutor: Send + Sync {
    /// 启动后台轮询，立即返回
    fn start(&self);

    /// 停止轮询，归还未触发的触发器，并在 `deadline` 内等待正在执行的任务
    async fn shutdown(&self, deadline: Duration) -> SchedulerResult<()>;

    /// 取消本进程持有的定时器，返回实际取消的数量；不修改存储
    fn cancel_triggers(&self, keys: &[String]) -> usize;
}
