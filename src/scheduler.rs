//! 调度器门面
//!
//! 对外暴露任务和触发器的增删查，以及执行器的注册与启停。
//! 存储、编解码器和执行器都在构建时注入，同一进程内可以同时运行多个互不影响的调度器。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use scheduler_core::{
    models::{Job, Trigger},
    traits::{JobExecutor, JobStore, TriggerExecutor},
    DefaultExecutorRegistry, ExecutorConfig, JsonCodec, PayloadCodec, SchedulerError,
    SchedulerResult,
};
use scheduler_dispatcher::RuntimeExecutor;
use scheduler_infrastructure::InMemoryStore;

pub struct SchedulerBuilder {
    name: String,
    store: Option<Arc<dyn JobStore>>,
    codec: Option<Arc<dyn PayloadCodec>>,
    config: ExecutorConfig,
    executors: Vec<(String, Arc<dyn JobExecutor>)>,
}

impl SchedulerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: None,
            codec: None,
            config: ExecutorConfig::default(),
            executors: Vec::new(),
        }
    }

    /// 默认使用 [`InMemoryStore`]
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 默认使用 [`JsonCodec`]
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_executor(
        mut self,
        job_type: impl Into<String>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        self.executors.push((job_type.into(), executor));
        self
    }

    pub fn with_executors<I>(mut self, executors: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn JobExecutor>)>,
    {
        self.executors.extend(executors);
        self
    }

    pub async fn build(self) -> SchedulerResult<Scheduler> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SchedulerError::Configuration("调度器名称不能为空".to_string()));
        }
        self.config
            .validate()
            .map_err(|e| SchedulerError::Configuration(e.to_string()))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));

        let registry = DefaultExecutorRegistry::new();
        registry.register_all(self.executors).await;

        let executor = RuntimeExecutor::new(
            name.clone(),
            Arc::clone(&store),
            registry.clone(),
            Arc::clone(&codec),
            self.config,
        );

        Ok(Scheduler {
            name,
            store,
            codec,
            registry,
            executor: Arc::new(executor),
        })
    }
}

/// 调度器实例
pub struct Scheduler {
    name: String,
    store: Arc<dyn JobStore>,
    codec: Arc<dyn PayloadCodec>,
    registry: DefaultExecutorRegistry,
    executor: Arc<dyn TriggerExecutor>,
}

impl Scheduler {
    pub fn builder(name: impl Into<String>) -> SchedulerBuilder {
        SchedulerBuilder::new(name)
    }

    /// 存储命名空间
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 构建任务和触发器负载时使用的编解码器
    pub fn codec(&self) -> &dyn PayloadCodec {
        self.codec.as_ref()
    }

    pub fn registry(&self) -> &DefaultExecutorRegistry {
        &self.registry
    }

    /// 保存任务并把触发器绑定到该任务
    ///
    /// 触发器写入失败时会删除刚写入的任务，返回写入存储的触发器。
    pub async fn schedule_job(&self, job: &Job, trigger: &Trigger) -> SchedulerResult<Trigger> {
        let trigger = trigger.scheduled_for_job(job.key());

        self.store.insert_job(&self.name, job).await?;
        if let Err(e) = self.store.insert_trigger(&self.name, &trigger).await {
            if let Err(rollback) = self.store.delete_job(&self.name, job.key()).await {
                warn!("回滚任务 {} 失败: {}", job.key(), rollback);
            }
            return Err(e);
        }

        info!(
            "任务 {} 已调度，触发器 {} 首次触发时间 {}",
            job.key(),
            trigger.key(),
            trigger.next_fire_time()
        );
        Ok(trigger)
    }

    /// 整体替换已有任务
    pub async fn update_job(&self, job: &Job) -> SchedulerResult<()> {
        self.store.update_job(&self.name, job).await
    }

    pub async fn get_job(&self, key: &str) -> SchedulerResult<Option<Job>> {
        self.store.get_job(&self.name, key).await
    }

    pub async fn get_trigger(&self, key: &str) -> SchedulerResult<Option<Trigger>> {
        self.store.get_trigger(&self.name, key).await
    }

    pub async fn get_jobs(&self) -> SchedulerResult<Vec<Job>> {
        self.store.get_jobs(&self.name).await
    }

    pub async fn get_triggers(&self) -> SchedulerResult<Vec<Trigger>> {
        self.store.get_triggers(&self.name).await
    }

    /// 删除任务及其全部触发器，并取消本进程持有的定时器
    pub async fn delete_job(&self, key: &str) -> SchedulerResult<bool> {
        let deleted = self.store.delete_job(&self.name, key).await?;
        let trigger_keys = self
            .store
            .delete_triggers_by_job_key(&self.name, key)
            .await?;
        let canceled = self.executor.cancel_triggers(&trigger_keys);

        debug!(
            "删除任务 {}: 删除 {} 个触发器，取消 {} 个定时器",
            key,
            trigger_keys.len(),
            canceled
        );
        Ok(deleted)
    }

    pub async fn delete_trigger(&self, key: &str) -> SchedulerResult<bool> {
        let deleted = self.store.delete_trigger(&self.name, key).await?;
        self.executor.cancel_triggers(&[key.to_string()]);
        Ok(deleted)
    }

    /// 清理已耗尽的触发器，供外部定期调用
    pub async fn purge_exhausted_triggers(&self) -> SchedulerResult<usize> {
        let purged = self.store.delete_exhausted_triggers(&self.name).await?;
        if purged > 0 {
            info!("清理了 {} 个已耗尽的触发器", purged);
        }
        Ok(purged)
    }

    /// 注册任务类型的执行器，同类型后注册的覆盖先注册的
    pub async fn register_executor(
        &self,
        job_type: impl Into<String>,
        executor: Arc<dyn JobExecutor>,
    ) -> &Self {
        self.registry.register(job_type, executor).await;
        self
    }

    pub async fn unregister_executor(&self, job_type: &str) -> bool {
        self.registry.unregister(job_type).await
    }

    pub fn start(&self) {
        info!("启动调度器 {}", self.name);
        self.executor.start();
    }

    /// 停止调度，等待执行中的任务最多 `deadline`
    pub async fn shutdown(&self, deadline: Duration) -> SchedulerResult<()> {
        info!("关闭调度器 {}", self.name);
        self.executor.shutdown(deadline).await
    }
}
