use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use scheduler_core::models::{Job, Trigger, TriggerState};
use scheduler_core::traits::JobStore;
use scheduler_core::{SchedulerError, SchedulerResult};

/// 命名空间（调度器实例名）-> 实体 key -> 记录
type Namespaced<T> = HashMap<String, HashMap<String, T>>;

/// 内存存储实现
///
/// 任务和触发器各用一把读写锁保护，锁只在单次映射读写/扫描期间持有，
/// 不会跨越对调用方代码的回调。多个调度器实例共享同一个 `InMemoryStore`
/// （克隆共享底层数据）即可模拟共享存储下的触发器偷取。
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    jobs: Arc<RwLock<Namespaced<Job>>>,
    triggers: Arc<RwLock<Namespaced<Trigger>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn insert_job(&self, scheduler: &str, job: &Job) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        let namespace = jobs.entry(scheduler.to_string()).or_default();
        if namespace.contains_key(job.key()) {
            return Err(SchedulerError::JobAlreadyExists {
                key: job.key().to_string(),
            });
        }
        namespace.insert(job.key().to_string(), job.clone());
        Ok(())
    }

    async fn insert_trigger(&self, scheduler: &str, trigger: &Trigger) -> SchedulerResult<()> {
        let mut triggers = self.triggers.write().await;
        let namespace = triggers.entry(scheduler.to_string()).or_default();
        if namespace.contains_key(trigger.key()) {
            return Err(SchedulerError::TriggerAlreadyExists {
                key: trigger.key().to_string(),
            });
        }
        namespace.insert(trigger.key().to_string(), trigger.clone());
        Ok(())
    }

    async fn get_job(&self, scheduler: &str, key: &str) -> SchedulerResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(scheduler).and_then(|ns| ns.get(key)).cloned())
    }

    async fn get_trigger(&self, scheduler: &str, key: &str) -> SchedulerResult<Option<Trigger>> {
        let triggers = self.triggers.read().await;
        Ok(triggers.get(scheduler).and_then(|ns| ns.get(key)).cloned())
    }

    async fn update_job(&self, scheduler: &str, job: &Job) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(scheduler).and_then(|ns| ns.get_mut(job.key())) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(SchedulerError::JobNotFound {
                key: job.key().to_string(),
            }),
        }
    }

    async fn update_trigger(&self, scheduler: &str, trigger: &Trigger) -> SchedulerResult<()> {
        let mut triggers = self.triggers.write().await;
        match triggers
            .get_mut(scheduler)
            .and_then(|ns| ns.get_mut(trigger.key()))
        {
            Some(stored) => {
                *stored = trigger.clone();
                Ok(())
            }
            None => Err(SchedulerError::TriggerNotFound {
                key: trigger.key().to_string(),
            }),
        }
    }

    async fn delete_job(&self, scheduler: &str, key: &str) -> SchedulerResult<bool> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs
            .get_mut(scheduler)
            .and_then(|ns| ns.remove(key))
            .is_some())
    }

    async fn delete_trigger(&self, scheduler: &str, key: &str) -> SchedulerResult<bool> {
        let mut triggers = self.triggers.write().await;
        Ok(triggers
            .get_mut(scheduler)
            .and_then(|ns| ns.remove(key))
            .is_some())
    }

    async fn delete_triggers_by_job_key(
        &self,
        scheduler: &str,
        job_key: &str,
    ) -> SchedulerResult<Vec<String>> {
        let mut triggers = self.triggers.write().await;
        let Some(namespace) = triggers.get_mut(scheduler) else {
            return Ok(Vec::new());
        };

        let mut deleted = Vec::new();
        namespace.retain(|key, trigger| {
            if trigger.job_key() == job_key {
                deleted.push(key.clone());
                false
            } else {
                true
            }
        });

        debug!(
            "调度器 {} 删除了任务 {} 的 {} 个触发器",
            scheduler,
            job_key,
            deleted.len()
        );
        Ok(deleted)
    }

    async fn get_jobs(&self, scheduler: &str) -> SchedulerResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(scheduler)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_triggers(&self, scheduler: &str) -> SchedulerResult<Vec<Trigger>> {
        let triggers = self.triggers.read().await;
        Ok(triggers
            .get(scheduler)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn acquire_triggers(&self, scheduler: &str) -> SchedulerResult<Vec<Trigger>> {
        // 写锁覆盖整个扫描+状态迁移，保证并发调用者拿到的集合互不相交
        let mut triggers = self.triggers.write().await;
        let Some(namespace) = triggers.get_mut(scheduler) else {
            return Ok(Vec::new());
        };

        let mut acquired = Vec::new();
        for trigger in namespace.values_mut() {
            if trigger.state() == TriggerState::Scheduled {
                *trigger = trigger.acquired();
                acquired.push(trigger.clone());
            }
        }
        Ok(acquired)
    }

    async fn delete_exhausted_triggers(&self, scheduler: &str) -> SchedulerResult<usize> {
        let mut triggers = self.triggers.write().await;
        let Some(namespace) = triggers.get_mut(scheduler) else {
            return Ok(0);
        };

        let before = namespace.len();
        namespace.retain(|_, trigger| !trigger.is_exhausted());
        Ok(before - namespace.len())
    }
}
