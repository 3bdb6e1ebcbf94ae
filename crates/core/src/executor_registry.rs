use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::traits::JobExecutor;

/// 任务类型 -> 处理器 的并发映射，同一类型以最后一次注册为准
#[derive(Clone, Default)]
pub struct DefaultExecutorRegistry {
    executors: Arc<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>,
}

impl DefaultExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job_type: impl Into<String>, executor: Arc<dyn JobExecutor>) {
        let job_type = job_type.into();
        debug!("注册任务处理器: {}", job_type);
        self.executors.write().await.insert(job_type, executor);
    }

    pub async fn register_all<I>(&self, executors: I)
    where
        I: IntoIterator<Item = (String, Arc<dyn JobExecutor>)>,
    {
        let mut registry = self.executors.write().await;
        for (job_type, executor) in executors {
            registry.insert(job_type, executor);
        }
    }

    /// 返回该类型之前是否已注册
    pub async fn unregister(&self, job_type: &str) -> bool {
        self.executors.write().await.remove(job_type).is_some()
    }

    pub async fn get_executor(&self, job_type: &str) -> Option<Arc<dyn JobExecutor>> {
        self.executors.read().await.get(job_type).cloned()
    }

    pub async fn contains(&self, job_type: &str) -> bool {
        self.executors.read().await.contains_key(job_type)
    }

    pub async fn job_types(&self) -> Vec<String> {
        self.executors.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.executors.read().await.len()
    }
}

impl std::fmt::Debug for DefaultExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultExecutorRegistry").finish_non_exhaustive()
    }
}
