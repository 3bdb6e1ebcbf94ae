use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::codec::{decode_payload, PayloadCodec};
use crate::models::{Job, Trigger};
use crate::SchedulerResult;

/// 任务执行上下文
///
/// 每次触发生成一份，持有本次触发时从存储重新读取的任务和触发器快照（只读）。
#[derive(Debug, Clone)]
pub struct JobContext {
    job: Job,
    trigger: Trigger,
    codec: Arc<dyn PayloadCodec>,
}

impl JobContext {
    pub fn new(job: Job, trigger: Trigger, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            job,
            trigger,
            codec,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// 解码任务负载，空负载返回 `NoData`
    pub fn job_data<T: DeserializeOwned>(&self) -> SchedulerResult<T> {
        decode_payload(self.codec.as_ref(), self.job.data())
    }

    /// 解码触发器负载，空负载返回 `NoData`
    pub fn trigger_data<T: DeserializeOwned>(&self) -> SchedulerResult<T> {
        decode_payload(self.codec.as_ref(), self.trigger.data())
    }
}
