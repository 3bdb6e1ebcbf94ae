use serde::{Deserialize, Serialize};

use crate::codec::{encode_payload, PayloadCodec};
use crate::{SchedulerError, SchedulerResult};

/// 任务构建器（可变阶段）
///
/// ```rust
/// use scheduler_core::models::JobBuilder;
///
/// let job = JobBuilder::new()
///     .with_key("daily-report")
///     .with_type("report")
///     .with_data(b"{\"day\":1}".to_vec())
///     .build()
///     .unwrap();
/// assert_eq!(job.job_type(), "report");
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobBuilder {
    key: String,
    job_type: String,
    data: Vec<u8>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = job_type.into();
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// 使用 `codec` 把 `value` 编码为负载
    pub fn with_payload<T: Serialize>(
        mut self,
        codec: &dyn PayloadCodec,
        value: &T,
    ) -> SchedulerResult<Self> {
        self.data = encode_payload(codec, value)?;
        Ok(self)
    }

    /// 校验并转换为不可变任务
    pub fn build(self) -> SchedulerResult<Job> {
        if self.key.trim().is_empty() {
            return Err(SchedulerError::EmptyJobKey);
        }
        if self.job_type.trim().is_empty() {
            return Err(SchedulerError::EmptyJobType);
        }

        Ok(Job {
            key: self.key,
            job_type: self.job_type,
            data: self.data,
        })
    }
}

/// 任务定义（不可变）
///
/// 只能通过存储的更新操作整体替换，没有字段级别的修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobRecord", into = "JobRecord")]
pub struct Job {
    key: String,
    job_type: String,
    data: Vec<u8>,
}

impl Job {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 回到可变阶段，用于构造替换记录
    pub fn to_builder(&self) -> JobBuilder {
        JobBuilder {
            key: self.key.clone(),
            job_type: self.job_type.clone(),
            data: self.data.clone(),
        }
    }
}

/// 任务的持久化形式，反序列化时走构建器的校验
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    key: String,
    job_type: String,
    #[serde(default)]
    data: Vec<u8>,
}

impl From<Job> for JobRecord {
    fn from(job: Job) -> Self {
        Self {
            key: job.key,
            job_type: job.job_type,
            data: job.data,
        }
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = SchedulerError;

    fn try_from(r: JobRecord) -> Result<Self, Self::Error> {
        JobBuilder::new()
            .with_key(r.key)
            .with_type(r.job_type)
            .with_data(r.data)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn test_build_requires_key_and_type() {
        assert!(matches!(
            JobBuilder::new().with_type("shell").build(),
            Err(SchedulerError::EmptyJobKey)
        ));
        assert!(matches!(
            JobBuilder::new().with_key("j1").build(),
            Err(SchedulerError::EmptyJobType)
        ));

        let job = JobBuilder::new()
            .with_key("j1")
            .with_type("shell")
            .build()
            .unwrap();
        assert_eq!(job.key(), "j1");
        assert!(job.data().is_empty());
    }

    #[test]
    fn test_with_payload_encodes_value() {
        let job = JobBuilder::new()
            .with_key("j1")
            .with_type("shell")
            .with_payload(&JsonCodec, &serde_json::json!({"command": "ls"}))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(job.data(), br#"{"command":"ls"}"#);

        let replaced = job.to_builder().with_type("http").build().unwrap();
        assert_eq!(replaced.key(), "j1");
        assert_eq!(replaced.job_type(), "http");
        assert_eq!(replaced.data(), job.data());
    }

    #[test]
    fn test_deserialize_revalidates_record() {
        let job = JobBuilder::new()
            .with_key("j1")
            .with_type("shell")
            .with_data(b"x".to_vec())
            .build()
            .unwrap();
        let json = serde_json::to_string(&job).unwrap();
        let restored: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, job);

        let no_data: Job = serde_json::from_str(r#"{"key":"j2","job_type":"shell"}"#).unwrap();
        assert!(no_data.data().is_empty());

        assert!(serde_json::from_str::<Job>(r#"{"key":"","job_type":"shell"}"#).is_err());
        assert!(serde_json::from_str::<Job>(r#"{"key":"j3","job_type":"  "}"#).is_err());
    }
}
