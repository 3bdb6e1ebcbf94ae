//! 负载编解码
//!
//! 任务和触发器的负载统一为字节序列。`PayloadCodec` 决定字节格式，
//! 调用方通过 [`encode_payload`] / [`decode_payload`] 显式地在具体类型和字节之间转换。

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{SchedulerError, SchedulerResult};

/// 可插拔的负载序列化器
pub trait PayloadCodec: Send + Sync + std::fmt::Debug {
    fn to_bytes(&self, value: &serde_json::Value) -> SchedulerResult<Vec<u8>>;

    fn from_bytes(&self, bytes: &[u8]) -> SchedulerResult<serde_json::Value>;
}

/// 默认的 JSON 编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn to_bytes(&self, value: &serde_json::Value) -> SchedulerResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_bytes(&self, bytes: &[u8]) -> SchedulerResult<serde_json::Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub fn encode_payload<T: Serialize>(codec: &dyn PayloadCodec, value: &T) -> SchedulerResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    codec.to_bytes(&value)
}

/// 解码负载，空负载返回 `NoData`
pub fn decode_payload<T: DeserializeOwned>(
    codec: &dyn PayloadCodec,
    bytes: &[u8],
) -> SchedulerResult<T> {
    if bytes.is_empty() {
        return Err(SchedulerError::NoData);
    }
    let value = codec.from_bytes(bytes)?;
    Ok(serde_json::from_value(value)?)
}
