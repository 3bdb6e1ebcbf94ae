use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{encode_payload, PayloadCodec};
use crate::cron_utils::CronScheduler;
use crate::models::location::{TriggerLocation, LOCAL_LOCATION};
use crate::{SchedulerError, SchedulerResult};

/// 触发次数上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeats {
    #[default]
    Infinite,
    Times(u32),
}

impl Repeats {
    /// 已触发 `triggered_count` 次后是否达到上限
    pub fn is_reached(&self, triggered_count: u32) -> bool {
        match self {
            Repeats::Infinite => false,
            Repeats::Times(limit) => triggered_count >= *limit,
        }
    }
}

/// 触发器状态
///
/// - `Scheduled`: 可以被任意调度器实例认领
/// - `Acquired`: 已被某个执行器认领，定时器等待中或任务正在执行
/// - `Exhausted`: 终态，不会再触发，可以被清理
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TriggerState {
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "ACQUIRED")]
    Acquired,
    #[serde(rename = "EXHAUSTED")]
    Exhausted,
}

/// 触发器构建器（可变阶段）
#[derive(Debug, Clone)]
pub struct TriggerBuilder {
    key: String,
    cron_spec: String,
    location: String,
    from_time: Option<DateTime<Utc>>,
    to_time: Option<DateTime<Utc>>,
    repeats: Repeats,
    data: Vec<u8>,
}

impl Default for TriggerBuilder {
    fn default() -> Self {
        Self {
            key: String::new(),
            cron_spec: String::new(),
            location: LOCAL_LOCATION.to_string(),
            from_time: None,
            to_time: None,
            repeats: Repeats::Infinite,
            data: Vec::new(),
        }
    }
}

impl TriggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_cron(mut self, spec: impl Into<String>) -> Self {
        self.cron_spec = spec.into();
        self
    }

    /// IANA 时区名，默认 `Local`
    pub fn in_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_from_time(mut self, from: DateTime<Utc>) -> Self {
        self.from_time = Some(from);
        self
    }

    pub fn with_to_time(mut self, to: DateTime<Utc>) -> Self {
        self.to_time = Some(to);
        self
    }

    pub fn with_repeats(mut self, repeats: Repeats) -> Self {
        self.repeats = repeats;
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_payload<T: Serialize>(
        mut self,
        codec: &dyn PayloadCodec,
        value: &T,
    ) -> SchedulerResult<Self> {
        self.data = encode_payload(codec, value)?;
        Ok(self)
    }

    /// 以当前时间为基准校验并转换为不可变触发器
    pub fn build(self) -> SchedulerResult<Trigger> {
        self.build_at(Utc::now())
    }

    /// 以 `now` 为基准校验并计算首次触发时间
    pub fn build_at(self, now: DateTime<Utc>) -> SchedulerResult<Trigger> {
        if self.key.trim().is_empty() {
            return Err(SchedulerError::EmptyTriggerKey);
        }
        if self.cron_spec.trim().is_empty() {
            return Err(SchedulerError::EmptyCronSpec);
        }

        let location = TriggerLocation::parse(&self.location)?;
        let schedule = CronScheduler::new(&self.cron_spec)?;

        if self.repeats.is_reached(0) {
            return Err(SchedulerError::AlreadyExhausted { key: self.key });
        }

        let next_fire_time = schedule
            .next_in_window(now, self.from_time, self.to_time, &location)
            .ok_or_else(|| SchedulerError::AlreadyExhausted {
                key: self.key.clone(),
            })?;

        Ok(Trigger {
            key: self.key,
            job_key: String::new(),
            cron_spec: self.cron_spec,
            location,
            from_time: self.from_time,
            to_time: self.to_time,
            repeats: self.repeats,
            data: self.data,
            state: TriggerState::Scheduled,
            triggered_count: 0,
            next_fire_time,
            schedule,
        })
    }
}

/// 触发器运行时字段的修改
///
/// 未设置的字段保持原值，配合 [`Trigger::with_state`] 生成新的快照。
#[derive(Debug, Clone, Default)]
pub struct TriggerPatch {
    pub job_key: Option<String>,
    pub state: Option<TriggerState>,
    pub triggered_count: Option<u32>,
    pub next_fire_time: Option<DateTime<Utc>>,
}

impl TriggerPatch {
    pub fn state(state: TriggerState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }
}

/// 触发器（不可变快照）
///
/// 身份字段和 CRON 表达式创建后不再变化；`state`、`triggered_count`、
/// `next_fire_time` 只能通过 [`Trigger::with_state`] 生成新快照后写回存储。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TriggerRecord", into = "TriggerRecord")]
pub struct Trigger {
    key: String,
    job_key: String,
    cron_spec: String,
    location: TriggerLocation,
    from_time: Option<DateTime<Utc>>,
    to_time: Option<DateTime<Utc>>,
    repeats: Repeats,
    data: Vec<u8>,
    state: TriggerState,
    triggered_count: u32,
    next_fire_time: DateTime<Utc>,
    schedule: CronScheduler,
}

impl Trigger {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn job_key(&self) -> &str {
        &self.job_key
    }

    pub fn cron_spec(&self) -> &str {
        &self.cron_spec
    }

    pub fn location(&self) -> &TriggerLocation {
        &self.location
    }

    pub fn from_time(&self) -> Option<DateTime<Utc>> {
        self.from_time
    }

    pub fn to_time(&self) -> Option<DateTime<Utc>> {
        self.to_time
    }

    pub fn repeats(&self) -> Repeats {
        self.repeats
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn triggered_count(&self) -> u32 {
        self.triggered_count
    }

    pub fn next_fire_time(&self) -> DateTime<Utc> {
        self.next_fire_time
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == TriggerState::Exhausted
    }

    /// 复制当前快照并应用 `patch`
    pub fn with_state(&self, patch: TriggerPatch) -> Trigger {
        let mut next = self.clone();
        if let Some(job_key) = patch.job_key {
            next.job_key = job_key;
        }
        if let Some(state) = patch.state {
            next.state = state;
        }
        if let Some(count) = patch.triggered_count {
            next.triggered_count = count;
        }
        if let Some(time) = patch.next_fire_time {
            next.next_fire_time = time;
        }
        next
    }

    /// 调度时绑定到任务，状态重置为 `Scheduled`
    pub fn scheduled_for_job(&self, job_key: &str) -> Trigger {
        self.with_state(TriggerPatch {
            job_key: Some(job_key.to_string()),
            state: Some(TriggerState::Scheduled),
            ..Default::default()
        })
    }

    pub fn acquired(&self) -> Trigger {
        self.with_state(TriggerPatch::state(TriggerState::Acquired))
    }

    /// 认领后未执行就归还
    pub fn released(&self) -> Trigger {
        self.with_state(TriggerPatch::state(TriggerState::Scheduled))
    }

    /// 一次执行结束后（无论成功与否）的下一个状态
    ///
    /// 触发次数加一；达到上限或窗口内没有下一次触发时间时进入 `Exhausted`，
    /// 否则回到 `Scheduled` 并推进 `next_fire_time`。
    pub fn after_run(&self, now: DateTime<Utc>) -> Trigger {
        let triggered_count = self.triggered_count.saturating_add(1);

        let next_fire_time = if self.repeats.is_reached(triggered_count) {
            None
        } else {
            // 定时器可能比触发时间略早醒来，从刚触发的时间点之后算起
            let after = now.max(self.next_fire_time);
            self.schedule
                .next_in_window(after, self.from_time, self.to_time, &self.location)
        };

        match next_fire_time {
            Some(next) => self.with_state(TriggerPatch {
                state: Some(TriggerState::Scheduled),
                triggered_count: Some(triggered_count),
                next_fire_time: Some(next),
                ..Default::default()
            }),
            None => self.with_state(TriggerPatch {
                state: Some(TriggerState::Exhausted),
                triggered_count: Some(triggered_count),
                ..Default::default()
            }),
        }
    }
}

/// 触发器的持久化形式，反序列化时重新解析时区和 CRON 表达式
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TriggerRecord {
    key: String,
    job_key: String,
    cron_spec: String,
    location: String,
    from_time: Option<DateTime<Utc>>,
    to_time: Option<DateTime<Utc>>,
    repeats: Repeats,
    #[serde(default)]
    data: Vec<u8>,
    state: TriggerState,
    triggered_count: u32,
    next_fire_time: DateTime<Utc>,
}

impl From<Trigger> for TriggerRecord {
    fn from(t: Trigger) -> Self {
        Self {
            location: t.location.name().to_string(),
            key: t.key,
            job_key: t.job_key,
            cron_spec: t.cron_spec,
            from_time: t.from_time,
            to_time: t.to_time,
            repeats: t.repeats,
            data: t.data,
            state: t.state,
            triggered_count: t.triggered_count,
            next_fire_time: t.next_fire_time,
        }
    }
}

impl TryFrom<TriggerRecord> for Trigger {
    type Error = SchedulerError;

    fn try_from(r: TriggerRecord) -> Result<Self, Self::Error> {
        if r.key.trim().is_empty() {
            return Err(SchedulerError::EmptyTriggerKey);
        }
        let location = TriggerLocation::parse(&r.location)?;
        let schedule = CronScheduler::new(&r.cron_spec)?;

        Ok(Self {
            key: r.key,
            job_key: r.job_key,
            cron_spec: r.cron_spec,
            location,
            from_time: r.from_time,
            to_time: r.to_time,
            repeats: r.repeats,
            data: r.data,
            state: r.state,
            triggered_count: r.triggered_count,
            next_fire_time: r.next_fire_time,
            schedule,
        })
    }
}
