use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use crate::models::TriggerLocation;
use crate::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
///
/// 表达式为带秒字段的 6 段（或带年份的 7 段）格式，例如 `*/5 * * * * *`。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        if cron_expr.trim().is_empty() {
            return Err(SchedulerError::EmptyCronSpec);
        }

        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    pub fn expression(&self) -> &str {
        self.schedule.source()
    }

    /// 获取严格晚于 `after` 的下一次执行时间，在 `location` 时区内求值
    pub fn next_execution_time(
        &self,
        after: DateTime<Utc>,
        location: &TriggerLocation,
    ) -> Option<DateTime<Utc>> {
        location.next_after(&self.schedule, after)
    }

    /// 考虑 `[from, to]` 时间窗口后的下一次执行时间
    ///
    /// 从 `max(now, from)` 开始求值；没有候选时间，或候选时间晚于 `to` 时返回 `None`，
    /// 表示触发器不会再触发。
    pub fn next_in_window(
        &self,
        now: DateTime<Utc>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        location: &TriggerLocation,
    ) -> Option<DateTime<Utc>> {
        let start = match from {
            Some(from) if from > now => from,
            _ => now,
        };

        let next = self.next_execution_time(start, location)?;
        if let Some(to) = to {
            if next > to {
                debug!(
                    "CRON {} 的下一次执行时间 {} 超出窗口结束时间 {}",
                    self.expression(),
                    next.format("%Y-%m-%d %H:%M:%S UTC"),
                    to.format("%Y-%m-%d %H:%M:%S UTC")
                );
                return None;
            }
        }

        Some(next)
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// 两个时间点的差是否在 `delta` 以内（含边界）
pub fn is_near(a: DateTime<Utc>, b: DateTime<Utc>, delta: chrono::Duration) -> bool {
    (a - b).abs() <= delta
}
