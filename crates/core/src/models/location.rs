use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{SchedulerError, SchedulerResult};

/// 进程本地时区的名称
pub const LOCAL_LOCATION: &str = "Local";

/// 触发器计算触发时间时使用的时区
///
/// 存储中的时间点统一为 UTC，CRON 表达式则在触发器自己的时区里求值，
/// 因此 `0 0 9 * * *` 在 `Asia/Shanghai` 下表示上海时间每天 9 点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerLocation {
    /// 进程本地时区
    #[default]
    Local,
    /// IANA 时区
    Zone(Tz),
}

impl TriggerLocation {
    pub fn parse(name: &str) -> SchedulerResult<Self> {
        let name = name.trim();
        if name.is_empty() || name == LOCAL_LOCATION {
            return Ok(TriggerLocation::Local);
        }

        name.parse::<Tz>()
            .map(TriggerLocation::Zone)
            .map_err(|e| SchedulerError::InvalidLocation {
                location: name.to_string(),
                message: e.to_string(),
            })
    }

    pub fn name(&self) -> &str {
        match self {
            TriggerLocation::Local => LOCAL_LOCATION,
            TriggerLocation::Zone(tz) => tz.name(),
        }
    }

    /// 在本时区内求 `schedule` 严格晚于 `after` 的下一个触发时间点
    pub(crate) fn next_after(
        &self,
        schedule: &cron::Schedule,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            TriggerLocation::Local => next_in_zone(schedule, &after.with_timezone(&Local)),
            TriggerLocation::Zone(tz) => next_in_zone(schedule, &after.with_timezone(tz)),
        }
    }
}

fn next_in_zone<Z: TimeZone>(
    schedule: &cron::Schedule,
    after: &DateTime<Z>,
) -> Option<DateTime<Utc>> {
    schedule
        .after(after)
        .next()
        .map(|next| next.with_timezone(&Utc))
}

impl FromStr for TriggerLocation {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TriggerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
