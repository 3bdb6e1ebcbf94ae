//! 本进程持有的定时触发

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use scheduler_core::models::Trigger;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELED: u8 = 2;
const FINISHED: u8 = 3;

/// 认领到的触发器快照加一个待触发的定时器
///
/// 阶段只能单向推进：`Pending -> Running -> Finished` 或 `Pending -> Canceled`。
/// 开始执行和取消都通过 CAS 从 `Pending` 出发，因此二者互斥。
#[derive(Debug)]
pub struct TriggerFuture {
    trigger: Trigger,
    phase: AtomicU8,
    cancel_signal: Notify,
}

impl TriggerFuture {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            phase: AtomicU8::new(PENDING),
            cancel_signal: Notify::new(),
        }
    }

    /// 认领时的快照，触发时用来和存储中的版本比对
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn key(&self) -> &str {
        self.trigger.key()
    }

    /// 距离触发还需等待的时间，已过期则为零
    pub fn delay(&self, now: DateTime<Utc>) -> Duration {
        (self.trigger.next_fire_time() - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// 取消尚未触发的定时器，已经开始执行的无法取消
    pub fn cancel(&self) -> bool {
        let canceled = self.transition(PENDING, CANCELED);
        if canceled {
            // notify_one 会保留许可，定时任务稍后开始等待也能收到
            self.cancel_signal.notify_one();
        }
        canceled
    }

    /// 定时器到期后抢占执行权
    pub fn begin_run(&self) -> bool {
        self.transition(PENDING, RUNNING)
    }

    pub fn finish(&self) {
        let _ = self.transition(RUNNING, FINISHED);
    }

    pub fn is_running(&self) -> bool {
        self.phase.load(Ordering::Acquire) == RUNNING
    }

    pub fn is_canceled(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CANCELED
    }

    pub async fn canceled(&self) {
        self.cancel_signal.notified().await;
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.phase
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::TriggerBuilder;

    fn future() -> TriggerFuture {
        let trigger = TriggerBuilder::new()
            .with_key("t1")
            .with_cron("* * * * * *")
            .in_location("UTC")
            .build()
            .unwrap()
            .scheduled_for_job("job1");
        TriggerFuture::new(trigger)
    }

    #[test]
    fn test_cancel_and_run_are_exclusive() {
        let f = future();
        assert!(f.cancel());
        assert!(f.is_canceled());
        assert!(!f.begin_run());
        assert!(!f.cancel());

        let f = future();
        assert!(f.begin_run());
        assert!(f.is_running());
        assert!(!f.cancel());
        f.finish();
        assert!(!f.is_running());
        assert!(!f.is_canceled());
    }

    #[test]
    fn test_delay_never_negative() {
        let f = future();
        let next = f.trigger().next_fire_time();

        assert_eq!(f.delay(next + chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(
            f.delay(next - chrono::Duration::milliseconds(1500)),
            Duration::from_millis(1500)
        );
    }

    #[tokio::test]
    async fn test_cancel_before_wait_is_not_lost() {
        let f = future();
        assert!(f.cancel());
        tokio::time::timeout(Duration::from_secs(1), f.canceled())
            .await
            .unwrap();
    }
}
