use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// 正在执行的任务计数
///
/// 关闭时需要在截止时间内等计数归零，同时允许并发读取当前值。
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    count: Arc<watch::Sender<usize>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0usize);
        Self {
            count: Arc::new(tx),
        }
    }

    /// 登记一次执行，返回的守卫在任意退出路径上释放计数
    pub fn enter(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// 等待计数归零；超时返回仍在执行的数量
    pub async fn wait_idle(&self, deadline: Duration) -> Result<(), usize> {
        let mut rx = self.count.subscribe();
        // `wait_for` 返回的 Ref 借用 rx，结果须在 rx 释放前落到局部变量
        let idle = match tokio::time::timeout(deadline, rx.wait_for(|n| *n == 0)).await {
            Ok(Ok(_)) => true,
            // 发送端由 self 持有，不会提前关闭
            Ok(Err(_)) => true,
            Err(_) => false,
        };
        if idle {
            Ok(())
        } else {
            Err(self.count())
        }
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}
