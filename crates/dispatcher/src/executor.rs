use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use scheduler_core::{
    cron_utils::is_near,
    models::{Trigger, TriggerState},
    traits::{JobExecutor, JobStore, TriggerExecutor},
    DefaultExecutorRegistry, ExecutorConfig, JobContext, PayloadCodec, SchedulerError,
    SchedulerResult,
};

use crate::future::TriggerFuture;
use crate::in_flight::InFlightTracker;

/// 运行时执行器
///
/// 一个后台轮询任务定期从存储认领 `Scheduled` 的触发器，为每个触发器创建定时任务；
/// 到期后重新读取触发器和任务，调用注册的处理器，再把推进后的触发器写回存储。
pub struct RuntimeExecutor {
    inner: Arc<ExecutorInner>,
    shutdown_tx: broadcast::Sender<()>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

struct ExecutorInner {
    scheduler_name: String,
    store: Arc<dyn JobStore>,
    registry: DefaultExecutorRegistry,
    codec: Arc<dyn PayloadCodec>,
    config: ExecutorConfig,
    futures: Mutex<HashMap<String, Arc<TriggerFuture>>>,
    in_flight: InFlightTracker,
    /// 关闭开始后置位；与 `futures` 在同一把锁下读写
    stopping: AtomicBool,
}

impl RuntimeExecutor {
    pub fn new(
        scheduler_name: impl Into<String>,
        store: Arc<dyn JobStore>,
        registry: DefaultExecutorRegistry,
        codec: Arc<dyn PayloadCodec>,
        config: ExecutorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(ExecutorInner {
                scheduler_name: scheduler_name.into(),
                store,
                registry,
                codec,
                config,
                futures: Mutex::new(HashMap::new()),
                in_flight: InFlightTracker::new(),
                stopping: AtomicBool::new(false),
            }),
            shutdown_tx,
            poll_handle: Mutex::new(None),
        }
    }

    pub fn scheduler_name(&self) -> &str {
        &self.inner.scheduler_name
    }

    /// 本进程当前持有的触发器数量（等待中和执行中）
    pub fn tracked_triggers(&self) -> usize {
        self.inner.lock_futures().len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.count()
    }

    pub fn is_started(&self) -> bool {
        self.poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl TriggerExecutor for RuntimeExecutor {
    fn start(&self) {
        let mut handle = self
            .poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            warn!("执行器 {} 已经启动", self.inner.scheduler_name);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("启动执行器失败，当前不在 tokio 运行时中: {}", e);
                return;
            }
        };

        self.inner.stopping.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *handle = Some(runtime.spawn(inner.poll_loop(shutdown_rx)));
        info!("执行器 {} 已启动", self.inner.scheduler_name);
    }

    async fn shutdown(&self, deadline: Duration) -> SchedulerResult<()> {
        info!("开始关闭执行器 {}", self.inner.scheduler_name);
        let started = Instant::now();
        let budget = || deadline.saturating_sub(started.elapsed());
        let mut on_time = true;

        // 置位后轮询任务认领到的批次不再进入本地表，由它自己归还
        {
            let _futures = self.inner.lock_futures();
            self.inner.stopping.store(true, Ordering::SeqCst);
        }
        let _ = self.shutdown_tx.send(());

        let handle = self
            .poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            match tokio::time::timeout(budget(), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("轮询任务异常退出: {}", e),
                Err(_) => {
                    on_time = false;
                    warn!("轮询任务仍在等待存储返回，转入后台退出");
                }
            }
        }

        let pending: Vec<Arc<TriggerFuture>> = {
            let mut futures = self.inner.lock_futures();
            let keys: Vec<String> = futures
                .iter()
                .filter(|(_, future)| future.cancel())
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| futures.remove(key)).collect()
        };

        if !pending.is_empty() {
            let canceled = pending.len();
            let inner = Arc::clone(&self.inner);
            let mut releasing = tokio::spawn(async move {
                let triggers: Vec<&Trigger> =
                    pending.iter().map(|future| future.trigger()).collect();
                inner.release_all(triggers).await
            });
            match tokio::time::timeout(budget(), &mut releasing).await {
                Ok(Ok(released)) => info!(
                    "已取消 {} 个未触发的定时器，其中 {} 个归还到存储",
                    canceled, released
                ),
                Ok(Err(e)) => error!("归还触发器的任务异常退出: {}", e),
                Err(_) => {
                    on_time = false;
                    warn!("归还 {} 个触发器超时，转入后台继续", canceled);
                }
            }
        }

        match self.inner.in_flight.wait_idle(budget()).await {
            Ok(()) if on_time => {
                info!("执行器 {} 已关闭", self.inner.scheduler_name);
                Ok(())
            }
            Ok(()) => {
                warn!("关闭超时 ({:?})，存储操作仍在后台进行", deadline);
                Err(SchedulerError::ShutdownTimeout { remaining: 0 })
            }
            Err(remaining) => {
                warn!(
                    "等待执行中的任务超时 ({:?})，仍有 {} 个任务在后台继续执行",
                    deadline, remaining
                );
                Err(SchedulerError::ShutdownTimeout { remaining })
            }
        }
    }

    fn cancel_triggers(&self, keys: &[String]) -> usize {
        let mut futures = self.inner.lock_futures();
        let mut canceled = 0;
        for key in keys {
            let removable = futures.get(key).is_some_and(|future| future.cancel());
            if removable {
                futures.remove(key);
                canceled += 1;
            }
        }
        if canceled > 0 {
            debug!("取消了 {} 个定时器", canceled);
        }
        canceled
    }
}

impl ExecutorInner {
    fn lock_futures(&self) -> MutexGuard<'_, HashMap<String, Arc<TriggerFuture>>> {
        self.futures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let span = info_span!("trigger_stealing", scheduler = %self.scheduler_name);
        async move {
            let mut failures: i32 = 0;
            loop {
                let wait = match self.steal_triggers().await {
                    Ok(_) => {
                        failures = 0;
                        self.config.trigger_steal_interval()
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let backoff = self.poll_backoff(failures);
                        if e.is_transient() {
                            warn!("认领触发器失败 (连续 {} 次)，{:?} 后重试: {}", failures, backoff, e);
                        } else {
                            error!("认领触发器失败 (连续 {} 次)，{:?} 后重试: {}", failures, backoff, e);
                        }
                        backoff
                    }
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("收到关闭信号，停止认领触发器");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
        .instrument(span)
        .await
    }

    /// 存储不可用时的轮询间隔：指数退避，封顶后加随机抖动
    fn poll_backoff(&self, failures: i32) -> Duration {
        let base = self.config.trigger_steal_interval().as_secs_f64();
        let max = self.config.max_poll_backoff().as_secs_f64().max(base);

        let exponential = base * 2f64.powi(failures.min(16));
        let capped = exponential.min(max);

        let jitter = capped * 0.1 * (rand::random::<f64>() - 0.5) * 2.0;
        Duration::from_secs_f64((capped + jitter).clamp(base, max))
    }

    async fn steal_triggers(self: &Arc<Self>) -> SchedulerResult<usize> {
        let triggers = self.store.acquire_triggers(&self.scheduler_name).await?;
        let acquired = triggers.len();
        if acquired == 0 {
            return Ok(0);
        }

        counter!("scheduler_triggers_acquired_total").increment(acquired as u64);
        debug!("认领到 {} 个触发器", acquired);

        let batch: Vec<Arc<TriggerFuture>> = triggers
            .into_iter()
            .map(|trigger| Arc::new(TriggerFuture::new(trigger)))
            .collect();

        let accepted = {
            let mut futures = self.lock_futures();
            if self.stopping.load(Ordering::SeqCst) {
                false
            } else {
                for future in &batch {
                    let previous = futures.insert(future.key().to_string(), Arc::clone(future));
                    if let Some(previous) = previous {
                        if previous.cancel() {
                            warn!("触发器 {} 被重复认领，取消旧的定时器", previous.key());
                        }
                    }
                }
                true
            }
        };

        if !accepted {
            let released = self
                .release_all(batch.iter().map(|future| future.trigger()).collect())
                .await;
            info!("执行器正在关闭，归还刚认领的 {} 个触发器中的 {} 个", acquired, released);
            return Ok(0);
        }

        for future in batch {
            self.schedule(future);
        }
        Ok(acquired)
    }

    fn schedule(self: &Arc<Self>, future: Arc<TriggerFuture>) {
        let delay = future.delay(Utc::now());
        debug!("触发器 {} 将在 {:?} 后触发", future.key(), delay);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let fired = tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = future.canceled() => false,
            };
            if fired {
                inner.fire(future).await;
            }
        });
    }

    /// 依次归还触发器，返回成功归还的数量
    async fn release_all(&self, triggers: Vec<&Trigger>) -> usize {
        let mut released = 0;
        for trigger in triggers {
            if self.release(trigger).await {
                released += 1;
            }
        }
        released
    }

    /// 归还一个未执行的触发器：存储中仍是本次认领的版本时改回 `Scheduled`
    async fn release(&self, snapshot: &Trigger) -> bool {
        let stored = match self
            .store
            .get_trigger(&self.scheduler_name, snapshot.key())
            .await
        {
            Ok(Some(trigger)) => trigger,
            Ok(None) => return false,
            Err(e) => {
                error!("归还触发器 {} 时读取失败: {}", snapshot.key(), e);
                return false;
            }
        };

        if stored.state() != TriggerState::Acquired
            || !is_near(
                stored.next_fire_time(),
                snapshot.next_fire_time(),
                self.config.fire_time_tolerance(),
            )
        {
            debug!("触发器 {} 已被其他调用方修改，不再归还", snapshot.key());
            return false;
        }

        match self
            .store
            .update_trigger(&self.scheduler_name, &stored.released())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("归还触发器 {} 失败: {}", snapshot.key(), e);
                false
            }
        }
    }

    async fn fire(self: Arc<Self>, future: Arc<TriggerFuture>) {
        let span = info_span!(
            "fire_trigger",
            scheduler = %self.scheduler_name,
            trigger = %future.key()
        );
        async move {
            // 先登记再抢执行权，关闭流程看到计数为零时不会有任务刚开始
            let _in_flight = self.in_flight.enter();
            if !future.begin_run() {
                debug!("定时器已取消，跳过");
                return;
            }
            let _cleanup = RunCleanup {
                inner: Arc::clone(&self),
                future: Arc::clone(&future),
            };
            self.run_trigger(future.trigger()).await;
        }
        .instrument(span)
        .await
    }

    async fn run_trigger(&self, snapshot: &Trigger) {
        let name = &self.scheduler_name;

        let trigger = match self.store.get_trigger(name, snapshot.key()).await {
            Ok(Some(trigger)) => trigger,
            Ok(None) => {
                warn!("触发器已被删除，跳过本次触发");
                return;
            }
            Err(e) => {
                error!("读取触发器失败: {}", e);
                return;
            }
        };

        if !is_near(
            trigger.next_fire_time(),
            snapshot.next_fire_time(),
            self.config.fire_time_tolerance(),
        ) {
            counter!("scheduler_triggers_stale_total").increment(1);
            warn!(
                "触发器已被并发修改 (存储: {}, 本地: {})，跳过本次触发",
                trigger.next_fire_time(),
                snapshot.next_fire_time()
            );
            return;
        }

        let job = match self.store.get_job(name, trigger.job_key()).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("任务 {} 不存在，跳过本次触发", trigger.job_key());
                return;
            }
            Err(e) => {
                error!("读取任务 {} 失败: {}", trigger.job_key(), e);
                return;
            }
        };

        let Some(executor) = self.registry.get_executor(job.job_type()).await else {
            error!("任务类型 {} 没有注册执行器", job.job_type());
            return;
        };

        let job_type = job.job_type().to_string();
        let ctx = JobContext::new(job, trigger.clone(), Arc::clone(&self.codec));

        let started = Instant::now();
        let result = self.run_job(executor, ctx).await;
        let elapsed = started.elapsed();

        histogram!("scheduler_job_duration_seconds", "job_type" => job_type.clone())
            .record(elapsed.as_secs_f64());
        counter!("scheduler_jobs_fired_total", "job_type" => job_type.clone()).increment(1);

        match &result {
            Ok(()) => info!("任务执行成功，耗时 {:?}", elapsed),
            Err(e) => {
                counter!("scheduler_jobs_failed_total", "job_type" => job_type).increment(1);
                warn!("任务执行失败，耗时 {:?}: {}", elapsed, e);
            }
        }

        // 无论成功与否都推进触发器
        let next = trigger.after_run(Utc::now());
        if let Err(e) = self.store.update_trigger(name, &next).await {
            error!("更新触发器失败，触发器将保持认领状态: {}", e);
            return;
        }

        if next.is_exhausted() {
            info!("触发器已耗尽，共触发 {} 次", next.triggered_count());
        } else {
            debug!("下次触发时间: {}", next.next_fire_time());
        }
    }

    /// 在独立任务中运行处理器：panic 转成 `JobPanicked`，超时转成 `DeadlineExceeded`
    async fn run_job(
        &self,
        executor: Arc<dyn JobExecutor>,
        ctx: JobContext,
    ) -> SchedulerResult<()> {
        let job_timeout = self.config.job_timeout();
        let mut handle = tokio::spawn(async move { executor.execute(ctx).await });

        match tokio::time::timeout(job_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => Err(SchedulerError::JobPanicked(panic_message(
                e.into_panic(),
            ))),
            Ok(Err(e)) => Err(SchedulerError::JobExecution(format!("任务被中止: {e}"))),
            Err(_) => {
                handle.abort();
                Err(SchedulerError::DeadlineExceeded {
                    timeout_ms: job_timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// 执行结束时从本地表移除，只移除自己那一项
struct RunCleanup {
    inner: Arc<ExecutorInner>,
    future: Arc<TriggerFuture>,
}

impl Drop for RunCleanup {
    fn drop(&mut self) {
        self.future.finish();
        let mut futures = self.inner.lock_futures();
        let same = futures
            .get(self.future.key())
            .is_some_and(|current| Arc::ptr_eq(current, &self.future));
        if same {
            futures.remove(self.future.key());
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知的panic".to_string()
    }
}
