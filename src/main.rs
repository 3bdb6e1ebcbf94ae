use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use scheduler_core::config::SeedJobConfig;
use trigger_scheduler::{
    encode_payload, executor_fn, AppConfig, JobBuilder, Repeats, Scheduler, SchedulerError,
    TriggerBuilder,
};

/// 清理已耗尽触发器的间隔
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("trigger-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("基于CRON的周期任务调度器")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时依次尝试 config/scheduler.toml 和 scheduler.toml"),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .value_name("NAME")
                .help("调度器实例名，覆盖配置文件"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str)).context("加载配置失败")?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    if let Some(name) = matches.get_one::<String>("name") {
        config.scheduler.name = name.clone();
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    let name = instance_name(&config.scheduler.name)?;
    info!("启动调度器实例 {}", name);

    let scheduler = Scheduler::builder(name)
        .with_config(config.executor.clone())
        .with_executor(
            "log",
            executor_fn(|ctx| async move {
                let data: serde_json::Value = match ctx.job_data() {
                    Ok(data) => data,
                    Err(SchedulerError::NoData) => serde_json::Value::Null,
                    Err(e) => return Err(e),
                };
                info!(
                    "执行任务 {} (第 {} 次触发): {}",
                    ctx.job().key(),
                    ctx.trigger().triggered_count() + 1,
                    data
                );
                Ok(())
            }),
        )
        .build()
        .await
        .context("创建调度器失败")?;

    for seed in &config.jobs {
        if let Err(e) = schedule_seed(&scheduler, seed).await {
            match e.downcast_ref::<SchedulerError>() {
                Some(err) if err.is_validation() => {
                    warn!("预置任务 {} 定义无效，已跳过: {}", seed.key, err)
                }
                _ => error!("预置任务 {} 调度失败: {:#}", seed.key, e),
            }
        }
    }

    scheduler.start();

    wait_for_shutdown_signal(&scheduler).await;
    info!("收到关闭信号，开始优雅关闭...");

    let deadline = Duration::from_secs(config.scheduler.shutdown_timeout_seconds);
    match scheduler.shutdown(deadline).await {
        Ok(()) => info!("调度器已优雅关闭"),
        Err(e) => warn!("调度器关闭未完成: {}", e),
    }

    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

fn instance_name(configured: &str) -> Result<String> {
    if !configured.trim().is_empty() {
        return Ok(configured.trim().to_string());
    }
    let host = hostname::get().context("获取主机名失败")?;
    Ok(host.to_string_lossy().into_owned())
}

async fn schedule_seed(scheduler: &Scheduler, seed: &SeedJobConfig) -> Result<()> {
    let mut job = JobBuilder::new().with_key(&seed.key).with_type(&seed.job_type);
    if let Some(data) = &seed.data {
        job = job.with_data(encode_payload(scheduler.codec(), data)?);
    }

    let mut trigger = TriggerBuilder::new()
        .with_key(format!("{}-{}", seed.key, Uuid::new_v4().simple()))
        .with_cron(&seed.cron);
    if let Some(location) = &seed.location {
        trigger = trigger.in_location(location);
    }
    if let Some(times) = seed.repeats {
        trigger = trigger.with_repeats(Repeats::Times(times));
    }

    let trigger = scheduler
        .schedule_job(&job.build()?, &trigger.build()?)
        .await?;
    info!(
        "预置任务 {} 已调度，首次触发时间 {}",
        seed.key,
        trigger.next_fire_time()
    );
    Ok(())
}

/// 等待关闭信号，期间定期清理已耗尽的触发器
async fn wait_for_shutdown_signal(scheduler: &Scheduler) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let janitor = async {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = scheduler.purge_exhausted_triggers().await {
                warn!("清理已耗尽触发器失败: {}", e);
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
        _ = janitor => {},
    }
}
