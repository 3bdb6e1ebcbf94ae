//! 调度器配置
//!
//! 加载顺序：
//! 1. 默认值
//! 2. 配置文件（TOML）
//! 3. 环境变量覆盖（前缀 `SCHEDULER_`，层级分隔符 `__`，例如
//!    `SCHEDULER_EXECUTOR__TRIGGER_STEAL_INTERVAL_MS=500`）

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::cron_utils::CronScheduler;
use crate::models::TriggerLocation;

/// 执行器的时间参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 认领（偷取）空闲触发器的轮询间隔
    pub trigger_steal_interval_ms: u64,
    /// 触发时存储中的触发时间与本地记录的偏差上限，超过视为已被并发修改
    pub fire_time_tolerance_ms: u64,
    /// 单次任务执行的超时时间
    pub job_timeout_seconds: u64,
    /// 存储不可用时轮询退避的上限
    pub max_poll_backoff_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            trigger_steal_interval_ms: 1_000,
            fire_time_tolerance_ms: 10_000,
            job_timeout_seconds: 300,
            max_poll_backoff_ms: 30_000,
        }
    }
}

impl ExecutorConfig {
    pub fn trigger_steal_interval(&self) -> Duration {
        Duration::from_millis(self.trigger_steal_interval_ms)
    }

    pub fn fire_time_tolerance(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.fire_time_tolerance_ms as i64)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }

    pub fn max_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.max_poll_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trigger_steal_interval_ms == 0 {
            return Err(anyhow::anyhow!("触发器轮询间隔必须大于0"));
        }
        if self.job_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务执行超时时间必须大于0"));
        }
        if self.max_poll_backoff_ms < self.trigger_steal_interval_ms {
            return Err(anyhow::anyhow!(
                "轮询退避上限({}ms)不能小于轮询间隔({}ms)",
                self.max_poll_backoff_ms,
                self.trigger_steal_interval_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstanceConfig {
    /// 调度器实例名（存储命名空间），为空时使用主机名
    pub name: String,
    pub shutdown_timeout_seconds: u64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            shutdown_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` 或 `json`
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }
        Ok(())
    }
}

/// 启动时预置的任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedJobConfig {
    pub key: String,
    pub job_type: String,
    pub cron: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub repeats: Option<u32>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: InstanceConfig,
    pub executor: ExecutorConfig,
    pub observability: ObservabilityConfig,
    pub jobs: Vec<SeedJobConfig>,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// `config_path` 为 `None` 时依次尝试默认路径，都不存在则只使用默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/scheduler.toml", "scheduler.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.executor.validate().context("执行器配置验证失败")?;
        self.observability
            .validate()
            .context("日志配置验证失败")?;

        for job in &self.jobs {
            if job.key.is_empty() || job.job_type.is_empty() || job.cron.is_empty() {
                return Err(anyhow::anyhow!(
                    "预置任务的 key、job_type、cron 都不能为空: {:?}",
                    job
                ));
            }
            CronScheduler::validate_cron_expression(&job.cron)
                .with_context(|| format!("预置任务 {} 的CRON表达式无效", job.key))?;
            if let Some(location) = &job.location {
                TriggerLocation::parse(location)
                    .with_context(|| format!("预置任务 {} 的时区无效", job.key))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.trigger_steal_interval(), Duration::from_secs(1));
        assert_eq!(
            config.executor.fire_time_tolerance(),
            chrono::Duration::seconds(10)
        );
    }

    #[test]
    fn test_from_toml_with_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            name = "billing"

            [executor]
            trigger_steal_interval_ms = 250

            [[jobs]]
            key = "heartbeat"
            job_type = "log"
            cron = "*/5 * * * * *"
            data = { message = "alive" }
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.name, "billing");
        assert_eq!(config.executor.trigger_steal_interval_ms, 250);
        assert_eq!(config.executor.job_timeout_seconds, 300);
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].data.as_ref().unwrap()["message"], "alive");

        let round_trip = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("[executor]\ntrigger_steal_interval_ms = 0").is_err());
        assert!(AppConfig::from_toml("[observability]\nlog_format = \"xml\"").is_err());
        assert!(AppConfig::from_toml(
            "[[jobs]]\nkey = \"\"\njob_type = \"log\"\ncron = \"* * * * * *\""
        )
        .is_err());
    }

    #[test]
    fn test_seed_job_schedule_is_checked() {
        let err = AppConfig::from_toml(
            "[[jobs]]\nkey = \"bad\"\njob_type = \"log\"\ncron = \"0 0 0 32 * *\"",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("bad"));

        assert!(AppConfig::from_toml(
            "[[jobs]]\nkey = \"tz\"\njob_type = \"log\"\ncron = \"0 * * * * *\"\nlocation = \"Mars/Olympus\""
        )
        .is_err());
        assert!(AppConfig::from_toml(
            "[[jobs]]\nkey = \"ok\"\njob_type = \"log\"\ncron = \"0 * * * * *\"\nlocation = \"Asia/Shanghai\""
        )
        .is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[executor]\njob_timeout_seconds = 42").unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.executor.job_timeout_seconds, 42);

        assert!(AppConfig::load(Some("/nonexistent/scheduler.toml")).is_err());
    }
}
