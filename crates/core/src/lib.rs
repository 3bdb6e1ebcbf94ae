pub mod codec;
pub mod config;
pub mod cron_utils;
pub mod errors;
pub mod executor_registry;
pub mod job_context;
pub mod models;
pub mod traits;

pub use codec::{decode_payload, encode_payload, JsonCodec, PayloadCodec};
pub use crate::config::{AppConfig, ExecutorConfig, InstanceConfig, ObservabilityConfig, SeedJobConfig};
pub use cron_utils::CronScheduler;
pub use errors::*;
pub use executor_registry::DefaultExecutorRegistry;
pub use job_context::JobContext;
pub use models::{
    Job, JobBuilder, Repeats, Trigger, TriggerBuilder, TriggerLocation, TriggerPatch, TriggerState,
};
pub use traits::{executor_fn, JobExecutor, JobStore, TriggerExecutor};
