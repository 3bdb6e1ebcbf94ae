pub mod job_executor;
pub mod store;

pub use job_executor::{executor_fn, FnExecutor, JobExecutor, TriggerExecutor};
pub use store::JobStore;
