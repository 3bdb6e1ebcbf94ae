//! 触发器运行时
//!
//! 定期认领存储中空闲的触发器，按触发时间执行对应任务，并维护触发器的状态推进。

pub mod executor;
pub mod future;
pub mod in_flight;

pub use executor::RuntimeExecutor;
pub use future::TriggerFuture;
pub use in_flight::{InFlightGuard, InFlightTracker};
