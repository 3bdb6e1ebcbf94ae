//! 任务与触发器模型
//!
//! 两者都分为可变的构建阶段（`JobBuilder` / `TriggerBuilder`）和校验后的不可变阶段
//! （`Job` / `Trigger`）。触发器的运行时字段通过 `Trigger::with_state` 生成新快照。

pub mod job;
pub mod location;
pub mod trigger;

pub use job::{Job, JobBuilder};
pub use location::TriggerLocation;
pub use trigger::{Repeats, Trigger, TriggerBuilder, TriggerPatch, TriggerState};
