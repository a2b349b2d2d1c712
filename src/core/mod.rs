//! Orchestration core: dependency resolution, action lifecycle,
//! retry policies and the bounded-concurrency scheduler.

pub mod dependencies;
pub mod lifecycle;
pub mod retry;
pub mod scheduler;

pub use dependencies::{DependencyResolver, DependencyRule, DependencySpec};
pub use lifecycle::{ActionLifecycle, EngineError};
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, SchedulerConfig};
