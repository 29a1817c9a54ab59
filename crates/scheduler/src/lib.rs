//! # Scheduler
//!
//! 批次调度模块。
//!
//! 负责：
//! - 有界并发执行一个子批次的任务 (worker 池 + 共享任务队列)
//! - 按完成顺序收集结果
//! - 熔断信号出现时取消尚未开始的任务，并把熔断标记交给调用方
//!
//! 每个 worker 持有自己的 [`TaskRunner`]；凭证池与熔断器通过
//! dispatcher 克隆共享。

mod error;
mod result;
mod runner;
mod scheduler;

pub use error::SchedulerError;
pub use result::{BatchOutcome, TaskOutcome, TaskResult};
pub use runner::{
    ArticleRunner, ArticleRunnerFactory, ArticleSettings, LocalTaskRunner, RunnerFactory,
    TaskRunner,
};
pub use scheduler::BatchScheduler;
