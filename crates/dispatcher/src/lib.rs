//! # Dispatcher
//!
//! 外部调用分发模块。
//!
//! 负责：
//! - 按服务轮换凭证 (`CredentialPool`)，隔离失效凭证
//! - 有界重试与指数退避
//! - 会话级熔断 (`BreakerHandle`)，熔断后不再发起任何尝试

pub mod backoff;
pub mod breaker;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod pool;

pub use backoff::{backoff_units, BackoffPolicy};
pub use breaker::{BreakerHandle, BreakerSnapshot, BreakerState};
pub use dispatcher::RequestDispatcher;
pub use error::DispatchError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use pool::{CredentialLease, CredentialPool, PoolRegistry};
