//! # Allocator
//!
//! 配额分配模块。
//!
//! 负责：
//! - 将排序并打乱后的待办流 (`WorkStream`) 逐批分配给目标站点
//! - 每个目标按本次运行的配额推进，工作项一经认领永不复用
//! - 熔断时冻结交付计数并整体中止

pub mod allocator;
pub mod error;
pub mod stream;
pub mod summary;

pub use allocator::{AllocatorSettings, DestinationTarget, QuotaAllocator};
pub use error::AllocatorError;
pub use stream::WorkStream;
pub use summary::{DestinationSummary, RunOutcome, RunSummary};
