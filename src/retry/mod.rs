// 异步单元重试模块

mod action;
mod queue;
mod shell;
mod store;
mod unit;

pub use action::{action_from_fn, DeferredRunAction, DeferredRunPayload, DynUnitAction, UnitAction};
pub use queue::{ChannelQueue, DynUnitQueue, UnitQueue};
pub use shell::RetryShell;
#[cfg(feature = "redis-store")]
pub use store::redis::RedisRetryStore;
pub use store::{DynRetryUnitStore, MemoryRetryStore, RetryUnitStore};
pub use unit::{RetryUnit, UnitStatus};
