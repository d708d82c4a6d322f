// 运行时执行引擎模块

mod cancel;
mod executor;
mod walker;

pub use cancel::{CancelHandle, CancelReason};
pub use executor::{FlowExecution, FlowExecutor};
