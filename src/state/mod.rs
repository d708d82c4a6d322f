// 运行期状态模块

mod execution;
mod trigger;

pub use execution::ExecutionData;
pub(crate) use execution::OverlayLookup;
pub use trigger::{TriggerData, TriggerType};
