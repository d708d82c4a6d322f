// 调试轨迹模块

mod row;
mod run;
mod sink;

pub use row::{LoopIterationResult, NodeTestConfig};
pub use run::{RunStatus, RunTrace, TRACE_FORMAT_VERSION};
pub use sink::{ChannelDebugSink, DebugSink, DynDebugSink, MemoryDebugSink, TracingDebugSink};
