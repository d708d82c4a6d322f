// 工具调用接口

mod builtin;
mod manifest;
mod registry;
mod tool;

pub use builtin::EchoTool;
pub use manifest::ToolManifest;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolInvocation, ToolOutput};
