// Flow 模块 - 工作流定义、校验与版本存储

pub mod builder;
pub mod conditions;
pub mod constants;
pub mod loader;
pub mod nodes;
pub mod registry;
pub mod types;
pub mod validation;

pub use builder::FlowBuilder;
pub use conditions::{Condition, Operator};
pub use loader::{load_flow_from_file, load_flow_from_str};
pub use nodes::Node;
pub use registry::{DynFlowRepository, FlowRepository, MemoryFlowRepository};
pub use types::{Edge, Flow, FlowDefinition, FlowType};
pub use validation::validate_flow;
