/// 流程相关的常量定义
///
/// 统一管理节点类型、保留引用源等字符串常量

/// 内置节点类型
pub mod node_types {
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const LLM: &str = "llm";
    pub const HTTP: &str = "http";
    pub const BRANCH: &str = "branch";
    pub const LOOP: &str = "loop";
    pub const LOOP_BODY: &str = "loop_body";
    pub const LOOP_END: &str = "loop_end";
    pub const SUB_FLOW: &str = "sub_flow";
    pub const TOOL: &str = "tool";
    pub const VARIABLE_SAVE: &str = "variable_save";
    pub const MESSAGE_SEARCH: &str = "message_search";
}

/// 表达式中的保留引用源
pub mod sources {
    /// 运行期变量（由 variable_save 节点写入）
    pub const VARIABLES: &str = "variables";
    /// 触发数据
    pub const TRIGGER: &str = "trigger";

    pub fn is_reserved(node_id: &str) -> bool {
        node_id == VARIABLES || node_id == TRIGGER
    }
}

/// 节点版本
pub mod versions {
    pub const DEFAULT: &str = "v0";
}
