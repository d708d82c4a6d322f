// 内置节点执行器

mod branch;
mod end;
mod http;
mod llm;
mod loops;
mod message_search;
mod start;
mod sub_flow;
mod tool;
mod variable_save;

use std::sync::Arc;

pub use branch::{BranchPolicy, BranchRunner, BranchSpec};
pub use end::EndRunner;
pub use http::HttpRunner;
pub use llm::LlmRunner;
pub use loops::{LoopBodyRunner, LoopEndRunner, LoopMode, LoopRunner};
pub use message_search::MessageSearchRunner;
pub use start::StartRunner;
pub use sub_flow::SubFlowRunner;
pub use tool::ToolRunner;
pub use variable_save::VariableSaveRunner;

use super::context::NodeRunner;
use super::registry::{RunnerRegistry, RunnerServices};

pub(crate) fn register_builtins(registry: &mut RunnerRegistry, services: &RunnerServices) {
    registry.register(
        start::manifest(),
        Arc::new(|node| Ok(Arc::new(StartRunner::from_node(node)?) as Arc<dyn NodeRunner>)),
    );
    registry.register(
        end::manifest(),
        Arc::new(|_node| Ok(Arc::new(EndRunner) as Arc<dyn NodeRunner>)),
    );

    let llm_client = Arc::clone(&services.llm);
    registry.register(
        llm::manifest(),
        Arc::new(move |node| {
            Ok(Arc::new(LlmRunner::from_node(node, Arc::clone(&llm_client))?) as Arc<dyn NodeRunner>)
        }),
    );

    let http_client = services.http.clone();
    registry.register(
        http::manifest(),
        Arc::new(move |node| {
            Ok(Arc::new(HttpRunner::from_node(node, http_client.clone())?) as Arc<dyn NodeRunner>)
        }),
    );

    registry.register(
        branch::manifest(),
        Arc::new(|node| Ok(Arc::new(BranchRunner::from_node(node)?) as Arc<dyn NodeRunner>)),
    );
    registry.register(
        loops::manifest(),
        Arc::new(|node| Ok(Arc::new(LoopRunner::from_node(node)?) as Arc<dyn NodeRunner>)),
    );
    registry.register(
        loops::body_manifest(),
        Arc::new(|_node| Ok(Arc::new(LoopBodyRunner) as Arc<dyn NodeRunner>)),
    );
    registry.register(
        loops::end_manifest(),
        Arc::new(|_node| Ok(Arc::new(LoopEndRunner) as Arc<dyn NodeRunner>)),
    );
    registry.register(
        sub_flow::manifest(),
        Arc::new(|node| Ok(Arc::new(SubFlowRunner::from_node(node)?) as Arc<dyn NodeRunner>)),
    );

    let tools = Arc::clone(&services.tools);
    registry.register(
        tool::manifest(),
        Arc::new(move |node| {
            Ok(Arc::new(ToolRunner::from_node(node, Arc::clone(&tools))?) as Arc<dyn NodeRunner>)
        }),
    );

    registry.register(
        variable_save::manifest(),
        Arc::new(|_node| Ok(Arc::new(VariableSaveRunner) as Arc<dyn NodeRunner>)),
    );

    let messages = services.messages.clone();
    registry.register(
        message_search::manifest(),
        Arc::new(move |_node| {
            Ok(Arc::new(MessageSearchRunner::new(messages.clone())) as Arc<dyn NodeRunner>)
        }),
    );
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::EngineConfig;
    use crate::error::{FlowEngineError, Result};
    use crate::flow::Flow;
    use crate::runner::{NodeContext, RegionOutcome, SubFlowRun, Walker};
    use crate::state::{ExecutionData, TriggerData};

    /// Walker for runners that never call back into the scheduler.
    #[derive(Default)]
    pub struct StubWalker {
        config: EngineConfig,
    }

    #[async_trait]
    impl Walker for StubWalker {
        async fn walk_region(&self, _entry: &str) -> RegionOutcome {
            RegionOutcome::default()
        }

        async fn run_sub_flow(
            &self,
            code: &str,
            version: Option<u32>,
            _trigger: TriggerData,
        ) -> Result<SubFlowRun> {
            Err(FlowEngineError::FlowNotFound {
                code: code.to_string(),
                version,
            })
        }

        fn config(&self) -> &EngineConfig {
            &self.config
        }

        fn is_cancelled(&self) -> bool {
            false
        }
    }

    pub fn context(flow: Flow, node_id: &str, trigger: TriggerData) -> NodeContext {
        let node = flow.node(node_id).cloned().expect("node in flow");
        let data = Arc::new(ExecutionData::new(Arc::new(flow), trigger));
        NodeContext::new(node, data, Arc::new(StubWalker::default()))
    }
}
