use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::flow::Node;
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;
use crate::state::{TriggerData, TriggerType};
use crate::trace::RunStatus;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::SUB_FLOW)
        .description("Runs a published sub-flow and returns its result")
        .params(Schema::object(
            [
                ("flow_code", Schema::string()),
                ("flow_version", Schema::integer().nullable()),
            ],
            &["flow_code"],
        ))
        .structured_input()
        .structured_output()
        .build()
}

#[derive(Deserialize)]
struct SubFlowParams {
    flow_code: String,
    #[serde(default)]
    flow_version: Option<u32>,
}

/// 子流程节点
///
/// The sub-flow runs with its own execution data; only the resolved input
/// crosses over as its trigger payload and only its end output comes back.
pub struct SubFlowRunner {
    flow_code: String,
    flow_version: Option<u32>,
}

impl SubFlowRunner {
    pub fn from_node(node: &Node) -> Result<Self> {
        let params: SubFlowParams = parse_params(node)?;
        Ok(Self {
            flow_code: params.flow_code,
            flow_version: params.flow_version,
        })
    }
}

#[async_trait]
impl NodeRunner for SubFlowRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let parent = ctx.data();
        let mut trigger = TriggerData::new(TriggerType::SubFlow, input.defined_value())
            .with_organization(parent.organization_code())
            .with_metadata(json!({
                "parent_execution_id": parent.execution_id(),
                "parent_flow": parent.flow().code,
                "parent_node": ctx.node_id(),
            }));
        trigger.user_id = parent.trigger().user_id.clone();

        let run = ctx
            .walker()
            .run_sub_flow(&self.flow_code, self.flow_version, trigger)
            .await
            .map_err(|e| ctx.fail(format!("sub-flow `{}`: {e}", self.flow_code)))?;

        if run.status != RunStatus::Completed {
            return Err(ctx.fail(format!(
                "sub-flow `{}` ended {:?}: {}",
                self.flow_code,
                run.status,
                run.error.as_deref().unwrap_or("no error recorded")
            )));
        }

        let debug_log = json!({
            "execution_id": run.execution_id,
            "status": run.status,
            "rows": run.rows,
        });
        Ok(VertexResult::next(ctx.node(), run.output.unwrap_or(Value::Null))
            .with_debug_log(Some(debug_log)))
    }
}
