use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::conditions::Condition;
use crate::flow::constants::node_types;
use crate::flow::validation::{check_references, check_targets};
use crate::flow::{Flow, Node};
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    let branch = Schema::object(
        [
            ("branch_id", Schema::string()),
            ("condition", Schema::any().nullable()),
            ("next_nodes", Schema::array(Schema::string())),
        ],
        &["branch_id"],
    );
    RunnerManifest::builder(node_types::BRANCH)
        .description("Routes to the branches whose condition holds")
        .params(Schema::object(
            [
                ("policy", Schema::one_of(["first_match", "all_matches"]).nullable()),
                ("branches", Schema::array(branch)),
            ],
            &["branches"],
        ))
        .build()
}

/// 分支匹配策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchPolicy {
    #[default]
    FirstMatch,
    AllMatches,
}

/// 一个分支：条件为空时是 else 分支
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub branch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub next_nodes: Vec<String>,
}

#[derive(Deserialize)]
struct BranchParams {
    #[serde(default)]
    policy: Option<BranchPolicy>,
    branches: Vec<BranchSpec>,
}

/// 条件分支节点
pub struct BranchRunner {
    policy: BranchPolicy,
    branches: Vec<BranchSpec>,
}

impl BranchRunner {
    pub fn from_node(node: &Node) -> Result<Self> {
        let params: BranchParams = parse_params(node)?;
        Ok(Self {
            policy: params.policy.unwrap_or_default(),
            branches: params.branches,
        })
    }

    fn select(&self, ctx: &NodeContext) -> Vec<&BranchSpec> {
        let mut active = Vec::new();
        for branch in &self.branches {
            let Some(condition) = &branch.condition else {
                continue;
            };
            if condition.evaluate(ctx.data()) {
                active.push(branch);
                if self.policy == BranchPolicy::FirstMatch {
                    break;
                }
            }
        }
        if active.is_empty() {
            active.extend(self.branches.iter().filter(|b| b.condition.is_none()).take(1));
        }
        active
    }
}

#[async_trait]
impl NodeRunner for BranchRunner {
    async fn run(&self, ctx: &NodeContext, _input: ResolvedInput) -> Result<VertexResult> {
        let active = self.select(ctx);

        let mut children: Vec<String> = Vec::new();
        for branch in &active {
            for next in &branch.next_nodes {
                if !children.contains(next) {
                    children.push(next.clone());
                }
            }
        }
        let matched: Vec<&str> = active.iter().map(|b| b.branch_id.as_str()).collect();
        debug!(node = %ctx.node_id(), ?matched, "branch evaluated");

        Ok(VertexResult::new(json!({ "matched": matched }), children))
    }

    fn validate(&self, flow: &Flow, node: &Node) -> Result<()> {
        for branch in &self.branches {
            check_targets(flow, node, &branch.next_nodes)?;
            if let Some(condition) = &branch.condition {
                for schema in condition.schemas() {
                    check_references(flow, &node.node_id, schema)?;
                }
            }
        }
        Ok(())
    }
}
