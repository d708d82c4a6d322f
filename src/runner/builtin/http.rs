use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::expression::ResolvedInput;
use crate::flow::constants::node_types;
use crate::flow::Node;
use crate::http::{DynHttpClient, HttpRequest};
use crate::runner::{parse_params, NodeContext, NodeRunner, RunnerManifest, VertexResult};
use crate::schema::Schema;

pub(super) fn manifest() -> RunnerManifest {
    RunnerManifest::builder(node_types::HTTP)
        .description("Performs an HTTP request")
        .params(Schema::object(
            [
                ("method", Schema::string().nullable()),
                ("timeout_ms", Schema::integer().nullable()),
                ("fail_on_error", Schema::boolean().nullable()),
            ],
            &[],
        ))
        .structured_input()
        .structured_output()
        .build()
}

#[derive(Deserialize)]
struct HttpParams {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    fail_on_error: Option<bool>,
}

/// HTTP 请求节点
pub struct HttpRunner {
    client: Option<DynHttpClient>,
    method: String,
    timeout_ms: Option<u64>,
    fail_on_error: bool,
}

impl HttpRunner {
    pub fn from_node(node: &Node, client: Option<DynHttpClient>) -> Result<Self> {
        let params: HttpParams = parse_params(node)?;
        Ok(Self {
            client,
            method: params.method.unwrap_or_else(|| "GET".to_string()),
            timeout_ms: params.timeout_ms,
            fail_on_error: params.fail_on_error.unwrap_or(true),
        })
    }

    fn request(&self, ctx: &NodeContext, input: &ResolvedInput) -> Result<HttpRequest> {
        let url = input.require_str(ctx.node_id(), "url")?;
        let method = input
            .get_str("method")
            .map(str::to_string)
            .unwrap_or_else(|| self.method.clone());
        Ok(HttpRequest {
            method: method.to_uppercase(),
            url: url.to_string(),
            headers: string_map(input.get("headers")),
            query: string_map(input.get("query")),
            body: input.get("body").filter(|body| !body.is_null()).cloned(),
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Flattens a JSON object into string pairs; non-string scalars are rendered.
fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

#[async_trait]
impl NodeRunner for HttpRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> Result<VertexResult> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ctx.fail("no http client configured"))?;
        let request = self.request(ctx, &input)?;

        debug!(node = %ctx.node_id(), method = %request.method, url = %request.url, "http call");
        let response = client
            .send(request.clone())
            .await
            .map_err(|e| ctx.fail(format!("http request failed: {e}")))?;

        if self.fail_on_error && !response.is_success() {
            return Err(ctx.fail(format!(
                "{} {} returned status {}",
                request.method, request.url, response.status
            )));
        }

        let debug_log = json!({
            "request": request,
            "status": response.status,
        });
        let output = json!({
            "status": response.status,
            "headers": response.headers,
            "body": response.body,
        });
        Ok(VertexResult::next(ctx.node(), output).with_debug_log(Some(debug_log)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::error::FlowEngineError;
    use crate::flow::FlowBuilder;
    use crate::http::{HttpClient, HttpResponse};
    use crate::runner::builtin::testing::context;
    use crate::state::TriggerData;

    struct Fixed {
        status: u16,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpClient for Fixed {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().push(request);
            Ok(HttpResponse {
                status: self.status,
                headers: BTreeMap::new(),
                body: json!({"ok": self.status == 200}),
            })
        }
    }

    fn ctx(params: Value) -> NodeContext {
        let flow = FlowBuilder::new("h")
            .start("start")
            .node(Node::new("call", node_types::HTTP).with_params(params))
            .connect("start", "call")
            .build()
            .unwrap();
        context(flow, "call", TriggerData::manual(json!({})))
    }

    #[tokio::test]
    async fn builds_request_from_input() {
        let client = Arc::new(Fixed {
            status: 200,
            seen: Mutex::new(Vec::new()),
        });
        let ctx = ctx(json!({"method": "post", "timeout_ms": 500}));
        let runner = HttpRunner::from_node(ctx.node(), Some(client.clone())).unwrap();
        let result = runner
            .run(
                &ctx,
                ResolvedInput::from_value(json!({
                    "url": "https://example.com/api",
                    "headers": {"x-id": 7},
                    "body": {"a": 1}
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.output["status"], json!(200));
        let seen = client.seen.lock();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].headers.get("x-id").map(String::as_str), Some("7"));
        assert_eq!(seen[0].timeout_ms, Some(500));
    }

    #[tokio::test]
    async fn non_success_status_fails_unless_disabled() {
        let client = Arc::new(Fixed {
            status: 503,
            seen: Mutex::new(Vec::new()),
        });
        let input = json!({"url": "https://example.com"});

        let ctx_strict = ctx(json!({}));
        let strict = HttpRunner::from_node(ctx_strict.node(), Some(client.clone())).unwrap();
        let err = strict
            .run(&ctx_strict, ResolvedInput::from_value(input.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowEngineError::Runner { .. }));

        let ctx_lenient = ctx(json!({"fail_on_error": false}));
        let lenient = HttpRunner::from_node(ctx_lenient.node(), Some(client)).unwrap();
        let result = lenient
            .run(&ctx_lenient, ResolvedInput::from_value(input))
            .await
            .unwrap();
        assert_eq!(result.output["status"], json!(503));
    }
}
