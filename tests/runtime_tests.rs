use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use flowengine::flow::constants::node_types;
use flowengine::http::{HttpClient, HttpRequest, HttpResponse};
use flowengine::{
    CancelHandle, Condition, EngineConfig, Flow, FlowBuilder, FlowEngineError, FlowExecutor,
    MemoryDebugSink, Node, NodeContext, NodeRunner, Operator, ResolvedInput, RunStatus,
    RunnerManifest, RunnerRegistry, RunnerServices, TriggerData, ValueSchema, VertexResult,
};

struct RecordingHttp {
    status: u16,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingHttp {
    fn new(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }
}

#[async_trait]
impl HttpClient for RecordingHttp {
    async fn send(&self, request: HttpRequest) -> flowengine::Result<HttpResponse> {
        self.requests.lock().push(request.clone());
        Ok(HttpResponse {
            status: self.status,
            headers: Default::default(),
            body: json!({ "echo": request.url }),
        })
    }
}

struct SleepRunner {
    ms: u64,
}

#[async_trait]
impl NodeRunner for SleepRunner {
    async fn run(&self, ctx: &NodeContext, _input: ResolvedInput) -> flowengine::Result<VertexResult> {
        tokio::time::sleep(Duration::from_millis(self.ms)).await;
        Ok(VertexResult::next(ctx.node(), json!({ "slept": self.ms })))
    }
}

struct PanicRunner;

#[async_trait]
impl NodeRunner for PanicRunner {
    async fn run(&self, _ctx: &NodeContext, _input: ResolvedInput) -> flowengine::Result<VertexResult> {
        panic!("runner blew up");
    }
}

/// Fails when its `at` input equals the configured index.
struct FailAtRunner {
    index: u64,
}

#[async_trait]
impl NodeRunner for FailAtRunner {
    async fn run(&self, ctx: &NodeContext, input: ResolvedInput) -> flowengine::Result<VertexResult> {
        let at = input.get("at").and_then(Value::as_u64);
        if at == Some(self.index) {
            return Err(ctx.fail(format!("refused index {}", self.index)));
        }
        Ok(VertexResult::next(ctx.node(), json!({ "at": at })))
    }
}

fn registry(http: Arc<RecordingHttp>) -> RunnerRegistry {
    let mut registry = RunnerRegistry::with_builtins(RunnerServices::default().with_http(http));
    registry.register(
        RunnerManifest::builder("sleep").build(),
        Arc::new(|node: &Node| {
            let ms = node.params.get("ms").and_then(Value::as_u64).unwrap_or(10);
            Ok(Arc::new(SleepRunner { ms }) as Arc<dyn NodeRunner>)
        }),
    );
    registry.register(
        RunnerManifest::builder("panic").build(),
        Arc::new(|_node: &Node| Ok(Arc::new(PanicRunner) as Arc<dyn NodeRunner>)),
    );
    registry.register(
        RunnerManifest::builder("fail_at").build(),
        Arc::new(|node: &Node| {
            let index = node.params.get("index").and_then(Value::as_u64).unwrap_or(0);
            Ok(Arc::new(FailAtRunner { index }) as Arc<dyn NodeRunner>)
        }),
    );
    registry
}

fn executor(http: Arc<RecordingHttp>, config: EngineConfig) -> FlowExecutor {
    FlowExecutor::new(registry(http), config)
}

fn sleep_node(id: &str, ms: u64) -> Node {
    Node::new(id, "sleep").with_params(json!({ "ms": ms }))
}

/// start -> each(body -> work -> stop) -> end, with `end` reporting the loop output.
fn loop_flow(mut params: Value, input: Option<ValueSchema>, work: Node) -> anyhow::Result<Flow> {
    params["body"] = json!("body");
    let mut each = Node::new("each", node_types::LOOP).with_params(params).with_next(["end"]);
    if let Some(input) = input {
        each = each.with_input(input);
    }
    let work_id = work.node_id.clone();
    let flow = FlowBuilder::new("looping")
        .start("start")
        .node(each)
        .node(Node::new("body", node_types::LOOP_BODY).with_parent("each"))
        .node(work.with_parent("each"))
        .node(Node::new("stop", node_types::LOOP_END).with_parent("each"))
        .node(Node::new("end", node_types::END).with_input(ValueSchema::object([
            ("count", ValueSchema::reference("each", "count")),
            ("items", ValueSchema::reference("each", "items")),
        ])))
        .connect("start", "each")
        .connect("each", "body")
        .connect("body", &work_id)
        .connect(&work_id, "stop")
        .build()?;
    Ok(flow)
}

fn index_node(id: &str, fail_at: u64) -> Node {
    Node::new(id, "fail_at")
        .with_params(json!({ "index": fail_at }))
        .with_input(ValueSchema::object([("at", ValueSchema::reference("each", "index"))]))
}

#[tokio::test]
async fn linear_http_flow_completes_with_three_rows() -> anyhow::Result<()> {
    let http = RecordingHttp::new(200);
    let sink = Arc::new(MemoryDebugSink::new());
    let executor = executor(Arc::clone(&http), EngineConfig::default()).with_debug_sink(sink.clone());

    let flow = FlowBuilder::new("fetch")
        .start("start")
        .node(Node::new("call", node_types::HTTP).with_input(ValueSchema::object([(
            "url",
            ValueSchema::template("https://api.test/items/{{start.id}}")?,
        )])))
        .node(Node::new("end", node_types::END).with_input(ValueSchema::object([
            ("status", ValueSchema::reference("call", "status")),
            ("body", ValueSchema::reference("call", "body")),
        ])))
        .connect("start", "call")
        .connect("call", "end")
        .build()?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({ "id": 7 }))).await?;

    assert_eq!(execution.status, RunStatus::Completed);
    assert_eq!(execution.trace.rows.len(), 3);
    assert_eq!(execution.end_node_id.as_deref(), Some("end"));
    assert_eq!(
        execution.output,
        Some(json!({ "status": 200, "body": { "echo": "https://api.test/items/7" } }))
    );
    assert_eq!(http.urls(), vec!["https://api.test/items/7".to_string()]);
    assert_eq!(sink.node_ids(), vec!["start", "call", "end"]);
    Ok(())
}

#[tokio::test]
async fn only_the_active_branch_end_runs() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let is_a = Condition::compare(
        ValueSchema::reference("start", "kind"),
        Operator::Equals,
        ValueSchema::constant(json!("a")),
    );
    let flow = FlowBuilder::new("route")
        .start("start")
        .node(Node::new("route", node_types::BRANCH).with_params(json!({
            "branches": [
                { "branch_id": "a", "condition": is_a, "next_nodes": ["end_a"] },
                { "branch_id": "b", "next_nodes": ["end_b"] }
            ]
        })))
        .node(Node::new("end_a", node_types::END).with_input(ValueSchema::object([(
            "picked",
            ValueSchema::constant(json!("a")),
        )])))
        .node(Node::new("end_b", node_types::END).with_input(ValueSchema::object([(
            "picked",
            ValueSchema::constant(json!("b")),
        )])))
        .connect("start", "route")
        .build()?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({ "kind": "b" }))).await?;

    assert_eq!(execution.status, RunStatus::Completed);
    let visited: Vec<_> = execution.trace.visited().collect();
    assert_eq!(visited, vec!["start", "route", "end_b"]);
    assert_eq!(execution.output, Some(json!({ "picked": "b" })));
    assert_eq!(
        execution.trace.row("route").map(|row| row.output.clone()),
        Some(json!({ "matched": ["b"] }))
    );
    Ok(())
}

#[tokio::test]
async fn loop_records_iterations_in_order() -> anyhow::Result<()> {
    let http = RecordingHttp::new(200);
    let sink = Arc::new(MemoryDebugSink::new());
    let executor = executor(Arc::clone(&http), EngineConfig::default()).with_debug_sink(sink.clone());

    let flow = FlowBuilder::new("repeat")
        .start("start")
        .node(
            Node::new("each", node_types::LOOP)
                .with_params(json!({ "count": 3, "body": "body" }))
                .with_next(["end"]),
        )
        .node(Node::new("body", node_types::LOOP_BODY).with_parent("each"))
        .node(
            Node::new("tick", node_types::HTTP)
                .with_parent("each")
                .with_input(ValueSchema::object([(
                    "url",
                    ValueSchema::template("https://api.test/tick/{{each.index}}")?,
                )])),
        )
        .node(Node::new("stop", node_types::LOOP_END).with_parent("each"))
        .node(Node::new("end", node_types::END).with_input(ValueSchema::object([(
            "count",
            ValueSchema::reference("each", "count"),
        )])))
        .connect("start", "each")
        .connect("each", "body")
        .connect("body", "tick")
        .connect("tick", "stop")
        .build()?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Completed);
    assert_eq!(execution.trace.rows.len(), 3);
    let loop_row = execution.trace.row("each").expect("loop row");
    let indexes: Vec<_> = loop_row.loop_debug_results.iter().map(|r| r.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    for iteration in &loop_row.loop_debug_results {
        assert!(iteration.success);
        let ids: Vec<_> = iteration.rows.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["body", "tick", "stop"]);
    }
    assert_eq!(
        http.urls(),
        vec![
            "https://api.test/tick/0".to_string(),
            "https://api.test/tick/1".to_string(),
            "https://api.test/tick/2".to_string(),
        ]
    );
    assert_eq!(execution.output, Some(json!({ "count": 3 })));
    assert_eq!(sink.rows().len(), 12);
    Ok(())
}

#[tokio::test]
async fn condition_loop_stops_when_its_predicate_fails() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let below_two = Condition::compare(
        ValueSchema::reference("each", "index"),
        Operator::LessThan,
        ValueSchema::constant(json!(2)),
    );
    let flow = loop_flow(
        json!({ "mode": "condition", "condition": below_two }),
        None,
        index_node("work", 99),
    )?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Completed);
    let loop_row = execution.trace.row("each").expect("loop row");
    let indexes: Vec<_> = loop_row.loop_debug_results.iter().map(|r| r.index).collect();
    assert_eq!(indexes, vec![0, 1]);
    assert_eq!(execution.output, Some(json!({ "count": 2, "items": [0, 1] })));
    Ok(())
}

#[tokio::test]
async fn array_loop_walks_each_item() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = loop_flow(
        json!({ "mode": "array" }),
        Some(ValueSchema::object([("items", ValueSchema::reference("start", "items"))])),
        index_node("work", 99),
    )?;
    executor.validate(&flow)?;

    let execution = executor
        .run(flow, TriggerData::manual(json!({ "items": ["a", "b", "c"] })))
        .await?;

    assert_eq!(execution.status, RunStatus::Completed);
    let loop_row = execution.trace.row("each").expect("loop row");
    let items: Vec<_> = loop_row
        .loop_debug_results
        .iter()
        .map(|r| r.rows[0].output["item"].clone())
        .collect();
    assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);
    assert_eq!(
        execution.output,
        Some(json!({ "count": 3, "items": ["a", "b", "c"] }))
    );
    Ok(())
}

#[tokio::test]
async fn failing_iteration_fails_the_loop_and_keeps_earlier_iterations() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = loop_flow(json!({ "count": 3 }), None, index_node("work", 1))?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Failed);
    let loop_row = execution.trace.row("each").expect("loop row");
    assert!(!loop_row.success);
    assert!(loop_row
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("iteration 1 failed")));
    let results = &loop_row.loop_debug_results;
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("refused index 1")));
    assert!(execution.trace.row("end").is_none());
    Ok(())
}

#[tokio::test]
async fn oversized_count_loop_fails_before_iterating() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = loop_flow(json!({ "count": 1_000_000_000_000u64 }), None, index_node("work", 99))?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Failed);
    assert!(matches!(execution.error, Some(FlowEngineError::Runner { .. })));
    let loop_row = execution.trace.row("each").expect("loop row");
    assert!(loop_row
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("max_iterations")));
    assert!(loop_row.loop_debug_results.is_empty());
    Ok(())
}

#[tokio::test]
async fn first_failure_stops_the_run_and_keeps_earlier_contexts() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(500), EngineConfig::default());
    let flow = FlowBuilder::new("broken")
        .start("start")
        .node(Node::new("call", node_types::HTTP).with_input(ValueSchema::object([(
            "url",
            ValueSchema::constant(json!("https://api.test/down")),
        )])))
        .end("end")
        .connect("start", "call")
        .connect("call", "end")
        .build()?;

    let execution = executor.run(flow, TriggerData::manual(json!({ "q": 1 }))).await?;

    assert_eq!(execution.status, RunStatus::Failed);
    assert!(matches!(execution.error, Some(FlowEngineError::Runner { .. })));
    let failed = execution.trace.row("call").expect("call row");
    assert!(!failed.success);
    assert!(failed.error_message.is_some());
    assert!(execution.trace.row("end").is_none());
    assert_eq!(execution.trace.node_contexts.get("start"), Some(&json!({ "q": 1 })));
    assert!(execution.output.is_none());
    Ok(())
}

#[tokio::test]
async fn sibling_branches_run_concurrently() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("fan")
        .start("start")
        .node(sleep_node("a", 200))
        .node(sleep_node("b", 200))
        .node(sleep_node("c", 200))
        .connect("start", "a")
        .connect("start", "b")
        .connect("start", "c")
        .build()?;

    let started = Instant::now();
    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Completed);
    assert_eq!(execution.trace.rows.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(550));
    Ok(())
}

#[tokio::test]
async fn join_nodes_run_once() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("diamond")
        .start("start")
        .node(sleep_node("left", 5))
        .node(sleep_node("right", 30))
        .end("end")
        .connect("start", "left")
        .connect("start", "right")
        .connect("left", "end")
        .connect("right", "end")
        .build()?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    let ends = execution.trace.visited().filter(|id| *id == "end").count();
    assert_eq!(ends, 1);
    Ok(())
}

#[tokio::test]
async fn cancelling_discards_in_flight_nodes() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("slow")
        .start("start")
        .node(sleep_node("wait", 5_000))
        .end("end")
        .connect("start", "wait")
        .connect("wait", "end")
        .build()?;

    let cancel = CancelHandle::new();
    let run = {
        let executor = executor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            executor
                .run_with_cancel(flow, TriggerData::manual(json!({ "a": 1 })), cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    let execution = run.await??;

    assert_eq!(execution.status, RunStatus::Cancelled);
    assert!(matches!(execution.error, Some(FlowEngineError::Cancelled)));
    let visited: Vec<_> = execution.trace.visited().collect();
    assert_eq!(visited, vec!["start"]);
    assert!(execution.trace.node_contexts.contains_key("start"));
    Ok(())
}

/// Cancels the run it belongs to and then finishes normally.
struct CancellingRunner {
    cancel: CancelHandle,
}

#[async_trait]
impl NodeRunner for CancellingRunner {
    async fn run(&self, ctx: &NodeContext, _input: ResolvedInput) -> flowengine::Result<VertexResult> {
        self.cancel.cancel();
        Ok(VertexResult::next(ctx.node(), json!({ "stopped": true })))
    }
}

#[tokio::test]
async fn nodes_finished_at_cancellation_keep_their_rows() -> anyhow::Result<()> {
    let cancel = CancelHandle::new();
    let mut registry = registry(RecordingHttp::new(200));
    let handle = cancel.clone();
    registry.register(
        RunnerManifest::builder("cancel_run").build(),
        Arc::new(move |_node: &Node| {
            Ok(Arc::new(CancellingRunner { cancel: handle.clone() }) as Arc<dyn NodeRunner>)
        }),
    );
    let executor = FlowExecutor::new(registry, EngineConfig::default());
    let flow = FlowBuilder::new("self-stop")
        .start("start")
        .node(Node::new("stopper", "cancel_run"))
        .end("end")
        .connect("start", "stopper")
        .connect("stopper", "end")
        .build()?;

    let execution = executor
        .run_with_cancel(flow, TriggerData::manual(json!({})), cancel)
        .await?;

    assert_eq!(execution.status, RunStatus::Cancelled);
    let visited: Vec<_> = execution.trace.visited().collect();
    assert_eq!(visited, vec!["start", "stopper"]);
    assert_eq!(
        execution.trace.node_contexts.get("stopper"),
        Some(&json!({ "stopped": true }))
    );
    assert!(execution.trace.row("end").is_none());
    Ok(())
}

#[tokio::test]
async fn run_timeout_cancels_with_reason() -> anyhow::Result<()> {
    let config = EngineConfig {
        run_timeout_ms: Some(50),
        ..EngineConfig::default()
    };
    let executor = executor(RecordingHttp::new(200), config);
    let flow = FlowBuilder::new("slow")
        .start("start")
        .node(sleep_node("wait", 5_000))
        .connect("start", "wait")
        .build()?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Cancelled);
    assert!(matches!(execution.error, Some(FlowEngineError::Timeout(50))));
    Ok(())
}

#[tokio::test]
async fn step_budget_bounds_a_run() -> anyhow::Result<()> {
    let config = EngineConfig {
        max_steps: 2,
        ..EngineConfig::default()
    };
    let executor = executor(RecordingHttp::new(200), config);
    let flow = FlowBuilder::new("long")
        .start("start")
        .node(sleep_node("a", 1))
        .node(sleep_node("b", 1))
        .end("end")
        .connect("start", "a")
        .connect("a", "b")
        .connect("b", "end")
        .build()?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Failed);
    assert!(matches!(execution.error, Some(FlowEngineError::MaxStepsExceeded(2))));
    assert_eq!(execution.trace.rows.len(), 2);
    Ok(())
}

#[tokio::test]
async fn panicking_runner_fails_the_run() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("panics")
        .start("start")
        .node(Node::new("boom", "panic"))
        .connect("start", "boom")
        .build()?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Failed);
    let row = execution.trace.row("boom").expect("boom row");
    assert!(row
        .error_message
        .as_deref()
        .is_some_and(|message| message.contains("runner blew up")));
    Ok(())
}

#[tokio::test]
async fn unproduced_references_resolve_to_undefined() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("forward")
        .start("start")
        .node(Node::new("end", node_types::END).with_input(ValueSchema::object([
            ("later", ValueSchema::reference("never", "value")),
            ("fixed", ValueSchema::constant(json!(1))),
        ])))
        .end("never")
        .connect("start", "end")
        .build()?;
    executor.validate(&flow)?;

    let execution = executor.run(flow, TriggerData::manual(json!({}))).await?;

    assert_eq!(execution.status, RunStatus::Completed);
    assert_eq!(execution.output, Some(json!({ "fixed": 1 })));
    Ok(())
}

#[tokio::test]
async fn output_schema_and_variables_shape_downstream_context() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("shape")
        .start("start")
        .node(
            Node::new("greet", "sleep")
                .with_params(json!({ "ms": 1 }))
                .with_output(ValueSchema::object([(
                    "text",
                    ValueSchema::template("slept {{greet.slept}}ms for {{start.name}}")?,
                )])),
        )
        .node(Node::new("save", node_types::VARIABLE_SAVE).with_input(ValueSchema::object([(
            "variables",
            ValueSchema::object([("city", ValueSchema::reference("start", "city"))]),
        )])))
        .node(Node::new("end", node_types::END).with_input(ValueSchema::object([
            ("text", ValueSchema::reference("greet", "text")),
            ("city", ValueSchema::reference("variables", "city")),
        ])))
        .connect("start", "greet")
        .connect("greet", "save")
        .connect("save", "end")
        .build()?;

    let execution = executor
        .run(flow, TriggerData::manual(json!({ "name": "Bo", "city": "Oslo" })))
        .await?;

    assert_eq!(
        execution.output,
        Some(json!({ "text": "slept 1ms for Bo", "city": "Oslo" }))
    );
    assert_eq!(execution.trace.variables.get("city"), Some(&json!("Oslo")));
    Ok(())
}

#[tokio::test]
async fn disabled_flows_are_rejected_before_start() -> anyhow::Result<()> {
    let executor = executor(RecordingHttp::new(200), EngineConfig::default());
    let flow = FlowBuilder::new("off").disabled().start("start").build()?;
    let err = executor
        .run(flow, TriggerData::manual(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowEngineError::FlowNotEnabled(code) if code == "off"));
    Ok(())
}
