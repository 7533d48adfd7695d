use async_trait::async_trait;
use barrage_context::{StepStatus, VarScope};
use barrage_core::{ExecutionRequest, HttpResponse, RequestExecutor, TransportError};
use barrage_runtime::FlowOrchestrator;
use barrage_yaml::{build_plan, PlanLeafRunner, PlanLoader};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn body(status: u16) -> Vec<u8> {
    format!("{{\"ok\": {}, \"meta\": {{\"status\": {status}}}}}", status < 400).into_bytes()
}

/// Records every request and answers with the status found in the
/// `x-status` header, 200 otherwise.
#[derive(Default)]
struct RecordingExecutor {
    seen: Mutex<Vec<ExecutionRequest>>,
}

#[async_trait]
impl RequestExecutor for RecordingExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<HttpResponse, TransportError> {
        let status = request
            .headers
            .iter()
            .find(|(name, _)| name == "x-status")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(200);
        self.seen.lock().unwrap().push(request);
        Ok(HttpResponse {
            status,
            body: body(status).into(),
        })
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

async fn run_plan(
    dir: &Path,
    executor: Arc<RecordingExecutor>,
) -> (anyhow::Result<()>, FlowOrchestrator) {
    let plan_path = dir.join("plan.yaml");
    let config = PlanLoader::from_file(&plan_path).unwrap();
    let plan = build_plan(&config, dir).unwrap();
    let runner = PlanLeafRunner::new(executor).preload(&plan).unwrap();
    let orchestrator = FlowOrchestrator::new(Arc::new(runner));
    let result = orchestrator
        .run(
            &plan,
            &dir.join("out"),
            VarScope::new().with("host", "http://svc"),
            None,
            CancellationToken::new(),
        )
        .await;
    (result, orchestrator)
}

fn lines(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_plan_runs_leaves_and_writes_records() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "plan.yaml",
        r#"
concurrency: 1
flows:
  - id: users
    file: users.yaml
    count: 2
    mkdir: true
    values:
      - { key: tenant, value: acme }
"#,
    );
    write(
        dir.path(),
        "users.yaml",
        r#"
type: MassExecute
auth: { type: bearer, token: "secret-${tenant}" }
requests:
  - id: list
    target: "${host}"
    endpoint: /tenants/{tenant}/users
    pathVariables: { tenant: "${tenant}" }
    queryParam: { page: "${attempt}" }
    interval: 5
    successBreak: [count]
    break: { count: 3 }
    data:
      - { name: status, query: $.meta.status }
"#,
    );

    let executor = Arc::new(RecordingExecutor::default());
    let (result, orchestrator) = run_plan(dir.path(), executor.clone()).await;
    result.unwrap();

    for iteration in 0..2 {
        let records = lines(&dir.path().join(format!("out/users_{iteration}/list.jsonl")));
        assert_eq!(records.len(), 3);
        let seqs: Vec<u64> = records.iter().map(|r| r["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(records[0]["data"]["status"], 200);
    }

    let seen = executor.seen.lock().unwrap();
    assert_eq!(seen.len(), 6);
    assert!(seen
        .iter()
        .all(|r| r.url() == "http://svc/tenants/acme/users"));
    assert!(seen.iter().all(|r| r
        .headers
        .contains(&("Authorization".to_string(), "Bearer secret-acme".to_string()))));

    let context = orchestrator.context();
    let ctx = context.lock().await;
    assert_eq!(ctx.status_of("users#0"), Some(StepStatus::Succeeded));
    assert_eq!(ctx.status_of("users#1"), Some(StepStatus::Succeeded));
}

#[tokio::test]
async fn test_failing_request_cancels_siblings_and_fails_plan() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "plan.yaml",
        "flows:\n  - id: mixed\n    file: mixed.yaml\n  - id: later\n    file: later.yaml\n",
    );
    write(
        dir.path(),
        "mixed.yaml",
        r#"
type: MassExecute
requests:
  - id: broken
    target: "${host}"
    headers: { x-status: "503" }
    interval: 5
    break:
      statusCode:
        - { id: 5xx, op: between, value: "500,599" }
  - id: steady
    target: "${host}"
    interval: 5
"#,
    );
    write(
        dir.path(),
        "later.yaml",
        "type: OneExecute\nrequest: { target: \"${host}\" }\n",
    );

    let (result, orchestrator) = run_plan(dir.path(), Arc::new(RecordingExecutor::default())).await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("statusCode/5xx"));

    let context = orchestrator.context();
    let ctx = context.lock().await;
    assert_eq!(ctx.status_of("mixed#0"), Some(StepStatus::Failed));
    assert_eq!(ctx.status_of("later#0"), Some(StepStatus::Cancelled));
}

#[tokio::test]
async fn test_one_execute_fires_once_and_writes_json_plan() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "plan.yaml",
        r#"flows: [{ id: ping, file: ping.json }]"#,
    );
    write(
        dir.path(),
        "ping.json",
        r#"{"type": "OneExecute", "request": {"id": "ping", "target": "${host}", "endpoint": "/health"}}"#,
    );

    let executor = Arc::new(RecordingExecutor::default());
    let (result, _) = run_plan(dir.path(), executor.clone()).await;
    result.unwrap();

    assert_eq!(executor.seen.lock().unwrap().len(), 1);
    let records = lines(&dir.path().join("out/ping.jsonl"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status_code"], 200);
}

#[test]
fn test_broken_leaf_fails_preload() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "plan.yaml", "flows: [{ id: a, file: a.yaml }]");
    write(dir.path(), "a.yaml", "type: Replay\n");

    let config = PlanLoader::from_file(dir.path().join("plan.yaml")).unwrap();
    let plan = build_plan(&config, dir.path()).unwrap();
    let err = PlanLeafRunner::new(Arc::new(RecordingExecutor::default()))
        .preload(&plan)
        .err()
        .unwrap();
    assert!(format!("{err:#}").contains("Replay"));
}
