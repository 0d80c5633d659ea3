use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use libsql_pipeline::{
    row_map, ClientOptions, ErrorCode, LibsqlError, PipelineSession, Statement, TransactionMode,
    TransactionState, Value,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: JsonValue) -> Self {
        Self::json(StatusCode::OK, body)
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    bodies: Arc<Mutex<Vec<JsonValue>>>,
    hits: Arc<AtomicUsize>,
    health: StatusCode,
}

async fn pipeline_handler(State(state): State<MockState>, body: String) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let parsed: JsonValue = serde_json::from_str(&body).expect("client must send JSON");
    state
        .bodies
        .lock()
        .expect("body log mutex must not be poisoned")
        .push(parsed);

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

async fn health_handler(State(state): State<MockState>) -> StatusCode {
    state.health
}

async fn version_handler() -> &'static str {
    "libsql-server 0.24.1"
}

struct TestServer {
    base_url: String,
    bodies: Arc<Mutex<Vec<JsonValue>>>,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn bodies(&self) -> Vec<JsonValue> {
        self.bodies
            .lock()
            .expect("body log mutex must not be poisoned")
            .clone()
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    spawn_server_with_health(responses, StatusCode::OK).await
}

async fn spawn_server_with_health(responses: Vec<MockResponse>, health: StatusCode) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        bodies: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
        health,
    };

    let app = Router::new()
        .route("/v2/pipeline", post(pipeline_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        bodies: state.bodies,
        hits: state.hits,
        task,
    }
}

fn execute_ok(result: JsonValue) -> JsonValue {
    json!({"type": "ok", "response": {"type": "execute", "result": result}})
}

fn close_ok() -> JsonValue {
    json!({"type": "ok", "response": {"type": "close"}})
}

fn affected(rows: u64) -> JsonValue {
    execute_ok(json!({"cols": [], "rows": [], "affected_row_count": rows, "last_insert_rowid": null, "replication_index": 1}))
}

fn users_result() -> JsonValue {
    execute_ok(json!({
        "cols": [
            {"name": "name", "decltype": "TEXT"},
            {"name": "id", "decltype": "INTEGER"},
            {"name": "weight", "decltype": "REAL"}
        ],
        "rows": [
            [
                {"type": "text", "value": "Ramons"},
                {"type": "integer", "value": "1"},
                {"type": "float", "value": 45.5}
            ]
        ],
        "affected_row_count": 0,
        "last_insert_rowid": null,
        "replication_index": "7"
    }))
}

#[tokio::test]
async fn execute_without_baton_runs_in_a_closed_stream() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "baton": null,
        "base_url": null,
        "results": [users_result(), close_ok()]
    }))])
    .await;
    let mut session = PipelineSession::new(&server.base_url).with_auth_token("token");

    let result = session
        .execute(
            &Statement::new("SELECT name, id, weight FROM users WHERE id = ?", [Value::integer(1)]),
            None,
        )
        .await
        .expect("execute must succeed");

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0][2], Value::Float(45.5));
    assert_eq!(result.replication_index.as_deref(), Some("7"));
    assert_eq!(
        row_map::to_text(&result),
        r#"[{"name":"Ramons","id":1,"weight":45.5}]"#
    );
    assert!(session.baton().is_none());
    assert_eq!(
        server.bodies(),
        vec![json!({
            "requests": [
                {"type": "execute", "stmt": {
                    "sql": "SELECT name, id, weight FROM users WHERE id = ?",
                    "args": [{"type": "integer", "value": "1"}]
                }},
                {"type": "close"}
            ]
        })]
    );
}

#[tokio::test]
async fn continued_stream_tracks_baton_until_close() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "b1", "results": [affected(0)]})),
        MockResponse::ok(json!({"baton": "b2", "results": [affected(1)]})),
        MockResponse::ok(json!({"baton": null, "results": [close_ok()]})),
    ])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    session
        .send_batch(
            vec![libsql_pipeline::Request::execute_sql("BEGIN IMMEDIATE")],
            None,
            false,
        )
        .await
        .expect("begin must succeed");
    let baton = session.baton().cloned().expect("server returned a baton");
    assert_eq!(baton.as_str(), "b1");

    let result = session
        .execute(&Statement::sql("DELETE FROM sessions"), Some(&baton))
        .await
        .expect("continued execute must succeed");
    assert_eq!(result.affected_row_count, 1);
    assert_eq!(session.baton().map(|b| b.as_str()), Some("b2"));

    session.close().await;
    assert!(session.baton().is_none());

    let bodies = server.bodies();
    assert_eq!(
        bodies[1],
        json!({
            "requests": [{"type": "execute", "stmt": {"sql": "DELETE FROM sessions"}}],
            "baton": "b1"
        })
    );
    assert_eq!(bodies[2], json!({"requests": [{"type": "close"}], "baton": "b2"}));
}

#[tokio::test]
async fn close_without_open_stream_sends_nothing() {
    let server = spawn_server(Vec::new()).await;
    let mut session = PipelineSession::new(&server.base_url);

    session.close().await;

    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn server_error_is_classified_and_observed() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "baton": null,
        "results": [
            {"type": "error", "error": {"message": "no such table: users", "code": "SQLITE_ERROR"}},
            close_ok()
        ]
    }))])
    .await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut session = PipelineSession::new(&server.base_url).with_observer(
        move |operation: &'static str, error: &LibsqlError| {
            sink.lock().unwrap().push((operation, error.code()));
        },
    );

    let err = session
        .execute(&Statement::sql("SELECT * FROM users"), None)
        .await
        .expect_err("query must fail");

    assert_eq!(err.code(), ErrorCode::QueryOperation);
    assert_eq!(err.server_code(), Some("SQLITE_ERROR"));
    assert_eq!(err.to_string(), "QUERY_OPERATION_ERROR: no such table: users");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("execute", ErrorCode::QueryOperation)]
    );
}

#[tokio::test]
async fn batch_stops_mapping_at_first_error() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "baton": "b1",
        "results": [
            affected(1),
            {"type": "error", "error": {"message": "near \"INSER\": syntax error", "code": "SQLITE_ERROR"}},
            affected(1)
        ]
    }))])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    let requests = [
        Statement::new("INSERT INTO users(name) VALUES (?)", [Value::text("A")]),
        Statement::new("INSER INTO users(name) VALUES (?)", [Value::text("B")]),
        Statement::new("INSERT INTO users(name) VALUES (?)", [Value::text("C")]),
    ]
    .iter()
    .map(libsql_pipeline::Request::execute)
    .collect::<Result<Vec<_>, _>>()
    .expect("statements must encode");

    let response = session
        .send_batch(requests, None, false)
        .await
        .expect("batch must decode");

    assert_eq!(response.outcomes.len(), 2);
    assert_eq!(response.results().count(), 1);
    let error = response.error().expect("second request failed");
    assert_eq!(error.request_index, 1);

    let err = response.into_results().expect_err("error outcome must surface");
    assert_eq!(err.server_code(), Some("SQLITE_ERROR"));
}

#[tokio::test]
async fn transaction_begin_and_commit_over_http() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "tx-1", "results": [affected(0)]})),
        MockResponse::ok(json!({
            "baton": null,
            "results": [affected(1), affected(0), close_ok()]
        })),
    ])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    let mut tx = session
        .transaction("write")
        .await
        .expect("transaction must open");
    tx.add(Statement::new(
        "INSERT INTO users (name, age) VALUES (?, ?)",
        [Value::text("Ramons"), Value::integer(32)],
    ))
    .expect("statement must queue");
    assert_eq!(server.hits(), 1);

    let response = tx.commit().await.expect("commit must succeed");
    assert_eq!(tx.state(), TransactionState::Closed);
    assert_eq!(response.results().count(), 2);
    drop(tx);
    assert!(session.baton().is_none());

    assert_eq!(
        server.bodies(),
        vec![
            json!({"requests": [{"type": "execute", "stmt": {"sql": "BEGIN IMMEDIATE"}}]}),
            json!({
                "requests": [
                    {"type": "execute", "stmt": {
                        "sql": "INSERT INTO users (name, age) VALUES (?, ?)",
                        "args": [
                            {"type": "text", "value": "Ramons"},
                            {"type": "integer", "value": "32"}
                        ]
                    }},
                    {"type": "execute", "stmt": {"sql": "COMMIT"}},
                    {"type": "close"}
                ],
                "baton": "tx-1"
            })
        ]
    );
}

#[tokio::test]
async fn bogus_transaction_mode_makes_no_request() {
    let server = spawn_server(Vec::new()).await;
    let mut session = PipelineSession::new(&server.base_url);

    let err = session
        .transaction("bogus")
        .await
        .expect_err("mode must be rejected");

    assert_eq!(err.code(), ErrorCode::InvalidTransactionMode);
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn batch_execute_uses_two_sequential_calls() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "batch-1", "results": [affected(0)]})),
        MockResponse::ok(json!({
            "baton": null,
            "results": [affected(1), affected(1), affected(0), close_ok()]
        })),
    ])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    let response = session
        .batch_execute(
            [
                Statement::new("INSERT INTO users (name) VALUES (?)", [Value::text("Ramons")]),
                Statement::new("INSERT INTO users (name) VALUES (?)", [Value::text("Georgia")]),
            ],
            TransactionMode::Deferred,
        )
        .await
        .expect("batch must commit");

    assert_eq!(response.results().count(), 3);
    let bodies = server.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0],
        json!({"requests": [{"type": "execute", "stmt": {"sql": "BEGIN DEFERRED"}}]})
    );
    assert_eq!(bodies[1]["baton"], json!("batch-1"));
    assert_eq!(bodies[1]["requests"][2], json!({"type": "execute", "stmt": {"sql": "COMMIT"}}));
    assert_eq!(bodies[1]["requests"][3], json!({"type": "close"}));
}

#[tokio::test]
async fn batch_execute_http_failure_is_start_phase() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({"error": "overloaded"}),
    )])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    let err = session
        .batch_execute([Statement::sql("DELETE FROM users")], TransactionMode::Write)
        .await
        .expect_err("begin must fail");

    assert_eq!(err.code(), ErrorCode::BatchTransactionTerminated);
    let phase = std::error::Error::source(&err).expect("phase error");
    assert!(phase.to_string().starts_with("INVALID_START_TRANSACTION"));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn execute_sequence_returns_raw_body() {
    let body = json!({"baton": null, "results": [{"type": "ok", "response": {"type": "sequence"}}, close_ok()]});
    let server = spawn_server(vec![MockResponse::ok(body.clone())]).await;
    let mut session = PipelineSession::new(&server.base_url);

    let raw = session
        .execute_sequence("UPDATE users SET name = 'Turso DB' WHERE id = 1;\nUPDATE users SET age = 3;\n")
        .await
        .expect("sequence must run");

    assert_eq!(serde_json::from_str::<JsonValue>(&raw).unwrap(), body);
    assert_eq!(
        server.bodies()[0],
        json!({
            "requests": [
                {"type": "sequence", "sql": "UPDATE users SET name = 'Turso DB' WHERE id = 1;UPDATE users SET age = 3;"},
                {"type": "close"}
            ]
        })
    );
}

#[tokio::test]
async fn base_url_from_server_reroutes_following_requests() {
    let second = spawn_server(vec![MockResponse::ok(json!({
        "baton": null,
        "results": [affected(1)]
    }))])
    .await;
    let first = spawn_server(vec![MockResponse::ok(json!({
        "baton": "b1",
        "base_url": second.base_url,
        "results": [affected(0)]
    }))])
    .await;
    let mut session = PipelineSession::new(&first.base_url);

    session
        .send_batch(
            vec![libsql_pipeline::Request::execute_sql("BEGIN")],
            None,
            false,
        )
        .await
        .expect("begin must succeed");
    assert_eq!(session.base_url(), second.base_url);

    let baton = session.baton().cloned();
    session
        .execute(&Statement::sql("COMMIT"), baton.as_ref())
        .await
        .expect("commit must reach the new origin");

    assert_eq!(first.hits(), 1);
    assert_eq!(second.hits(), 1);
}

#[tokio::test]
async fn connect_and_version() {
    let server = spawn_server(Vec::new()).await;
    let session = PipelineSession::new(&server.base_url);
    assert!(session.connect().await.expect("health check must run"));
    assert_eq!(
        session.version().await.expect("version must load"),
        "libsql-server 0.24.1"
    );

    let unhealthy = spawn_server_with_health(Vec::new(), StatusCode::SERVICE_UNAVAILABLE).await;
    let session = PipelineSession::new(&unhealthy.base_url);
    assert!(!session.connect().await.expect("health check must run"));
}

#[tokio::test]
async fn connect_failure_is_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let session = PipelineSession::new(format!("http://{address}"));
    let err = session.connect().await.expect_err("nothing listens there");

    assert_eq!(err.code(), ErrorCode::Connection);
    assert!(err.to_string().starts_with("CONNECTION_ERROR"));
}

#[tokio::test]
async fn request_timeout_surfaces_as_query_operation_error() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "baton": null,
        "results": [affected(1), close_ok()]
    }))
    .with_delay(Duration::from_millis(150))])
    .await;

    let mut session = PipelineSession::new(&server.base_url).with_options(ClientOptions {
        timeout_ms: 20,
        ..ClientOptions::default()
    });

    let err = session
        .execute(&Statement::sql("DELETE FROM users"), None)
        .await
        .expect_err("request must time out");

    assert_eq!(err.code(), ErrorCode::QueryOperation);
    assert_eq!(err.server_code(), None);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn failed_continued_execute_closes_the_stream() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "b1", "results": [affected(0)]})),
        MockResponse::ok(json!({
            "baton": "b2",
            "results": [
                {"type": "error", "error": {"message": "UNIQUE constraint failed: users.id", "code": "SQLITE_CONSTRAINT"}}
            ]
        })),
        MockResponse::ok(json!({"baton": null, "results": [close_ok()]})),
    ])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    session
        .send_batch(
            vec![libsql_pipeline::Request::execute_sql("BEGIN IMMEDIATE")],
            None,
            false,
        )
        .await
        .expect("begin must succeed");
    let baton = session.baton().cloned();

    let err = session
        .execute(
            &Statement::new("INSERT INTO users (id) VALUES (?)", [Value::integer(1)]),
            baton.as_ref(),
        )
        .await
        .expect_err("constraint must fail");

    assert_eq!(err.code(), ErrorCode::QueryOperation);
    assert_eq!(err.server_code(), Some("SQLITE_CONSTRAINT"));
    assert!(session.baton().is_none());
    let bodies = server.bodies();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[2], json!({"requests": [{"type": "close"}], "baton": "b2"}));
}

#[tokio::test]
async fn timed_out_continued_execute_closes_the_stream() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "b1", "results": [affected(0)]})),
        MockResponse::ok(json!({"baton": "b2", "results": [affected(1)]}))
            .with_delay(Duration::from_millis(300)),
        MockResponse::ok(json!({"baton": null, "results": [close_ok()]})),
    ])
    .await;
    let mut session = PipelineSession::new(&server.base_url).with_options(ClientOptions {
        timeout_ms: 50,
        ..ClientOptions::default()
    });

    session
        .send_batch(
            vec![libsql_pipeline::Request::execute_sql("BEGIN IMMEDIATE")],
            None,
            false,
        )
        .await
        .expect("begin must succeed");
    let baton = session.baton().cloned();

    let err = session
        .execute(&Statement::sql("DELETE FROM users"), baton.as_ref())
        .await
        .expect_err("request must time out");

    assert_eq!(err.code(), ErrorCode::QueryOperation);
    assert!(session.baton().is_none());
    let bodies = server.bodies();
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[2], json!({"requests": [{"type": "close"}], "baton": "b1"}));
}

#[tokio::test]
async fn failed_sequence_is_multiple_exec_and_keeps_open_stream() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "b1", "results": [affected(0)]})),
        MockResponse::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "sequence failed"}),
        ),
    ])
    .await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut session = PipelineSession::new(&server.base_url).with_observer(
        move |operation: &'static str, error: &LibsqlError| {
            sink.lock().unwrap().push((operation, error.code()));
        },
    );

    session
        .send_batch(
            vec![libsql_pipeline::Request::execute_sql("BEGIN IMMEDIATE")],
            None,
            false,
        )
        .await
        .expect("begin must succeed");

    let err = session
        .execute_sequence("UPDATE users SET age = 1;\nUPDATE users SET age = 2;")
        .await
        .expect_err("server rejected the script");

    assert_eq!(err.code(), ErrorCode::MultipleExec);
    assert!(err.to_string().starts_with("MULTIPLE_EXEC_ERROR"));
    assert_eq!(session.baton().map(|b| b.as_str()), Some("b1"));
    assert_eq!(server.hits(), 2);
    assert_eq!(server.bodies()[1].get("baton"), None);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("execute_sequence", ErrorCode::MultipleExec)]
    );
}

#[tokio::test]
async fn undecodable_begin_response_still_closes_its_stream() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"baton": "b1", "results": [{"type": "pending"}]})),
        MockResponse::ok(json!({"baton": null, "results": [close_ok()]})),
    ])
    .await;
    let mut session = PipelineSession::new(&server.base_url);

    let err = session
        .batch_execute([Statement::sql("DELETE FROM users")], TransactionMode::Write)
        .await
        .expect_err("begin outcome cannot be decoded");

    assert_eq!(err.code(), ErrorCode::BatchTransactionTerminated);
    assert!(session.baton().is_none());
    let bodies = server.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1], json!({"requests": [{"type": "close"}], "baton": "b1"}));
}
