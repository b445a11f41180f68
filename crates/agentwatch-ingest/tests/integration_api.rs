//! Ingestion API integration tests
//!
//! Router-level tests driven through `tower::ServiceExt::oneshot`, with a
//! directly registered broadcaster client standing in for a dashboard.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use agentwatch_ingest::{AppState, Broadcaster, HitlNotifier, app};
use agentwatch_store::EventStore;

async fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let store = EventStore::new(dir.path().join("test.db")).await.unwrap();
    let state = AppState {
        store,
        broadcaster: Arc::new(Broadcaster::new()),
        notifier: HitlNotifier::new().unwrap(),
    };
    (dir, state)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sample_event() -> Value {
    json!({
        "source_app": "agentA",
        "session_id": "s1",
        "hook_event_type": "PreToolUse",
        "payload": {"tool_name": "Bash"}
    })
}

#[tokio::test]
async fn test_post_event_returns_stored_event_and_broadcasts() {
    let (_dir, state) = test_state().await;
    let (_client, mut rx) = state.broadcaster.register();

    let response = app(state.clone())
        .oneshot(post("/events", sample_event()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = json_body(response).await;
    let id = stored["id"].as_i64().unwrap();
    assert!(id > 0);
    assert!(stored["timestamp"].is_string());
    assert_eq!(stored["payload"]["tool_name"], "Bash");

    // The connected dashboard client sees the same event
    let broadcast: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(broadcast["type"], "event");
    assert_eq!(broadcast["data"]["id"], json!(id));
}

#[tokio::test]
async fn test_post_event_missing_fields_is_rejected_without_broadcast() {
    let (_dir, state) = test_state().await;
    let (_client, mut rx) = state.broadcaster.register();

    let response = app(state.clone())
        .oneshot(post(
            "/events",
            json!({
                "source_app": "agentA",
                "hook_event_type": "PreToolUse",
                "payload": {}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Missing required fields");

    // Nothing persisted, nothing broadcast
    assert!(rx.try_recv().is_err());
    let response = app(state.clone())
        .oneshot(get("/events/recent"))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_recent_events_respects_limit_and_order() {
    let (_dir, state) = test_state().await;

    for i in 0..4 {
        let mut event = sample_event();
        event["summary"] = json!(format!("event-{}", i));
        let response = app(state.clone())
            .oneshot(post("/events", event))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app(state.clone())
        .oneshot(get("/events/recent?limit=2"))
        .await
        .unwrap();
    let events = json_body(response).await;
    let summaries: Vec<_> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["summary"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(summaries, vec!["event-2", "event-3"]);
}

#[tokio::test]
async fn test_filter_options_endpoint() {
    let (_dir, state) = test_state().await;

    app(state.clone())
        .oneshot(post("/events", sample_event()))
        .await
        .unwrap();
    let mut other = sample_event();
    other["source_app"] = json!("agentB");
    other["hook_event_type"] = json!("PostToolUse");
    app(state.clone()).oneshot(post("/events", other)).await.unwrap();

    let response = app(state.clone())
        .oneshot(get("/events/filter-options"))
        .await
        .unwrap();
    let options = json_body(response).await;
    assert_eq!(options["source_apps"], json!(["agentA", "agentB"]));
    assert_eq!(options["session_ids"], json!(["s1"]));
    assert_eq!(
        options["hook_event_types"],
        json!(["PostToolUse", "PreToolUse"])
    );
}

#[tokio::test]
async fn test_respond_to_unknown_event_is_404() {
    let (_dir, state) = test_state().await;

    let response = app(state.clone())
        .oneshot(post("/events/999/respond", json!({"decision": "approve"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_respond_records_and_broadcasts_update() {
    let (_dir, state) = test_state().await;

    let mut event = sample_event();
    event["hook_event_type"] = json!("Notification");
    event["humanInTheLoop"] = json!({"question": "continue?"});
    let response = app(state.clone())
        .oneshot(post("/events", event))
        .await
        .unwrap();
    let stored = json_body(response).await;
    assert_eq!(stored["humanInTheLoopStatus"], "pending");
    let id = stored["id"].as_i64().unwrap();

    let (_client, mut rx) = state.broadcaster.register();
    let response = app(state.clone())
        .oneshot(post(
            &format!("/events/{}/respond", id),
            json!({"decision": "approve"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let updated = json_body(response).await;
    assert_eq!(updated["humanInTheLoopStatus"], "responded");
    assert_eq!(updated["humanInTheLoopResponse"]["decision"], "approve");
    assert!(updated["respondedAt"].is_string());

    let broadcast: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(broadcast["type"], "event");
    assert_eq!(broadcast["data"]["humanInTheLoopStatus"], "responded");
}

#[tokio::test]
async fn test_hitl_response_is_delivered_to_callback() {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let (_dir, state) = test_state().await;
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hitl/answer"))
        .and(body_json(json!({"decision": "approve"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock)
        .await;

    let mut event = sample_event();
    event["humanInTheLoop"] = json!({
        "question": "continue?",
        "callback_url": format!("{}/hitl/answer", mock.uri())
    });
    let response = app(state.clone())
        .oneshot(post("/events", event))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_i64().unwrap();

    let response = app(state.clone())
        .oneshot(post(
            &format!("/events/{}/respond", id),
            json!({"decision": "approve"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Delivery runs on a spawned task; wait for the callback to land
    let mut delivered = false;
    for _ in 0..100 {
        if !mock.received_requests().await.unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(delivered, "HITL callback never arrived");
}

#[tokio::test]
async fn test_token_metric_roundtrip_and_summary() {
    let (_dir, state) = test_state().await;
    let (_client, mut rx) = state.broadcaster.register();

    app(state.clone())
        .oneshot(post("/api/sessions", json!({"session_id": "s1"})))
        .await
        .unwrap();
    rx.try_recv().unwrap(); // session_update

    let response = app(state.clone())
        .oneshot(post(
            "/api/metrics/tokens",
            json!({
                "session_id": "s1",
                "source_app": "agentA",
                "model_name": "claude-sonnet-4",
                "input_tokens": 100,
                "output_tokens": 50,
                "estimated_cost": 0.25
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = json_body(response).await;
    assert_eq!(stored["total_tokens"], 150);

    let broadcast: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(broadcast["type"], "token_update");

    let response = app(state.clone())
        .oneshot(get("/api/metrics/tokens?session_id=s1"))
        .await
        .unwrap();
    let summary = json_body(response).await;
    assert_eq!(summary["totals"]["total_tokens"], 150);
    assert_eq!(
        summary["by_model"]["claude-sonnet-4"]["input_tokens"],
        100
    );

    // The session rollup rode the same write
    let response = app(state.clone())
        .oneshot(get("/api/sessions/s1"))
        .await
        .unwrap();
    let session = json_body(response).await;
    assert_eq!(session["total_tokens"], 150);
}

#[tokio::test]
async fn test_metric_missing_fields_is_400() {
    let (_dir, state) = test_state().await;

    for uri in [
        "/api/metrics/tokens",
        "/api/metrics/tools",
        "/api/metrics/findings",
        "/api/metrics/wstg",
    ] {
        let response = app(state.clone())
            .oneshot(post(uri, json!({"session_id": "s1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Missing required fields");
    }
}

#[tokio::test]
async fn test_tool_findings_and_wstg_endpoints() {
    let (_dir, state) = test_state().await;

    app(state.clone())
        .oneshot(post("/api/sessions", json!({"session_id": "s1"})))
        .await
        .unwrap();

    for status in ["success", "success", "failure"] {
        let response = app(state.clone())
            .oneshot(post(
                "/api/metrics/tools",
                json!({
                    "session_id": "s1",
                    "source_app": "agentA",
                    "tool_name": "sqlmap",
                    "tool_type": "scanner",
                    "status": status
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app(state.clone())
        .oneshot(get("/api/metrics/tools"))
        .await
        .unwrap();
    let report = json_body(response).await;
    assert_eq!(report["tools"][0]["total_calls"], 3);
    assert_eq!(report["tools"][0]["success_rate"], 66.67);

    app(state.clone())
        .oneshot(post(
            "/api/metrics/findings",
            json!({
                "session_id": "s1",
                "source_app": "agentA",
                "finding_id": "F-1",
                "vulnerability_type": "sqli",
                "severity": "high"
            }),
        ))
        .await
        .unwrap();

    let response = app(state.clone())
        .oneshot(get("/api/metrics/findings"))
        .await
        .unwrap();
    let summary = json_body(response).await;
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["by_severity"]["high"], 1);

    for (wstg_id, status) in [
        ("WSTG-ATHN-01", "executed"),
        ("WSTG-ATHN-02", "not_applicable"),
        ("WSTG-INPV-05", "skipped"),
    ] {
        app(state.clone())
            .oneshot(post(
                "/api/metrics/wstg",
                json!({
                    "session_id": "s1",
                    "source_app": "agentA",
                    "wstg_id": wstg_id,
                    "status": status
                }),
            ))
            .await
            .unwrap();
    }

    let response = app(state.clone())
        .oneshot(get("/api/metrics/wstg"))
        .await
        .unwrap();
    let report = json_body(response).await;
    assert_eq!(report["coverage_percentage"], 50.0);

    let response = app(state.clone())
        .oneshot(get("/api/metrics/dashboard"))
        .await
        .unwrap();
    let dashboard = json_body(response).await;
    assert_eq!(dashboard["sessions"]["by_status"]["running"], 1);
    assert_eq!(dashboard["findings"]["total"], 1);
    assert_eq!(dashboard["tools"]["tools"][0]["tool_name"], "sqlmap");
    assert_eq!(dashboard["coverage"]["total_items"], 3);
}

#[tokio::test]
async fn test_session_crud() {
    let (_dir, state) = test_state().await;

    let response = app(state.clone())
        .oneshot(post(
            "/api/sessions",
            json!({"session_id": "s1", "client_name": "acme"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = json_body(response).await;
    assert_eq!(session["status"], "running");

    let response = app(state.clone())
        .oneshot(post("/api/sessions/s1/agents", json!({"agent": "recon"})))
        .await
        .unwrap();
    let session = json_body(response).await;
    assert_eq!(session["agents_used"], json!(["recon"]));

    let response = app(state.clone())
        .oneshot(get("/api/sessions"))
        .await
        .unwrap();
    let sessions = json_body(response).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);

    let response = app(state.clone())
        .oneshot(get("/api/sessions/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(state.clone())
        .oneshot(post("/api/sessions/missing/agents", json!({"agent": "x"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(state.clone())
        .oneshot(post("/api/sessions", json!({"client_name": "acme"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_is_wide_open() {
    let (_dir, state) = test_state().await;

    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/events")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_healthz() {
    let (_dir, state) = test_state().await;

    let response = app(state.clone()).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}
