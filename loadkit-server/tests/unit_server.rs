use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use loadkit_common::{AggregateMetrics, Category, Clock, Document, OperationOutcome, ReportPayload};
use loadkit_server::{
    config::{MAX_LIST_LIMIT, RETAINED_REPORTS},
    handle_count, handle_create, handle_create_batch, handle_get, handle_list, handle_metrics_ingest,
    handle_metrics_summary, handle_update, AppState, ListParams, MetricsSummary, Server, ServerConfig,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// --- Test helpers ---

const NOW: u64 = 1_700_000_000_000;

struct MockClock(AtomicU64);

impl Clock for MockClock {
    fn unix_now_ms(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

fn empty_state() -> AppState {
    AppState::new(Arc::new(MockClock(AtomicU64::new(NOW))) as Arc<dyn Clock>)
}

/// Consume a response body into JSON.
async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn no_filter(limit: Option<usize>) -> Query<ListParams> {
    Query(ListParams { limit, field: None, value: None })
}

/// Issue a create and return the new id.
async fn create_doc(state: &AppState, collection: &str, fields: Value) -> String {
    let response = handle_create(State(state.clone()), Path(collection.to_string()), Json(fields)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["id"].as_str().unwrap().to_string()
}

fn payload(client_id: &str, records: usize) -> ReportPayload {
    ReportPayload {
        client_id: client_id.to_string(),
        timestamp: NOW,
        records: (0..records)
            .map(|i| OperationOutcome::success(Category::Query, format!("op-{i}"), 1.0).stamped(NOW))
            .collect(),
        metrics: AggregateMetrics::default(),
    }
}

// --- Server struct ---

#[test]
fn test_server_creation_with_config() {
    let addr: std::net::SocketAddr = "0.0.0.0:9000".parse().unwrap();
    let server = Server::new(ServerConfig { address: addr });
    assert_eq!(server.address().to_string(), "0.0.0.0:9000");
}

#[test]
fn test_router_builds() {
    let _router = Server::create_router(empty_state());
}

// --- Documents ---

#[tokio::test]
async fn test_create_then_get() {
    let state = empty_state();
    let id = create_doc(&state, "items", json!({"name": "widget"})).await;

    let response = handle_get(State(state.clone()), Path(("items".to_string(), id.clone()))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Document = serde_json::from_value(response_json(response).await).unwrap();
    assert_eq!(doc.id, id);
    assert_eq!(doc.created_at, NOW);
    assert_eq!(doc.field("name"), Some(&json!("widget")));
}

#[tokio::test]
async fn test_get_missing_returns_404_with_envelope() {
    let state = empty_state();
    let response = handle_get(State(state), Path(("items".to_string(), "nope".to_string()))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["error"], "Document not found: items/nope");
}

#[tokio::test]
async fn test_create_rejects_non_object() {
    let state = empty_state();
    let response = handle_create(State(state), Path("items".to_string()), Json(json!([1, 2]))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_batch_and_count() {
    let state = empty_state();
    let body = vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})];
    let response = handle_create_batch(State(state.clone()), Path("items".to_string()), Json(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response_json(response).await["ids"].as_array().unwrap().len(), 3);

    let response = handle_count(State(state), Path("items".to_string())).await;
    assert_eq!(response_json(response).await, json!({"count": 3}));
}

#[tokio::test]
async fn test_create_batch_rejects_non_object_member() {
    let state = empty_state();
    let body = vec![json!({"n": 1}), json!("bad")];
    let response = handle_create_batch(State(state.clone()), Path("items".to_string()), Json(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = handle_count(State(state), Path("items".to_string())).await;
    assert_eq!(response_json(response).await, json!({"count": 0}));
}

#[tokio::test]
async fn test_list_newest_first_with_limit() {
    let state = empty_state();
    let first = create_doc(&state, "items", json!({"n": 1})).await;
    let second = create_doc(&state, "items", json!({"n": 2})).await;

    let response = handle_list(State(state.clone()), Path("items".to_string()), no_filter(None)).await;
    let docs = response_json(response).await;
    assert_eq!(docs[0]["id"], second.as_str());
    assert_eq!(docs[1]["id"], first.as_str());

    let response = handle_list(State(state), Path("items".to_string()), no_filter(Some(1))).await;
    assert_eq!(response_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_rejects_excessive_limit() {
    let state = empty_state();
    let response = handle_list(State(state), Path("items".to_string()), no_filter(Some(MAX_LIST_LIMIT + 1))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_with_filter() {
    let state = empty_state();
    create_doc(&state, "items", json!({"status": "active"})).await;
    create_doc(&state, "items", json!({"status": "archived"})).await;

    let params = Query(ListParams {
        limit: Some(10),
        field: Some("status".to_string()),
        value: Some("\"archived\"".to_string()),
    });
    let response = handle_list(State(state.clone()), Path("items".to_string()), params).await;
    let docs = response_json(response).await;
    assert_eq!(docs.as_array().unwrap().len(), 1);
    assert_eq!(docs[0]["fields"]["status"], "archived");

    let params = Query(ListParams { limit: None, field: Some("status".to_string()), value: None });
    let response = handle_list(State(state.clone()), Path("items".to_string()), params).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let params = Query(ListParams { limit: None, field: Some("status".to_string()), value: Some("{oops".to_string()) });
    let response = handle_list(State(state), Path("items".to_string()), params).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_merges_and_missing_is_404() {
    let state = empty_state();
    let id = create_doc(&state, "items", json!({"a": 1})).await;

    let response =
        handle_update(State(state.clone()), Path(("items".to_string(), id.clone())), Json(json!({"b": 2}))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = handle_get(State(state.clone()), Path(("items".to_string(), id))).await;
    assert_eq!(response_json(response).await["fields"], json!({"a": 1, "b": 2}));

    let response =
        handle_update(State(state), Path(("items".to_string(), "ghost".to_string())), Json(json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Metrics inbox ---

#[tokio::test]
async fn test_metrics_ingest_accumulates() {
    let state = empty_state();

    let response = handle_metrics_ingest(State(state.clone()), Json(payload("client-a", 3))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    handle_metrics_ingest(State(state.clone()), Json(payload("client-b", 2))).await;
    handle_metrics_ingest(State(state.clone()), Json(payload("client-a", 1))).await;

    let response = handle_metrics_summary(State(state)).await;
    let summary: MetricsSummary = serde_json::from_value(response_json(response).await).unwrap();
    assert_eq!(
        summary,
        MetricsSummary {
            batches: 3,
            records: 6,
            clients: vec!["client-a".to_string(), "client-b".to_string()],
        }
    );
}

#[tokio::test]
async fn test_metrics_inbox_retains_bounded_history() {
    let state = empty_state();
    for _ in 0..RETAINED_REPORTS + 5 {
        handle_metrics_ingest(State(state.clone()), Json(payload("c", 1))).await;
    }

    let inbox = state.inbox.read().await;
    assert_eq!(inbox.recent.len(), RETAINED_REPORTS);
    assert_eq!(inbox.batches, (RETAINED_REPORTS + 5) as u64);
}
