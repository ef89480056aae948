use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use loadkit_client::{DataAccess, Fields, MemoryStore};
use loadkit_common::{Clock, ErrorResponse, ReportPayload, StoreError, SystemClock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info};

pub mod config;
use config::{DEFAULT_LIST_LIMIT, LOCK_TIMEOUT, MAX_BATCH_SIZE, MAX_LIST_LIMIT, RETAINED_REPORTS};

/// Report payloads received on `POST /metrics`.
#[derive(Default)]
pub struct MetricsInbox {
    pub batches: u64,
    pub records: u64,
    pub clients: BTreeSet<String>,
    /// Most recent payloads, oldest first.
    pub recent: VecDeque<ReportPayload>,
}

/// Body of `GET /metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub batches: u64,
    pub records: u64,
    pub clients: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub inbox: Arc<RwLock<MetricsInbox>>,
}

impl AppState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(MemoryStore::with_clock(clock)),
            inbox: Arc::new(RwLock::new(MetricsInbox::default())),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

/// Document store and metrics sink served over HTTP
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Get the server's configured address
    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Create the application router with the given state
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/collections/:collection/docs", get(handle_list).post(handle_create))
            .route("/collections/:collection/docs/:id", get(handle_get).patch(handle_update))
            .route("/collections/:collection/batch", post(handle_create_batch))
            .route("/collections/:collection/count", get(handle_count))
            .route("/metrics", get(handle_metrics_summary).post(handle_metrics_ingest))
            .with_state(state)
    }

    /// Run the server, signalling `ready_tx` with the bound address once accepting connections
    pub async fn run(self, ready_tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
        let state = AppState::new(Arc::new(SystemClock));
        let app = Self::create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "loadkit server listening");
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(what) => error_response(StatusCode::NOT_FOUND, format!("Document not found: {what}")),
        StoreError::InvalidDocument(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn into_fields(value: Value) -> Result<Fields, Response> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "fields must be an object")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub field: Option<String>,
    /// JSON-encoded value `field` must equal.
    pub value: Option<String>,
}

/// Handler for GET /collections/:collection/docs: newest first; optional `field`/`value` filter.
pub async fn handle_list(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit > MAX_LIST_LIMIT {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("limit exceeds maximum of {}", MAX_LIST_LIMIT),
        );
    }

    let result = match (params.field, params.value) {
        (Some(field), Some(raw)) => {
            let value: Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(_) => return error_response(StatusCode::BAD_REQUEST, "value must be JSON"),
            };
            state.store.find_by(&collection, &field, &value, limit).await
        }
        (None, None) => state.store.list(&collection, limit).await,
        _ => return error_response(StatusCode::BAD_REQUEST, "field and value must be given together"),
    };

    match result {
        Ok(docs) => Json(docs).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Handler for GET /collections/:collection/docs/:id: 404 if absent.
pub async fn handle_get(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    match state.store.get(&collection, &id).await {
        Ok(Some(doc)) => Json(doc).into_response(),
        Ok(None) => store_error_response(StoreError::NotFound(format!("{collection}/{id}"))),
        Err(e) => store_error_response(e),
    }
}

/// Handler for GET /collections/:collection/count
pub async fn handle_count(State(state): State<AppState>, Path(collection): Path<String>) -> Response {
    match state.store.count(&collection).await {
        Ok(count) => Json(json!({ "count": count })).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Handler for POST /collections/:collection/docs: body is the new document's fields.
pub async fn handle_create(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let fields = match into_fields(body) {
        Ok(f) => f,
        Err(r) => return r,
    };
    match state.store.create(&collection, fields).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Handler for POST /collections/:collection/batch: body is an array of field objects.
pub async fn handle_create_batch(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<Vec<Value>>,
) -> Response {
    if body.len() > MAX_BATCH_SIZE {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("batch exceeds maximum of {} documents", MAX_BATCH_SIZE),
        );
    }
    let mut docs = Vec::with_capacity(body.len());
    for value in body {
        match into_fields(value) {
            Ok(f) => docs.push(f),
            Err(r) => return r,
        }
    }
    match state.store.create_batch(&collection, docs).await {
        Ok(ids) => (StatusCode::CREATED, Json(json!({ "ids": ids }))).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Handler for PATCH /collections/:collection/docs/:id: merges the body into the document.
pub async fn handle_update(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let fields = match into_fields(body) {
        Ok(f) => f,
        Err(r) => return r,
    };
    match state.store.update(&collection, &id, fields).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Handler for POST /metrics: accepts one flushed report payload.
pub async fn handle_metrics_ingest(State(state): State<AppState>, Json(payload): Json<ReportPayload>) -> Response {
    let mut inbox = match timeout(LOCK_TIMEOUT, state.inbox.write()).await {
        Ok(guard) => guard,
        Err(_) => return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server error: Lock acquisition timed out"),
    };

    debug!(
        client_id = %payload.client_id,
        records = payload.records.len(),
        p95 = payload.metrics.overall.p95,
        "report received"
    );

    inbox.batches += 1;
    inbox.records += payload.records.len() as u64;
    inbox.clients.insert(payload.client_id.clone());
    inbox.recent.push_back(payload);
    while inbox.recent.len() > RETAINED_REPORTS {
        inbox.recent.pop_front();
    }

    StatusCode::ACCEPTED.into_response()
}

/// Handler for GET /metrics: totals across all received payloads.
pub async fn handle_metrics_summary(State(state): State<AppState>) -> Response {
    let inbox = match timeout(LOCK_TIMEOUT, state.inbox.read()).await {
        Ok(guard) => guard,
        Err(_) => return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server error: Lock acquisition timed out"),
    };

    Json(MetricsSummary {
        batches: inbox.batches,
        records: inbox.records,
        clients: inbox.clients.iter().cloned().collect(),
    })
    .into_response()
}
