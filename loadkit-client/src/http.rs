use async_trait::async_trait;
use loadkit_common::{Document, ErrorResponse, Result, StoreError};
use serde::Deserialize;
use serde_json::Value;

use crate::{DataAccess, Fields};

/// HTTP store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of a `loadkit-server`, e.g. `http://127.0.0.1:3210`.
    pub base_url: String,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Deserialize)]
struct BatchCreatedResponse {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

/// Data access over the server's REST interface.
pub struct HttpStore {
    pub config: StoreConfig,
    http_client: reqwest::Client,
}

impl HttpStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config, http_client: reqwest::Client::new() }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// `base` followed by `segments`, each percent-encoded as a single path segment.
    fn build_url(&self, segments: &[&str]) -> String {
        match reqwest::Url::parse(self.base()) {
            Ok(mut url) => {
                if let Ok(mut path) = url.path_segments_mut() {
                    path.pop_if_empty().extend(segments);
                }
                url.into()
            }
            // Left unencoded; the request itself reports the bad base URL.
            Err(_) => format!("{}/{}", self.base(), segments.join("/")),
        }
    }

    /// URL of a collection's document list.
    pub fn build_docs_url(&self, collection: &str) -> String {
        self.build_url(&["collections", collection, "docs"])
    }

    /// URL of a single document.
    pub fn build_doc_url(&self, collection: &str, id: &str) -> String {
        self.build_url(&["collections", collection, "docs", id])
    }

    pub fn build_batch_url(&self, collection: &str) -> String {
        self.build_url(&["collections", collection, "batch"])
    }

    pub fn build_count_url(&self, collection: &str) -> String {
        self.build_url(&["collections", collection, "count"])
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, what, response).await);
        }
        Ok(response)
    }

    async fn query_docs(&self, collection: &str, query: &[(&str, String)]) -> Result<Vec<Document>> {
        let request = self.http_client.get(self.build_docs_url(collection)).query(query);
        let response = self.send(request, collection).await?;
        decode(response).await
    }
}

#[async_trait]
impl DataAccess for HttpStore {
    async fn list(&self, collection: &str, limit: usize) -> Result<Vec<Document>> {
        self.query_docs(collection, &[("limit", limit.to_string())]).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let request = self.http_client.get(self.build_doc_url(collection, id));
        match self.send(request, &format!("{collection}/{id}")).await {
            Ok(response) => decode(response).await.map(Some),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let request = self.http_client.get(self.build_count_url(collection));
        let response = self.send(request, collection).await?;
        decode::<CountResponse>(response).await.map(|r| r.count)
    }

    async fn find_by(&self, collection: &str, field: &str, value: &Value, limit: usize) -> Result<Vec<Document>> {
        let value = serde_json::to_string(value).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        self.query_docs(
            collection,
            &[("limit", limit.to_string()), ("field", field.to_string()), ("value", value)],
        )
        .await
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let request = self.http_client.post(self.build_docs_url(collection)).json(&fields);
        let response = self.send(request, collection).await?;
        decode::<CreatedResponse>(response).await.map(|r| r.id)
    }

    async fn create_batch(&self, collection: &str, docs: Vec<Fields>) -> Result<Vec<String>> {
        let request = self.http_client.post(self.build_batch_url(collection)).json(&docs);
        let response = self.send(request, collection).await?;
        decode::<BatchCreatedResponse>(response).await.map(|r| r.ids)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let request = self.http_client.patch(self.build_doc_url(collection, id)).json(&fields);
        self.send(request, &format!("{collection}/{id}")).await?;
        Ok(())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

async fn parse_error_response(
    status: reqwest::StatusCode,
    what: &str,
    response: reqwest::Response,
) -> StoreError {
    if status == reqwest::StatusCode::NOT_FOUND {
        return StoreError::NotFound(what.to_string());
    }

    let error_msg = response
        .json::<ErrorResponse>()
        .await
        .map(|r| r.error)
        .unwrap_or_else(|_| format!("Server returned status: {}", status));

    StoreError::HttpError(status.as_u16(), error_msg)
}
