//! JSON:API transport for a Commerce Layer style REST API.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use promosync_core::ResourceType;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};

use crate::error::{ApiErrorDetail, ClientError};
use crate::payload::{ListQuery, Page, ResourcePayload};
use crate::ResourceClient;

const JSON_API: &str = "application/vnd.api+json";

/// Included relationships are resolved this many levels deep (e.g. `sku_list_promotion_rule.sku_list`).
const MAX_INCLUDE_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Minimum spacing between requests, derived from a per-minute budget.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub requests_per_minute: u32,
}

impl RateLimit {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(60) / self.requests_per_minute.max(1)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub page_size: u32,
    pub backoff: BackoffPolicy,
    pub rate_limit: Option<RateLimit>,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            page_size: 25,
            backoff: BackoffPolicy::default(),
            rate_limit: None,
        }
    }
}

#[derive(Debug)]
pub struct HttpResourceClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    page_size: u32,
    backoff: BackoffPolicy,
    rate_limit: Option<RateLimit>,
    last_request: Mutex<Option<Instant>>,
}

impl HttpResourceClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token,
            page_size: config.page_size.max(1),
            backoff: config.backoff,
            rate_limit: config.rate_limit,
            last_request: Mutex::new(None),
        })
    }

    fn collection_url(&self, resource: ResourceType) -> String {
        format!("{}/{}", self.base_url, resource.as_str())
    }

    fn member_url(&self, resource: ResourceType, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, resource.as_str(), id)
    }

    async fn throttle(&self) {
        let Some(limit) = self.rate_limit else {
            return;
        };
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            let interval = limit.interval();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Sends one request. Only reads are retried: writes are not safe to repeat.
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, ClientError> {
        let retries = if method == Method::GET {
            self.backoff.max_retries
        } else {
            0
        };

        for attempt in 0..=retries {
            self.throttle().await;

            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.access_token)
                .header(reqwest::header::ACCEPT, JSON_API)
                .query(query);
            if let Some(body) = body {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, JSON_API)
                    .body(body.to_string());
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        if status == StatusCode::NO_CONTENT {
                            return Ok(None);
                        }
                        let bytes = resp.bytes().await?;
                        if bytes.is_empty() {
                            return Ok(None);
                        }
                        let document = serde_json::from_slice(&bytes).map_err(|err| {
                            ClientError::Decode {
                                url: url.to_string(),
                                message: err.to_string(),
                            }
                        })?;
                        return Ok(Some(document));
                    }

                    if classify_status(status) == RetryDisposition::Retryable && attempt < retries {
                        debug!(%status, attempt, "retrying request");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    let bytes = resp.bytes().await.unwrap_or_default();
                    return Err(ClientError::Api {
                        status: status.as_u16(),
                        url: url.to_string(),
                        errors: parse_errors(&bytes),
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < retries
                    {
                        debug!(error = %err, attempt, "retrying request");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(ClientError::Request(err));
                }
            }
        }

        Err(ClientError::Message(format!("retries exhausted for {url}")))
    }

    fn single_resource(url: &str, document: Option<Value>) -> Result<Value, ClientError> {
        let document = document.ok_or_else(|| ClientError::Decode {
            url: url.to_string(),
            message: "empty response body".to_string(),
        })?;
        let index = IncludedIndex::from_document(&document);
        match document.get("data") {
            Some(data @ Value::Object(_)) => Ok(flatten_resource(data, &index, MAX_INCLUDE_DEPTH)),
            _ => Err(ClientError::Decode {
                url: url.to_string(),
                message: "response has no `data` object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    async fn list(&self, resource: ResourceType, query: &ListQuery) -> Result<Page, ClientError> {
        let url = self.collection_url(resource);
        let params = encode_query(query, self.page_size);
        let span = info_span!("http_list", resource = %resource, page = ?query.page_number);
        let document = self
            .send(Method::GET, &url, &params, None)
            .instrument(span)
            .await?
            .ok_or_else(|| ClientError::Decode {
                url: url.clone(),
                message: "empty response body".to_string(),
            })?;
        decode_page(&url, &document)
    }

    async fn create(
        &self,
        resource: ResourceType,
        payload: &ResourcePayload,
    ) -> Result<Value, ClientError> {
        let url = self.collection_url(resource);
        let body = encode_payload(resource, None, payload);
        let span = info_span!("http_create", resource = %resource);
        let document = self
            .send(Method::POST, &url, &[], Some(&body))
            .instrument(span)
            .await?;
        Self::single_resource(&url, document)
    }

    async fn update(
        &self,
        resource: ResourceType,
        id: &str,
        payload: &ResourcePayload,
    ) -> Result<Value, ClientError> {
        let url = self.member_url(resource, id);
        let body = encode_payload(resource, Some(id), payload);
        let span = info_span!("http_update", resource = %resource, id);
        let document = self
            .send(Method::PATCH, &url, &[], Some(&body))
            .instrument(span)
            .await?;
        Self::single_resource(&url, document)
    }

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<(), ClientError> {
        let url = self.member_url(resource, id);
        let span = info_span!("http_delete", resource = %resource, id);
        self.send(Method::DELETE, &url, &[], None)
            .instrument(span)
            .await?;
        Ok(())
    }
}

/// Encodes filters as `filter[q][...]`, plus `include`, `fields[...]` and paging.
pub fn encode_query(query: &ListQuery, default_page_size: u32) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for (predicate, value) in &query.filters {
        params.push((format!("filter[q][{predicate}]"), value.clone()));
    }
    if !query.include.is_empty() {
        params.push(("include".to_string(), query.include.join(",")));
    }
    for (resource, names) in &query.fields {
        params.push((format!("fields[{resource}]"), names.join(",")));
    }
    params.push((
        "page[number]".to_string(),
        query.page_number.unwrap_or(1).to_string(),
    ));
    params.push((
        "page[size]".to_string(),
        query.page_size.unwrap_or(default_page_size).to_string(),
    ));
    params
}

/// Builds a JSON:API document for a create (no id) or update.
pub fn encode_payload(resource: ResourceType, id: Option<&str>, payload: &ResourcePayload) -> Value {
    let mut data = Map::new();
    data.insert("type".into(), Value::String(resource.as_str().to_string()));
    if let Some(id) = id {
        data.insert("id".into(), Value::String(id.to_string()));
    }
    data.insert("attributes".into(), Value::Object(payload.attributes.clone()));
    if !payload.relationships.is_empty() {
        let relationships = payload
            .relationships
            .iter()
            .map(|(name, target)| {
                (
                    name.clone(),
                    json!({ "data": { "type": target.resource.as_str(), "id": target.id } }),
                )
            })
            .collect::<Map<_, _>>();
        data.insert("relationships".into(), Value::Object(relationships));
    }
    json!({ "data": Value::Object(data) })
}

pub fn decode_page(url: &str, document: &Value) -> Result<Page, ClientError> {
    let index = IncludedIndex::from_document(document);
    let data = document
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::Decode {
            url: url.to_string(),
            message: "response has no `data` array".to_string(),
        })?;
    let items = data
        .iter()
        .map(|resource| flatten_resource(resource, &index, MAX_INCLUDE_DEPTH))
        .collect();
    let meta = document.get("meta");
    let page_count = meta
        .and_then(|meta| meta.get("page_count"))
        .and_then(Value::as_u64)
        .map_or(1, |count| u32::try_from(count).unwrap_or(u32::MAX));
    let record_count = meta
        .and_then(|meta| meta.get("record_count"))
        .and_then(Value::as_u64);
    Ok(Page {
        items,
        page_count,
        record_count,
    })
}

fn parse_errors(body: &[u8]) -> Vec<ApiErrorDetail> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|document| document.get("errors").cloned())
        .and_then(|errors| serde_json::from_value(errors).ok())
        .unwrap_or_default()
}

struct IncludedIndex<'a> {
    by_key: HashMap<(String, String), &'a Value>,
}

impl<'a> IncludedIndex<'a> {
    fn from_document(document: &'a Value) -> Self {
        let mut by_key = HashMap::new();
        if let Some(included) = document.get("included").and_then(Value::as_array) {
            for resource in included {
                let kind = resource.get("type").and_then(Value::as_str);
                let id = resource.get("id").and_then(Value::as_str);
                if let (Some(kind), Some(id)) = (kind, id) {
                    by_key.insert((kind.to_string(), id.to_string()), resource);
                }
            }
        }
        Self { by_key }
    }

    fn get(&self, kind: &str, id: &str) -> Option<&'a Value> {
        self.by_key
            .get(&(kind.to_string(), id.to_string()))
            .copied()
    }
}

/// Merges `id`, `type` and attributes into one object and inlines included relationships.
fn flatten_resource(resource: &Value, included: &IncludedIndex<'_>, depth: usize) -> Value {
    let mut flat = Map::new();
    if let Some(id) = resource.get("id") {
        flat.insert("id".into(), id.clone());
    }
    if let Some(kind) = resource.get("type") {
        flat.insert("type".into(), kind.clone());
    }
    if let Some(Value::Object(attributes)) = resource.get("attributes") {
        for (name, value) in attributes {
            flat.insert(name.clone(), value.clone());
        }
    }
    if depth == 0 {
        return Value::Object(flat);
    }
    if let Some(Value::Object(relationships)) = resource.get("relationships") {
        for (name, relationship) in relationships {
            match relationship.get("data") {
                Some(Value::Object(linkage)) => {
                    let kind = linkage.get("type").and_then(Value::as_str);
                    let id = linkage.get("id").and_then(Value::as_str);
                    if let Some(target) = kind.zip(id).and_then(|(k, i)| included.get(k, i)) {
                        flat.insert(name.clone(), flatten_resource(target, included, depth - 1));
                    }
                }
                Some(Value::Array(linkages)) => {
                    let resolved = linkages
                        .iter()
                        .filter_map(|linkage| {
                            let kind = linkage.get("type").and_then(Value::as_str)?;
                            let id = linkage.get("id").and_then(Value::as_str)?;
                            included.get(kind, id)
                        })
                        .map(|target| flatten_resource(target, included, depth - 1))
                        .collect::<Vec<_>>();
                    if !resolved.is_empty() {
                        flat.insert(name.clone(), Value::Array(resolved));
                    }
                }
                Some(Value::Null) => {
                    flat.insert(name.clone(), Value::Null);
                }
                _ => {}
            }
        }
    }
    Value::Object(flat)
}
