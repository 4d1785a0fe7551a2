//! Resource client contract plus the JSON:API HTTP and in-memory implementations.

mod error;
pub mod http;
pub mod memory;
mod payload;

use async_trait::async_trait;
use promosync_core::ResourceType;
use serde_json::Value;

pub use error::{ApiErrorDetail, ClientError};
pub use http::{BackoffPolicy, HttpClientConfig, HttpResourceClient, RateLimit};
pub use memory::{ClientCall, ClientOperation, MemoryClient};
pub use payload::{ListQuery, Page, ResourcePayload, ResourceRef};

pub const CRATE_NAME: &str = "promosync-client";

/// Read/write access to one environment's resources.
///
/// Items are flattened objects: `id`, `type`, the attributes, and any included
/// relationship inlined under its relationship name.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn list(&self, resource: ResourceType, query: &ListQuery) -> Result<Page, ClientError>;

    async fn create(
        &self,
        resource: ResourceType,
        payload: &ResourcePayload,
    ) -> Result<Value, ClientError>;

    async fn update(
        &self,
        resource: ResourceType,
        id: &str,
        payload: &ResourcePayload,
    ) -> Result<Value, ClientError>;

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<(), ClientError>;

    /// Walks every page of `list`, one request at a time.
    async fn list_all(
        &self,
        resource: ResourceType,
        query: &ListQuery,
    ) -> Result<Vec<Value>, ClientError> {
        let mut items = Vec::new();
        let mut query = query.clone();
        let mut page_number = query.page_number.unwrap_or(1);
        loop {
            query.page_number = Some(page_number);
            let page = self.list(resource, &query).await?;
            let fetched = page.items.len();
            items.extend(page.items);
            if fetched == 0 || page_number >= page.page_count {
                break;
            }
            page_number += 1;
        }
        Ok(items)
    }
}
