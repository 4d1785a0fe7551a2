//! In-memory environment that records every call, used for tests and rehearsals.

use std::collections::BTreeMap;

use async_trait::async_trait;
use promosync_core::ResourceType;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::error::{ApiErrorDetail, ClientError};
use crate::payload::{ListQuery, Page, ResourcePayload};
use crate::ResourceClient;

const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOperation {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientCall {
    pub operation: ClientOperation,
    pub resource: ResourceType,
    pub id: Option<String>,
    pub payload: Option<ResourcePayload>,
    pub query: Option<ListQuery>,
}

impl ClientCall {
    pub fn is(&self, operation: ClientOperation, resource: ResourceType) -> bool {
        self.operation == operation && self.resource == resource
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|payload| payload.get(name))
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: ClientOperation,
    resource: Option<ResourceType>,
    name: Option<String>,
    detail: String,
}

impl FailureRule {
    fn matches(&self, call: &ClientCall) -> bool {
        if self.operation != call.operation {
            return false;
        }
        if self.resource.is_some_and(|resource| resource != call.resource) {
            return false;
        }
        match &self.name {
            Some(name) => call.attribute("name").and_then(Value::as_str) == Some(name.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<ResourceType, Vec<Value>>,
    calls: Vec<ClientCall>,
    failures: Vec<FailureRule>,
    next_id: u64,
}

impl MemoryState {
    fn find(&self, resource: ResourceType, id: &str) -> Option<&Value> {
        self.collections
            .get(&resource)
            .and_then(|items| items.iter().find(|item| item_id(item) == Some(id)))
    }

    fn find_mut(&mut self, resource: ResourceType, id: &str) -> Option<&mut Value> {
        self.collections
            .get_mut(&resource)
            .and_then(|items| items.iter_mut().find(|item| item_id(item) == Some(id)))
    }

    fn listed(&self, resource: ResourceType) -> Vec<Value> {
        if resource == ResourceType::Promotions {
            return self
                .collections
                .iter()
                .filter(|(kind, _)| kind.is_promotion_kind())
                .flat_map(|(_, items)| items.iter().cloned())
                .collect();
        }
        self.collections.get(&resource).cloned().unwrap_or_default()
    }

    fn apply(&self, item: &mut Map<String, Value>, payload: &ResourcePayload) {
        for (name, value) in &payload.attributes {
            match name.as_str() {
                "_disable" if value == &Value::Bool(true) => {
                    item.insert("active".into(), Value::Bool(false));
                }
                "_enable" if value == &Value::Bool(true) => {
                    item.insert("active".into(), Value::Bool(true));
                }
                trigger if trigger.starts_with('_') => {}
                _ => {
                    item.insert(name.clone(), value.clone());
                }
            }
        }
        for (name, target) in &payload.relationships {
            let linked = match (name.as_str(), self.find(target.resource, &target.id)) {
                ("promotion" | "promotion_rule", _) | (_, None) => {
                    serde_json::json!({ "type": target.resource.as_str(), "id": target.id })
                }
                (_, Some(found)) => found.clone(),
            };
            item.insert(name.clone(), linked);
        }
    }

    /// Mirrors a rule into the promotion it belongs to, as an include would.
    fn attach_rule(&mut self, rule_resource: ResourceType, rule: &Value) {
        let Some(field) = rule_field(rule_resource) else {
            return;
        };
        let Some(rule_id) = item_id(rule).map(str::to_string) else {
            return;
        };
        let owner = rule.get("promotion").and_then(|promotion| {
            let kind = promotion.get("type")?.as_str()?.parse::<ResourceType>().ok()?;
            let id = promotion.get("id")?.as_str()?.to_string();
            Some((kind, id))
        });
        let Some((kind, promotion_id)) = owner.or_else(|| self.owner_of(field, &rule_id)) else {
            return;
        };
        if let Some(Value::Object(promotion)) = self.find_mut(kind, &promotion_id) {
            promotion.insert(field.to_string(), rule.clone());
        }
    }

    fn owner_of(&self, field: &str, rule_id: &str) -> Option<(ResourceType, String)> {
        self.collections
            .iter()
            .filter(|(kind, _)| kind.is_promotion_kind())
            .flat_map(|(kind, items)| items.iter().map(move |item| (*kind, item)))
            .find(|(_, item)| item.get(field).and_then(item_id) == Some(rule_id))
            .and_then(|(kind, item)| item_id(item).map(|id| (kind, id.to_string())))
    }

    fn detach_rule(&mut self, rule_resource: ResourceType, rule_id: &str) {
        let Some(field) = rule_field(rule_resource) else {
            return;
        };
        for (kind, items) in self.collections.iter_mut() {
            if !kind.is_promotion_kind() {
                continue;
            }
            for item in items.iter_mut() {
                if item.get(field).and_then(item_id) == Some(rule_id) {
                    if let Value::Object(promotion) = item {
                        promotion.remove(field);
                    }
                }
            }
        }
    }
}

/// In-memory stand-in for one environment.
#[derive(Debug, Default)]
pub struct MemoryClient {
    state: Mutex<MemoryState>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a collection with flattened items (promotions may carry inlined rules).
    pub fn with_items(mut self, resource: ResourceType, items: Vec<Value>) -> Self {
        self.state
            .get_mut()
            .collections
            .entry(resource)
            .or_default()
            .extend(items);
        self
    }

    /// Makes every matching call fail with an API error carrying `detail`.
    pub fn fail_on(
        mut self,
        operation: ClientOperation,
        resource: Option<ResourceType>,
        detail: impl Into<String>,
    ) -> Self {
        self.state.get_mut().failures.push(FailureRule {
            operation,
            resource,
            name: None,
            detail: detail.into(),
        });
        self
    }

    /// Like [`MemoryClient::fail_on`], restricted to payloads whose `name` attribute matches.
    pub fn fail_on_named(
        mut self,
        operation: ClientOperation,
        name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        self.state.get_mut().failures.push(FailureRule {
            operation,
            resource: None,
            name: Some(name.into()),
            detail: detail.into(),
        });
        self
    }

    pub async fn calls(&self) -> Vec<ClientCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls other than reads, in the order they were issued.
    pub async fn writes(&self) -> Vec<ClientCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.operation != ClientOperation::List)
            .collect()
    }

    pub async fn items(&self, resource: ResourceType) -> Vec<Value> {
        self.state.lock().await.listed(resource)
    }

    fn record(state: &mut MemoryState, call: ClientCall) -> Result<(), ClientError> {
        let failure = state
            .failures
            .iter()
            .find(|rule| rule.matches(&call))
            .map(|rule| rule.detail.clone());
        let resource = call.resource;
        state.calls.push(call);
        match failure {
            Some(detail) => Err(ClientError::Api {
                status: 422,
                url: format!("memory://{resource}"),
                errors: vec![ApiErrorDetail {
                    title: Some("simulated failure".to_string()),
                    detail: Some(detail),
                    ..Default::default()
                }],
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceClient for MemoryClient {
    async fn list(&self, resource: ResourceType, query: &ListQuery) -> Result<Page, ClientError> {
        let mut state = self.state.lock().await;
        Self::record(
            &mut state,
            ClientCall {
                operation: ClientOperation::List,
                resource,
                id: None,
                payload: None,
                query: Some(query.clone()),
            },
        )?;

        let mut items = state.listed(resource);
        if let Some(ids) = query.filters.get("id_in") {
            let wanted = ids.split(',').collect::<Vec<_>>();
            items.retain(|item| item_id(item).is_some_and(|id| wanted.contains(&id)));
        }

        let page_size = query
            .page_size
            .map(|size| size as usize)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .max(1);
        let page_count = items.len().div_ceil(page_size).max(1);
        let page_number = query.page_number.unwrap_or(1).max(1) as usize;
        let record_count = items.len() as u64;
        let page = items
            .into_iter()
            .skip((page_number - 1) * page_size)
            .take(page_size)
            .collect();

        Ok(Page {
            items: page,
            page_count: page_count as u32,
            record_count: Some(record_count),
        })
    }

    async fn create(
        &self,
        resource: ResourceType,
        payload: &ResourcePayload,
    ) -> Result<Value, ClientError> {
        let mut state = self.state.lock().await;
        Self::record(
            &mut state,
            ClientCall {
                operation: ClientOperation::Create,
                resource,
                id: None,
                payload: Some(payload.clone()),
                query: None,
            },
        )?;

        state.next_id += 1;
        let id = format!("{}_{}", resource.as_str(), state.next_id);
        let mut item = Map::new();
        item.insert("id".into(), Value::String(id));
        item.insert("type".into(), Value::String(resource.as_str().to_string()));
        state.apply(&mut item, payload);
        let item = Value::Object(item);

        state.collections.entry(resource).or_default().push(item.clone());
        state.attach_rule(resource, &item);
        Ok(item)
    }

    async fn update(
        &self,
        resource: ResourceType,
        id: &str,
        payload: &ResourcePayload,
    ) -> Result<Value, ClientError> {
        let mut state = self.state.lock().await;
        Self::record(
            &mut state,
            ClientCall {
                operation: ClientOperation::Update,
                resource,
                id: Some(id.to_string()),
                payload: Some(payload.clone()),
                query: None,
            },
        )?;

        let mut item = match state.find(resource, id) {
            Some(Value::Object(existing)) => existing.clone(),
            _ => {
                return Err(ClientError::NotFound {
                    resource: resource.as_str().to_string(),
                    id: id.to_string(),
                })
            }
        };
        state.apply(&mut item, payload);
        let item = Value::Object(item);
        if let Some(stored) = state.find_mut(resource, id) {
            *stored = item.clone();
        }
        state.attach_rule(resource, &item);
        Ok(item)
    }

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        Self::record(
            &mut state,
            ClientCall {
                operation: ClientOperation::Delete,
                resource,
                id: Some(id.to_string()),
                payload: None,
                query: None,
            },
        )?;

        let existed = state.collections.get_mut(&resource).is_some_and(|items| {
            let before = items.len();
            items.retain(|item| item_id(item) != Some(id));
            items.len() != before
        });
        if !existed {
            return Err(ClientError::NotFound {
                resource: resource.as_str().to_string(),
                id: id.to_string(),
            });
        }
        state.detach_rule(resource, id);
        Ok(())
    }
}

fn item_id(item: &Value) -> Option<&str> {
    item.get("id").and_then(Value::as_str)
}

fn rule_field(resource: ResourceType) -> Option<&'static str> {
    match resource {
        ResourceType::OrderAmountPromotionRules => Some("order_amount_promotion_rule"),
        ResourceType::SkuListPromotionRules => Some("sku_list_promotion_rule"),
        ResourceType::CouponCodesPromotionRules => Some("coupon_codes_promotion_rule"),
        ResourceType::CustomPromotionRules => Some("custom_promotion_rule"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ResourceRef;
    use serde_json::json;

    fn tags(count: usize) -> Vec<Value> {
        (1..=count)
            .map(|n| json!({ "id": format!("tag_{n}"), "type": "tags", "name": format!("Tag {n}") }))
            .collect()
    }

    #[tokio::test]
    async fn list_all_walks_every_page() {
        let client = MemoryClient::new().with_items(ResourceType::Tags, tags(7));
        let items = client
            .list_all(ResourceType::Tags, &ListQuery::new().page_size(3))
            .await
            .unwrap();
        assert_eq!(items.len(), 7);
        assert_eq!(client.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn id_in_filter_restricts_results() {
        let client = MemoryClient::new().with_items(ResourceType::Tags, tags(4));
        let items = client
            .list_all(ResourceType::Tags, &ListQuery::new().id_in(&["tag_2", "tag_4"]))
            .await
            .unwrap();
        let ids = items.iter().filter_map(item_id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["tag_2", "tag_4"]);
    }

    #[tokio::test]
    async fn created_rules_are_inlined_on_their_promotion() {
        let client = MemoryClient::new().with_items(
            ResourceType::SkuLists,
            vec![json!({ "id": "sl_1", "type": "sku_lists", "name": "Sunglasses" })],
        );
        let promotion = client
            .create(
                ResourceType::FreeShippingPromotions,
                &ResourcePayload::new()
                    .attribute("name", "FREESHIP")
                    .attribute("_disable", true),
            )
            .await
            .unwrap();
        assert_eq!(promotion["active"], false);
        let promotion_id = promotion["id"].as_str().unwrap().to_string();

        client
            .create(
                ResourceType::SkuListPromotionRules,
                &ResourcePayload::new()
                    .attribute("min_quantity", 1)
                    .relationship("sku_list", ResourceRef::new(ResourceType::SkuLists, "sl_1"))
                    .relationship(
                        "promotion",
                        ResourceRef::new(ResourceType::FreeShippingPromotions, &promotion_id),
                    ),
            )
            .await
            .unwrap();

        let promotions = client.items(ResourceType::Promotions).await;
        assert_eq!(promotions.len(), 1);
        assert_eq!(
            promotions[0]["sku_list_promotion_rule"]["sku_list"]["name"],
            "Sunglasses"
        );

        let rule_id = promotions[0]["sku_list_promotion_rule"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        client
            .delete(ResourceType::SkuListPromotionRules, &rule_id)
            .await
            .unwrap();
        let promotions = client.items(ResourceType::Promotions).await;
        assert!(promotions[0].get("sku_list_promotion_rule").is_none());
    }

    #[tokio::test]
    async fn injected_failures_are_recorded_and_returned() {
        let client = MemoryClient::new().fail_on_named(ClientOperation::Create, "BROKEN", "priority - is invalid");
        let err = client
            .create(
                ResourceType::FixedAmountPromotions,
                &ResourcePayload::new().attribute("name", "BROKEN"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.details(), vec!["priority - is invalid".to_string()]);
        assert_eq!(client.calls().await.len(), 1);
        assert!(client.items(ResourceType::Promotions).await.is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_item_is_not_found() {
        let client = MemoryClient::new();
        let err = client
            .update(ResourceType::Markets, "mkt_x", &ResourcePayload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound { .. }));
    }
}
