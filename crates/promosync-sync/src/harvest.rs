//! Collects every relationship the promotions of one environment depend on.

use std::collections::{BTreeMap, BTreeSet};

use promosync_client::{ListQuery, ResourceClient};
use promosync_core::{Promotion, RelationType, Relationship};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::events::{EventSink, SyncEvent};
use crate::index::RelationshipsById;
use crate::predicate::parse_rule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub direct: usize,
    pub requested_batches: usize,
    pub failed_batches: usize,
    pub fetched: usize,
}

/// Adds the market, SKU list and rule SKU list inlined on each promotion.
pub fn collect_direct_relationships(promotions: &[Promotion], into: &mut RelationshipsById) -> usize {
    let mut added = 0;
    for relationship in promotions.iter().flat_map(Promotion::direct_relationships) {
        if into
            .insert(relationship.id().to_string(), relationship)
            .is_none()
        {
            added += 1;
        }
    }
    added
}

/// Foreign ids referenced by custom rules, grouped by relation type in first-seen order.
pub fn custom_rule_foreign_ids(
    promotions: &[Promotion],
) -> Result<BTreeMap<RelationType, Vec<String>>, SyncError> {
    let mut grouped: BTreeMap<RelationType, Vec<String>> = BTreeMap::new();
    let mut seen: BTreeSet<(RelationType, String)> = BTreeSet::new();
    for promotion in promotions {
        for predicate in parse_rule(promotion.custom_promotion_rule.as_ref())? {
            let Some(relation) = predicate.relation else {
                continue;
            };
            for id in predicate.foreign_ids() {
                if seen.insert((relation, id.clone())) {
                    grouped.entry(relation).or_default().push(id);
                }
            }
        }
    }
    Ok(grouped)
}

/// Fills `relationships` with everything `promotions` reference.
///
/// Ids already present are never requested again. A failed batch is reported
/// through the sink and the run carries on; only an unparsable custom rule
/// aborts.
pub async fn harvest(
    client: &dyn ResourceClient,
    promotions: &[Promotion],
    relationships: &mut RelationshipsById,
    sink: &mut dyn EventSink,
) -> Result<HarvestStats, SyncError> {
    let mut stats = HarvestStats {
        direct: collect_direct_relationships(promotions, relationships),
        ..Default::default()
    };

    for (relation, ids) in custom_rule_foreign_ids(promotions)? {
        let missing = ids
            .into_iter()
            .filter(|id| !relationships.contains_key(id))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            debug!(relation = %relation, "all custom rule references already harvested");
            continue;
        }

        stats.requested_batches += 1;
        let query = ListQuery::new().id_in(&missing);
        let fetched = match client.list_all(relation.resource_type(), &query).await {
            Ok(items) => decode_relationships(relation, items),
            Err(err) => Err(err.to_string()),
        };
        match fetched {
            Ok(found) => {
                info!(relation = %relation, requested = missing.len(), found = found.len(), "harvested relationships");
                stats.fetched += found.len();
                for relationship in found {
                    relationships.insert(relationship.id().to_string(), relationship);
                }
            }
            Err(detail) => {
                warn!(relation = %relation, %detail, "relationship batch failed");
                stats.failed_batches += 1;
                sink.emit(SyncEvent::FetchFailed {
                    resource: relation.to_string(),
                    detail,
                });
            }
        }
    }

    Ok(stats)
}

/// Reads the complete tables for the named relation types.
///
/// Each type is its own batch: an unknown name or a failed request is reported
/// and skipped.
pub async fn fetch_relationship_types(
    client: &dyn ResourceClient,
    type_names: &[String],
    sink: &mut dyn EventSink,
) -> Vec<Relationship> {
    let mut relationships = Vec::new();
    for name in type_names {
        let relation = match name.parse::<RelationType>() {
            Ok(relation) => relation,
            Err(err) => {
                sink.emit(SyncEvent::FetchFailed {
                    resource: name.clone(),
                    detail: err.to_string(),
                });
                continue;
            }
        };
        let fetched = match client.list_all(relation.resource_type(), &ListQuery::new()).await {
            Ok(items) => decode_relationships(relation, items),
            Err(err) => Err(err.to_string()),
        };
        match fetched {
            Ok(found) => {
                info!(relation = %relation, count = found.len(), "fetched target relationships");
                relationships.extend(found);
            }
            Err(detail) => {
                warn!(relation = %relation, %detail, "relationship table fetch failed");
                sink.emit(SyncEvent::FetchFailed {
                    resource: relation.to_string(),
                    detail,
                });
            }
        }
    }
    relationships
}

/// Decodes one batch; a single bad item fails the whole batch.
fn decode_relationships(relation: RelationType, items: Vec<Value>) -> Result<Vec<Relationship>, String> {
    items
        .into_iter()
        .map(|mut item| {
            if let Value::Object(fields) = &mut item {
                fields
                    .entry("type")
                    .or_insert_with(|| Value::String(relation.as_str().to_string()));
            }
            let relationship = serde_json::from_value::<Relationship>(item)
                .map_err(|err| format!("undecodable {relation} record: {err}"))?;
            if relationship.relation_type() != relation {
                return Err(format!(
                    "expected {relation}, got {}",
                    relationship.relation_type()
                ));
            }
            Ok(relationship)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Transcript;
    use promosync_client::{ClientOperation, MemoryClient};
    use promosync_core::ResourceType;
    use serde_json::json;

    fn promotion(value: Value) -> Promotion {
        serde_json::from_value(value).unwrap()
    }

    fn with_custom_rule(id: &str, filters: Value) -> Promotion {
        promotion(json!({
            "id": id,
            "type": "free_shipping_promotions",
            "name": id.to_uppercase(),
            "market": { "id": "mkt_1", "code": "EU" },
            "custom_promotion_rule": { "id": format!("rule_{id}"), "filters": filters }
        }))
    }

    #[test]
    fn foreign_ids_are_grouped_and_deduplicated() {
        let promotions = vec![
            with_custom_rule("a", json!({ "market_id_in": "mkt_2,mkt_1", "customer_tags_id_in": "tag_1" })),
            with_custom_rule("b", json!({ "order_tags_id_not_in": "tag_1,tag_2", "currency_code_in": "EUR" })),
        ];
        let grouped = custom_rule_foreign_ids(&promotions).unwrap();
        assert_eq!(grouped[&RelationType::Markets], vec!["mkt_2", "mkt_1"]);
        assert_eq!(grouped[&RelationType::Tags], vec!["tag_1", "tag_2"]);
        assert!(!grouped.contains_key(&RelationType::SkuLists));
    }

    #[tokio::test]
    async fn only_missing_ids_are_requested() {
        let client = MemoryClient::new()
            .with_items(
                ResourceType::Markets,
                vec![
                    json!({ "id": "mkt_1", "type": "markets", "code": "EU" }),
                    json!({ "id": "mkt_2", "type": "markets", "code": "US" }),
                ],
            )
            .with_items(
                ResourceType::Tags,
                vec![json!({ "id": "tag_1", "type": "tags", "name": "VIP" })],
            );
        let promotions = vec![with_custom_rule(
            "a",
            json!({ "market_id_in": "mkt_1,mkt_2", "customer_tags_id_in": "tag_1" }),
        )];
        let mut relationships = RelationshipsById::new();
        let mut transcript = Transcript::new();

        let stats = harvest(&client, &promotions, &mut relationships, &mut transcript)
            .await
            .unwrap();

        assert_eq!(stats.direct, 1);
        assert_eq!(stats.requested_batches, 2);
        assert_eq!(stats.fetched, 2);
        assert_eq!(relationships.len(), 3);
        let calls = client.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is(ClientOperation::List, ResourceType::Markets));
        let filter = calls[0].query.as_ref().and_then(|q| q.filters.get("id_in")).cloned();
        assert_eq!(filter.as_deref(), Some("mkt_2"));
        assert!(transcript.events().is_empty());
    }

    #[tokio::test]
    async fn fully_harvested_types_issue_no_request() {
        let client = MemoryClient::new();
        let promotions = vec![with_custom_rule("a", json!({ "market_id_in": "mkt_1" }))];
        let mut relationships = RelationshipsById::new();
        let mut transcript = Transcript::new();

        harvest(&client, &promotions, &mut relationships, &mut transcript)
            .await
            .unwrap();

        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_is_reported_and_skipped() {
        let client = MemoryClient::new()
            .fail_on(ClientOperation::List, Some(ResourceType::Tags), "tags unavailable")
            .with_items(
                ResourceType::Markets,
                vec![json!({ "id": "mkt_2", "type": "markets", "code": "US" })],
            );
        let promotions = vec![with_custom_rule(
            "a",
            json!({ "market_id_in": "mkt_2", "customer_tags_id_in": "tag_1" }),
        )];
        let mut relationships = RelationshipsById::new();
        let mut transcript = Transcript::new();

        let stats = harvest(&client, &promotions, &mut relationships, &mut transcript)
            .await
            .unwrap();

        assert_eq!(stats.failed_batches, 1);
        assert!(relationships.contains_key("mkt_2"));
        assert!(!relationships.contains_key("tag_1"));
        assert_eq!(transcript.fetch_failures(), 1);
    }

    #[tokio::test]
    async fn unsupported_predicate_aborts_harvest() {
        let client = MemoryClient::new();
        let promotions = vec![with_custom_rule("a", json!({ "weekday_eq": 5 }))];
        let mut relationships = RelationshipsById::new();
        let mut transcript = Transcript::new();

        let result = harvest(&client, &promotions, &mut relationships, &mut transcript).await;

        assert!(matches!(result, Err(SyncError::UnsupportedPredicate { .. })));
    }

    #[tokio::test]
    async fn unknown_type_names_are_failed_batches() {
        let client = MemoryClient::new().with_items(
            ResourceType::SkuLists,
            vec![json!({ "id": "sl_1", "type": "sku_lists", "name": "Shoes" })],
        );
        let mut transcript = Transcript::new();

        let fetched = fetch_relationship_types(
            &client,
            &["sku_lists".to_string(), "vouchers".to_string()],
            &mut transcript,
        )
        .await;

        assert_eq!(fetched.len(), 1);
        assert_eq!(transcript.fetch_failures(), 1);
    }
}
