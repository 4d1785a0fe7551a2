//! Builds a portable snapshot from the source environment.

use promosync_client::{ListQuery, ResourceClient};
use promosync_core::{Promotion, ResourceType};
use serde_json::Value;
use tracing::{info, info_span, Instrument};

use crate::comparable::is_comparable;
use crate::error::SyncError;
use crate::events::{EventSink, ExclusionReason, SyncEvent};
use crate::harvest::harvest;
use crate::index::RelationshipsById;
use crate::matcher::are_relationships_comparable;
use crate::snapshot::Snapshot;

/// Relationships loaded together with every promotion.
pub const PROMOTION_INCLUDES: [&str; 7] = [
    "market",
    "sku_list",
    "order_amount_promotion_rule",
    "sku_list_promotion_rule",
    "sku_list_promotion_rule.sku_list",
    "coupon_codes_promotion_rule",
    "custom_promotion_rule",
];

pub fn promotions_query() -> ListQuery {
    ListQuery::new().include(PROMOTION_INCLUDES)
}

/// Every promotion of the environment, with its rules inlined.
///
/// Records of an unknown promotion type are reported and skipped.
pub async fn fetch_promotions(
    client: &dyn ResourceClient,
    sink: &mut dyn EventSink,
) -> Result<Vec<Promotion>, SyncError> {
    let items = client
        .list_all(ResourceType::Promotions, &promotions_query())
        .await?;
    let mut promotions = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Promotion>(item.clone()) {
            Ok(promotion) => promotions.push(promotion),
            Err(err) => sink.emit(SyncEvent::Excluded {
                promotion: item_label(&item),
                reason: ExclusionReason::Undecodable {
                    message: err.to_string(),
                },
            }),
        }
    }
    Ok(promotions)
}

/// Comparable promotions whose custom-rule references can be carried across.
pub async fn export_promotions(
    client: &dyn ResourceClient,
    sink: &mut dyn EventSink,
) -> Result<Snapshot, SyncError> {
    async move {
        let fetched = fetch_promotions(client, sink).await?;
        let total = fetched.len();
        let comparable = fetched
            .into_iter()
            .filter(|promotion| is_comparable(promotion, sink))
            .collect::<Vec<_>>();

        let mut relationships = RelationshipsById::new();
        let stats = harvest(client, &comparable, &mut relationships, sink).await?;

        let mut exported = Vec::with_capacity(comparable.len());
        for promotion in comparable {
            if are_relationships_comparable(&relationships, &promotion, sink)? {
                exported.push(promotion);
            }
        }

        info!(
            total,
            exported = exported.len(),
            relationships = relationships.len(),
            failed_batches = stats.failed_batches,
            "export prepared"
        );
        sink.emit(SyncEvent::Info(format!(
            "exporting {} of {} promotions with {} relationships",
            exported.len(),
            total,
            relationships.len()
        )));
        Ok::<_, SyncError>(Snapshot::new(exported, relationships))
    }
    .instrument(info_span!("export_promotions"))
    .await
}

fn item_label(item: &Value) -> String {
    item.get("name")
        .or_else(|| item.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}
