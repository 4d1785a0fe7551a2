//! Matching source promotions against what the target environment already has.

use promosync_core::{CompareKey, Promotion, RelationType, Relationship};

use crate::error::SyncError;
use crate::events::{EventSink, ExclusionReason, Slot, SyncEvent};
use crate::index::{CompareIndex, RelationshipsById};
use crate::predicate::parse_rule;

/// Source id to natural key to target record.
pub fn translate_id<'t>(
    source_by_id: &RelationshipsById,
    target_index: &'t CompareIndex<Relationship>,
    relation: RelationType,
    id: &str,
) -> Result<&'t Relationship, ExclusionReason> {
    let Some(source) = source_by_id.get(id) else {
        return Err(ExclusionReason::UnknownSourceRelationship {
            relation,
            id: id.to_string(),
        });
    };
    let key = source
        .compare_value()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ExclusionReason::UncomparableRelationship {
            relation,
            id: id.to_string(),
        })?;
    resolve_key(target_index, relation, Slot::Custom(relation), key)
}

/// Natural key to target record.
pub fn resolve_key<'t>(
    target_index: &'t CompareIndex<Relationship>,
    relation: RelationType,
    slot: Slot,
    key: &str,
) -> Result<&'t Relationship, ExclusionReason> {
    target_index
        .relation(relation, key)
        .ok_or_else(|| ExclusionReason::NotFoundInTarget {
            slot,
            key: key.to_string(),
        })
}

fn resolve_slot<'t, K: CompareKey>(
    target_index: &'t CompareIndex<Relationship>,
    relation: RelationType,
    slot: Slot,
    record: &K,
) -> Result<&'t Relationship, ExclusionReason> {
    match record.compare_value().filter(|key| !key.is_empty()) {
        Some(key) => resolve_key(target_index, relation, slot, key),
        None => Err(ExclusionReason::MissingCompareField {
            slot,
            field: relation.compare_field(),
        }),
    }
}

/// Export side: every custom-rule foreign id names a harvested record with a natural key.
pub fn are_relationships_comparable(
    by_id: &RelationshipsById,
    promotion: &Promotion,
    sink: &mut dyn EventSink,
) -> Result<bool, SyncError> {
    let mut comparable = true;
    for predicate in parse_rule(promotion.custom_promotion_rule.as_ref())? {
        let Some(relation) = predicate.relation else {
            continue;
        };
        for id in predicate.foreign_ids() {
            let reason = match by_id.get(&id) {
                None => ExclusionReason::UnknownSourceRelationship { relation, id },
                Some(record) if !record.has_compare_value() => {
                    ExclusionReason::UncomparableRelationship { relation, id }
                }
                Some(_) => continue,
            };
            comparable = false;
            sink.emit(SyncEvent::Excluded {
                promotion: promotion.label().to_string(),
                reason,
            });
        }
    }
    Ok(comparable)
}

/// Import side: every relationship the promotion depends on exists in the target.
///
/// Reports each failed lookup; only a custom rule that does not parse is an error.
pub fn compare(
    source_by_id: &RelationshipsById,
    target_index: &CompareIndex<Relationship>,
    promotion: &Promotion,
    sink: &mut dyn EventSink,
) -> Result<bool, SyncError> {
    let mut failures = Vec::new();

    if let Some(market) = &promotion.market {
        if let Err(reason) = resolve_slot(target_index, RelationType::Markets, Slot::Market, market) {
            failures.push(reason);
        }
    }
    if let Some(sku_list) = &promotion.sku_list {
        if let Err(reason) = resolve_slot(target_index, RelationType::SkuLists, Slot::SkuList, sku_list) {
            failures.push(reason);
        }
    }
    if let Some(sku_list) = promotion.rule_sku_list() {
        if let Err(reason) =
            resolve_slot(target_index, RelationType::SkuLists, Slot::RuleSkuList, sku_list)
        {
            failures.push(reason);
        }
    }
    for predicate in parse_rule(promotion.custom_promotion_rule.as_ref())? {
        let Some(relation) = predicate.relation else {
            continue;
        };
        for id in predicate.foreign_ids() {
            if let Err(reason) = translate_id(source_by_id, target_index, relation, &id) {
                failures.push(reason);
            }
        }
    }

    let matched = failures.is_empty();
    for reason in failures {
        sink.emit(SyncEvent::Excluded {
            promotion: promotion.label().to_string(),
            reason,
        });
    }
    Ok(matched)
}
