use promosync_core::{CompareKey, Promotion, RelationType};

use crate::events::{EventSink, ExclusionReason, Slot, SyncEvent};

/// Every reason a promotion cannot be matched across environments.
pub fn comparability_violations(promotion: &Promotion) -> Vec<ExclusionReason> {
    let mut violations = Vec::new();
    if !promotion.has_compare_value() {
        violations.push(ExclusionReason::MissingCompareField {
            slot: Slot::Promotion,
            field: "name",
        });
    }
    if promotion.market.as_ref().is_some_and(|market| !market.has_compare_value()) {
        violations.push(ExclusionReason::MissingCompareField {
            slot: Slot::Market,
            field: RelationType::Markets.compare_field(),
        });
    }
    if promotion.sku_list.as_ref().is_some_and(|sku_list| !sku_list.has_compare_value()) {
        violations.push(ExclusionReason::MissingCompareField {
            slot: Slot::SkuList,
            field: RelationType::SkuLists.compare_field(),
        });
    }
    if promotion.rule_sku_list().is_some_and(|sku_list| !sku_list.has_compare_value()) {
        violations.push(ExclusionReason::MissingCompareField {
            slot: Slot::RuleSkuList,
            field: RelationType::SkuLists.compare_field(),
        });
    }
    violations
}

/// True when the promotion and its directly attached relationships all carry
/// natural keys. Emits one exclusion per violated condition otherwise.
pub fn is_comparable(promotion: &Promotion, sink: &mut dyn EventSink) -> bool {
    let violations = comparability_violations(promotion);
    let comparable = violations.is_empty();
    for reason in violations {
        sink.emit(SyncEvent::Excluded {
            promotion: promotion.label().to_string(),
            reason,
        });
    }
    comparable
}
