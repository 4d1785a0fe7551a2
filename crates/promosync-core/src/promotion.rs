//! Promotions and their activation rules, in the flattened shape the API returns
//! them with related resources included.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::relationship::{Market, Relationship, SkuList};
use crate::resource::{CompareKey, ResourceType};

/// Attributes every promotion and rule carries besides its own fields.
pub const SHARED_ATTRIBUTES: [&str; 3] = ["metadata", "reference", "reference_origin"];

/// Promotion attributes copied verbatim across environments, on top of the kind-specific ones.
pub const SHARED_PROMOTION_ATTRIBUTES: [&str; 10] = [
    "name",
    "currency_code",
    "exclusive",
    "priority",
    "starts_at",
    "expires_at",
    "total_usage_limit",
    "metadata",
    "reference",
    "reference_origin",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_origin: Option<String>,
}

impl SharedAttributes {
    /// Attribute map holding only the fields that are set.
    pub fn to_attributes(&self) -> Map<String, Value> {
        let mut attributes = Map::new();
        if let Some(metadata) = &self.metadata {
            attributes.insert("metadata".into(), Value::Object(metadata.clone()));
        }
        if let Some(reference) = &self.reference {
            attributes.insert("reference".into(), Value::String(reference.clone()));
        }
        if let Some(origin) = &self.reference_origin {
            attributes.insert("reference_origin".into(), Value::String(origin.clone()));
        }
        attributes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PromotionKind {
    PercentageDiscount,
    FixedAmount,
    FixedPrice,
    BuyXPayY,
    FreeGift,
    FreeShipping,
    External,
}

impl PromotionKind {
    pub const ALL: [PromotionKind; 7] = [
        PromotionKind::PercentageDiscount,
        PromotionKind::FixedAmount,
        PromotionKind::FixedPrice,
        PromotionKind::BuyXPayY,
        PromotionKind::FreeGift,
        PromotionKind::FreeShipping,
        PromotionKind::External,
    ];

    pub const fn resource_type(self) -> ResourceType {
        match self {
            PromotionKind::PercentageDiscount => ResourceType::PercentageDiscountPromotions,
            PromotionKind::FixedAmount => ResourceType::FixedAmountPromotions,
            PromotionKind::FixedPrice => ResourceType::FixedPricePromotions,
            PromotionKind::BuyXPayY => ResourceType::BuyXPayYPromotions,
            PromotionKind::FreeGift => ResourceType::FreeGiftPromotions,
            PromotionKind::FreeShipping => ResourceType::FreeShippingPromotions,
            PromotionKind::External => ResourceType::ExternalPromotions,
        }
    }

    pub fn from_resource_type(resource: ResourceType) -> Option<Self> {
        PromotionKind::ALL
            .into_iter()
            .find(|kind| kind.resource_type() == resource)
    }

    /// Attributes that only exist on this kind of promotion.
    pub const fn specific_attributes(self) -> &'static [&'static str] {
        match self {
            PromotionKind::PercentageDiscount => &["percentage"],
            PromotionKind::FixedAmount | PromotionKind::FixedPrice => &["fixed_amount_cents"],
            PromotionKind::BuyXPayY => &["x", "y", "cheapest_free"],
            PromotionKind::FreeGift => &["max_quantity"],
            PromotionKind::FreeShipping => &[],
            PromotionKind::External => &["promotion_url"],
        }
    }
}

/// Kind-specific promotion fields, tagged by the API resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PromotionVariant {
    #[serde(rename = "percentage_discount_promotions")]
    PercentageDiscount {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percentage: Option<i64>,
    },
    #[serde(rename = "fixed_amount_promotions")]
    FixedAmount {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fixed_amount_cents: Option<i64>,
    },
    #[serde(rename = "fixed_price_promotions")]
    FixedPrice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fixed_amount_cents: Option<i64>,
    },
    #[serde(rename = "buy_x_pay_y_promotions")]
    BuyXPayY {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cheapest_free: Option<bool>,
    },
    #[serde(rename = "free_gift_promotions")]
    FreeGift {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_quantity: Option<i64>,
    },
    #[serde(rename = "free_shipping_promotions")]
    FreeShipping {},
    #[serde(rename = "external_promotions")]
    External {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        promotion_url: Option<String>,
    },
}

impl PromotionVariant {
    pub fn kind(&self) -> PromotionKind {
        match self {
            PromotionVariant::PercentageDiscount { .. } => PromotionKind::PercentageDiscount,
            PromotionVariant::FixedAmount { .. } => PromotionKind::FixedAmount,
            PromotionVariant::FixedPrice { .. } => PromotionKind::FixedPrice,
            PromotionVariant::BuyXPayY { .. } => PromotionKind::BuyXPayY,
            PromotionVariant::FreeGift { .. } => PromotionKind::FreeGift,
            PromotionVariant::FreeShipping {} => PromotionKind::FreeShipping,
            PromotionVariant::External { .. } => PromotionKind::External,
        }
    }

    /// The set kind-specific attributes, restricted to the kind's attribute table.
    pub fn specific_attributes(&self) -> Map<String, Value> {
        let allowed = self.kind().specific_attributes();
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields
                .into_iter()
                .filter(|(key, value)| allowed.contains(&key.as_str()) && !value.is_null())
                .collect(),
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    #[serde(flatten)]
    pub variant: PromotionVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_usage_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_usage_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub shared: SharedAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<Market>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_list: Option<SkuList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_amount_promotion_rule: Option<OrderAmountPromotionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_list_promotion_rule: Option<SkuListPromotionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_codes_promotion_rule: Option<CouponCodesPromotionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_promotion_rule: Option<CustomPromotionRule>,
}

impl Promotion {
    pub fn kind(&self) -> PromotionKind {
        self.variant.kind()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.kind().resource_type()
    }

    /// Name for diagnostics; falls back to the id when the name is missing or empty.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(false)
    }

    pub fn rule_sku_list(&self) -> Option<&SkuList> {
        self.sku_list_promotion_rule
            .as_ref()
            .and_then(|rule| rule.sku_list.as_ref())
    }

    /// Relationships inlined directly on the promotion or its SKU list rule.
    pub fn direct_relationships(&self) -> Vec<Relationship> {
        let mut relationships = Vec::new();
        if let Some(market) = &self.market {
            relationships.push(Relationship::Market(market.clone()));
        }
        if let Some(sku_list) = &self.sku_list {
            relationships.push(Relationship::SkuList(sku_list.clone()));
        }
        if let Some(sku_list) = self.rule_sku_list() {
            relationships.push(Relationship::SkuList(sku_list.clone()));
        }
        relationships
    }

    /// Shared and kind-specific attributes, as copied to another environment.
    pub fn portable_attributes(&self) -> Map<String, Value> {
        let mut attributes = match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields
                .into_iter()
                .filter(|(key, value)| {
                    SHARED_PROMOTION_ATTRIBUTES.contains(&key.as_str()) && !value.is_null()
                })
                .collect(),
            _ => Map::new(),
        };
        attributes.extend(self.variant.specific_attributes());
        attributes
    }

    /// Portable attributes with every unset one sent as `null`, so an update
    /// clears what the target still holds.
    pub fn overwrite_attributes(&self) -> Map<String, Value> {
        let mut attributes = self.portable_attributes();
        for name in SHARED_PROMOTION_ATTRIBUTES
            .iter()
            .chain(self.kind().specific_attributes())
        {
            attributes.entry(*name).or_insert(Value::Null);
        }
        attributes
    }
}

impl CompareKey for Promotion {
    fn compare_scope(&self) -> ResourceType {
        ResourceType::Promotions
    }

    fn compare_value(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAmountPromotionRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_amount_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_subtotal: Option<bool>,
    #[serde(flatten)]
    pub shared: SharedAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuListPromotionRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_skus: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_list: Option<SkuList>,
    #[serde(flatten)]
    pub shared: SharedAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponCodesPromotionRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupons: Option<Vec<Coupon>>,
    #[serde(flatten)]
    pub shared: SharedAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPromotionRule {
    pub id: String,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub shared: SharedAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summer10() -> Value {
        json!({
            "id": "promo_1",
            "type": "percentage_discount_promotions",
            "name": "SUMMER10",
            "currency_code": "EUR",
            "percentage": 10,
            "priority": 1,
            "active": true,
            "starts_at": "2024-06-01T00:00:00Z",
            "expires_at": "2024-09-01T00:00:00Z",
            "reference": "summer",
            "metadata": { "campaign": "summer" },
            "market": { "id": "mkt_1", "type": "markets", "code": "EU" },
            "sku_list_promotion_rule": {
                "id": "rule_1",
                "type": "sku_list_promotion_rules",
                "min_quantity": 2,
                "sku_list": { "id": "sl_1", "type": "sku_lists", "name": "Sunglasses" }
            },
            "custom_promotion_rule": {
                "id": "rule_2",
                "filters": { "market_id_in": "mkt_1,mkt_2", "subtotal_amount_cents_gteq": 5000 }
            }
        })
    }

    #[test]
    fn decodes_flattened_promotion_with_included_rules() {
        let promotion: Promotion = serde_json::from_value(summer10()).unwrap();
        assert_eq!(promotion.kind(), PromotionKind::PercentageDiscount);
        assert_eq!(promotion.compare_value(), Some("SUMMER10"));
        assert_eq!(promotion.market.as_ref().and_then(|m| m.code.as_deref()), Some("EU"));
        assert_eq!(promotion.rule_sku_list().map(|s| s.id.as_str()), Some("sl_1"));
        assert_eq!(promotion.shared.reference.as_deref(), Some("summer"));
        assert_eq!(promotion.direct_relationships().len(), 2);
        assert!(promotion.is_active());
    }

    #[test]
    fn serialized_promotion_keeps_type_tag_and_included_relationships() {
        let promotion: Promotion = serde_json::from_value(summer10()).unwrap();
        let value = serde_json::to_value(&promotion).unwrap();
        assert_eq!(value["type"], "percentage_discount_promotions");
        assert_eq!(value["market"]["code"], "EU");
        let decoded: Promotion = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, promotion);
    }

    #[test]
    fn portable_attributes_follow_kind_table() {
        let promotion: Promotion = serde_json::from_value(summer10()).unwrap();
        let attributes = promotion.portable_attributes();
        assert_eq!(attributes["percentage"], json!(10));
        assert_eq!(attributes["name"], json!("SUMMER10"));
        assert_eq!(attributes["metadata"], json!({ "campaign": "summer" }));
        assert!(!attributes.contains_key("active"));
        assert!(!attributes.contains_key("market"));
        assert!(!attributes.contains_key("type"));
        assert!(!attributes.contains_key("id"));
    }

    #[test]
    fn overwrite_attributes_null_out_unset_fields() {
        let promotion: Promotion = serde_json::from_value(json!({
            "id": "promo_4",
            "type": "buy_x_pay_y_promotions",
            "name": "3FOR2",
            "x": 3,
            "y": 2
        }))
        .unwrap();
        let attributes = promotion.overwrite_attributes();
        assert_eq!(attributes["x"], json!(3));
        assert_eq!(attributes["expires_at"], Value::Null);
        assert_eq!(attributes["reference"], Value::Null);
        assert_eq!(attributes["cheapest_free"], Value::Null);
        assert_eq!(attributes.len(), SHARED_PROMOTION_ATTRIBUTES.len() + 3);
        assert!(!promotion.portable_attributes().contains_key("expires_at"));
    }

    #[test]
    fn free_shipping_has_no_specific_attributes() {
        let promotion: Promotion = serde_json::from_value(json!({
            "id": "promo_2",
            "type": "free_shipping_promotions",
            "name": "FREESHIP"
        }))
        .unwrap();
        assert_eq!(promotion.kind(), PromotionKind::FreeShipping);
        assert!(promotion.variant.specific_attributes().is_empty());
    }

    #[test]
    fn unknown_promotion_type_fails_to_decode() {
        let result = serde_json::from_value::<Promotion>(json!({
            "id": "promo_3",
            "type": "flex_promotions",
            "name": "FLEX"
        }));
        assert!(result.is_err());
    }
}
