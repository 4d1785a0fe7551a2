//! Resource types and the compare-key registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every API resource the sync engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "promotions")]
    Promotions,
    #[serde(rename = "percentage_discount_promotions")]
    PercentageDiscountPromotions,
    #[serde(rename = "fixed_amount_promotions")]
    FixedAmountPromotions,
    #[serde(rename = "fixed_price_promotions")]
    FixedPricePromotions,
    #[serde(rename = "buy_x_pay_y_promotions")]
    BuyXPayYPromotions,
    #[serde(rename = "free_gift_promotions")]
    FreeGiftPromotions,
    #[serde(rename = "free_shipping_promotions")]
    FreeShippingPromotions,
    #[serde(rename = "external_promotions")]
    ExternalPromotions,
    #[serde(rename = "order_amount_promotion_rules")]
    OrderAmountPromotionRules,
    #[serde(rename = "sku_list_promotion_rules")]
    SkuListPromotionRules,
    #[serde(rename = "coupon_codes_promotion_rules")]
    CouponCodesPromotionRules,
    #[serde(rename = "custom_promotion_rules")]
    CustomPromotionRules,
    #[serde(rename = "coupons")]
    Coupons,
    #[serde(rename = "markets")]
    Markets,
    #[serde(rename = "sku_lists")]
    SkuLists,
    #[serde(rename = "tags")]
    Tags,
}

impl ResourceType {
    pub const ALL: [ResourceType; 16] = [
        ResourceType::Promotions,
        ResourceType::PercentageDiscountPromotions,
        ResourceType::FixedAmountPromotions,
        ResourceType::FixedPricePromotions,
        ResourceType::BuyXPayYPromotions,
        ResourceType::FreeGiftPromotions,
        ResourceType::FreeShippingPromotions,
        ResourceType::ExternalPromotions,
        ResourceType::OrderAmountPromotionRules,
        ResourceType::SkuListPromotionRules,
        ResourceType::CouponCodesPromotionRules,
        ResourceType::CustomPromotionRules,
        ResourceType::Coupons,
        ResourceType::Markets,
        ResourceType::SkuLists,
        ResourceType::Tags,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::Promotions => "promotions",
            ResourceType::PercentageDiscountPromotions => "percentage_discount_promotions",
            ResourceType::FixedAmountPromotions => "fixed_amount_promotions",
            ResourceType::FixedPricePromotions => "fixed_price_promotions",
            ResourceType::BuyXPayYPromotions => "buy_x_pay_y_promotions",
            ResourceType::FreeGiftPromotions => "free_gift_promotions",
            ResourceType::FreeShippingPromotions => "free_shipping_promotions",
            ResourceType::ExternalPromotions => "external_promotions",
            ResourceType::OrderAmountPromotionRules => "order_amount_promotion_rules",
            ResourceType::SkuListPromotionRules => "sku_list_promotion_rules",
            ResourceType::CouponCodesPromotionRules => "coupon_codes_promotion_rules",
            ResourceType::CustomPromotionRules => "custom_promotion_rules",
            ResourceType::Coupons => "coupons",
            ResourceType::Markets => "markets",
            ResourceType::SkuLists => "sku_lists",
            ResourceType::Tags => "tags",
        }
    }

    /// True for the seven concrete promotion collections.
    pub const fn is_promotion_kind(self) -> bool {
        matches!(
            self,
            ResourceType::PercentageDiscountPromotions
                | ResourceType::FixedAmountPromotions
                | ResourceType::FixedPricePromotions
                | ResourceType::BuyXPayYPromotions
                | ResourceType::FreeGiftPromotions
                | ResourceType::FreeShippingPromotions
                | ResourceType::ExternalPromotions
        )
    }

    /// Scope under which natural keys must be unique. All promotion kinds share one scope.
    pub const fn compare_scope(self) -> ResourceType {
        if self.is_promotion_kind() {
            ResourceType::Promotions
        } else {
            self
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource type `{0}`")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// Related resources a promotion can reference but never owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationType {
    #[serde(rename = "markets")]
    Markets,
    #[serde(rename = "sku_lists")]
    SkuLists,
    #[serde(rename = "tags")]
    Tags,
}

impl RelationType {
    pub const ALL: [RelationType; 3] = [RelationType::Markets, RelationType::SkuLists, RelationType::Tags];

    pub const fn resource_type(self) -> ResourceType {
        match self {
            RelationType::Markets => ResourceType::Markets,
            RelationType::SkuLists => ResourceType::SkuLists,
            RelationType::Tags => ResourceType::Tags,
        }
    }

    pub const fn as_str(self) -> &'static str {
        self.resource_type().as_str()
    }

    pub const fn compare_field(self) -> &'static str {
        match self {
            RelationType::Markets => "code",
            RelationType::SkuLists | RelationType::Tags => "name",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationType::ALL
            .into_iter()
            .find(|relation| relation.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// Natural field used as cross-environment identity, per resource type.
pub const COMPARE_FIELDS: [(ResourceType, &str); 4] = [
    (ResourceType::Promotions, "name"),
    (ResourceType::Markets, "code"),
    (ResourceType::SkuLists, "name"),
    (ResourceType::Tags, "name"),
];

/// Looks up the compare field for a resource; promotion kinds resolve through `promotions`.
pub fn compare_field(resource: ResourceType) -> Option<&'static str> {
    let scope = resource.compare_scope();
    COMPARE_FIELDS
        .iter()
        .find(|(candidate, _)| *candidate == scope)
        .map(|(_, field)| *field)
}

/// A record that carries a natural key usable across environments.
pub trait CompareKey {
    fn compare_scope(&self) -> ResourceType;

    fn compare_value(&self) -> Option<&str>;

    /// Null and empty keys both count as missing.
    fn has_compare_value(&self) -> bool {
        self.compare_value().is_some_and(|value| !value.is_empty())
    }
}
