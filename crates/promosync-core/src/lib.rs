//! Core domain model for promotion sync: resource types, the compare-key
//! registry, promotions with their rules, and the resources they reference.

pub mod promotion;
pub mod relationship;
pub mod resource;

pub use promotion::{
    Coupon, CouponCodesPromotionRule, CustomPromotionRule, OrderAmountPromotionRule, Promotion,
    PromotionKind, PromotionVariant, SharedAttributes, SkuListPromotionRule,
    SHARED_ATTRIBUTES, SHARED_PROMOTION_ATTRIBUTES,
};
pub use relationship::{Market, Relationship, SkuList, Tag};
pub use resource::{
    compare_field, CompareKey, RelationType, ResourceType, UnknownResourceType, COMPARE_FIELDS,
};

pub const CRATE_NAME: &str = "promosync-core";
