//! Resources referenced by promotions: markets, SKU lists and tags.

use serde::{Deserialize, Serialize};

use crate::resource::{CompareKey, RelationType, ResourceType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuList {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A referenced resource, tagged by its API type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Relationship {
    #[serde(rename = "markets")]
    Market(Market),
    #[serde(rename = "sku_lists")]
    SkuList(SkuList),
    #[serde(rename = "tags")]
    Tag(Tag),
}

impl Relationship {
    pub fn id(&self) -> &str {
        match self {
            Relationship::Market(market) => &market.id,
            Relationship::SkuList(sku_list) => &sku_list.id,
            Relationship::Tag(tag) => &tag.id,
        }
    }

    pub fn relation_type(&self) -> RelationType {
        match self {
            Relationship::Market(_) => RelationType::Markets,
            Relationship::SkuList(_) => RelationType::SkuLists,
            Relationship::Tag(_) => RelationType::Tags,
        }
    }
}

impl From<Market> for Relationship {
    fn from(market: Market) -> Self {
        Relationship::Market(market)
    }
}

impl From<SkuList> for Relationship {
    fn from(sku_list: SkuList) -> Self {
        Relationship::SkuList(sku_list)
    }
}

impl From<Tag> for Relationship {
    fn from(tag: Tag) -> Self {
        Relationship::Tag(tag)
    }
}

impl CompareKey for Market {
    fn compare_scope(&self) -> ResourceType {
        ResourceType::Markets
    }

    fn compare_value(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl CompareKey for SkuList {
    fn compare_scope(&self) -> ResourceType {
        ResourceType::SkuLists
    }

    fn compare_value(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl CompareKey for Tag {
    fn compare_scope(&self) -> ResourceType {
        ResourceType::Tags
    }

    fn compare_value(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl CompareKey for Relationship {
    fn compare_scope(&self) -> ResourceType {
        self.relation_type().resource_type()
    }

    fn compare_value(&self) -> Option<&str> {
        match self {
            Relationship::Market(market) => market.compare_value(),
            Relationship::SkuList(sku_list) => sku_list.compare_value(),
            Relationship::Tag(tag) => tag.compare_value(),
        }
    }
}
