use std::collections::BTreeMap;

use promosync_core::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Filters, includes and sparse fieldsets for a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: BTreeMap<String, String>,
    pub include: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(predicate.into(), value.into());
        self
    }

    /// `id_in` filter over a batch of ids.
    pub fn id_in<S: AsRef<str>>(self, ids: &[S]) -> Self {
        let joined = ids.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
        self.filter("id_in", joined)
    }

    pub fn include<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn fields<I, S>(mut self, resource: ResourceType, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert(
            resource.as_str().to_string(),
            names.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub page_count: u32,
    pub record_count: Option<u64>,
}

/// Pointer to another resource, as attached to a create/update payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource: ResourceType,
    pub id: String,
}

impl ResourceRef {
    pub fn new(resource: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource,
            id: id.into(),
        }
    }
}

/// Attributes and relationships for a create or update call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePayload {
    pub attributes: Map<String, Value>,
    pub relationships: BTreeMap<String, ResourceRef>,
}

impl ResourcePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            relationships: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn relationship(mut self, name: impl Into<String>, target: ResourceRef) -> Self {
        self.relationships.insert(name.into(), target);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}
