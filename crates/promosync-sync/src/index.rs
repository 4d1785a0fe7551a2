use std::collections::BTreeMap;

use promosync_core::{CompareKey, RelationType, Relationship, ResourceType};

use crate::error::SyncError;

/// Source-side relationships keyed by their environment-local id.
pub type RelationshipsById = BTreeMap<String, Relationship>;

pub fn index_by_id<I>(relationships: I) -> RelationshipsById
where
    I: IntoIterator<Item = Relationship>,
{
    relationships
        .into_iter()
        .map(|relationship| (relationship.id().to_string(), relationship))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// A second item with the same key is an error.
    #[default]
    Strict,
    /// The last item with a given key wins.
    AllowDuplicates,
}

/// Items keyed by `(compare scope, natural key)`.
#[derive(Debug, Clone)]
pub struct CompareIndex<T> {
    entries: BTreeMap<(ResourceType, String), T>,
}

impl<T> Default for CompareIndex<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: CompareKey> CompareIndex<T> {
    /// Items without a natural key are left out.
    pub fn build<I>(items: I, policy: DuplicatePolicy) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut entries = BTreeMap::new();
        for item in items {
            if !item.has_compare_value() {
                continue;
            }
            let scope = item.compare_scope();
            let key = item.compare_value().unwrap_or_default().to_string();
            if policy == DuplicatePolicy::Strict && entries.contains_key(&(scope, key.clone())) {
                return Err(SyncError::DuplicateCompareKey {
                    resource: scope,
                    key,
                });
            }
            entries.insert((scope, key), item);
        }
        Ok(Self { entries })
    }
}

impl<T> CompareIndex<T> {
    pub fn get(&self, scope: ResourceType, key: &str) -> Option<&T> {
        self.entries.get(&(scope.compare_scope(), key.to_string()))
    }

    pub fn relation(&self, relation: RelationType, key: &str) -> Option<&T> {
        self.get(relation.resource_type(), key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = (ResourceType, &str)> {
        self.entries.keys().map(|(scope, key)| (*scope, key.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}
