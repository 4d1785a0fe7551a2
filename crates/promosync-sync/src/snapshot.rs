use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use promosync_core::Promotion;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::index::RelationshipsById;

/// Portable export of one environment's promotions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub promotions: Vec<Promotion>,
    #[serde(rename = "relationshipsById", default)]
    pub relationships_by_id: RelationshipsById,
    /// Relation type names present in `relationships_by_id`.
    #[serde(rename = "relationshipsTypes", default)]
    pub relationships_types: Vec<String>,
}

impl Snapshot {
    pub fn new(promotions: Vec<Promotion>, relationships_by_id: RelationshipsById) -> Self {
        let relationships_types = relationships_by_id
            .values()
            .map(|relationship| relationship.relation_type().as_str().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            promotions,
            relationships_by_id,
            relationships_types,
        }
    }

    /// Keeps only the named promotions; an empty selection keeps all of them.
    /// The relationship tables are left complete.
    pub fn select(&self, names: &[String]) -> Snapshot {
        if names.is_empty() {
            return self.clone();
        }
        Snapshot {
            promotions: self
                .promotions
                .iter()
                .filter(|promotion| promotion.name.as_ref().is_some_and(|name| names.contains(name)))
                .cloned()
                .collect(),
            relationships_by_id: self.relationships_by_id.clone(),
            relationships_types: self.relationships_types.clone(),
        }
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(self).context("serializing snapshot")?;
        fs::write(path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    pub async fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
    }
}
