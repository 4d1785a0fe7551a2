//! Cross-environment promotion sync: export a portable snapshot from one
//! environment and reconcile it into another by natural keys.

pub mod comparable;
pub mod config;
mod error;
pub mod events;
pub mod export;
pub mod harvest;
pub mod import;
pub mod index;
pub mod matcher;
pub mod predicate;
pub mod snapshot;
pub mod writer;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use promosync_client::{HttpResourceClient, ResourceClient};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub use config::{resolve_token, EnvironmentConfig, EnvironmentRegistry, SyncConfig};
pub use error::{SyncError, GENERIC_WRITE_FAILURE};
pub use events::{EventSink, ExclusionReason, Slot, StepKind, SyncEvent, TracingSink, Transcript};
pub use export::{export_promotions, fetch_promotions};
pub use import::{execute_import, prepare_import, ImportPlan, PlannedPromotion, SyncRunSummary};
pub use index::{CompareIndex, DuplicatePolicy, RelationshipsById};
pub use snapshot::Snapshot;
pub use writer::{get_action, Action, PromotionState, SyncWriter, WriteOptions};

pub const CRATE_NAME: &str = "promosync-sync";

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub promotions: usize,
    pub relationships: usize,
    pub relationship_types: Vec<String>,
    pub path: String,
}

/// Exports `client`'s promotions, keeps the `only` selection (all when empty)
/// and writes the snapshot to `out`.
pub async fn export_to_file(
    client: &dyn ResourceClient,
    out: &Path,
    only: &[String],
    sink: &mut dyn EventSink,
) -> Result<ExportSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    let snapshot = export_promotions(client, sink)
        .await
        .context("exporting promotions")?
        .select(only);
    snapshot.write_to(out).await?;
    info!(%run_id, promotions = snapshot.promotions.len(), path = %out.display(), "snapshot written");
    Ok(ExportSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        promotions: snapshot.promotions.len(),
        relationships: snapshot.relationships_by_id.len(),
        relationship_types: snapshot.relationships_types,
        path: out.display().to_string(),
    })
}

pub async fn plan_from_file(
    client: &dyn ResourceClient,
    snapshot_path: &Path,
    sink: &mut dyn EventSink,
) -> Result<ImportPlan> {
    let snapshot = Snapshot::read_from(snapshot_path).await?;
    prepare_import(client, &snapshot, sink)
        .await
        .with_context(|| format!("preparing import of {}", snapshot_path.display()))
}

pub async fn import_from_file(
    client: &dyn ResourceClient,
    snapshot_path: &Path,
    only: &[String],
    options: WriteOptions,
    sink: &mut dyn EventSink,
) -> Result<SyncRunSummary> {
    let plan = plan_from_file(client, snapshot_path, sink).await?;
    Ok(execute_import(client, &plan, only, options, sink).await)
}

/// Resolves named environments to HTTP clients and runs the commands against them.
pub struct SyncPipeline {
    config: SyncConfig,
    registry: EnvironmentRegistry,
}

impl SyncPipeline {
    pub async fn new(config: SyncConfig) -> Result<Self> {
        let registry = EnvironmentRegistry::load(&config.config_path).await?;
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: SyncConfig, registry: EnvironmentRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connect(&self, environment: &str) -> Result<HttpResourceClient> {
        let environment = self.registry.get(environment)?;
        let token = resolve_token(environment, |key| std::env::var(key).ok())?;
        HttpResourceClient::new(self.config.client_config(&environment.base_url, token))
            .with_context(|| format!("building client for {}", environment.name))
    }

    pub async fn run_export(
        &self,
        environment: &str,
        out: &Path,
        only: &[String],
        sink: &mut dyn EventSink,
    ) -> Result<ExportSummary> {
        let client = self.connect(environment)?;
        export_to_file(&client, out, only, sink).await
    }

    pub async fn run_plan(
        &self,
        snapshot_path: &Path,
        environment: &str,
        sink: &mut dyn EventSink,
    ) -> Result<ImportPlan> {
        let client = self.connect(environment)?;
        plan_from_file(&client, snapshot_path, sink).await
    }

    pub async fn run_import(
        &self,
        snapshot_path: &Path,
        environment: &str,
        only: &[String],
        options: WriteOptions,
        sink: &mut dyn EventSink,
    ) -> Result<SyncRunSummary> {
        let client = self.connect(environment)?;
        import_from_file(&client, snapshot_path, only, options, sink).await
    }
}

pub async fn pipeline_from_env() -> Result<SyncPipeline> {
    SyncPipeline::new(SyncConfig::from_env()).await
}
