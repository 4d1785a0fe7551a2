//! Plans and applies a snapshot against the target environment.

use chrono::{DateTime, Utc};
use promosync_client::ResourceClient;
use promosync_core::{CompareKey, Promotion, Relationship, ResourceType};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::comparable::is_comparable;
use crate::error::SyncError;
use crate::events::{EventSink, ExclusionReason, SyncEvent, Transcript};
use crate::export::fetch_promotions;
use crate::harvest::fetch_relationship_types;
use crate::index::{index_by_id, CompareIndex, DuplicatePolicy, RelationshipsById};
use crate::matcher::{are_relationships_comparable, compare};
use crate::snapshot::Snapshot;
use crate::writer::{get_action, Action, SyncWriter, WriteOptions};

/// A snapshot promotion that can be written, with its counterpart in the target.
#[derive(Debug, Clone)]
pub struct PlannedPromotion {
    pub source: Promotion,
    pub target: Option<Promotion>,
    pub action: Action,
}

impl PlannedPromotion {
    pub fn name(&self) -> &str {
        self.source.label()
    }
}

/// Counts reported about the target environment while planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetDiagnostics {
    pub promotions: usize,
    pub comparable: usize,
    pub syncable: usize,
    pub relationships: usize,
}

#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub candidates: Vec<PlannedPromotion>,
    pub source_by_id: RelationshipsById,
    pub target_index: CompareIndex<Relationship>,
    pub target: TargetDiagnostics,
    pub excluded: usize,
}

impl ImportPlan {
    /// Candidates most recently updated first; undated ones last.
    pub fn ordered_for_review(&self) -> Vec<&PlannedPromotion> {
        let mut ordered = self.candidates.iter().collect::<Vec<_>>();
        ordered.sort_by(|a, b| b.source.updated_at.cmp(&a.source.updated_at));
        ordered
    }

    /// Candidates in plan order, restricted to `names` unless it is empty.
    pub fn select(&self, names: &[String]) -> Vec<&PlannedPromotion> {
        self.candidates
            .iter()
            .filter(|candidate| names.is_empty() || names.iter().any(|name| name == candidate.name()))
            .collect()
    }

    pub fn count(&self, action: Action) -> usize {
        self.candidates
            .iter()
            .filter(|candidate| candidate.action == action)
            .count()
    }
}

/// Reads the target environment and decides what each snapshot promotion needs.
///
/// Fails on duplicate natural keys in the target; snapshot promotions whose
/// custom rule cannot be parsed are excluded.
pub async fn prepare_import(
    client: &dyn ResourceClient,
    snapshot: &Snapshot,
    sink: &mut dyn EventSink,
) -> Result<ImportPlan, SyncError> {
    async move {
        let mut target_log = Transcript::new();
        let target_promotions = fetch_promotions(client, &mut target_log).await?;
        let fetched = target_promotions.len();
        let comparable_targets = target_promotions
            .iter()
            .filter(|promotion| is_comparable(promotion, &mut target_log))
            .collect::<Vec<_>>();
        let mut diagnostics = TargetDiagnostics {
            promotions: fetched,
            comparable: comparable_targets.len(),
            ..Default::default()
        };

        let relationships =
            fetch_relationship_types(client, &snapshot.relationships_types, sink).await;
        diagnostics.relationships = relationships.len();
        let target_by_id = index_by_id(relationships.iter().cloned());
        let target_index = CompareIndex::build(relationships, DuplicatePolicy::Strict)?;

        for promotion in comparable_targets {
            // An unparsable target rule only makes that promotion unsyncable.
            if matches!(
                are_relationships_comparable(&target_by_id, promotion, &mut target_log),
                Ok(true)
            ) {
                diagnostics.syncable += 1;
            }
        }
        info!(
            promotions = diagnostics.promotions,
            comparable = diagnostics.comparable,
            syncable = diagnostics.syncable,
            relationships = diagnostics.relationships,
            "target environment loaded"
        );
        sink.emit(SyncEvent::Info(format!(
            "target has {} promotions, {} comparable, {} with comparable relationships; {} relationships",
            diagnostics.promotions, diagnostics.comparable, diagnostics.syncable, diagnostics.relationships
        )));

        // Counterparts are looked up among every named target promotion, comparable or not.
        let targets_by_name = CompareIndex::build(target_promotions, DuplicatePolicy::Strict)?;

        let mut candidates = Vec::new();
        let mut excluded = 0;
        for promotion in &snapshot.promotions {
            if !is_comparable(promotion, sink) {
                excluded += 1;
                continue;
            }
            match compare(&snapshot.relationships_by_id, &target_index, promotion, sink) {
                Ok(true) => {}
                Ok(false) => {
                    excluded += 1;
                    continue;
                }
                Err(SyncError::UnsupportedPredicate { predicate }) => {
                    excluded += 1;
                    sink.emit(SyncEvent::Excluded {
                        promotion: promotion.label().to_string(),
                        reason: ExclusionReason::UnsupportedPredicate { predicate },
                    });
                    continue;
                }
                Err(err) => return Err(err),
            }
            let target = promotion
                .compare_value()
                .and_then(|name| targets_by_name.get(ResourceType::Promotions, name))
                .cloned();
            let action = get_action(target.as_ref());
            sink.emit(SyncEvent::Planned {
                promotion: promotion.label().to_string(),
                action,
            });
            candidates.push(PlannedPromotion {
                source: promotion.clone(),
                target,
                action,
            });
        }

        Ok::<_, SyncError>(ImportPlan {
            candidates,
            source_by_id: snapshot.relationships_by_id.clone(),
            target_index,
            target: diagnostics,
            excluded,
        })
    }
    .instrument(info_span!("prepare_import"))
    .await
}

/// Outcome of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub enabled: usize,
    pub placeholder_coupons: usize,
    /// Selected names that are not in the plan.
    pub unmatched_selection: Vec<String>,
}

/// Writes the selected candidates (all of them for an empty selection), in plan order.
pub async fn execute_import(
    client: &dyn ResourceClient,
    plan: &ImportPlan,
    selection: &[String],
    options: WriteOptions,
    sink: &mut dyn EventSink,
) -> SyncRunSummary {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let unmatched_selection = selection
        .iter()
        .filter(|name| !plan.candidates.iter().any(|c| c.name() == name.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    for name in &unmatched_selection {
        sink.emit(SyncEvent::Info(format!("{name} is not part of the import plan")));
    }

    let selected = plan.select(selection);
    let writer =
        SyncWriter::new(client, &plan.source_by_id, &plan.target_index).with_options(options);
    let report = writer
        .sync_all(
            selected
                .iter()
                .map(|candidate| (&candidate.source, candidate.target.as_ref())),
            sink,
        )
        .instrument(info_span!("execute_import", %run_id))
        .await;
    sink.emit(SyncEvent::Info("Done".to_string()));

    let summary = SyncRunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        attempted: selected.len(),
        created: report.count(Action::Create),
        updated: report.count(Action::Update),
        failed: report.failures.len(),
        enabled: report.enabled(),
        placeholder_coupons: report.placeholder_coupons(),
        unmatched_selection,
    };
    info!(
        %run_id,
        attempted = summary.attempted,
        created = summary.created,
        updated = summary.updated,
        failed = summary.failed,
        "import finished"
    );
    summary
}
