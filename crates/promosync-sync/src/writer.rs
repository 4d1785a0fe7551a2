//! Writes source promotions and their rules into the target environment.

use std::fmt;

use promosync_client::{ResourceClient, ResourcePayload, ResourceRef};
use promosync_core::{
    CompareKey, CouponCodesPromotionRule, CustomPromotionRule, OrderAmountPromotionRule, Promotion,
    RelationType, Relationship, ResourceType, SkuListPromotionRule, SHARED_ATTRIBUTES,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, info_span, Instrument};

use crate::error::SyncError;
use crate::events::{EventSink, ExclusionReason, Slot, StepKind, SyncEvent};
use crate::index::{CompareIndex, RelationshipsById};
use crate::matcher::{resolve_key, translate_id};
use crate::predicate::parse_filters;

/// Code of the coupon that keeps a freshly created coupon-gated promotion unusable.
pub const PLACEHOLDER_COUPON_CODE: &str = "PLACEHOLDER_TO_NOT_ACTIVATE_PROMOTION";
pub const PLACEHOLDER_RECIPIENT_EMAIL: &str = "coupon@placeholder.com";
pub const PLACEHOLDER_REFERENCE: &str = "placeholder";
pub const PLACEHOLDER_EXPIRES_AT: &str = "1970-01-01T00:00:00.000Z";
/// `reference_origin` stamped on records this tool creates on its own.
pub const REFERENCE_ORIGIN: &str = "promosync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// `Update` when the target already has the record.
pub fn get_action<T>(existing: Option<&T>) -> Action {
    match existing {
        Some(_) => Action::Update,
        None => Action::Create,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionState {
    NotFound,
    Found,
    Created,
    Updated,
    RulesSynced,
    Enabled,
    Disabled,
    Unchanged,
}

impl fmt::Display for PromotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromotionState::NotFound => "not found in target",
            PromotionState::Found => "found in target",
            PromotionState::Created => "created",
            PromotionState::Updated => "updated",
            PromotionState::RulesSynced => "rules synced",
            PromotionState::Enabled => "enabled",
            PromotionState::Disabled => "disabled",
            PromotionState::Unchanged => "activation unchanged",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Disable an active target promotion when the source one is inactive.
    pub disable_inactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleWrite {
    Skipped,
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionOutcome {
    pub name: String,
    pub action: Action,
    pub promotion_id: String,
    pub state: PromotionState,
    pub placeholder_coupon: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub outcomes: Vec<PromotionOutcome>,
    /// Promotion name and reported detail, in processing order.
    pub failures: Vec<(String, String)>,
}

impl WriteReport {
    pub fn count(&self, action: Action) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.action == action).count()
    }

    pub fn enabled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == PromotionState::Enabled)
            .count()
    }

    pub fn placeholder_coupons(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.placeholder_coupon).count()
    }
}

/// Target-side ids of the promotion being written.
struct WriteTarget<'p> {
    name: &'p str,
    resource: ResourceType,
    promotion_id: String,
}

pub struct SyncWriter<'a> {
    client: &'a dyn ResourceClient,
    source_by_id: &'a RelationshipsById,
    target_index: &'a CompareIndex<Relationship>,
    options: WriteOptions,
}

impl<'a> SyncWriter<'a> {
    pub fn new(
        client: &'a dyn ResourceClient,
        source_by_id: &'a RelationshipsById,
        target_index: &'a CompareIndex<Relationship>,
    ) -> Self {
        Self {
            client,
            source_by_id,
            target_index,
            options: WriteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Writes each promotion in order. A failure stops only that promotion;
    /// nothing already written for it is rolled back.
    pub async fn sync_all<'p, I>(&self, promotions: I, sink: &mut dyn EventSink) -> WriteReport
    where
        I: IntoIterator<Item = (&'p Promotion, Option<&'p Promotion>)>,
    {
        let mut report = WriteReport::default();
        for (source, target) in promotions {
            let name = source.label().to_string();
            let span = info_span!("sync_promotion", promotion = %name);
            match self.sync_promotion(source, target, sink).instrument(span).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(err) => {
                    let detail = err.write_detail();
                    error!(promotion = %name, error = %err, "promotion sync failed");
                    sink.emit(SyncEvent::WriteFailed {
                        promotion_name: name.clone(),
                        detail: detail.clone(),
                    });
                    report.failures.push((name, detail));
                }
            }
        }
        report
    }

    /// Creates or updates one promotion, then its rules, then activates it.
    pub async fn sync_promotion(
        &self,
        source: &Promotion,
        target: Option<&Promotion>,
        sink: &mut dyn EventSink,
    ) -> Result<PromotionOutcome, SyncError> {
        let name = source.label();
        let action = get_action(target);
        let resource = source.resource_type();
        emit_state(
            sink,
            name,
            match action {
                Action::Create => PromotionState::NotFound,
                Action::Update => PromotionState::Found,
            },
        );

        if let Some(target) = target {
            if target.kind() != source.kind() {
                return Err(SyncError::KindMismatch {
                    name: name.to_string(),
                    source_type: resource,
                    target_type: target.resource_type(),
                });
            }
        }

        let payload = self.promotion_payload(source, action)?;
        let written = match target {
            None => self.client.create(resource, &payload).await?,
            Some(target) => self.client.update(resource, &target.id, &payload).await?,
        };
        let write = WriteTarget {
            name,
            resource,
            promotion_id: written_id(&written, resource)?,
        };
        match action {
            Action::Create => {
                emit_step(sink, name, resource, StepKind::Create);
                emit_state(sink, name, PromotionState::Created);
            }
            Action::Update => {
                emit_step(sink, name, resource, StepKind::Update);
                emit_state(sink, name, PromotionState::Updated);
            }
        }

        let placeholder_coupon = self.sync_rules(source, target, &write, sink).await?;
        emit_state(sink, name, PromotionState::RulesSynced);

        let state = if source.is_active() {
            let payload = ResourcePayload::new().attribute("_enable", true);
            self.client.update(resource, &write.promotion_id, &payload).await?;
            emit_step(sink, name, resource, StepKind::Enable);
            PromotionState::Enabled
        } else if self.options.disable_inactive && target.is_some_and(Promotion::is_active) {
            let payload = ResourcePayload::new().attribute("_disable", true);
            self.client.update(resource, &write.promotion_id, &payload).await?;
            emit_step(sink, name, resource, StepKind::Disable);
            PromotionState::Disabled
        } else {
            PromotionState::Unchanged
        };
        emit_state(sink, name, state);
        info!(promotion = %name, action = %action, state = %state, "promotion synced");

        Ok(PromotionOutcome {
            name: name.to_string(),
            action,
            promotion_id: write.promotion_id,
            state,
            placeholder_coupon,
        })
    }

    /// Attributes plus re-resolved market and SKU list. A created promotion starts disabled.
    pub fn promotion_payload(
        &self,
        source: &Promotion,
        action: Action,
    ) -> Result<ResourcePayload, SyncError> {
        let mut payload = match action {
            Action::Create => ResourcePayload::with_attributes(source.portable_attributes())
                .attribute("_disable", true),
            Action::Update => ResourcePayload::with_attributes(source.overwrite_attributes()),
        };
        if let Some(market) = &source.market {
            let found = self.resolve(RelationType::Markets, Slot::Market, market)?;
            payload = payload.relationship("market", ResourceRef::new(ResourceType::Markets, found.id()));
        }
        if let Some(sku_list) = &source.sku_list {
            let found = self.resolve(RelationType::SkuLists, Slot::SkuList, sku_list)?;
            payload =
                payload.relationship("sku_list", ResourceRef::new(ResourceType::SkuLists, found.id()));
        }
        Ok(payload)
    }

    /// Rules in fixed order. Returns whether a placeholder coupon was created.
    async fn sync_rules(
        &self,
        source: &Promotion,
        target: Option<&Promotion>,
        write: &WriteTarget<'_>,
        sink: &mut dyn EventSink,
    ) -> Result<bool, SyncError> {
        let order_amount = source
            .order_amount_promotion_rule
            .as_ref()
            .map(order_amount_rule_payload);
        self.sync_rule(
            write,
            ResourceType::OrderAmountPromotionRules,
            order_amount,
            target.and_then(|t| t.order_amount_promotion_rule.as_ref()).map(|r| r.id.as_str()),
            sink,
        )
        .await?;

        let sku_list = source
            .sku_list_promotion_rule
            .as_ref()
            .map(|rule| self.sku_list_rule_payload(rule))
            .transpose()?;
        self.sync_rule(
            write,
            ResourceType::SkuListPromotionRules,
            sku_list,
            target.and_then(|t| t.sku_list_promotion_rule.as_ref()).map(|r| r.id.as_str()),
            sink,
        )
        .await?;

        let coupon_codes = source
            .coupon_codes_promotion_rule
            .as_ref()
            .map(coupon_codes_rule_payload);
        let (coupon_rule, coupon_rule_id) = self
            .sync_rule(
                write,
                ResourceType::CouponCodesPromotionRules,
                coupon_codes,
                target.and_then(|t| t.coupon_codes_promotion_rule.as_ref()).map(|r| r.id.as_str()),
                sink,
            )
            .await?;
        let placeholder_coupon = match (coupon_rule, coupon_rule_id) {
            (RuleWrite::Created, Some(rule_id)) => {
                self.client
                    .create(ResourceType::Coupons, &placeholder_coupon_payload(&rule_id))
                    .await?;
                emit_step(sink, write.name, ResourceType::Coupons, StepKind::Create);
                true
            }
            _ => false,
        };

        let custom = source
            .custom_promotion_rule
            .as_ref()
            .map(|rule| self.custom_rule_payload(rule))
            .transpose()?;
        self.sync_rule(
            write,
            ResourceType::CustomPromotionRules,
            custom,
            target.and_then(|t| t.custom_promotion_rule.as_ref()).map(|r| r.id.as_str()),
            sink,
        )
        .await?;

        Ok(placeholder_coupon)
    }

    async fn sync_rule(
        &self,
        write: &WriteTarget<'_>,
        resource: ResourceType,
        payload: Option<ResourcePayload>,
        existing_id: Option<&str>,
        sink: &mut dyn EventSink,
    ) -> Result<(RuleWrite, Option<String>), SyncError> {
        let result = match (payload, existing_id) {
            (Some(mut payload), Some(id)) => {
                for name in rule_attributes(resource).iter().chain(SHARED_ATTRIBUTES.iter()) {
                    payload.attributes.entry(*name).or_insert(Value::Null);
                }
                self.client.update(resource, id, &payload).await?;
                emit_step(sink, write.name, resource, StepKind::Update);
                (RuleWrite::Updated, Some(id.to_string()))
            }
            (Some(payload), None) => {
                let payload = payload.relationship(
                    "promotion",
                    ResourceRef::new(write.resource, write.promotion_id.clone()),
                );
                let created = self.client.create(resource, &payload).await?;
                emit_step(sink, write.name, resource, StepKind::Create);
                (RuleWrite::Created, Some(written_id(&created, resource)?))
            }
            (None, Some(id)) => {
                self.client.delete(resource, id).await?;
                emit_step(sink, write.name, resource, StepKind::Delete);
                (RuleWrite::Deleted, None)
            }
            (None, None) => (RuleWrite::Skipped, None),
        };
        Ok(result)
    }

    fn sku_list_rule_payload(&self, rule: &SkuListPromotionRule) -> Result<ResourcePayload, SyncError> {
        let mut attributes = rule.shared.to_attributes();
        insert_some(&mut attributes, "all_skus", rule.all_skus);
        insert_some(&mut attributes, "min_quantity", rule.min_quantity);
        let mut payload = ResourcePayload::with_attributes(attributes);
        if let Some(sku_list) = &rule.sku_list {
            let found = self.resolve(RelationType::SkuLists, Slot::RuleSkuList, sku_list)?;
            payload =
                payload.relationship("sku_list", ResourceRef::new(ResourceType::SkuLists, found.id()));
        }
        Ok(payload)
    }

    fn custom_rule_payload(&self, rule: &CustomPromotionRule) -> Result<ResourcePayload, SyncError> {
        let mut filters = Map::new();
        for predicate in parse_filters(&rule.filters)? {
            let value = match predicate.relation {
                Some(relation) => {
                    let translated = predicate
                        .foreign_ids()
                        .iter()
                        .map(|id| {
                            translate_id(self.source_by_id, self.target_index, relation, id)
                                .map(|found| found.id().to_string())
                                .map_err(|reason| resolution_error(relation, reason))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Value::String(translated.join(","))
                }
                None => predicate.raw_value.clone(),
            };
            filters.insert(predicate.predicate, value);
        }
        let mut attributes = rule.shared.to_attributes();
        attributes.insert("filters".into(), Value::Object(filters));
        Ok(ResourcePayload::with_attributes(attributes))
    }

    fn resolve<K: CompareKey>(
        &self,
        relation: RelationType,
        slot: Slot,
        record: &K,
    ) -> Result<&'a Relationship, SyncError> {
        let key = record.compare_value().unwrap_or_default();
        resolve_key(self.target_index, relation, slot, key)
            .map_err(|reason| resolution_error(relation, reason))
    }
}

fn order_amount_rule_payload(rule: &OrderAmountPromotionRule) -> ResourcePayload {
    let mut attributes = rule.shared.to_attributes();
    insert_some(&mut attributes, "order_amount_cents", rule.order_amount_cents);
    insert_some(&mut attributes, "use_subtotal", rule.use_subtotal);
    ResourcePayload::with_attributes(attributes)
}

fn coupon_codes_rule_payload(rule: &CouponCodesPromotionRule) -> ResourcePayload {
    ResourcePayload::with_attributes(rule.shared.to_attributes())
}

/// Single-use, already expired coupon attached to a new coupon-codes rule.
pub fn placeholder_coupon_payload(rule_id: &str) -> ResourcePayload {
    ResourcePayload::new()
        .attribute("code", PLACEHOLDER_COUPON_CODE)
        .attribute("usage_limit", 1)
        .attribute("expires_at", PLACEHOLDER_EXPIRES_AT)
        .attribute("recipient_email", PLACEHOLDER_RECIPIENT_EMAIL)
        .attribute("reference", PLACEHOLDER_REFERENCE)
        .attribute("reference_origin", REFERENCE_ORIGIN)
        .relationship(
            "promotion_rule",
            ResourceRef::new(ResourceType::CouponCodesPromotionRules, rule_id),
        )
}

/// Rule fields an update overwrites, besides the shared ones.
fn rule_attributes(resource: ResourceType) -> &'static [&'static str] {
    match resource {
        ResourceType::OrderAmountPromotionRules => &["order_amount_cents", "use_subtotal"],
        ResourceType::SkuListPromotionRules => &["all_skus", "min_quantity"],
        ResourceType::CustomPromotionRules => &["filters"],
        _ => &[],
    }
}

fn insert_some<T: Into<Value>>(attributes: &mut Map<String, Value>, name: &str, value: Option<T>) {
    if let Some(value) = value {
        attributes.insert(name.to_string(), value.into());
    }
}

fn written_id(written: &Value, resource: ResourceType) -> Result<String, SyncError> {
    written
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SyncError::Decode {
            resource: resource.to_string(),
            message: "write response has no id".to_string(),
        })
}

fn resolution_error(relation: RelationType, reason: ExclusionReason) -> SyncError {
    match reason {
        ExclusionReason::UnknownSourceRelationship { relation, id } => {
            SyncError::UnknownSourceRelationship { relation, id }
        }
        ExclusionReason::NotFoundInTarget { key, .. } => {
            SyncError::UnresolvedRelationship { relation, key }
        }
        ExclusionReason::UncomparableRelationship { id, .. } => {
            SyncError::UnresolvedRelationship { relation, key: id }
        }
        _ => SyncError::UnresolvedRelationship {
            relation,
            key: String::new(),
        },
    }
}

fn emit_step(sink: &mut dyn EventSink, promotion: &str, resource: ResourceType, kind: StepKind) {
    sink.emit(SyncEvent::Step {
        promotion: promotion.to_string(),
        resource,
        kind,
    });
}

fn emit_state(sink: &mut dyn EventSink, promotion: &str, state: PromotionState) {
    sink.emit(SyncEvent::State {
        promotion: promotion.to_string(),
        state,
    });
}
