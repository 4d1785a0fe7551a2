//! Typed diagnostics emitted by the engine, in the order they happen.

use std::fmt;

use promosync_core::{RelationType, ResourceType};
use tracing::{error, info, warn};

use crate::writer::{Action, PromotionState};

/// Where a missing or unmatched natural key was found on a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Promotion,
    Market,
    SkuList,
    RuleSkuList,
    Custom(RelationType),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Promotion => f.write_str("promotion"),
            Slot::Market => f.write_str("market"),
            Slot::SkuList => f.write_str("sku list"),
            Slot::RuleSkuList => f.write_str("sku list promotion rule sku list"),
            Slot::Custom(relation) => write!(f, "custom promotion rule {relation}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The natural key the slot is matched on is null or empty.
    MissingCompareField { slot: Slot, field: &'static str },
    /// A custom-rule foreign id resolved to a record without a natural key.
    UncomparableRelationship { relation: RelationType, id: String },
    /// A custom-rule foreign id is absent from the harvested relationships.
    UnknownSourceRelationship { relation: RelationType, id: String },
    /// The natural key has no counterpart in the target environment.
    NotFoundInTarget { slot: Slot, key: String },
    UnsupportedPredicate { predicate: String },
    Undecodable { message: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::MissingCompareField { slot, field } => {
                write!(f, "missing {field} on {slot}")
            }
            ExclusionReason::UncomparableRelationship { relation, id } => write!(
                f,
                "{relation} {id} has no {} to compare on",
                relation.compare_field()
            ),
            ExclusionReason::UnknownSourceRelationship { relation, id } => {
                write!(f, "{relation} {id} was not harvested from the source")
            }
            ExclusionReason::NotFoundInTarget { slot, key } => {
                write!(f, "{slot} `{key}` not found in target")
            }
            ExclusionReason::UnsupportedPredicate { predicate } => {
                write!(f, "unsupported custom rule predicate `{predicate}`")
            }
            ExclusionReason::Undecodable { message } => write!(f, "could not decode: {message}"),
        }
    }
}

/// A single remote write made while syncing a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Create,
    Update,
    Delete,
    Enable,
    Disable,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepKind::Create => "create",
            StepKind::Update => "update",
            StepKind::Delete => "delete",
            StepKind::Enable => "enable",
            StepKind::Disable => "disable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Info(String),
    Excluded {
        promotion: String,
        reason: ExclusionReason,
    },
    FetchFailed {
        resource: String,
        detail: String,
    },
    Planned {
        promotion: String,
        action: Action,
    },
    Step {
        promotion: String,
        resource: ResourceType,
        kind: StepKind,
    },
    State {
        promotion: String,
        state: PromotionState,
    },
    WriteFailed {
        promotion_name: String,
        detail: String,
    },
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Info(message) => f.write_str(message),
            SyncEvent::Excluded { promotion, reason } => {
                write!(f, "promotion {promotion} excluded: {reason}")
            }
            SyncEvent::FetchFailed { resource, detail } => {
                write!(f, "could not fetch {resource}: {detail}")
            }
            SyncEvent::Planned { promotion, action } => write!(f, "{promotion}: {action}"),
            SyncEvent::Step {
                promotion,
                resource,
                kind,
            } => write!(f, "{promotion}: {kind} {resource}"),
            SyncEvent::State { promotion, state } => write!(f, "{promotion}: {state}"),
            SyncEvent::WriteFailed {
                promotion_name,
                detail,
            } => write!(f, "promotion {promotion_name} failed: {detail}"),
        }
    }
}

/// Receiver for engine events, passed once to each entry point.
pub trait EventSink: Send {
    fn emit(&mut self, event: SyncEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: SyncEvent) {
        (**self).emit(event);
    }
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: SyncEvent) {
        self.0.emit(event.clone());
        self.1.emit(event);
    }
}

/// Append-only record of a run's events.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    events: Vec<SyncEvent>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SyncEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SyncEvent> {
        self.events
    }

    pub fn lines(&self) -> Vec<String> {
        self.events.iter().map(ToString::to_string).collect()
    }

    pub fn exclusions(&self) -> impl Iterator<Item = (&str, &ExclusionReason)> {
        self.events.iter().filter_map(|event| match event {
            SyncEvent::Excluded { promotion, reason } => Some((promotion.as_str(), reason)),
            _ => None,
        })
    }

    pub fn write_failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.events.iter().filter_map(|event| match event {
            SyncEvent::WriteFailed {
                promotion_name,
                detail,
            } => Some((promotion_name.as_str(), detail.as_str())),
            _ => None,
        })
    }

    pub fn fetch_failures(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SyncEvent::FetchFailed { .. }))
            .count()
    }
}

impl EventSink for Transcript {
    fn emit(&mut self, event: SyncEvent) {
        self.events.push(event);
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: SyncEvent) {
        match &event {
            SyncEvent::Excluded { .. } | SyncEvent::FetchFailed { .. } => warn!("{event}"),
            SyncEvent::WriteFailed { .. } => error!("{event}"),
            _ => info!("{event}"),
        }
    }
}
