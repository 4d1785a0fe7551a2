//! Custom promotion rule filters: `<attribute>_<matcher>` predicates over a fixed table.

use std::collections::BTreeMap;
use std::fmt;

use promosync_core::{CustomPromotionRule, RelationType};
use serde_json::Value;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Matcher {
    In,
    NotIn,
    Eq,
    Gteq,
    Gt,
    EndAny,
}

impl Matcher {
    pub const ALL: [Matcher; 6] = [
        Matcher::In,
        Matcher::NotIn,
        Matcher::Eq,
        Matcher::Gteq,
        Matcher::Gt,
        Matcher::EndAny,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            Matcher::In => "in",
            Matcher::NotIn => "not_in",
            Matcher::Eq => "eq",
            Matcher::Gteq => "gteq",
            Matcher::Gt => "gt",
            Matcher::EndAny => "end_any",
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// One filterable attribute of a custom rule.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    pub attribute: &'static str,
    /// Relation whose ids the predicate value lists, if any.
    pub relation: Option<RelationType>,
    pub rel_field: Option<&'static str>,
    pub matchers: &'static [Matcher],
}

const LIST_MATCHERS: &[Matcher] = &[Matcher::In, Matcher::NotIn];
const AMOUNT_MATCHERS: &[Matcher] = &[Matcher::Eq, Matcher::Gteq, Matcher::Gt];

pub const CUSTOM_RULE_ATTRIBUTES: [AttributeSpec; 8] = [
    AttributeSpec {
        attribute: "market_id",
        relation: Some(RelationType::Markets),
        rel_field: Some("id"),
        matchers: LIST_MATCHERS,
    },
    AttributeSpec {
        attribute: "currency_code",
        relation: None,
        rel_field: None,
        matchers: LIST_MATCHERS,
    },
    AttributeSpec {
        attribute: "line_items_sku_tags_id",
        relation: Some(RelationType::Tags),
        rel_field: Some("id"),
        matchers: LIST_MATCHERS,
    },
    AttributeSpec {
        attribute: "customer_tags_id",
        relation: Some(RelationType::Tags),
        rel_field: Some("id"),
        matchers: LIST_MATCHERS,
    },
    AttributeSpec {
        attribute: "order_tags_id",
        relation: Some(RelationType::Tags),
        rel_field: Some("id"),
        matchers: LIST_MATCHERS,
    },
    AttributeSpec {
        attribute: "customer_email",
        relation: None,
        rel_field: None,
        matchers: &[Matcher::EndAny],
    },
    AttributeSpec {
        attribute: "subtotal_amount_cents",
        relation: None,
        rel_field: None,
        matchers: AMOUNT_MATCHERS,
    },
    AttributeSpec {
        attribute: "total_amount_cents",
        relation: None,
        rel_field: None,
        matchers: AMOUNT_MATCHERS,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct CustomPredicate {
    pub predicate: String,
    pub attribute: &'static str,
    pub matcher: Matcher,
    pub raw_value: Value,
    pub relation: Option<RelationType>,
    pub rel_field: Option<&'static str>,
}

impl CustomPredicate {
    /// The value as the comma-separated list the API stores.
    pub fn raw_string(&self) -> String {
        match &self.raw_value {
            Value::String(value) => value.clone(),
            Value::Array(values) => values
                .iter()
                .map(|value| match value {
                    Value::String(value) => value.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn raw_values(&self) -> Vec<String> {
        self.raw_string().split(',').map(str::to_string).collect()
    }

    /// Ids of related resources this predicate refers to; empty for plain-value predicates.
    pub fn foreign_ids(&self) -> Vec<String> {
        if self.relation.is_none() {
            return Vec::new();
        }
        self.raw_values()
            .into_iter()
            .filter(|id| !id.is_empty())
            .collect()
    }
}

pub fn parse_predicate(predicate: &str, raw_value: &Value) -> Result<CustomPredicate, SyncError> {
    let mut matchers = Matcher::ALL;
    matchers.sort_by_key(|matcher| std::cmp::Reverse(matcher.suffix().len()));

    for matcher in matchers {
        let Some(attribute) = predicate
            .strip_suffix(matcher.suffix())
            .and_then(|rest| rest.strip_suffix('_'))
        else {
            continue;
        };
        let spec = CUSTOM_RULE_ATTRIBUTES
            .iter()
            .find(|spec| spec.attribute == attribute && spec.matchers.contains(&matcher));
        if let Some(spec) = spec {
            return Ok(CustomPredicate {
                predicate: predicate.to_string(),
                attribute: spec.attribute,
                matcher,
                raw_value: raw_value.clone(),
                relation: spec.relation,
                rel_field: spec.rel_field,
            });
        }
    }

    Err(SyncError::UnsupportedPredicate {
        predicate: predicate.to_string(),
    })
}

pub fn parse_filters(filters: &BTreeMap<String, Value>) -> Result<Vec<CustomPredicate>, SyncError> {
    filters
        .iter()
        .map(|(predicate, value)| parse_predicate(predicate, value))
        .collect()
}

/// Parses a promotion's custom rule; no rule means no predicates.
pub fn parse_rule(rule: Option<&CustomPromotionRule>) -> Result<Vec<CustomPredicate>, SyncError> {
    match rule {
        Some(rule) => parse_filters(&rule.filters),
        None => Ok(Vec::new()),
    }
}
