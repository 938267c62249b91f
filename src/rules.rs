//! Rule and alert payload models and the tenant filter.
//!
//! The rules endpoint returns rule groups whose `rules` arrays mix two
//! structurally different record kinds, discriminated by a `type` field.
//! The two shapes share no usable common subset (recording rules have no
//! duration, alerts, or trigger annotations), so decoding is two-phase:
//! probe the discriminator from an untyped value, then run the matching
//! variant decoder over the whole object. Unknown discriminators fail the
//! decode; they are never silently skipped.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::api::ApiResponse;
use crate::error::GateError;
use crate::labels::LabelSet;

/// Discriminator value for alerting rules.
const KIND_ALERTING: &str = "alerting";
/// Discriminator value for recording rules.
const KIND_RECORDING: &str = "recording";

/// Payload of the rules endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesPayload {
    pub groups: Vec<RuleGroup>,
}

/// A named group of rules evaluated at a shared interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub file: String,
    pub rules: Vec<Rule>,
    pub interval: f64,
}

/// A single rule record: exactly one of the two concrete kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Alerting(AlertingRule),
    Recording(RecordingRule),
}

impl Rule {
    /// Label set of the active variant.
    pub fn labels(&self) -> &LabelSet {
        match self {
            Rule::Alerting(r) => &r.labels,
            Rule::Recording(r) => &r.labels,
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rule::Alerting(r) => r.serialize(serializer),
            Rule::Recording(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Buffer the object, read the discriminator, then dispatch. A
        // missing `type` probes as "" and falls through to the unknown-kind
        // failure, naming the offending value.
        let raw = Value::deserialize(deserializer)?;
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or("");

        match kind {
            KIND_ALERTING => serde_json::from_value(raw)
                .map(Rule::Alerting)
                .map_err(de::Error::custom),
            KIND_RECORDING => serde_json::from_value(raw)
                .map(Rule::Recording)
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "unknown rule type {:?}",
                other
            ))),
        }
    }
}

/// A rule that fires alerts when its query condition holds for `duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertingRule {
    pub name: String,
    pub query: String,
    pub duration: f64,
    pub labels: LabelSet,
    pub annotations: LabelSet,
    pub alerts: Vec<Alert>,
    pub health: String,
    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Always `"alerting"` on the wire.
    #[serde(rename = "type")]
    pub kind: String,
}

/// A rule that records its query result as a new series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingRule {
    pub name: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "LabelSet::is_empty")]
    pub labels: LabelSet,
    pub health: String,
    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Always `"recording"` on the wire.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Payload of the alerts endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsPayload {
    pub alerts: Vec<Alert>,
}

/// A currently firing or pending alert instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub labels: LabelSet,
    pub annotations: LabelSet,
    pub state: String,
    #[serde(rename = "activeAt", default, skip_serializing_if = "Option::is_none")]
    pub active_at: Option<DateTime<Utc>>,
    pub value: String,
}

/// Keep only rules labeled `(label, value)`; drop groups left empty.
///
/// Group order and intra-group rule order are preserved. The result is
/// always a sequence, possibly empty, never absent.
pub fn filter_rule_groups(groups: Vec<RuleGroup>, label: &str, value: &str) -> Vec<RuleGroup> {
    groups
        .into_iter()
        .filter_map(|mut group| {
            group.rules.retain(|rule| rule.labels().has(label, value));
            if group.rules.is_empty() {
                None
            } else {
                Some(group)
            }
        })
        .collect()
}

/// Keep only alerts labeled `(label, value)`. Same conventions as
/// [`filter_rule_groups`], one level deep.
pub fn filter_alert_list(alerts: Vec<Alert>, label: &str, value: &str) -> Vec<Alert> {
    alerts
        .into_iter()
        .filter(|alert| alert.labels.has(label, value))
        .collect()
}

/// Rules-endpoint handler: decode the payload, filter, write it back.
///
/// The tenant value arrives as an explicit argument, resolved once by the
/// proxy service from the request that produced this response.
pub fn filter_rules(resp: &mut ApiResponse, label: &str, value: &str) -> Result<(), GateError> {
    let payload: RulesPayload = resp.payload().map_err(GateError::DecodeRules)?;

    let groups = filter_rule_groups(payload.groups, label, value);

    resp.set_payload(&RulesPayload { groups })
        .map_err(GateError::SetPayload)
}

/// Alerts-endpoint handler. See [`filter_rules`].
pub fn filter_alerts(resp: &mut ApiResponse, label: &str, value: &str) -> Result<(), GateError> {
    let payload: AlertsPayload = resp.payload().map_err(GateError::DecodeAlerts)?;

    let alerts = filter_alert_list(payload.alerts, label, value);

    resp.set_payload(&AlertsPayload { alerts })
        .map_err(GateError::SetPayload)
}
