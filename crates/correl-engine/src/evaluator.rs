//! Rule evaluation: ordered condition sequencing over the window store.
//!
//! Conditions run strictly left to right and evaluation stops at the
//! first failure. Each condition slices its event type's window, applies
//! field filters, then the cross-condition gates (`same_user`,
//! `after_previous`/`within`), partitions by the group-by key, and tests
//! the count threshold per partition. The satisfying partition's events —
//! all of them, the threshold is a minimum, not a maximum — become the
//! condition's bound set, visible to the next condition.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::alert::Alert;
use crate::compile::{CompiledCondition, CompiledRule};
use crate::correlator::CorrelatorConfig;
use crate::event::Event;
use crate::graph::{ConditionTrace, DecisionGraph};
use crate::matcher;
use crate::window::WindowStore;

/// Result of evaluating one rule against the current window state.
#[derive(Debug)]
pub struct EvalOutcome {
    pub graph: DecisionGraph,
    pub alert: Option<Alert>,
}

/// Evaluate a rule for the evaluation instant `now` (the trigger event's
/// ingest time). A single consistent `now` is used for every window slice
/// in the pass.
pub fn evaluate_rule(
    rule: &CompiledRule,
    window: &WindowStore,
    trigger: &Arc<Event>,
    now: i64,
    config: &CorrelatorConfig,
) -> EvalOutcome {
    let mut bound: Vec<Vec<Arc<Event>>> = Vec::with_capacity(rule.conditions.len());
    let mut traces: Vec<ConditionTrace> = Vec::with_capacity(rule.conditions.len());

    for (i, condition) in rule.conditions.iter().enumerate() {
        let index = i + 1;
        match bind_condition(condition, window, now, &bound) {
            Some(events) => {
                traces.push(ConditionTrace {
                    index,
                    event_type: condition.event_type.as_str().to_string(),
                    matched: true,
                    bound_events: events.clone(),
                });
                bound.push(events);
            }
            None => {
                traces.push(ConditionTrace {
                    index,
                    event_type: condition.event_type.as_str().to_string(),
                    matched: false,
                    bound_events: Vec::new(),
                });
                let graph = DecisionGraph {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    trigger_event: Arc::clone(trigger),
                    conditions_evaluated: traces,
                    matched: false,
                    failed_at_condition: Some(index),
                };
                return EvalOutcome { graph, alert: None };
            }
        }
    }

    let alert = build_alert(rule, trigger, now, &bound, config);
    let graph = DecisionGraph {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        trigger_event: Arc::clone(trigger),
        conditions_evaluated: traces,
        matched: true,
        failed_at_condition: None,
    };
    EvalOutcome {
        graph,
        alert: Some(alert),
    }
}

/// Evaluate a single condition, returning the bound event set when it
/// matches.
fn bind_condition(
    condition: &CompiledCondition,
    window: &WindowStore,
    now: i64,
    bound: &[Vec<Arc<Event>>],
) -> Option<Vec<Arc<Event>>> {
    let mut candidates = window.slice(&condition.event_type, now, condition.window_secs);
    candidates.retain(|event| matcher::event_matches(event, &condition.field_filter));

    // same_user anchors on the first event bound by the first condition.
    if condition.same_user
        && let Some(anchor) = bound.first().and_then(|events| events.first())
    {
        let anchor_user = anchor.user.as_deref();
        candidates.retain(|event| event.user.as_deref() == anchor_user);
    }

    // after_previous gates on the latest timestamp of the previous
    // condition's binding: strictly later, and within the allowed gap.
    if condition.after_previous
        && let Some(previous) = bound.last()
        && let Some(t_star) = previous.iter().map(|event| event.timestamp).max()
    {
        candidates.retain(|event| {
            event.timestamp > t_star
                && condition
                    .within
                    .is_none_or(|within| event.timestamp - t_star <= within as i64)
        });
    }

    if condition.group_by.is_empty() {
        return condition.count.check(candidates.len()).then_some(candidates);
    }

    // Partition by the tuple of group-by field values. An absent field
    // contributes `None`, so events missing the field still form a
    // partition rather than vanishing.
    let mut partitions: BTreeMap<Vec<Option<String>>, Vec<Arc<Event>>> = BTreeMap::new();
    for event in candidates {
        let key: Vec<Option<String>> = condition
            .group_by
            .iter()
            .map(|field| event.field(field).and_then(|value| value.to_key_string()))
            .collect();
        partitions.entry(key).or_default().push(event);
    }

    // Among satisfying partitions, pick the one with the latest maximum
    // timestamp; equal timestamps fall to the lexicographically smallest
    // key (the BTreeMap iterates keys in ascending order, so keeping the
    // strictly-greater candidate preserves the earlier key on ties).
    let mut best: Option<(i64, Vec<Arc<Event>>)> = None;
    for (_key, events) in partitions {
        if !condition.count.check(events.len()) {
            continue;
        }
        let Some(max_ts) = events.iter().map(|event| event.timestamp).max() else {
            continue;
        };
        match &best {
            Some((best_ts, _)) if max_ts <= *best_ts => {}
            _ => best = Some((max_ts, events)),
        }
    }
    best.map(|(_, events)| events)
}

/// Construct the alert for a fully-matched rule from its first alert
/// action's template.
fn build_alert(
    rule: &CompiledRule,
    trigger: &Arc<Event>,
    now: i64,
    bound: &[Vec<Arc<Event>>],
    config: &CorrelatorConfig,
) -> Alert {
    let template = &rule.template;
    let message = template
        .message
        .clone()
        .or_else(|| rule.description.clone())
        .unwrap_or_else(|| rule.name.clone());
    let severity = template.severity.unwrap_or(rule.severity);
    let confidence = template
        .confidence
        .or(rule.confidence)
        .unwrap_or(config.default_confidence);
    let tags = template.tag.clone().into_iter().collect();

    Alert {
        timestamp: now,
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        message,
        severity,
        confidence,
        mitre_techniques: rule.mitre_techniques.clone(),
        trigger_event: Arc::clone(trigger),
        bound_events: bound.to_vec(),
        tags,
    }
}
