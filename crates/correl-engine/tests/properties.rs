//! Invariant checks on the correlation core: purity, order independence
//! for equal timestamps, windowing, temporal gating, bounded state, and
//! trace completeness.

use correl_engine::{Correlator, CorrelatorConfig};
use correl_rules::parse_rules_yaml;
use serde_json::{Value, json};

const RULES: &str = r#"
rules:
  - id: P-BURST
    name: Failure Burst
    severity: MEDIUM
    conditions:
      - type: auth_fail
        window: 120
        count: ">= 3"
        group_by: [user]
    actions:
      - alert: {}
  - id: P-CHAIN
    name: Burst Then Success
    severity: HIGH
    conditions:
      - type: auth_fail
        window: 120
        count: ">= 3"
        group_by: [user]
      - type: auth_success
        same_user: true
        after_previous: true
        within: 60
    actions:
      - alert: {}
"#;

fn correlator() -> Correlator {
    let mut c = Correlator::new(CorrelatorConfig::default());
    c.load_rules(parse_rules_yaml(RULES).unwrap()).unwrap();
    c
}

fn run_sequence(events: &[(Value, i64)]) -> Correlator {
    let mut c = correlator();
    for (event, ingest) in events {
        let _ = c.process_json_at(event, *ingest);
    }
    c
}

fn attack_sequence() -> Vec<(Value, i64)> {
    let t = 1_700_000_000;
    let mut events: Vec<(Value, i64)> = (0..4)
        .map(|i| {
            (
                json!({"type": "auth_fail", "timestamp": t + i, "user": "alice"}),
                t + i,
            )
        })
        .collect();
    events.push((
        json!({"type": "auth_success", "timestamp": t + 10, "user": "alice"}),
        t + 10,
    ));
    events
}

#[test]
fn purity_same_inputs_same_outputs() {
    let events = attack_sequence();
    let a = run_sequence(&events);
    let b = run_sequence(&events);

    let alerts_a = serde_json::to_value(a.alerts()).unwrap();
    let alerts_b = serde_json::to_value(b.alerts()).unwrap();
    assert_eq!(alerts_a, alerts_b);

    let graphs_a = serde_json::to_value(a.graphs()).unwrap();
    let graphs_b = serde_json::to_value(b.graphs()).unwrap();
    assert_eq!(graphs_a, graphs_b);
}

#[test]
fn equal_timestamp_permutation_preserves_alert_set() {
    let t = 1_700_000_000;
    // Three failures sharing one timestamp, in two admission orders.
    let users_ordered = ["alice", "alice", "alice"];
    let mut forward: Vec<(Value, i64)> = users_ordered
        .iter()
        .enumerate()
        .map(|(i, user)| {
            (
                json!({"type": "auth_fail", "timestamp": t, "user": user, "seq": i}),
                t,
            )
        })
        .collect();
    forward.push((
        json!({"type": "auth_success", "timestamp": t + 5, "user": "alice"}),
        t + 5,
    ));

    let mut reversed = forward.clone();
    reversed[0..3].reverse();

    let a = run_sequence(&forward);
    let b = run_sequence(&reversed);

    let ids = |c: &Correlator| {
        let mut ids: Vec<String> = c.alerts().iter().map(|a| a.rule_id.clone()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&a), ids(&b));

    // Bound sets are the same events regardless of admission order.
    let bound_sizes = |c: &Correlator| {
        c.alerts()
            .iter()
            .map(|a| a.bound_events.iter().map(Vec::len).collect::<Vec<_>>())
            .collect::<Vec<_>>()
    };
    assert_eq!(bound_sizes(&a), bound_sizes(&b));
}

#[test]
fn stale_events_never_bind() {
    let t = 1_700_000_000;
    let mut c = correlator();
    // Two failures that will be outside the 120s window at match time.
    for i in 0..2 {
        let _ = c.process_json_at(
            &json!({"type": "auth_fail", "timestamp": t + i, "user": "alice"}),
            t + i,
        );
    }
    // Three more inside the window much later.
    let late = t + 1000;
    for i in 0..3 {
        let _ = c.process_json_at(
            &json!({"type": "auth_fail", "timestamp": late + i, "user": "alice"}),
            late + i,
        );
    }

    let alerts = c.alerts();
    assert!(!alerts.is_empty());
    for alert in &alerts {
        for event in &alert.bound_events[0] {
            assert!(
                alert.timestamp - event.timestamp <= 120,
                "bound event older than the condition window"
            );
        }
    }
}

#[test]
fn ordering_gate_is_strict() {
    let events = attack_sequence();
    let c = run_sequence(&events);

    let chain_alert = c
        .alerts()
        .into_iter()
        .find(|a| a.rule_id == "P-CHAIN")
        .expect("chain rule should have fired");

    let max_first: i64 = chain_alert.bound_events[0]
        .iter()
        .map(|e| e.timestamp)
        .max()
        .unwrap();
    for event in &chain_alert.bound_events[1] {
        assert!(event.timestamp > max_first);
    }
}

#[test]
fn state_stays_bounded() {
    let config = CorrelatorConfig {
        retention_window: 100,
        max_decision_graphs: 16,
        max_alerts_in_memory: 8,
        ..CorrelatorConfig::default()
    };
    let mut c = Correlator::new(config);
    c.load_rules(parse_rules_yaml(RULES).unwrap()).unwrap();

    let t = 1_700_000_000;
    for i in 0..1000 {
        let ts = t + i;
        let _ = c.process_json_at(
            &json!({"type": "auth_fail", "timestamp": ts, "user": format!("u{}", i % 7)}),
            ts,
        );
    }

    let stats = c.stats();
    // Window holds at most the arrivals within the retention horizon.
    assert!(stats.window_events <= 101);
    assert!(c.graphs().len() <= 16);
    assert!(c.alerts().len() <= 8);
    assert_eq!(stats.events_processed, 1000);
}

#[test]
fn every_evaluation_leaves_a_complete_trace() {
    let events = attack_sequence();
    let c = run_sequence(&events);

    for graph in c.graphs() {
        if graph.matched {
            assert!(graph.failed_at_condition.is_none());
            assert!(graph.conditions_evaluated.iter().all(|t| t.matched));
            // Matched traces bind at least one event per condition here.
            assert!(graph
                .conditions_evaluated
                .iter()
                .all(|t| !t.bound_events.is_empty()));
        } else {
            let failed = graph.failed_at_condition.expect("non-match must name a condition");
            assert!(failed >= 1 && failed <= graph.conditions_evaluated.len());
            // Evaluation stops at the failure: it is the last trace entry.
            assert_eq!(graph.conditions_evaluated.last().unwrap().index, failed);
            assert!(!graph.conditions_evaluated.last().unwrap().matched);
        }
    }

    // Every alert has a matched graph for the same rule.
    for alert in c.alerts() {
        assert!(c
            .graphs()
            .iter()
            .any(|g| g.matched && g.rule_id == alert.rule_id));
    }
}

#[test]
fn graphs_survive_window_expiry() {
    let config = CorrelatorConfig {
        retention_window: 50,
        ..CorrelatorConfig::default()
    };
    let mut c = Correlator::new(config);
    c.load_rules(parse_rules_yaml(RULES).unwrap()).unwrap();

    let t = 1_700_000_000;
    for i in 0..3 {
        let _ = c.process_json_at(
            &json!({"type": "auth_fail", "timestamp": t + i, "user": "alice"}),
            t + i,
        );
    }
    // Push the window far past the retention horizon.
    let _ = c.process_json_at(
        &json!({"type": "dns_query", "timestamp": t + 500, "domain": "x.test"}),
        t + 500,
    );
    assert_eq!(c.stats().window_events, 1);

    // Graph copies of the expired events are still intact.
    let graphs = c.graphs();
    let matched = graphs.iter().find(|g| g.matched).unwrap();
    assert_eq!(matched.conditions_evaluated[0].bound_events.len(), 3);
    assert_eq!(
        matched.conditions_evaluated[0].bound_events[0]
            .user
            .as_deref(),
        Some("alice")
    );
}
