//! The correlation core: a value type owning the window store, compiled
//! rules, decision ring, alert ring, sinks, and stats.
//!
//! Each admitted event runs four ordered phases — admit, evaluate all
//! rules in load order, emit, expire — under a single evaluation instant
//! taken from the trigger's ingest time. The clock is consulted once per
//! event, at ingestion; nothing mid-evaluation reads wall time.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use correl_rules::{CountPredicate, RuleDocument, validate_rules};

use crate::alert::{Alert, AlertSink, SinkRegistry};
use crate::compile::{CompiledRule, compile_rule};
use crate::error::{EngineError, Result};
use crate::evaluator::evaluate_rule;
use crate::event::Event;
use crate::graph::DecisionGraph;
use crate::ring::Ring;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::window::WindowStore;

// =============================================================================
// Configuration
// =============================================================================

/// Process-wide configuration for the correlation core.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Window-store expiry horizon in seconds.
    pub retention_window: u64,
    /// Decision graph ring capacity.
    pub max_decision_graphs: usize,
    /// In-memory alert ring capacity.
    pub max_alerts_in_memory: usize,
    /// Count threshold used when a condition omits `count`.
    pub default_count: CountPredicate,
    /// Lookback in seconds used when a condition omits `window`.
    pub default_window: u64,
    /// Alert confidence when neither the template nor the rule sets one.
    pub default_confidence: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        CorrelatorConfig {
            retention_window: 3600,
            max_decision_graphs: 512,
            max_alerts_in_memory: 500,
            default_count: CountPredicate::at_least(1),
            default_window: 60,
            default_confidence: 0.75,
        }
    }
}

// =============================================================================
// Correlator
// =============================================================================

/// The single-writer streaming evaluator.
pub struct Correlator {
    config: CorrelatorConfig,
    rules: Vec<CompiledRule>,
    window: WindowStore,
    graphs: Ring<DecisionGraph>,
    alerts: Ring<Alert>,
    sinks: SinkRegistry,
    stats: StatsCollector,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig) -> Self {
        let graphs = Ring::new(config.max_decision_graphs);
        let alerts = Ring::new(config.max_alerts_in_memory);
        Correlator {
            config,
            rules: Vec::new(),
            window: WindowStore::new(),
            graphs,
            alerts,
            sinks: SinkRegistry::new(),
            stats: StatsCollector::default(),
        }
    }

    /// Load a parsed rule document, replacing any previously loaded rules.
    ///
    /// Refuses the whole load if any enabled rule carried a parse error or
    /// fails cross-rule validation; the prior rule set stays active in
    /// that case. Returns the number of rules loaded.
    pub fn load_rules(&mut self, document: RuleDocument) -> Result<usize> {
        let mut errors = document.errors;
        errors.extend(validate_rules(&document.rules));
        if !errors.is_empty() {
            return Err(EngineError::RuleValidation(errors));
        }

        self.rules = document
            .rules
            .iter()
            .map(|rule| compile_rule(rule, &self.config))
            .collect();
        info!(rules = self.rules.len(), "rule set loaded");
        Ok(self.rules.len())
    }

    /// Register an alert sink. Sinks receive every emitted alert in rule
    /// load order, synchronously.
    pub fn register_sink(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.register(sink);
    }

    /// Ingest a raw JSON event.
    ///
    /// The evaluation instant is taken from the event's own timestamp when
    /// it carries a parseable one (so replayed streams evaluate
    /// deterministically), falling back to the wall clock for live
    /// collectors that omit it. This is the only place the clock is read.
    pub fn process_json(&mut self, value: &Value) -> Result<Vec<Alert>> {
        let ingest_time = value
            .get("timestamp")
            .and_then(crate::event::parse_timestamp_value)
            .unwrap_or_else(|| Utc::now().timestamp());
        self.process_json_at(value, ingest_time)
    }

    /// Ingest a raw JSON event with an explicit ingest time (tests, replay).
    pub fn process_json_at(&mut self, value: &Value, ingest_time: i64) -> Result<Vec<Alert>> {
        let event = match Event::from_json(value, ingest_time) {
            Ok(event) => event,
            Err(e) => {
                self.stats.events_rejected += 1;
                debug!(error = %e, "rejected malformed event");
                return Err(e);
            }
        };
        Ok(self.process_event_at(event, ingest_time))
    }

    /// Run the four phases for an already-normalized event.
    pub fn process_event_at(&mut self, event: Event, ingest_time: i64) -> Vec<Alert> {
        let now = ingest_time;
        let trigger = Arc::new(event);

        // Phase 1: admit.
        self.window.admit(Arc::clone(&trigger), ingest_time);
        self.stats.events_processed += 1;

        // Phase 2 + 3: evaluate every rule in load order, emitting as we go
        // so alerts from one admission leave in rule order.
        let mut emitted = Vec::new();
        for rule in &self.rules {
            self.stats.rules_evaluated += 1;
            let outcome = evaluate_rule(rule, &self.window, &trigger, now, &self.config);
            if let Some(alert) = outcome.alert {
                self.stats.correlations_found += 1;
                self.stats.alerts_generated += 1;
                self.stats.alerts_dropped += self.sinks.fan_out(&alert);
                debug!(rule_id = %alert.rule_id, severity = %alert.severity, "rule matched");
                self.alerts.push(alert.clone());
                emitted.push(alert);
            }
            self.graphs.push(outcome.graph);
        }

        // Phase 4: expire, bounding memory after every admission.
        let expired = self.window.expire(now, self.config.retention_window);
        self.stats.events_expired += expired as u64;

        emitted
    }

    // =========================================================================
    // Read API
    // =========================================================================

    /// Snapshot of the in-memory alert ring, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.snapshot()
    }

    /// Snapshot of the decision graph ring, oldest first.
    pub fn graphs(&self) -> Vec<DecisionGraph> {
        self.graphs.snapshot()
    }

    /// DOT rendering of the graph at `index` (oldest first), if retained.
    pub fn export_graph(&self, index: usize) -> Option<String> {
        self.graphs.get(index).map(DecisionGraph::to_dot)
    }

    /// Current counters and window gauges.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(self.window.total_events(), self.window.window_count())
    }

    /// Per-type window occupancy.
    pub fn window_summary(&self) -> std::collections::HashMap<String, usize> {
        self.window.summary()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(CorrelatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use correl_rules::parse_rules_yaml;
    use serde_json::json;

    const BURST_RULE: &str = r#"
rules:
  - id: CNT-001
    name: Failed Login Burst
    severity: MEDIUM
    conditions:
      - type: auth_fail
        window: 120
        count: ">= 3"
        group_by: [user]
    actions:
      - alert:
          message: Burst of failed logins
"#;

    fn correlator_with(yaml: &str) -> Correlator {
        let mut correlator = Correlator::default();
        let doc = parse_rules_yaml(yaml).unwrap();
        correlator.load_rules(doc).unwrap();
        correlator
    }

    #[test]
    fn test_load_rules_refuses_bad_document() {
        let yaml = r#"
rules:
  - id: BAD-001
    name: Broken
    severity: EXTREME
    conditions:
      - type: auth_fail
    actions:
      - alert: {}
"#;
        let mut correlator = Correlator::default();
        let doc = parse_rules_yaml(yaml).unwrap();
        let err = correlator.load_rules(doc).unwrap_err();
        assert!(matches!(err, EngineError::RuleValidation(ref errors) if errors.len() == 1));
        assert_eq!(correlator.rule_count(), 0);
    }

    #[test]
    fn test_process_emits_alert_and_graphs() {
        let mut correlator = correlator_with(BURST_RULE);

        for ts in [100, 101] {
            let alerts = correlator
                .process_json_at(&json!({"type": "auth_fail", "timestamp": ts, "user": "alice"}), ts)
                .unwrap();
            assert!(alerts.is_empty());
        }
        let alerts = correlator
            .process_json_at(&json!({"type": "auth_fail", "timestamp": 102, "user": "alice"}), 102)
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Burst of failed logins");
        assert_eq!(alerts[0].timestamp, 102);

        // One decision graph per rule evaluation, matched or not.
        assert_eq!(correlator.graphs().len(), 3);
        assert_eq!(correlator.alerts().len(), 1);

        let stats = correlator.stats();
        assert_eq!(stats.events_processed, 3);
        assert_eq!(stats.rules_evaluated, 3);
        assert_eq!(stats.correlations_found, 1);
        assert_eq!(stats.alerts_generated, 1);
        assert_eq!(stats.window_events, 3);
    }

    #[test]
    fn test_rejected_event_counted_not_evaluated() {
        let mut correlator = correlator_with(BURST_RULE);
        let result = correlator.process_json_at(&json!({"user": "alice"}), 100);
        assert!(result.is_err());

        let stats = correlator.stats();
        assert_eq!(stats.events_rejected, 1);
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.rules_evaluated, 0);
        assert!(correlator.graphs().is_empty());
    }

    #[test]
    fn test_retention_expiry_counted() {
        let mut correlator = correlator_with(BURST_RULE);
        correlator
            .process_json_at(&json!({"type": "auth_fail", "timestamp": 100, "user": "alice"}), 100)
            .unwrap();
        // Next event arrives beyond the retention horizon.
        correlator
            .process_json_at(
                &json!({"type": "auth_fail", "timestamp": 5000, "user": "alice"}),
                5000,
            )
            .unwrap();

        let stats = correlator.stats();
        assert_eq!(stats.events_expired, 1);
        assert_eq!(stats.window_events, 1);
    }

    #[test]
    fn test_export_graph_dot() {
        let mut correlator = correlator_with(BURST_RULE);
        correlator
            .process_json_at(&json!({"type": "auth_fail", "timestamp": 100, "user": "alice"}), 100)
            .unwrap();

        let dot = correlator.export_graph(0).unwrap();
        assert!(dot.contains("digraph CorrelationGraph"));
        assert!(dot.contains("CNT-001"));
        assert!(correlator.export_graph(99).is_none());
    }

    #[test]
    fn test_overlapping_rules_fan_out_in_load_order() {
        let yaml = r#"
rules:
  - id: A-001
    name: Any Failure A
    severity: LOW
    conditions:
      - type: auth_fail
    actions:
      - alert: {}
  - id: B-001
    name: Any Failure B
    severity: LOW
    conditions:
      - type: auth_fail
    actions:
      - alert: {}
"#;
        let mut correlator = correlator_with(yaml);
        let alerts = correlator
            .process_json_at(&json!({"type": "auth_fail", "timestamp": 100}), 100)
            .unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].rule_id, "A-001");
        assert_eq!(alerts[1].rule_id, "B-001");
    }

    #[test]
    fn test_alert_ring_bounded() {
        let config = CorrelatorConfig {
            max_alerts_in_memory: 5,
            max_decision_graphs: 7,
            ..CorrelatorConfig::default()
        };
        let mut correlator = Correlator::new(config);
        let doc = parse_rules_yaml(
            r#"
rules:
  - id: ALL-001
    name: Every Failure
    severity: LOW
    conditions:
      - type: auth_fail
        window: 1
    actions:
      - alert: {}
"#,
        )
        .unwrap();
        correlator.load_rules(doc).unwrap();

        for ts in 0..20 {
            correlator
                .process_json_at(&json!({"type": "auth_fail", "timestamp": ts}), ts)
                .unwrap();
        }
        assert_eq!(correlator.alerts().len(), 5);
        assert_eq!(correlator.graphs().len(), 7);
        assert_eq!(correlator.stats().alerts_generated, 20);
    }
}
