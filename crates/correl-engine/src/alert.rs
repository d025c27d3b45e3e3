//! Alert records and sink fan-out.
//!
//! Alerts are handed to every registered sink synchronously. A sink that
//! reports a drop is marked degraded and skipped from then on; its alerts
//! count toward `alerts_dropped`. Sink trouble never blocks the evaluator
//! or the other sinks.

use std::sync::Arc;

use correl_rules::Severity;
use serde::Serialize;
use tracing::warn;

use crate::event::Event;

/// An alert produced by a matched rule.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Ingest time of the triggering event (Unix epoch seconds).
    pub timestamp: i64,
    pub rule_id: String,
    pub rule_name: String,
    pub message: String,
    pub severity: Severity,
    pub confidence: f64,
    /// Technique identifiers forwarded verbatim from the rule.
    pub mitre_techniques: Vec<String>,
    pub trigger_event: Arc<Event>,
    /// One event list per condition, in condition order.
    pub bound_events: Vec<Vec<Arc<Event>>>,
    pub tags: Vec<String>,
}

/// Result of handing an alert to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Acknowledged,
    Dropped,
}

/// A write-only alert destination registered by the host.
///
/// Implementations must not block: a sink that performs I/O should hand
/// the alert to its own queue or task and return immediately.
pub trait AlertSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn emit(&mut self, alert: &Alert) -> SinkStatus;
}

struct SinkEntry {
    sink: Box<dyn AlertSink>,
    degraded: bool,
}

/// The set of registered sinks with degraded-state tracking.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<SinkEntry>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        SinkRegistry { sinks: Vec::new() }
    }

    pub fn register(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(SinkEntry {
            sink,
            degraded: false,
        });
    }

    /// Fan an alert out to all sinks. Returns how many sinks dropped it.
    pub fn fan_out(&mut self, alert: &Alert) -> u64 {
        let mut dropped = 0;
        for entry in &mut self.sinks {
            if entry.degraded {
                dropped += 1;
                continue;
            }
            match entry.sink.emit(alert) {
                SinkStatus::Acknowledged => {}
                SinkStatus::Dropped => {
                    warn!(
                        sink = entry.sink.name(),
                        rule_id = %alert.rule_id,
                        "alert sink dropped an alert, marking sink degraded"
                    );
                    entry.degraded = true;
                    dropped += 1;
                }
            }
        }
        dropped
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn degraded_count(&self) -> usize {
        self.sinks.iter().filter(|e| e.degraded).count()
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("sinks", &self.sinks.len())
            .field("degraded", &self.degraded_count())
            .finish()
    }
}
