//! Process-wide counters for observability.
//!
//! The core loop is single-writer, so plain integers suffice; readers get
//! a cloned snapshot taken under the correlator's lock.

use serde::Serialize;

/// Monotonic counters maintained by the core loop.
#[derive(Debug, Default)]
pub struct StatsCollector {
    pub events_processed: u64,
    pub events_rejected: u64,
    pub rules_evaluated: u64,
    pub correlations_found: u64,
    pub alerts_generated: u64,
    pub alerts_dropped: u64,
    pub events_expired: u64,
}

/// A point-in-time view of the counters plus window gauges.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub events_processed: u64,
    pub events_rejected: u64,
    pub rules_evaluated: u64,
    pub correlations_found: u64,
    pub alerts_generated: u64,
    pub alerts_dropped: u64,
    pub events_expired: u64,
    /// Current total events retained across all windows.
    pub window_events: usize,
    /// Number of event types with a non-empty window.
    pub windows_active: usize,
}

impl StatsCollector {
    pub fn snapshot(&self, window_events: usize, windows_active: usize) -> StatsSnapshot {
        StatsSnapshot {
            events_processed: self.events_processed,
            events_rejected: self.events_rejected,
            rules_evaluated: self.rules_evaluated,
            correlations_found: self.correlations_found,
            alerts_generated: self.alerts_generated,
            alerts_dropped: self.alerts_dropped,
            events_expired: self.events_expired,
            window_events,
            windows_active,
        }
    }
}
