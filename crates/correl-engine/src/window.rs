//! Per-type sliding event windows with bounded retention.
//!
//! Each event type gets an arrival-ordered buffer. Slicing filters by the
//! event's own timestamp; expiry trims by ingest time against the global
//! retention horizon, popping from the front since arrival order implies
//! ingest-time order.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::event::{Event, EventKind};

/// A window entry: the admitted event plus the instant it was ingested.
#[derive(Debug, Clone)]
struct StoredEvent {
    event: Arc<Event>,
    ingest_time: i64,
}

/// Per-type sliding buffers over admitted events.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: HashMap<EventKind, VecDeque<StoredEvent>>,
}

impl WindowStore {
    pub fn new() -> Self {
        WindowStore {
            windows: HashMap::new(),
        }
    }

    /// Append an event to its type's buffer.
    pub fn admit(&mut self, event: Arc<Event>, ingest_time: i64) {
        self.windows
            .entry(event.kind.clone())
            .or_default()
            .push_back(StoredEvent { event, ingest_time });
    }

    /// Events of `kind` whose timestamp lies within the lookback window
    /// (`now − timestamp ≤ window_secs`), in arrival order.
    pub fn slice(&self, kind: &EventKind, now: i64, window_secs: u64) -> Vec<Arc<Event>> {
        let Some(buffer) = self.windows.get(kind) else {
            return Vec::new();
        };
        buffer
            .iter()
            .filter(|stored| now - stored.event.timestamp <= window_secs as i64)
            .map(|stored| Arc::clone(&stored.event))
            .collect()
    }

    /// Drop entries older than the retention horizon (`now − ingest_time >
    /// retention_secs`). Buffers that empty out are freed. Returns the
    /// number of events expired.
    pub fn expire(&mut self, now: i64, retention_secs: u64) -> usize {
        let cutoff = now - retention_secs as i64;
        let mut expired = 0;
        self.windows.retain(|_, buffer| {
            while buffer.front().is_some_and(|stored| stored.ingest_time < cutoff) {
                buffer.pop_front();
                expired += 1;
            }
            !buffer.is_empty()
        });
        expired
    }

    /// Total events currently retained across all windows.
    pub fn total_events(&self) -> usize {
        self.windows.values().map(VecDeque::len).sum()
    }

    /// Per-type event counts, for observability.
    pub fn summary(&self) -> HashMap<String, usize> {
        self.windows
            .iter()
            .map(|(kind, buffer)| (kind.as_str().to_string(), buffer.len()))
            .collect()
    }

    /// Number of non-empty windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}
