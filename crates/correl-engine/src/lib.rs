//! # correl-engine
//!
//! Temporal event correlation core for logic-based security detection.
//!
//! The engine ingests a stream of normalized security events, evaluates
//! each arrival against a declarative rule set (count thresholds over
//! sliding windows, per-key grouping, temporal ordering between
//! conditions), and emits alerts annotated with the decision path that
//! justifies each firing.
//!
//! ## Architecture
//!
//! Each admitted event runs four ordered phases on a single writer:
//!
//! 1. **admit** — append to the per-type sliding window
//! 2. **evaluate** — test every loaded rule, left-to-right conditions
//! 3. **emit** — fan alerts out to sinks, record decision graphs
//! 4. **expire** — trim events beyond the retention horizon
//!
//! State is bounded three ways: the retention horizon on the window
//! store, and ring capacities on decision graphs and alerts.
//!
//! ## Quick start
//!
//! ```rust
//! use correl_engine::{Correlator, CorrelatorConfig};
//! use correl_rules::parse_rules_yaml;
//! use serde_json::json;
//!
//! let yaml = r#"
//! rules:
//!   - id: CRED-001
//!     name: Credential Stuffing
//!     severity: HIGH
//!     mitre_techniques: [T1110.004]
//!     conditions:
//!       - type: auth_fail
//!         window: 120
//!         count: ">= 5"
//!         group_by: [user]
//!       - type: auth_success
//!         same_user: true
//!         after_previous: true
//!         within: 30
//!     actions:
//!       - alert:
//!           message: Possible credential stuffing attack
//!           severity: CRITICAL
//! "#;
//!
//! let mut correlator = Correlator::new(CorrelatorConfig::default());
//! correlator.load_rules(parse_rules_yaml(yaml).unwrap()).unwrap();
//!
//! let base = 1_700_000_000;
//! for i in 0..5 {
//!     let event = json!({"type": "auth_fail", "timestamp": base + i, "user": "alice"});
//!     let alerts = correlator.process_json_at(&event, base + i).unwrap();
//!     assert!(alerts.is_empty());
//! }
//!
//! let success = json!({"type": "auth_success", "timestamp": base + 10, "user": "alice"});
//! let alerts = correlator.process_json_at(&success, base + 10).unwrap();
//! assert_eq!(alerts.len(), 1);
//! assert_eq!(alerts[0].bound_events[0].len(), 5);
//! ```
//!
//! ## Threaded ingestion
//!
//! [`Service`] wraps a [`Correlator`] in a dedicated consumer thread fed
//! by a thread-safe queue, with a drain-deadline shutdown path.

pub mod alert;
pub mod compile;
pub mod correlator;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod graph;
pub mod matcher;
pub mod ring;
pub mod service;
pub mod stats;
pub mod window;

pub use alert::{Alert, AlertSink, SinkRegistry, SinkStatus};
pub use compile::{CompiledCondition, CompiledRule, compile_rule};
pub use correlator::{Correlator, CorrelatorConfig};
pub use error::{EngineError, Result};
pub use evaluator::{EvalOutcome, evaluate_rule};
pub use event::{Direction, Event, EventKind, FieldValue};
pub use graph::{ConditionTrace, DecisionGraph};
pub use service::{DEFAULT_DRAIN_DEADLINE, Service};
pub use stats::{StatsCollector, StatsSnapshot};
pub use window::WindowStore;
