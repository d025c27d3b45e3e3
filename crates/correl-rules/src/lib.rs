//! # correl-rules
//!
//! Rule document model and loader for the correl detection engine.
//!
//! A rule document is a YAML file with a top-level `rules:` list. Each rule
//! names an ordered sequence of conditions (count thresholds over sliding
//! windows, field predicates, per-key grouping, temporal ordering) and at
//! least one alert action. All predicate text — count strings like
//! `">= 5"`, comparison filters like `"> 10MB"` — is compiled here, once,
//! at load time.
//!
//! ```rust
//! use correl_rules::{parse_rules_yaml, validate_rules, Severity};
//!
//! let yaml = r#"
//! rules:
//!   - id: CRED-001
//!     name: Credential Stuffing
//!     severity: HIGH
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
//! "#;
//!
//! let doc = parse_rules_yaml(yaml).unwrap();
//! assert!(doc.is_clean());
//! assert_eq!(doc.rules[0].severity, Severity::High);
//! assert!(validate_rules(&doc.rules).is_empty());
//! ```

pub mod ast;
pub mod error;
pub mod parser;
pub mod validate;
pub mod value;

pub use ast::{
    Action, AlertTemplate, Condition, FieldFilter, FieldPredicate, Rule, RuleDocument, Severity,
};
pub use error::{Result, RuleError};
pub use parser::{parse_rules_file, parse_rules_yaml};
pub use validate::validate_rules;
pub use value::{CompareOp, CountPredicate, ScalarValue, parse_comparison, parse_size};
