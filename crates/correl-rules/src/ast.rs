//! AST types for rule documents: rules, ordered conditions, field
//! predicates, and alert actions.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::value::{CompareOp, CountPredicate, ScalarValue};

// =============================================================================
// Enumerations
// =============================================================================

/// Severity assigned to a rule and forwarded to its alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Severity {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Field predicates
// =============================================================================

/// A compiled predicate against a single event field.
///
/// All parsing happens at rule-load time; evaluation never re-interprets
/// strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldPredicate {
    /// Type-exact scalar equality (numbers compare numerically, strings
    /// string-wise).
    Equals(ScalarValue),
    /// Set membership: the field equals at least one of the values.
    OneOf(Vec<ScalarValue>),
    /// Case-sensitive substring: the field contains at least one of the
    /// substrings. Compiled from `<field>_contains` filter keys.
    Contains(Vec<String>),
    /// Arithmetic comparison, compiled from `"OP N"` strings. Size literals
    /// (`KB`, `MB`, `GB`) are already expanded into the operand.
    Compare(CompareOp, f64),
}

/// A named field filter entry within a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFilter {
    /// Event field the predicate applies to.
    pub field: String,
    pub predicate: FieldPredicate,
}

// =============================================================================
// Conditions
// =============================================================================

/// One step in a rule's ordered condition sequence.
///
/// `window` and `count` are optional in the document; the engine resolves
/// them against process-wide defaults when the rule is compiled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    /// Event type tag this condition binds to.
    pub event_type: String,
    /// Sliding lookback in seconds from the evaluation instant.
    pub window: Option<u64>,
    /// Count threshold over the filtered window slice.
    pub count: Option<CountPredicate>,
    /// Field predicates, all of which must hold for an event to qualify.
    pub field_filter: Vec<FieldFilter>,
    /// Field names forcing the count to be per-key.
    pub group_by: Vec<String>,
    /// Require matched events to share the `user` of the first bound event.
    pub same_user: bool,
    /// Require matched events to postdate the previous condition's binding.
    pub after_previous: bool,
    /// Upper bound in seconds on the gap allowed by `after_previous`.
    pub within: Option<u64>,
}

// =============================================================================
// Actions
// =============================================================================

/// Alert template carried by a rule's `alert` action.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AlertTemplate {
    /// Alert message; falls back to the rule description, then the rule name.
    pub message: Option<String>,
    /// Severity override; falls back to the rule severity.
    pub severity: Option<Severity>,
    /// Confidence override; falls back to the rule confidence, then the
    /// configured default.
    pub confidence: Option<f64>,
    /// Tag attached to emitted alerts.
    pub tag: Option<String>,
}

/// An action taken when a rule matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Action {
    Alert(AlertTemplate),
}

impl Action {
    /// The alert template, for the action kinds that carry one.
    pub fn template(&self) -> &AlertTemplate {
        match self {
            Action::Alert(t) => t,
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A parsed detection rule: metadata, an ordered condition sequence, and
/// at least one alert action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    /// Globally unique identifier, e.g. `CRED-001`.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub severity: Severity,
    pub confidence: Option<f64>,
    /// MITRE ATT&CK technique identifiers, forwarded verbatim to alerts.
    pub mitre_techniques: Vec<String>,
    /// Ordered condition sequence, evaluated strictly left to right.
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

/// A parsed rule document: the rules that loaded plus any load errors.
#[derive(Debug, Default)]
pub struct RuleDocument {
    pub rules: Vec<Rule>,
    pub errors: Vec<crate::error::RuleError>,
}

impl RuleDocument {
    /// True when every enabled rule loaded cleanly.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
