//! Cross-rule validation run after parsing.
//!
//! Shape problems (missing fields, bad predicates) are caught by the
//! parser; this pass checks properties that span the whole document.

use std::collections::HashSet;

use tracing::warn;

use crate::ast::Rule;
use crate::error::RuleError;

/// Event type tags with first-class schema support. Conditions may bind to
/// other tags (the set is open-ended), but a typo here is a common rule
/// authoring mistake, so unknown tags are logged.
const KNOWN_EVENT_TYPES: &[&str] = &[
    "auth_fail",
    "auth_success",
    "process_start",
    "network_connect",
    "file_access",
    "registry_change",
    "dns_query",
    "privilege_escalation",
];

/// Validate a parsed rule set as a whole.
///
/// Returns hard errors (currently: duplicate rule ids). Unknown event
/// types only produce a warning since rules may target collector-specific
/// tags.
pub fn validate_rules(rules: &[Rule]) -> Vec<RuleError> {
    let mut errors = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for rule in rules {
        if !seen_ids.insert(rule.id.as_str()) {
            errors.push(RuleError::DuplicateId(rule.id.clone()));
        }

        for (i, condition) in rule.conditions.iter().enumerate() {
            if !KNOWN_EVENT_TYPES.contains(&condition.event_type.as_str()) {
                warn!(
                    rule = %rule.id,
                    condition = i + 1,
                    event_type = %condition.event_type,
                    "condition binds to an event type without first-class schema support"
                );
            }
            if condition.within.is_some() && !condition.after_previous {
                warn!(
                    rule = %rule.id,
                    condition = i + 1,
                    "'within' has no effect without 'after_previous'"
                );
            }
        }
    }

    errors
}
