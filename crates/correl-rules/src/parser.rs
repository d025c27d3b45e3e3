//! YAML → AST loader for rule documents.
//!
//! Handles:
//! - Top-level `rules:` list extraction
//! - Per-rule parsing with structured error accumulation (one bad rule
//!   does not hide errors in the others)
//! - Field filter compilation (`_contains` keys, comparison strings, size
//!   literals) so evaluation never re-parses predicate text
//! - `enabled: false` rules, which are skipped entirely

use std::path::Path;

use serde_yaml::Value;

use crate::ast::{
    Action, AlertTemplate, Condition, FieldFilter, FieldPredicate, Rule, RuleDocument, Severity,
};
use crate::error::{Result, RuleError};
use crate::value::{CountPredicate, ScalarValue, parse_comparison};

// =============================================================================
// Public API
// =============================================================================

/// Parse a YAML string containing a rule document.
///
/// Returns `Err` only for document-level failures (malformed YAML, missing
/// `rules:` key). Per-rule problems are collected into
/// [`RuleDocument::errors`]; callers refuse to start when that list is
/// non-empty.
pub fn parse_rules_yaml(yaml: &str) -> Result<RuleDocument> {
    let value: Value = serde_yaml::from_str(yaml)?;

    let Some(rules_val) = value.get("rules") else {
        return Err(RuleError::MissingRulesKey);
    };
    let Some(rules_seq) = rules_val.as_sequence() else {
        return Err(RuleError::MissingRulesKey);
    };

    let mut document = RuleDocument::default();
    for (index, rule_val) in rules_seq.iter().enumerate() {
        match parse_rule(rule_val, index) {
            Ok(Some(rule)) => document.rules.push(rule),
            Ok(None) => {} // disabled rule, ignored
            Err(e) => document.errors.push(e),
        }
    }

    Ok(document)
}

/// Parse a rule document from a file path.
pub fn parse_rules_file(path: &Path) -> Result<RuleDocument> {
    let content = std::fs::read_to_string(path)?;
    parse_rules_yaml(&content)
}

// =============================================================================
// Rule parsing
// =============================================================================

fn parse_rule(value: &Value, index: usize) -> Result<Option<Rule>> {
    let rule_ref = value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"));

    // Disabled rules are skipped before any further validation.
    if let Some(enabled) = value.get("enabled").and_then(Value::as_bool)
        && !enabled
    {
        return Ok(None);
    }

    let id = require_str(value, "id", &rule_ref)?;
    let name = require_str(value, "name", &rule_ref)?;

    let severity_str = require_str(value, "severity", &rule_ref)?;
    let severity: Severity =
        severity_str
            .parse()
            .map_err(|_| RuleError::InvalidSeverity {
                rule: rule_ref.clone(),
                value: severity_str.clone(),
            })?;

    let confidence = match value.get("confidence").and_then(Value::as_f64) {
        Some(c) if !(0.0..=1.0).contains(&c) => {
            return Err(RuleError::ConfidenceRange {
                rule: rule_ref,
                value: c,
            });
        }
        other => other,
    };

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mitre_techniques = value
        .get("mitre_techniques")
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Conditions: a non-empty ordered sequence.
    let conditions_seq = value
        .get("conditions")
        .and_then(Value::as_sequence)
        .ok_or_else(|| RuleError::MissingField {
            rule: rule_ref.clone(),
            field: "conditions",
        })?;
    if conditions_seq.is_empty() {
        return Err(RuleError::EmptyConditions { rule: rule_ref });
    }
    let mut conditions = Vec::with_capacity(conditions_seq.len());
    for (i, cond_val) in conditions_seq.iter().enumerate() {
        conditions.push(parse_condition(cond_val, &rule_ref, i + 1)?);
    }

    // Actions: at least one, each a single-key map naming the action kind.
    let actions_seq = value
        .get("actions")
        .and_then(Value::as_sequence)
        .ok_or_else(|| RuleError::MissingField {
            rule: rule_ref.clone(),
            field: "actions",
        })?;
    if actions_seq.is_empty() {
        return Err(RuleError::EmptyActions { rule: rule_ref });
    }
    let mut actions = Vec::with_capacity(actions_seq.len());
    for action_val in actions_seq {
        actions.push(parse_action(action_val, &rule_ref)?);
    }

    Ok(Some(Rule {
        id,
        name,
        description,
        enabled: true,
        severity,
        confidence,
        mitre_techniques,
        conditions,
        actions,
    }))
}

// =============================================================================
// Condition parsing
// =============================================================================

fn parse_condition(value: &Value, rule: &str, index: usize) -> Result<Condition> {
    let bad = |message: String| RuleError::InvalidCondition {
        rule: rule.to_string(),
        index,
        message,
    };

    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| bad("missing 'type' field".to_string()))?
        .to_string();

    let window = parse_positive_secs(value, "window", rule, index)?;
    let within = parse_positive_secs(value, "within", rule, index)?;

    let count = match value.get("count") {
        None => None,
        Some(v) => {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(RuleError::InvalidCount {
                        rule: rule.to_string(),
                        value: format!("{other:?}"),
                    });
                }
            };
            let predicate: CountPredicate =
                text.parse().map_err(|_| RuleError::InvalidCount {
                    rule: rule.to_string(),
                    value: text,
                })?;
            Some(predicate)
        }
    };

    let field_filter = match value.get("field_filter") {
        None => Vec::new(),
        Some(v) => {
            let mapping = v
                .as_mapping()
                .ok_or_else(|| bad("'field_filter' must be a mapping".to_string()))?;
            let mut filters = Vec::with_capacity(mapping.len());
            for (key, val) in mapping {
                let key = key
                    .as_str()
                    .ok_or_else(|| bad("field filter keys must be strings".to_string()))?;
                filters.push(parse_field_filter(key, val, rule, index)?);
            }
            filters
        }
    };

    let group_by = value
        .get("group_by")
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let same_user = value
        .get("same_user")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let after_previous = value
        .get("after_previous")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Condition {
        event_type,
        window,
        count,
        field_filter,
        group_by,
        same_user,
        after_previous,
        within,
    })
}

fn parse_positive_secs(
    value: &Value,
    key: &str,
    rule: &str,
    index: usize,
) -> Result<Option<u64>> {
    match value.get(key) {
        None => Ok(None),
        Some(v) => match v.as_u64() {
            Some(secs) if secs > 0 => Ok(Some(secs)),
            _ => Err(RuleError::InvalidCondition {
                rule: rule.to_string(),
                index,
                message: format!("'{key}' must be a positive integer"),
            }),
        },
    }
}

/// Compile a single field filter entry.
///
/// Keys ending in `_contains` become substring predicates against the
/// stripped field name. String values carrying a comparison operator
/// compile to numeric predicates; everything else is exact equality.
fn parse_field_filter(key: &str, value: &Value, rule: &str, index: usize) -> Result<FieldFilter> {
    let bad = |message: String| RuleError::InvalidCondition {
        rule: rule.to_string(),
        index,
        message,
    };

    if let Some(field) = key.strip_suffix("_contains") {
        let substrings = match value {
            Value::String(s) => vec![s.clone()],
            Value::Sequence(seq) => {
                let mut out = Vec::with_capacity(seq.len());
                for v in seq {
                    let s = v.as_str().ok_or_else(|| {
                        bad(format!("'{key}' entries must be strings"))
                    })?;
                    out.push(s.to_string());
                }
                out
            }
            _ => return Err(bad(format!("'{key}' must be a string or list of strings"))),
        };
        if substrings.is_empty() {
            return Err(bad(format!("'{key}' must not be empty")));
        }
        return Ok(FieldFilter {
            field: field.to_string(),
            predicate: FieldPredicate::Contains(substrings),
        });
    }

    let predicate = match value {
        Value::Sequence(seq) => {
            let mut values = Vec::with_capacity(seq.len());
            for v in seq {
                let scalar = ScalarValue::from_yaml(v)
                    .ok_or_else(|| bad(format!("'{key}' list entries must be scalars")))?;
                values.push(scalar);
            }
            if values.is_empty() {
                return Err(bad(format!("'{key}' must not be an empty list")));
            }
            FieldPredicate::OneOf(values)
        }
        Value::String(s) => match parse_comparison(s) {
            Some((op, operand)) => FieldPredicate::Compare(op, operand),
            None => FieldPredicate::Equals(ScalarValue::String(s.clone())),
        },
        other => {
            let scalar = ScalarValue::from_yaml(other)
                .ok_or_else(|| bad(format!("unsupported value shape for '{key}'")))?;
            FieldPredicate::Equals(scalar)
        }
    };

    Ok(FieldFilter {
        field: key.to_string(),
        predicate,
    })
}

// =============================================================================
// Action parsing
// =============================================================================

fn parse_action(value: &Value, rule: &str) -> Result<Action> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| RuleError::UnknownAction {
            rule: rule.to_string(),
            kind: format!("{value:?}"),
        })?;

    // Each action is a single-key map: the key names the kind.
    let (kind_val, body) = mapping.iter().next().ok_or_else(|| RuleError::UnknownAction {
        rule: rule.to_string(),
        kind: "<empty>".to_string(),
    })?;
    let kind = kind_val.as_str().unwrap_or_default();

    match kind {
        "alert" => {
            let severity = match body.get("severity").and_then(Value::as_str) {
                None => None,
                Some(s) => Some(s.parse().map_err(|_| RuleError::InvalidSeverity {
                    rule: rule.to_string(),
                    value: s.to_string(),
                })?),
            };
            let confidence = match body.get("confidence").and_then(Value::as_f64) {
                Some(c) if !(0.0..=1.0).contains(&c) => {
                    return Err(RuleError::ConfidenceRange {
                        rule: rule.to_string(),
                        value: c,
                    });
                }
                other => other,
            };
            Ok(Action::Alert(AlertTemplate {
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                severity,
                confidence,
                tag: body.get("tag").and_then(Value::as_str).map(str::to_string),
            }))
        }
        other => Err(RuleError::UnknownAction {
            rule: rule.to_string(),
            kind: other.to_string(),
        }),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn require_str(value: &Value, field: &'static str, rule: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RuleError::MissingField {
            rule: rule.to_string(),
            field,
        })
}
