//! Field predicate evaluation against events.
//!
//! Missing fields fail their predicate silently. Equality is type-exact
//! (a string predicate never matches a numeric field); comparison
//! predicates are lenient and accept numeric strings, matching how
//! loosely-typed collectors report byte counts. Any runtime shape
//! mismatch makes the predicate false rather than an error.

use correl_rules::{FieldFilter, FieldPredicate, ScalarValue};

use crate::event::{Event, FieldValue};

/// True when the event satisfies every predicate in the filter list.
pub fn event_matches(event: &Event, filters: &[FieldFilter]) -> bool {
    filters.iter().all(|filter| field_matches(event, filter))
}

/// Evaluate a single field predicate against an event.
pub fn field_matches(event: &Event, filter: &FieldFilter) -> bool {
    let Some(value) = event.field(&filter.field) else {
        return false;
    };
    match &filter.predicate {
        FieldPredicate::Equals(scalar) => scalar_equals(&value, scalar),
        FieldPredicate::OneOf(scalars) => scalars.iter().any(|s| scalar_equals(&value, s)),
        FieldPredicate::Contains(substrings) => match value.as_str() {
            Some(text) => substrings.iter().any(|sub| text.contains(sub.as_str())),
            None => false,
        },
        FieldPredicate::Compare(op, operand) => match value.as_f64() {
            Some(n) => op.check_f64(n, *operand),
            None => false,
        },
    }
}

/// Type-exact equality between a field value and a rule scalar.
fn scalar_equals(value: &FieldValue<'_>, scalar: &ScalarValue) -> bool {
    match scalar {
        ScalarValue::String(expected) => value.as_str() == Some(expected.as_str()),
        ScalarValue::Integer(_) | ScalarValue::Float(_) => {
            // Numbers compare numerically across integer/float shapes, but
            // never against strings.
            match (numeric_view(value), scalar.as_f64()) {
                (Some(lhs), Some(rhs)) => (lhs - rhs).abs() < f64::EPSILON,
                _ => false,
            }
        }
        ScalarValue::Bool(expected) => match value {
            FieldValue::Bool(b) => b == expected,
            FieldValue::Json(serde_json::Value::Bool(b)) => b == expected,
            _ => false,
        },
    }
}

/// Numeric view that excludes strings, for type-exact equality.
fn numeric_view(value: &FieldValue<'_>) -> Option<f64> {
    match value {
        FieldValue::Int(i) => Some(*i as f64),
        FieldValue::Float(f) => Some(*f),
        FieldValue::Json(serde_json::Value::Number(n)) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use correl_rules::CompareOp;
    use serde_json::json;

    fn event(v: serde_json::Value) -> Event {
        Event::from_json(&v, 0).unwrap()
    }

    fn filter(field: &str, predicate: FieldPredicate) -> FieldFilter {
        FieldFilter {
            field: field.to_string(),
            predicate,
        }
    }

    #[test]
    fn test_scalar_equality() {
        let e = event(json!({"type": "auth_fail", "timestamp": 1, "user": "alice"}));
        assert!(field_matches(
            &e,
            &filter("user", FieldPredicate::Equals(ScalarValue::String("alice".into())))
        ));
        assert!(!field_matches(
            &e,
            &filter("user", FieldPredicate::Equals(ScalarValue::String("bob".into())))
        ));
    }

    #[test]
    fn test_numeric_equality_across_shapes() {
        let e = event(json!({"type": "network_connect", "timestamp": 1, "dest_port": 445}));
        assert!(field_matches(
            &e,
            &filter("dest_port", FieldPredicate::Equals(ScalarValue::Integer(445)))
        ));
        assert!(field_matches(
            &e,
            &filter("dest_port", FieldPredicate::Equals(ScalarValue::Float(445.0)))
        ));
        // Type-exact: the number 445 is not the string "445"
        assert!(!field_matches(
            &e,
            &filter("dest_port", FieldPredicate::Equals(ScalarValue::String("445".into())))
        ));
    }

    #[test]
    fn test_set_membership() {
        let e = event(json!({"type": "network_connect", "timestamp": 1, "dest_port": 139}));
        let p = FieldPredicate::OneOf(vec![ScalarValue::Integer(445), ScalarValue::Integer(139)]);
        assert!(field_matches(&e, &filter("dest_port", p.clone())));

        let e2 = event(json!({"type": "network_connect", "timestamp": 1, "dest_port": 80}));
        assert!(!field_matches(&e2, &filter("dest_port", p)));
    }

    #[test]
    fn test_substring_contains() {
        let e = event(json!({
            "type": "process_start", "timestamp": 1,
            "command_line": "powershell.exe -enc SQBFAFgA"
        }));
        let p = FieldPredicate::Contains(vec!["-enc".into(), "-EncodedCommand".into()]);
        assert!(field_matches(&e, &filter("command_line", p)));

        // Case-sensitive
        let p = FieldPredicate::Contains(vec!["POWERSHELL".into()]);
        assert!(!field_matches(&e, &filter("command_line", p)));
    }

    #[test]
    fn test_comparison() {
        let e = event(json!({"type": "file_access", "timestamp": 1, "bytes": 2048}));
        assert!(field_matches(
            &e,
            &filter("bytes", FieldPredicate::Compare(CompareOp::Gt, 1024.0))
        ));
        assert!(!field_matches(
            &e,
            &filter("bytes", FieldPredicate::Compare(CompareOp::Lt, 1024.0))
        ));
    }

    #[test]
    fn test_comparison_accepts_numeric_strings() {
        let e = event(json!({"type": "file_access", "timestamp": 1, "bytes": "2048"}));
        assert!(field_matches(
            &e,
            &filter("bytes", FieldPredicate::Compare(CompareOp::Gte, 2048.0))
        ));
    }

    #[test]
    fn test_missing_field_fails_silently() {
        let e = event(json!({"type": "auth_fail", "timestamp": 1}));
        assert!(!field_matches(
            &e,
            &filter("user", FieldPredicate::Equals(ScalarValue::String("alice".into())))
        ));
    }

    #[test]
    fn test_type_mismatch_is_false_not_error() {
        let e = event(json!({"type": "auth_fail", "timestamp": 1, "user": "alice"}));
        // Comparing a non-numeric string numerically is simply false
        assert!(!field_matches(
            &e,
            &filter("user", FieldPredicate::Compare(CompareOp::Gt, 1.0))
        ));
        // Substring test against a numeric field is simply false
        let e2 = event(json!({"type": "auth_fail", "timestamp": 1, "attempts": 5}));
        assert!(!field_matches(
            &e2,
            &filter("attempts", FieldPredicate::Contains(vec!["5".into()]))
        ));
    }

    #[test]
    fn test_all_filters_must_hold() {
        let e = event(json!({
            "type": "network_connect", "timestamp": 1,
            "dest_port": 445, "direction": "outbound"
        }));
        let filters = vec![
            filter("dest_port", FieldPredicate::Equals(ScalarValue::Integer(445))),
            filter(
                "direction",
                FieldPredicate::Equals(ScalarValue::String("outbound".into())),
            ),
        ];
        assert!(event_matches(&e, &filters));

        let filters = vec![
            filter("dest_port", FieldPredicate::Equals(ScalarValue::Integer(445))),
            filter(
                "direction",
                FieldPredicate::Equals(ScalarValue::String("inbound".into())),
            ),
        ];
        assert!(!event_matches(&e, &filters));
    }
}
