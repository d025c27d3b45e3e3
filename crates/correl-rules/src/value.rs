use std::fmt;
use std::str::FromStr;

use serde::Serialize;

// =============================================================================
// Comparison operators
// =============================================================================

/// Comparison operator used by count predicates and numeric field predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gte,
    Gt,
    Eq,
    Lte,
    Lt,
}

impl CompareOp {
    /// Apply the operator to a pair of floats.
    pub fn check_f64(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gte => lhs >= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Eq => (lhs - rhs).abs() < f64::EPSILON,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Lt => lhs < rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Gte => ">=",
            CompareOp::Gt => ">",
            CompareOp::Eq => "=",
            CompareOp::Lte => "<=",
            CompareOp::Lt => "<",
        };
        write!(f, "{s}")
    }
}

/// Split a comparison string like `">= 5"` into its operator and operand.
///
/// Multi-character operators must be tried before their one-character
/// prefixes. Returns `None` if the string carries no operator.
fn split_op(s: &str) -> Option<(CompareOp, &str)> {
    let s = s.trim();
    for (prefix, op) in [
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        ("=", CompareOp::Eq),
    ] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return Some((op, rest.trim()));
        }
    }
    None
}

// =============================================================================
// Count predicates
// =============================================================================

/// A compiled count threshold, parsed once at rule-load time.
///
/// The source form is a string like `">= 5"` or a bare integer (shorthand
/// for `>= N`). The operator is honored at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountPredicate {
    pub op: CompareOp,
    pub value: u64,
}

impl CountPredicate {
    /// An `>= n` predicate.
    pub const fn at_least(n: u64) -> Self {
        CountPredicate {
            op: CompareOp::Gte,
            value: n,
        }
    }

    /// Test a partition size against the predicate.
    pub fn check(&self, count: usize) -> bool {
        let count = count as u64;
        match self.op {
            CompareOp::Gte => count >= self.value,
            CompareOp::Gt => count > self.value,
            CompareOp::Eq => count == self.value,
            CompareOp::Lte => count <= self.value,
            CompareOp::Lt => count < self.value,
        }
    }
}

impl FromStr for CountPredicate {
    type Err = ();

    /// Parse `">= 5"`, `"> 5"`, `"= 1"`, `"<= 3"`, `"< 2"` or a bare `"5"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((op, rest)) = split_op(s) {
            let value: u64 = rest.parse().map_err(|_| ())?;
            return Ok(CountPredicate { op, value });
        }
        // Bare integer shorthand for ">= N"
        let value: u64 = s.parse().map_err(|_| ())?;
        Ok(CountPredicate::at_least(value))
    }
}

impl fmt::Display for CountPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.value)
    }
}

// =============================================================================
// Scalar values
// =============================================================================

/// A typed scalar from a rule's field filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl ScalarValue {
    /// Convert a YAML scalar. Returns `None` for sequences, mappings, and null.
    pub fn from_yaml(v: &serde_yaml::Value) -> Option<Self> {
        match v {
            serde_yaml::Value::String(s) => Some(ScalarValue::String(s.clone())),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ScalarValue::Integer(i))
                } else {
                    n.as_f64().map(ScalarValue::Float)
                }
            }
            serde_yaml::Value::Bool(b) => Some(ScalarValue::Bool(*b)),
            _ => None,
        }
    }

    /// Numeric view of the scalar, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "{s}"),
            ScalarValue::Integer(n) => write!(f, "{n}"),
            ScalarValue::Float(n) => write!(f, "{n}"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

// =============================================================================
// Numeric comparison parsing (with size literals)
// =============================================================================

/// Parse a comparison string like `"> 10"`, `">= 2.5"`, or `"> 10MB"`.
///
/// Size suffixes `KB`, `MB`, `GB` (powers of 1024) are expanded before the
/// comparison is compiled. Returns `None` if the string is not a comparison,
/// so callers can fall back to plain string equality.
pub fn parse_comparison(s: &str) -> Option<(CompareOp, f64)> {
    let (op, operand) = split_op(s)?;
    let value = parse_size(operand)?;
    Some((op, value))
}

/// Parse a numeric operand, honoring `KB`/`MB`/`GB` size suffixes.
pub fn parse_size(s: &str) -> Option<f64> {
    let s = s.trim();
    for (suffix, multiplier) in [
        ("KB", 1024.0),
        ("MB", 1024.0 * 1024.0),
        ("GB", 1024.0 * 1024.0 * 1024.0),
    ] {
        if let Some(num) = s.strip_suffix(suffix) {
            return num.trim().parse::<f64>().ok().map(|n| n * multiplier);
        }
    }
    s.parse::<f64>().ok()
}
