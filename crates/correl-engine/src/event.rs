//! Normalized security event model.
//!
//! Events are a tagged record: a [`EventKind`] discriminant, the timestamp
//! and producing collector, the schema's typed optional fields, and an
//! overflow map for collector-specific extras. Field lookups dispatch on
//! the typed fields first, then fall back to the overflow map.
//!
//! Events are immutable once admitted; the window store hands out
//! `Arc<Event>` clones and nothing downstream takes `&mut`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::EngineError;

// =============================================================================
// Event kind
// =============================================================================

/// Event type tag. The well-known tags get variants; anything else a
/// collector emits is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    AuthFail,
    AuthSuccess,
    ProcessStart,
    NetworkConnect,
    FileAccess,
    RegistryChange,
    DnsQuery,
    PrivilegeEscalation,
    Other(String),
}

impl EventKind {
    /// Map a tag string to its variant; unrecognized tags become `Other`.
    pub fn from_tag(s: &str) -> Self {
        match s {
            "auth_fail" => EventKind::AuthFail,
            "auth_success" => EventKind::AuthSuccess,
            "process_start" => EventKind::ProcessStart,
            "network_connect" => EventKind::NetworkConnect,
            "file_access" => EventKind::FileAccess,
            "registry_change" => EventKind::RegistryChange,
            "dns_query" => EventKind::DnsQuery,
            "privilege_escalation" => EventKind::PrivilegeEscalation,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::AuthFail => "auth_fail",
            EventKind::AuthSuccess => "auth_success",
            EventKind::ProcessStart => "process_start",
            EventKind::NetworkConnect => "network_connect",
            EventKind::FileAccess => "file_access",
            EventKind::RegistryChange => "registry_change",
            EventKind::DnsQuery => "dns_query",
            EventKind::PrivilegeEscalation => "privilege_escalation",
            EventKind::Other(s) => s.as_str(),
        }
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(EventKind::from_tag(s))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Direction of a network connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl FromStr for Direction {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Event
// =============================================================================

/// An immutable, normalized security event.
///
/// `timestamp` is Unix epoch seconds, already normalized: a missing or
/// non-finite timestamp in the source record was replaced with the ingest
/// time during construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: i64,
    /// Producing collector. Advisory only; never used for matching.
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Collector-specific fields outside the schema, preserved verbatim so
    /// rules can still predicate on them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A borrowed view of one event field, used by predicate evaluation and
/// group-by key extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(&'a Value),
}

impl<'a> FieldValue<'a> {
    /// String view, if the field is string-shaped.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Json(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view. Numeric strings are accepted so comparison predicates
    /// work against collectors that emit numbers as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Str(s) => s.parse().ok(),
            FieldValue::Json(Value::Number(n)) => n.as_f64(),
            FieldValue::Json(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Render the field as a group-by key component. Compound JSON values
    /// have no key form.
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            FieldValue::Str(s) => Some((*s).to_string()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Json(Value::String(s)) => Some(s.clone()),
            FieldValue::Json(Value::Number(n)) => Some(n.to_string()),
            FieldValue::Json(Value::Bool(b)) => Some(b.to_string()),
            FieldValue::Json(_) => None,
        }
    }
}

impl Event {
    /// Build an event from an ingress JSON object.
    ///
    /// `type` is mandatory; an event without it is rejected. A missing or
    /// unparseable `timestamp` falls back to `ingest_time`. The collector
    /// identity is taken from `_source` (or `source`), defaulting to
    /// `"unknown"`.
    pub fn from_json(value: &Value, ingest_time: i64) -> Result<Self, EngineError> {
        let Some(obj) = value.as_object() else {
            return Err(EngineError::EventSchema("event is not a JSON object".into()));
        };

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .map(EventKind::from_tag)
            .ok_or_else(|| EngineError::EventSchema("event missing 'type' field".into()))?;

        let timestamp = obj
            .get("timestamp")
            .and_then(parse_timestamp_value)
            .unwrap_or(ingest_time);

        let source = obj
            .get("_source")
            .or_else(|| obj.get("source"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let mut event = Event {
            kind,
            timestamp,
            source,
            user: None,
            source_ip: None,
            source_port: None,
            dest_ip: None,
            dest_port: None,
            protocol: None,
            direction: None,
            process_name: None,
            command_line: None,
            parent_process: None,
            pid: None,
            file_path: None,
            operation: None,
            domain: None,
            query_type: None,
            severity: None,
            message: None,
            extra: Map::new(),
        };

        for (key, val) in obj {
            if matches!(key.as_str(), "type" | "timestamp" | "_source" | "source") {
                continue;
            }
            if !event.absorb_known_field(key, val) {
                event.extra.insert(key.clone(), val.clone());
            }
        }

        Ok(event)
    }

    /// Try to place a JSON value into the typed field named by `key`.
    /// Returns false when the key is unknown or the value has the wrong
    /// shape, in which case the caller keeps it in the overflow map.
    fn absorb_known_field(&mut self, key: &str, val: &Value) -> bool {
        fn s(val: &Value) -> Option<String> {
            val.as_str().map(str::to_string)
        }
        match key {
            "user" => assign(&mut self.user, s(val)),
            "source_ip" => assign(&mut self.source_ip, s(val)),
            "dest_ip" => assign(&mut self.dest_ip, s(val)),
            "protocol" => assign(&mut self.protocol, s(val)),
            "process_name" => assign(&mut self.process_name, s(val)),
            "command_line" => assign(&mut self.command_line, s(val)),
            "parent_process" => assign(&mut self.parent_process, s(val)),
            "file_path" => assign(&mut self.file_path, s(val)),
            "operation" => assign(&mut self.operation, s(val)),
            "domain" => assign(&mut self.domain, s(val)),
            "query_type" => assign(&mut self.query_type, s(val)),
            "severity" => assign(&mut self.severity, s(val)),
            "message" => assign(&mut self.message, s(val)),
            "source_port" => assign(&mut self.source_port, as_port(val)),
            "dest_port" => assign(&mut self.dest_port, as_port(val)),
            "pid" => assign(&mut self.pid, val.as_u64().and_then(|p| u32::try_from(p).ok())),
            "direction" => assign(
                &mut self.direction,
                val.as_str().and_then(|d| d.parse().ok()),
            ),
            _ => false,
        }
    }

    /// Look up a field by name: typed fields first, then the overflow map.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        let typed = match name {
            "type" => Some(FieldValue::Str(self.kind.as_str())),
            "timestamp" => Some(FieldValue::Int(self.timestamp)),
            "source" => Some(FieldValue::Str(&self.source)),
            "user" => self.user.as_deref().map(FieldValue::Str),
            "source_ip" => self.source_ip.as_deref().map(FieldValue::Str),
            "source_port" => self.source_port.map(|p| FieldValue::Int(p.into())),
            "dest_ip" => self.dest_ip.as_deref().map(FieldValue::Str),
            "dest_port" => self.dest_port.map(|p| FieldValue::Int(p.into())),
            "protocol" => self.protocol.as_deref().map(FieldValue::Str),
            "direction" => self.direction.map(|d| FieldValue::Str(d.as_str())),
            "process_name" => self.process_name.as_deref().map(FieldValue::Str),
            "command_line" => self.command_line.as_deref().map(FieldValue::Str),
            "parent_process" => self.parent_process.as_deref().map(FieldValue::Str),
            "pid" => self.pid.map(|p| FieldValue::Int(p.into())),
            "file_path" => self.file_path.as_deref().map(FieldValue::Str),
            "operation" => self.operation.as_deref().map(FieldValue::Str),
            "domain" => self.domain.as_deref().map(FieldValue::Str),
            "query_type" => self.query_type.as_deref().map(FieldValue::Str),
            "severity" => self.severity.as_deref().map(FieldValue::Str),
            "message" => self.message.as_deref().map(FieldValue::Str),
            _ => None,
        };
        typed.or_else(|| self.extra.get(name).map(FieldValue::Json))
    }
}

fn assign<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

fn as_port(val: &Value) -> Option<u16> {
    val.as_u64().and_then(|p| u16::try_from(p).ok())
}

// =============================================================================
// Timestamp parsing
// =============================================================================

/// Parse a JSON value as a Unix epoch timestamp in seconds.
///
/// Accepts numeric epoch seconds (or milliseconds, detected by magnitude)
/// and ISO 8601 strings with or without a timezone. Non-finite numbers are
/// rejected so the caller falls back to ingest time.
pub fn parse_timestamp_value(val: &Value) -> Option<i64> {
    match val {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(normalize_epoch(i))
            } else {
                let f = n.as_f64()?;
                f.is_finite().then(|| normalize_epoch(f as i64))
            }
        }
        Value::String(s) => parse_timestamp_string(s),
        _ => None,
    }
}

/// Epoch values that look like milliseconds are converted to seconds.
fn normalize_epoch(v: i64) -> i64 {
    if v > 1_000_000_000_000 { v / 1000 } else { v }
}

fn parse_timestamp_string(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive).timestamp());
        }
    }
    // Numeric strings ("1720612200") from loosely-typed collectors
    s.parse::<i64>().ok().map(normalize_epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trip() {
        let k: EventKind = "auth_fail".parse().unwrap();
        assert_eq!(k, EventKind::AuthFail);
        assert_eq!(k.as_str(), "auth_fail");

        let k: EventKind = "edr_telemetry".parse().unwrap();
        assert_eq!(k, EventKind::Other("edr_telemetry".into()));
        assert_eq!(k.as_str(), "edr_telemetry");
    }

    #[test]
    fn test_from_json_typed_fields() {
        let v = json!({
            "type": "network_connect",
            "timestamp": 1720612200,
            "_source": "netmon",
            "dest_ip": "10.0.0.5",
            "dest_port": 445,
            "direction": "outbound",
            "session_id": "abc123"
        });
        let event = Event::from_json(&v, 0).unwrap();
        assert_eq!(event.kind, EventKind::NetworkConnect);
        assert_eq!(event.timestamp, 1720612200);
        assert_eq!(event.source, "netmon");
        assert_eq!(event.dest_port, Some(445));
        assert_eq!(event.direction, Some(Direction::Outbound));
        // Unknown field preserved in the overflow map
        assert_eq!(
            event.field("session_id").and_then(|f| f.as_str().map(str::to_string)),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_from_json_missing_type_rejected() {
        let v = json!({"timestamp": 1720612200, "user": "alice"});
        assert!(matches!(
            Event::from_json(&v, 0),
            Err(EngineError::EventSchema(_))
        ));
    }

    #[test]
    fn test_from_json_missing_timestamp_falls_back() {
        let v = json!({"type": "auth_fail", "user": "alice"});
        let event = Event::from_json(&v, 4242).unwrap();
        assert_eq!(event.timestamp, 4242);
    }

    #[test]
    fn test_from_json_iso8601_timestamp() {
        let v = json!({"type": "auth_fail", "timestamp": "2024-07-10T12:30:00Z"});
        let event = Event::from_json(&v, 0).unwrap();
        assert_eq!(event.timestamp, 1720614600);
    }

    #[test]
    fn test_from_json_epoch_millis() {
        let v = json!({"type": "auth_fail", "timestamp": 1720612200000i64});
        let event = Event::from_json(&v, 0).unwrap();
        assert_eq!(event.timestamp, 1720612200);
    }

    #[test]
    fn test_from_json_non_finite_timestamp_falls_back() {
        let v = json!({"type": "auth_fail", "timestamp": "not a time"});
        let event = Event::from_json(&v, 99).unwrap();
        assert_eq!(event.timestamp, 99);
    }

    #[test]
    fn test_mistyped_known_field_lands_in_extra() {
        // `user` as a number doesn't fit the typed slot, but the value is
        // still reachable through the overflow map.
        let v = json!({"type": "auth_fail", "timestamp": 1, "user": 42});
        let event = Event::from_json(&v, 0).unwrap();
        assert_eq!(event.user, None);
        assert_eq!(event.field("user").and_then(|f| f.as_f64()), Some(42.0));
    }

    #[test]
    fn test_field_lookup_dispatch() {
        let v = json!({
            "type": "process_start",
            "timestamp": 100,
            "process_name": "psexec.exe",
            "pid": 1234,
            "custom_tag": "lab"
        });
        let event = Event::from_json(&v, 0).unwrap();
        assert_eq!(event.field("type").unwrap().as_str(), Some("process_start"));
        assert_eq!(event.field("pid").unwrap().as_f64(), Some(1234.0));
        assert_eq!(event.field("custom_tag").unwrap().as_str(), Some("lab"));
        assert!(event.field("absent").is_none());
    }

    #[test]
    fn test_serialize_shape() {
        let v = json!({
            "type": "auth_fail",
            "timestamp": 100,
            "user": "alice",
            "attempt": 3
        });
        let event = Event::from_json(&v, 0).unwrap();
        let out = serde_json::to_value(&event).unwrap();
        assert_eq!(out["type"], "auth_fail");
        assert_eq!(out["timestamp"], 100);
        assert_eq!(out["user"], "alice");
        assert_eq!(out["attempt"], 3);
        // Absent optional fields are omitted, not null
        assert!(out.get("dest_ip").is_none());
    }
}
