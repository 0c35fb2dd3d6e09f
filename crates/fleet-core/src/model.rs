use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Seconds since the Unix epoch, in the skew-corrected time base.
pub type Timestamp = f64;

/// One worker machine as reported by the snapshot or delta source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Filled from the map key or message id when the record omits it.
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "deserialize_count")]
    pub threads: u32,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub assigned: u32,
    #[serde(default, deserialize_with = "deserialize_opt_seconds")]
    pub seen: Option<Timestamp>,
    #[serde(default, deserialize_with = "deserialize_opt_seconds")]
    pub seenwork: Option<Timestamp>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, threads: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            threads,
            assigned: 0,
            seen: None,
            seenwork: None,
            extra: HashMap::new(),
        }
    }

    /// Parse a node record from a delta payload, keyed by the message id.
    pub fn from_payload(id: &str, payload: &str) -> Result<Self, serde_json::Error> {
        let mut node: Node = serde_json::from_str(payload)?;
        node.id = id.to_string();
        Ok(node)
    }
}

/// One dispatched unit of work. `worker` is a weak reference by node id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Workunit {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub worker: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_seconds")]
    pub starttime: Option<Timestamp>,
    #[serde(default, deserialize_with = "deserialize_opt_seconds")]
    pub nitems: Option<f64>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl Workunit {
    pub fn from_payload(id: &str, payload: &str) -> Result<Self, serde_json::Error> {
        let mut unit: Workunit = serde_json::from_str(payload)?;
        unit.id = id.to_string();
        Ok(unit)
    }

    /// Start time, if one was actually recorded (zero counts as unset).
    pub fn recorded_start(&self) -> Option<Timestamp> {
        self.starttime.filter(|start| *start > 0.0)
    }
}

/// Deserialize an id that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

/// Counts arrive as integers, floats or decimal strings; negatives clamp to zero.
fn deserialize_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(u32::try_from(u).unwrap_or(u32::MAX));
            }
            let f = n
                .as_f64()
                .ok_or_else(|| serde::de::Error::custom("invalid count"))?;
            Ok(f.max(0.0).min(u32::MAX as f64) as u32)
        }
        Value::String(s) => parse_leading_int(&s)
            .map(|v| v.clamp(0, u32::MAX as i64) as u32)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid count '{s}'"))),
        _ => Err(serde::de::Error::custom("expected number or string for count")),
    }
}

fn deserialize_opt_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => Ok(s.trim().parse::<f64>().ok()),
        Value::Null => Ok(None),
        _ => Err(serde::de::Error::custom("expected number or string")),
    }
}

/// Integer prefix of a string, e.g. `"12 threads"` -> 12.
pub(crate) fn parse_leading_int(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|value| sign * value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_accepts_string_counts_and_keeps_unknown_fields() {
        let node = Node::from_payload(
            "n1",
            r#"{"name":"alpha","threads":"8","assigned":2,"seen":"1700000000","rack":"b3"}"#,
        )
        .expect("parse node");
        assert_eq!(node.id, "n1");
        assert_eq!(node.threads, 8);
        assert_eq!(node.assigned, 2);
        assert_eq!(node.seen, Some(1_700_000_000.0));
        assert_eq!(node.seenwork, None);
        assert_eq!(node.extra.get("rack"), Some(&serde_json::json!("b3")));
    }

    #[test]
    fn node_without_threads_is_rejected() {
        assert!(Node::from_payload("n1", r#"{"name":"alpha"}"#).is_err());
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        let node = Node::from_payload("n1", r#"{"threads":4,"assigned":-3}"#).expect("parse");
        assert_eq!(node.assigned, 0);
    }

    #[test]
    fn workunit_treats_empty_worker_and_zero_start_as_unset() {
        let unit = Workunit::from_payload("w1", r#"{"worker":"","starttime":0,"nitems":"40"}"#)
            .expect("parse workunit");
        assert_eq!(unit.worker, None);
        assert_eq!(unit.recorded_start(), None);
        assert_eq!(unit.nitems, Some(40.0));

        let unit = Workunit::from_payload("w2", r#"{"worker":7,"starttime":1700000000.5}"#)
            .expect("parse workunit");
        assert_eq!(unit.worker.as_deref(), Some("7"));
        assert_eq!(unit.recorded_start(), Some(1_700_000_000.5));
    }

    #[test]
    fn leading_int_matches_prefix_digits() {
        assert_eq!(parse_leading_int("12 threads"), Some(12));
        assert_eq!(parse_leading_int("  -4"), Some(-4));
        assert_eq!(parse_leading_int("x1"), None);
        assert_eq!(parse_leading_int(""), None);
    }
}
