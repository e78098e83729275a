//! Conversion of provider responses into JSON-safe resource descriptors.
//!
//! Provider calls hand back loosely typed trees whose leaves may be
//! timestamps, dates, or raw bytes. [`normalize`] walks such a tree and yields
//! a [`ResourceDescriptor`] whose leaves are all JSON primitives, rendering
//! timestamps as ISO-8601 text. Leaves with no JSON representation are
//! rejected with the path at which they were found.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Normalized, JSON-safe description of a cloud resource.
pub type ResourceDescriptor = Value;

/// Value shapes a provider response may contain.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    Date(NaiveDate),
    Bytes(Vec<u8>),
    Sequence(Vec<RawValue>),
    Mapping(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// Build a mapping from `(key, value)` pairs.
    pub fn mapping<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<RawValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        RawValue::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Integer(_) | RawValue::Unsigned(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::String(_) => "string",
            RawValue::Timestamp(_) => "timestamp",
            RawValue::Date(_) => "date",
            RawValue::Bytes(_) => "bytes",
            RawValue::Sequence(_) => "sequence",
            RawValue::Mapping(_) => "mapping",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(value: DateTime<Utc>) -> Self {
        RawValue::Timestamp(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for RawValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        RawValue::Timestamp(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

impl From<Vec<RawValue>> for RawValue {
    fn from(value: Vec<RawValue>) -> Self {
        RawValue::Sequence(value)
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RawValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    RawValue::Unsigned(u)
                } else {
                    // serde_json numbers are always finite, so as_f64 succeeds here.
                    RawValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => RawValue::String(s),
            Value::Array(items) => RawValue::Sequence(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                RawValue::Mapping(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// A leaf has no JSON representation.
    #[error("unsupported {kind} value at {path}")]
    Unsupported { path: String, kind: &'static str },
}

/// Normalize a single provider value.
pub fn normalize(value: &RawValue) -> Result<ResourceDescriptor, NormalizeError> {
    Walker::default().walk(value)
}

/// Normalize each element of a sequence, preserving order.
///
/// Error paths start with the element index (`/3/Tags/0`).
pub fn normalize_each(values: &[RawValue]) -> Result<Vec<ResourceDescriptor>, NormalizeError> {
    let mut walker = Walker::default();
    values
        .iter()
        .enumerate()
        .map(|(index, value)| walker.child(index.to_string(), value))
        .collect()
}

#[derive(Default)]
struct Walker {
    path: Vec<String>,
}

impl Walker {
    fn walk(&mut self, value: &RawValue) -> Result<Value, NormalizeError> {
        match value {
            RawValue::Null => Ok(Value::Null),
            RawValue::Bool(b) => Ok(Value::Bool(*b)),
            RawValue::Integer(i) => Ok(Value::from(*i)),
            RawValue::Unsigned(u) => Ok(Value::from(*u)),
            RawValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| self.unsupported("non-finite float")),
            RawValue::String(s) => Ok(Value::String(s.clone())),
            RawValue::Timestamp(ts) => Ok(Value::String(
                ts.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            )),
            RawValue::Date(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
            RawValue::Bytes(_) => Err(self.unsupported(value.kind())),
            RawValue::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| self.child(index.to_string(), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            RawValue::Mapping(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    let normalized = self.child(key.clone(), item)?;
                    out.insert(key.clone(), normalized);
                }
                Ok(Value::Object(out))
            }
        }
    }

    fn child(&mut self, segment: String, value: &RawValue) -> Result<Value, NormalizeError> {
        self.path.push(segment);
        let result = self.walk(value);
        self.path.pop();
        result
    }

    fn unsupported(&self, kind: &'static str) -> NormalizeError {
        NormalizeError::Unsupported {
            path: self.pointer(),
            kind,
        }
    }

    /// Current location as a JSON pointer.
    fn pointer(&self) -> String {
        if self.path.is_empty() {
            return "/".to_string();
        }
        self.path
            .iter()
            .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    use super::*;

    fn launch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn sample_instance() -> RawValue {
        RawValue::mapping([
            ("InstanceId", RawValue::from("i-0abc")),
            ("LaunchTime", RawValue::from(launch_time())),
            ("CpuOptions", RawValue::mapping([("CoreCount", 2i64)])),
            (
                "Tags",
                RawValue::Sequence(vec![RawValue::mapping([
                    ("Key", "Name"),
                    ("Value", "web-1"),
                ])]),
            ),
            ("EbsOptimized", RawValue::Bool(false)),
            ("KernelId", RawValue::Null),
        ])
    }

    #[test]
    fn timestamps_render_as_iso8601() {
        let out = normalize(&sample_instance()).expect("normalize");
        assert_eq!(out["LaunchTime"], "2024-01-15T12:00:00+00:00");
        assert_eq!(out["InstanceId"], "i-0abc");
        assert_eq!(out["CpuOptions"]["CoreCount"], 2);
        assert_eq!(out["Tags"][0]["Value"], "web-1");
        assert_eq!(out["KernelId"], Value::Null);
    }

    #[test]
    fn offsets_and_fractional_seconds_are_kept() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let ts = offset
            .with_ymd_and_hms(2023, 6, 1, 8, 30, 5)
            .unwrap()
            .with_nanosecond(250_000_000)
            .unwrap();
        let out = normalize(&RawValue::Timestamp(ts)).expect("normalize");
        assert_eq!(out, json!("2023-06-01T08:30:05.250+02:00"));
    }

    #[test]
    fn dates_render_without_time() {
        let date = NaiveDate::from_ymd_opt(2022, 12, 31).unwrap();
        assert_eq!(normalize(&date.into()).unwrap(), json!("2022-12-31"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = vec![
            sample_instance(),
            RawValue::Sequence(vec![RawValue::Float(1.5), RawValue::Unsigned(u64::MAX)]),
            RawValue::Float(3.0),
            RawValue::Null,
            RawValue::mapping([("empty", RawValue::Sequence(vec![]))]),
        ];
        for sample in samples {
            let once = normalize(&sample).expect("first pass");
            let twice = normalize(&RawValue::from(once.clone())).expect("second pass");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn every_leaf_is_a_json_primitive() {
        fn assert_primitive_leaves(value: &Value) {
            match value {
                Value::Array(items) => items.iter().for_each(assert_primitive_leaves),
                Value::Object(map) => map.values().for_each(assert_primitive_leaves),
                Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
            }
        }
        let out = normalize(&sample_instance()).expect("normalize");
        assert_primitive_leaves(&out);
        serde_json::to_string(&out).expect("output serializes");
    }

    #[test]
    fn sequence_order_is_preserved() {
        let raw = RawValue::Sequence((0..5i64).map(RawValue::from).collect());
        assert_eq!(normalize(&raw).unwrap(), json!([0, 1, 2, 3, 4]));
    }

    #[test]
    fn bytes_are_rejected_with_path() {
        let raw = RawValue::Sequence(vec![
            RawValue::Null,
            RawValue::mapping([(
                "UserData",
                RawValue::Sequence(vec![RawValue::Bytes(vec![1, 2, 3])]),
            )]),
        ]);
        let err = normalize(&raw).expect_err("bytes are not JSON-safe");
        assert_eq!(
            err,
            NormalizeError::Unsupported {
                path: "/1/UserData/0".into(),
                kind: "bytes",
            }
        );
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = normalize(&RawValue::Float(f64::INFINITY)).expect_err("inf");
        assert!(matches!(err, NormalizeError::Unsupported { ref path, .. } if path == "/"));
    }

    #[test]
    fn pointer_escapes_separator_characters() {
        let raw = RawValue::mapping([("a/b~c", RawValue::Bytes(vec![]))]);
        let err = normalize(&raw).expect_err("bytes");
        assert!(matches!(err, NormalizeError::Unsupported { ref path, .. } if path == "/a~1b~0c"));
    }

    #[test]
    fn normalize_each_prefixes_element_index() {
        let items = vec![sample_instance(), RawValue::Bytes(vec![0])];
        let err = normalize_each(&items).expect_err("second element fails");
        assert!(matches!(err, NormalizeError::Unsupported { ref path, .. } if path == "/1"));

        let ok = normalize_each(&[sample_instance()]).expect("normalize");
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0]["LaunchTime"], "2024-01-15T12:00:00+00:00");
    }

    #[test]
    fn json_numbers_keep_their_kind() {
        assert_eq!(RawValue::from(json!(7)), RawValue::Integer(7));
        assert_eq!(RawValue::from(json!(u64::MAX)), RawValue::Unsigned(u64::MAX));
        assert_eq!(RawValue::from(json!(2.5)), RawValue::Float(2.5));
    }
}
