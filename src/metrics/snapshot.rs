use chrono::{DateTime, Utc};
use serde::ser::{Serialize, Serializer};

/// Snapshot labels, in the order they are emitted.
pub mod labels {
    pub const SYSLOAD: &str = "sysload%";
    pub const FREEMEM: &str = "freememMB";
    pub const CPU: &str = "cpu%";
    pub const RSS: &str = "rssMB";
    pub const HEAP: &str = "heapMB";
    pub const RPS: &str = "rps";
    pub const RESTIME: &str = "resTime_ms";
    pub const REQBYTES: &str = "reqBytes";
    pub const RESBYTES: &str = "resBytes";
    pub const RXRATE: &str = "rxKBs";
    pub const TXRATE: &str = "txKBs";
    pub const EVLOOP: &str = "evloop_us";
    pub const NUMCONN: &str = "numconn";
}

/// A single metric reading. Most metrics are rounded to whole numbers;
/// mean response time keeps its fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    /// Round to the nearest integer.
    pub fn rounded(value: f64) -> Self {
        Self::Int(value.round() as i64)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Self::Int(v) => serializer.serialize_i64(v),
            Self::Float(v) => serializer.serialize_f64(v),
        }
    }
}

/// Merged metric values produced by one tick, in insertion order.
///
/// Serializes as a flat JSON object (`{"sysload%":12,"rps":40,...}`); the
/// timestamp is kept alongside but not part of the object.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    values: Vec<(&'static str, MetricValue)>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            values: Vec::with_capacity(13),
        }
    }

    pub fn push(&mut self, label: &'static str, value: impl Into<MetricValue>) {
        self.values.push((label, value.into()));
    }

    pub fn get(&self, label: &str) -> Option<MetricValue> {
        self.values
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(l, _)| *l)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, MetricValue)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.values.iter().map(|(label, value)| (*label, value)))
    }
}
