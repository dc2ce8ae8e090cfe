//! Core telemetry types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value carried by a metric
///
/// Closed union; a number never compares equal to the text of that number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Short type name for logs and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::Boolean(_) => "boolean",
            MetricValue::Number(_) => "number",
            MetricValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Boolean(b) => write!(f, "{}", b),
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Boolean(b)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::Text(s)
    }
}

/// One named observation produced by a device
///
/// `timestamp` is producer event time and decides which value wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub timestamp: i64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<MetricValue>, timestamp: i64) -> Self {
        Metric {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }
}

/// Inbound batch for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub metrics: Vec<Metric>,
}

impl IngestRequest {
    pub fn new(device_id: impl Into<String>, metrics: Vec<Metric>) -> Self {
        IngestRequest {
            device_id: device_id.into(),
            metrics,
        }
    }
}

/// Raw record persisted once per accepted metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub device_id: String,
    pub metric: Metric,
    /// Ingestion wall clock; informational only
    pub received_at_ms: u64,
    /// Random id of the store instance that wrote the record
    pub writer_id: u64,
    /// Per-writer append counter
    pub sequence: u64,
}
