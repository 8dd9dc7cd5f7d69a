//! Plain domain types shared by the query, correlation, and exposition stages.
//!
//! Provider SDK types never cross into this module; collaborators translate
//! at their own boundary.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One `name=value` dimension narrowing a monitoring query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One outbound query: a single (resource, metric, statistic) triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricQuery {
    /// Opaque id, unique within one submission (`q_0`, `q_1`, ...).
    pub id: String,
    pub resource_name: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub period_secs: i64,
    pub statistic: String,
}

/// Semantic identity behind an opaque query id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIdentity {
    pub resource_name: String,
    pub metric_name: String,
    pub statistic_name: String,
}

/// Request-scoped side table: query id -> identity.
pub type QueryLookup = HashMap<String, QueryIdentity>;

/// Shared `[start, end]` window for every call of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window length in whole seconds (rounded), used as the query period.
    pub fn period_secs(&self) -> i64 {
        let millis = (self.end - self.start).num_milliseconds();
        (millis as f64 / 1000.0).round() as i64
    }
}

/// Raw per-id result as returned by the monitoring API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSeries {
    pub id: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
    /// Per-series status messages; any entry fails the whole dispatch.
    pub warnings: Vec<String>,
}

impl RawResultSeries {
    /// Present value of the series and, when the provider sent one, its
    /// timestamp.
    ///
    /// Timestamps and values are paired positionally. If any pair exists the
    /// newest one wins; otherwise the last value stands alone.
    pub fn latest(&self) -> Option<(Option<DateTime<Utc>>, f64)> {
        let paired = self
            .timestamps
            .iter()
            .zip(self.values.iter())
            .max_by_key(|(ts, _)| **ts)
            .map(|(ts, v)| (Some(*ts), *v));
        paired.or_else(|| self.values.last().map(|v| (None, *v)))
    }
}

/// One monitoring API response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricDataPage {
    pub results: Vec<RawResultSeries>,
    pub messages: Vec<String>,
    pub next_token: Option<String>,
}

/// Insertion-ordered label set with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a label; an existing name keeps its position and takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One exported measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric_name: String,
    pub labels: Labels,
    /// `None` means "no datapoint", which is never rendered as zero.
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Sample {
    pub fn gauge(metric_name: impl Into<String>, labels: Labels, value: Option<f64>) -> Self {
        Self {
            metric_name: metric_name.into(),
            labels,
            value,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Supported exposition types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricKind {
    #[default]
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Named, typed group of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    pub fn gauge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Gauge,
            samples: Vec::new(),
        }
    }
}

/// Families keyed by name; iteration order is the rendering order.
pub type Families = BTreeMap<String, MetricFamily>;
