// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Output model: metrics grouped by resource and instrumentation scope,
//! mirroring the grouping of the spans they were derived from.

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeMap;
use crate::trace::{InstrumentationScope, Resource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationTemporality {
    Delta,
    Cumulative,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramDataPoint {
    pub attributes: AttributeMap,
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberValue {
    Int(i64),
    Double(f64),
}

impl NumberValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => *i as f64,
            Self::Double(d) => *d,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumberDataPoint {
    pub attributes: AttributeMap,
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub value: NumberValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub aggregation_temporality: AggregationTemporality,
    pub data_points: Vec<HistogramDataPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sum {
    pub aggregation_temporality: AggregationTemporality,
    pub is_monotonic: bool,
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricData {
    Histogram(Histogram),
    Sum(Sum),
    Gauge(Gauge),
}

impl MetricData {
    pub fn data_point_count(&self) -> usize {
        match self {
            Self::Histogram(h) => h.data_points.len(),
            Self::Sum(s) => s.data_points.len(),
            Self::Gauge(g) => g.data_points.len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    pub data: MetricData,
}

impl Metric {
    pub fn histogram(&self) -> Option<&Histogram> {
        match &self.data {
            MetricData::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn sum(&self) -> Option<&Sum> {
        match &self.data {
            MetricData::Sum(s) => Some(s),
            _ => None,
        }
    }

    pub fn gauge(&self) -> Option<&Gauge> {
        match &self.data {
            MetricData::Gauge(g) => Some(g),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeMetrics {
    pub scope: InstrumentationScope,
    pub metrics: Vec<Metric>,
}

impl ScopeMetrics {
    /// Returns the first metric named `name`.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub resource: Resource,
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// One batch of finished metrics handed to the next pipeline stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsBatch {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl MetricsBatch {
    pub fn is_empty(&self) -> bool {
        self.metric_count() == 0
    }

    pub fn metric_count(&self) -> usize {
        self.metrics().count()
    }

    pub fn data_point_count(&self) -> usize {
        self.metrics().map(|m| m.data.data_point_count()).sum()
    }

    /// Iterates over every metric of every resource and scope.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
    }

    /// Returns every metric named `name`, across resources and scopes.
    pub fn find_metrics<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Metric> + 'a {
        self.metrics().filter(move |m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge_metric(name: &str, points: usize) -> Metric {
        Metric {
            name: name.to_string(),
            unit: String::new(),
            data: MetricData::Gauge(Gauge {
                data_points: (0..points)
                    .map(|i| NumberDataPoint {
                        attributes: AttributeMap::new(),
                        start_time_unix_nano: 0,
                        time_unix_nano: i as u64,
                        value: NumberValue::Double(1.0),
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn test_counts_across_resources() {
        let batch = MetricsBatch {
            resource_metrics: vec![
                ResourceMetrics {
                    resource: Resource::default(),
                    scope_metrics: vec![ScopeMetrics {
                        scope: InstrumentationScope::default(),
                        metrics: vec![gauge_metric("a", 2), gauge_metric("b", 1)],
                    }],
                },
                ResourceMetrics {
                    resource: Resource::default(),
                    scope_metrics: vec![ScopeMetrics {
                        scope: InstrumentationScope::default(),
                        metrics: vec![gauge_metric("a", 1)],
                    }],
                },
            ],
        };
        assert_eq!(batch.metric_count(), 3);
        assert_eq!(batch.data_point_count(), 4);
        assert_eq!(batch.find_metrics("a").count(), 2);
        assert!(!batch.is_empty());
        assert!(MetricsBatch::default().is_empty());
    }

    #[test]
    fn test_number_value_as_f64() {
        assert_eq!(NumberValue::Int(3).as_f64(), 3.0);
        assert_eq!(NumberValue::Double(0.25).as_f64(), 0.25);
    }
}
