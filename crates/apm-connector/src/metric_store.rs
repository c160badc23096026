// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch-scoped accumulation of metric data points, grouped
//! resource → scope → metric → data point.
//!
//! Every level is an insertion-ordered arena indexed by the [`AttributeKey`]
//! of its attributes (or by name, for metrics), so the flattened output is
//! deterministic for a given input. Handles returned by the `get_or_create_*`
//! methods are plain indices and stay valid until [`MetricStore::reset`].

use apm_pdata::key::{canonical_key, AttributeKey};
use apm_pdata::metrics::{
    AggregationTemporality, Histogram, HistogramDataPoint, Metric, MetricData, MetricsBatch,
    NumberDataPoint, NumberValue, ResourceMetrics, ScopeMetrics, Sum,
};
use apm_pdata::trace::{InstrumentationScope, Resource};
use apm_pdata::AttributeMap;
use hashbrown::HashMap;
use tracing::debug;
use ustr::Ustr;

pub const SECONDS_UNIT: &str = "s";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MetricId(usize);

/// Shape of the data points a metric accumulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    /// Delta histogram of durations in seconds.
    Histogram,
    /// Cumulative, non-monotonic integer sum.
    Sum,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Accumulator {
    Histogram {
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    },
    Sum(i64),
}

#[derive(Debug)]
struct Datapoint {
    attributes: AttributeMap,
    start_time_unix_nano: u64,
    time_unix_nano: u64,
    value: Accumulator,
}

impl Datapoint {
    fn widen(&mut self, start_time_unix_nano: u64, time_unix_nano: u64) {
        self.start_time_unix_nano = self.start_time_unix_nano.min(start_time_unix_nano);
        self.time_unix_nano = self.time_unix_nano.max(time_unix_nano);
    }
}

#[derive(Debug)]
struct MetricEntry {
    name: Ustr,
    kind: MetricKind,
    datapoints: Vec<Datapoint>,
    by_key: HashMap<AttributeKey, usize>,
}

#[derive(Debug)]
struct ScopeEntry {
    scope: InstrumentationScope,
    metrics: Vec<usize>,
    by_name: HashMap<Ustr, usize>,
}

#[derive(Debug)]
struct ResourceEntry {
    resource: Resource,
    scopes: Vec<usize>,
    by_key: HashMap<AttributeKey, usize>,
}

#[derive(Debug, Default)]
pub struct MetricStore {
    resources: Vec<ResourceEntry>,
    resources_by_key: HashMap<AttributeKey, usize>,
    scopes: Vec<ScopeEntry>,
    metrics: Vec<MetricEntry>,
}

impl MetricStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds or creates the resource identified by `attributes`. The first
    /// attribute map seen for a key is the one emitted.
    pub fn get_or_create_resource(&mut self, attributes: &AttributeMap) -> ResourceId {
        let key = canonical_key(attributes);
        if let Some(&index) = self.resources_by_key.get(&key) {
            return ResourceId(index);
        }
        let index = self.resources.len();
        self.resources.push(ResourceEntry {
            resource: Resource::new(attributes.clone()),
            scopes: Vec::new(),
            by_key: HashMap::new(),
        });
        self.resources_by_key.insert(key, index);
        ResourceId(index)
    }

    /// Finds or creates the scope under `resource` whose attributes share the
    /// canonical key of `scope.attributes`.
    pub fn get_or_create_scope(
        &mut self,
        resource: ResourceId,
        scope: &InstrumentationScope,
    ) -> ScopeId {
        let key = canonical_key(&scope.attributes);
        let next = self.scopes.len();
        let resource_entry = &mut self.resources[resource.0];
        if let Some(&index) = resource_entry.by_key.get(&key) {
            return ScopeId(index);
        }
        resource_entry.by_key.insert(key, next);
        resource_entry.scopes.push(next);
        self.scopes.push(ScopeEntry {
            scope: scope.clone(),
            metrics: Vec::new(),
            by_name: HashMap::new(),
        });
        ScopeId(next)
    }

    /// Finds or creates the metric `name` under `scope`. A metric keeps the
    /// kind it was first created with.
    pub fn get_or_create_metric(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: MetricKind,
    ) -> MetricId {
        let name = Ustr::from(name);
        let next = self.metrics.len();
        let scope_entry = &mut self.scopes[scope.0];
        if let Some(&index) = scope_entry.by_name.get(&name) {
            return MetricId(index);
        }
        scope_entry.by_name.insert(name, next);
        scope_entry.metrics.push(next);
        self.metrics.push(MetricEntry {
            name,
            kind,
            datapoints: Vec::new(),
            by_key: HashMap::new(),
        });
        MetricId(next)
    }

    /// Adds one observation of `seconds` to the histogram data point keyed by
    /// `dimensions`.
    pub fn record_histogram(
        &mut self,
        metric: MetricId,
        dimensions: AttributeMap,
        seconds: f64,
        start_time_unix_nano: u64,
        time_unix_nano: u64,
    ) {
        let entry = &mut self.metrics[metric.0];
        if entry.kind != MetricKind::Histogram {
            debug!("Ignoring histogram value for sum metric {}", entry.name);
            return;
        }
        let key = canonical_key(&dimensions);
        match entry.by_key.get(&key) {
            Some(&index) => {
                let datapoint = &mut entry.datapoints[index];
                if let Accumulator::Histogram {
                    count,
                    sum,
                    min,
                    max,
                } = &mut datapoint.value
                {
                    *count += 1;
                    *sum += seconds;
                    *min = min.min(seconds);
                    *max = max.max(seconds);
                }
                datapoint.widen(start_time_unix_nano, time_unix_nano);
            }
            None => {
                entry.by_key.insert(key, entry.datapoints.len());
                entry.datapoints.push(Datapoint {
                    attributes: dimensions,
                    start_time_unix_nano,
                    time_unix_nano,
                    value: Accumulator::Histogram {
                        count: 1,
                        sum: seconds,
                        min: seconds,
                        max: seconds,
                    },
                });
            }
        }
    }

    /// Adds `value` to the sum data point keyed by `dimensions`.
    pub fn record_sum(
        &mut self,
        metric: MetricId,
        dimensions: AttributeMap,
        value: i64,
        start_time_unix_nano: u64,
        time_unix_nano: u64,
    ) {
        let entry = &mut self.metrics[metric.0];
        if entry.kind != MetricKind::Sum {
            debug!("Ignoring sum value for histogram metric {}", entry.name);
            return;
        }
        let key = canonical_key(&dimensions);
        match entry.by_key.get(&key) {
            Some(&index) => {
                let datapoint = &mut entry.datapoints[index];
                if let Accumulator::Sum(total) = &mut datapoint.value {
                    *total = total.saturating_add(value);
                }
                datapoint.widen(start_time_unix_nano, time_unix_nano);
            }
            None => {
                entry.by_key.insert(key, entry.datapoints.len());
                entry.datapoints.push(Datapoint {
                    attributes: dimensions,
                    start_time_unix_nano,
                    time_unix_nano,
                    value: Accumulator::Sum(value),
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn datapoint_count(&self) -> usize {
        self.metrics.iter().map(|m| m.datapoints.len()).sum()
    }

    /// Builds the nested output batch. Resources, scopes, metrics and data
    /// points appear in first-seen order; levels left without any data point
    /// are omitted.
    pub fn flatten(&self) -> MetricsBatch {
        let resource_metrics = self
            .resources
            .iter()
            .filter_map(|resource| {
                let scope_metrics: Vec<ScopeMetrics> = resource
                    .scopes
                    .iter()
                    .filter_map(|&scope_index| self.flatten_scope(&self.scopes[scope_index]))
                    .collect();
                (!scope_metrics.is_empty()).then(|| ResourceMetrics {
                    resource: resource.resource.clone(),
                    scope_metrics,
                })
            })
            .collect();
        MetricsBatch { resource_metrics }
    }

    fn flatten_scope(&self, scope: &ScopeEntry) -> Option<ScopeMetrics> {
        let metrics: Vec<Metric> = scope
            .metrics
            .iter()
            .map(|&metric_index| &self.metrics[metric_index])
            .filter(|metric| !metric.datapoints.is_empty())
            .map(flatten_metric)
            .collect();
        (!metrics.is_empty()).then(|| ScopeMetrics {
            scope: scope.scope.clone(),
            metrics,
        })
    }

    /// Drops everything accumulated so far. Handles handed out before the
    /// reset must not be used afterwards.
    pub fn reset(&mut self) {
        self.resources.clear();
        self.resources_by_key.clear();
        self.scopes.clear();
        self.metrics.clear();
    }
}

fn flatten_metric(metric: &MetricEntry) -> Metric {
    match metric.kind {
        MetricKind::Histogram => Metric {
            name: metric.name.to_string(),
            unit: SECONDS_UNIT.to_string(),
            data: MetricData::Histogram(Histogram {
                aggregation_temporality: AggregationTemporality::Delta,
                data_points: metric
                    .datapoints
                    .iter()
                    .filter_map(|dp| match dp.value {
                        Accumulator::Histogram {
                            count,
                            sum,
                            min,
                            max,
                        } => Some(HistogramDataPoint {
                            attributes: dp.attributes.clone(),
                            start_time_unix_nano: dp.start_time_unix_nano,
                            time_unix_nano: dp.time_unix_nano,
                            count,
                            sum,
                            min,
                            max,
                        }),
                        Accumulator::Sum(_) => None,
                    })
                    .collect(),
            }),
        },
        MetricKind::Sum => Metric {
            name: metric.name.to_string(),
            unit: String::new(),
            data: MetricData::Sum(Sum {
                aggregation_temporality: AggregationTemporality::Cumulative,
                is_monotonic: false,
                data_points: metric
                    .datapoints
                    .iter()
                    .filter_map(|dp| match dp.value {
                        Accumulator::Sum(total) => Some(NumberDataPoint {
                            attributes: dp.attributes.clone(),
                            start_time_unix_nano: dp.start_time_unix_nano,
                            time_unix_nano: dp.time_unix_nano,
                            value: NumberValue::Int(total),
                        }),
                        Accumulator::Histogram { .. } => None,
                    })
                    .collect(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_attributes(service: &str) -> AttributeMap {
        [("service.name", service)].into_iter().collect()
    }

    fn dims(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_resource_identity_ignores_insertion_order() {
        let mut store = MetricStore::new();
        let a: AttributeMap = [("a", "1"), ("b", "2")].into_iter().collect();
        let b: AttributeMap = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(
            store.get_or_create_resource(&a),
            store.get_or_create_resource(&b)
        );
        assert_ne!(
            store.get_or_create_resource(&a),
            store.get_or_create_resource(&resource_attributes("other"))
        );
    }

    #[test]
    fn test_scope_identity_uses_attributes_only() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("svc"));
        let first = InstrumentationScope {
            name: "first".to_string(),
            ..Default::default()
        };
        let second = InstrumentationScope {
            name: "second".to_string(),
            ..Default::default()
        };
        let a = store.get_or_create_scope(resource, &first);
        let b = store.get_or_create_scope(resource, &second);
        assert_eq!(a, b);

        let metric = store.get_or_create_metric(a, "m", MetricKind::Histogram);
        store.record_histogram(metric, AttributeMap::new(), 1.0, 0, 1);
        let batch = store.flatten();
        assert_eq!(batch.resource_metrics[0].scope_metrics.len(), 1);
        assert_eq!(batch.resource_metrics[0].scope_metrics[0].scope.name, "first");
    }

    #[test]
    fn test_scopes_are_per_resource() {
        let mut store = MetricStore::new();
        let r1 = store.get_or_create_resource(&resource_attributes("one"));
        let r2 = store.get_or_create_resource(&resource_attributes("two"));
        let scope = InstrumentationScope::default();
        assert_ne!(
            store.get_or_create_scope(r1, &scope),
            store.get_or_create_scope(r2, &scope)
        );
    }

    #[test]
    fn test_histogram_accumulates_per_dimension_set() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("svc"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        let metric = store.get_or_create_metric(scope, "latency", MetricKind::Histogram);

        store.record_histogram(metric, dims(&[("route", "/a")]), 0.5, 100, 200);
        store.record_histogram(metric, dims(&[("route", "/a")]), 1.5, 50, 150);
        store.record_histogram(metric, dims(&[("route", "/b")]), 2.0, 300, 400);

        let batch = store.flatten();
        let metric = batch.metrics().next().unwrap();
        assert_eq!(metric.unit, SECONDS_UNIT);
        let histogram = metric.histogram().unwrap();
        assert_eq!(
            histogram.aggregation_temporality,
            AggregationTemporality::Delta
        );
        assert_eq!(histogram.data_points.len(), 2);

        let a = &histogram.data_points[0];
        assert_eq!(a.count, 2);
        assert_eq!(a.sum, 2.0);
        assert_eq!(a.min, 0.5);
        assert_eq!(a.max, 1.5);
        assert_eq!(a.start_time_unix_nano, 50);
        assert_eq!(a.time_unix_nano, 200);

        let b = &histogram.data_points[1];
        assert_eq!(b.count, 1);
        assert_eq!(b.attributes.get_string("route").as_deref(), Some("/b"));
    }

    #[test]
    fn test_sum_is_cumulative_and_non_monotonic() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("svc"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        let metric = store.get_or_create_metric(scope, "errors", MetricKind::Sum);

        store.record_sum(metric, dims(&[("transactionType", "Web")]), 1, 10, 20);
        store.record_sum(metric, dims(&[("transactionType", "Web")]), 1, 5, 30);

        let batch = store.flatten();
        let sum = batch.metrics().next().unwrap().sum().unwrap().clone();
        assert_eq!(sum.aggregation_temporality, AggregationTemporality::Cumulative);
        assert!(!sum.is_monotonic);
        assert_eq!(sum.data_points.len(), 1);
        assert_eq!(sum.data_points[0].value, NumberValue::Int(2));
        assert_eq!(sum.data_points[0].start_time_unix_nano, 5);
        assert_eq!(sum.data_points[0].time_unix_nano, 30);
    }

    #[test]
    fn test_metric_keeps_first_kind() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("svc"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        let metric = store.get_or_create_metric(scope, "m", MetricKind::Sum);
        assert_eq!(
            store.get_or_create_metric(scope, "m", MetricKind::Histogram),
            metric
        );

        store.record_histogram(metric, AttributeMap::new(), 1.0, 0, 1);
        assert_eq!(store.datapoint_count(), 0);
        store.record_sum(metric, AttributeMap::new(), 1, 0, 1);
        assert_eq!(store.datapoint_count(), 1);
    }

    #[test]
    fn test_flatten_preserves_insertion_order() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("svc"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        for name in ["zeta", "alpha", "mu"] {
            let metric = store.get_or_create_metric(scope, name, MetricKind::Histogram);
            store.record_histogram(metric, AttributeMap::new(), 1.0, 0, 1);
        }
        let names: Vec<String> = store.flatten().metrics().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mu"]);
    }

    #[test]
    fn test_empty_metrics_are_omitted() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("svc"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        store.get_or_create_metric(scope, "unused", MetricKind::Histogram);
        store.get_or_create_resource(&resource_attributes("no scopes"));
        assert_eq!(store.flatten(), MetricsBatch::default());
    }

    #[test]
    fn test_reset_isolates_batches() {
        let mut store = MetricStore::new();
        let resource = store.get_or_create_resource(&resource_attributes("first"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        let metric = store.get_or_create_metric(scope, "m", MetricKind::Histogram);
        store.record_histogram(metric, AttributeMap::new(), 1.0, 0, 1);
        assert!(!store.is_empty());

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.flatten(), MetricsBatch::default());

        let resource = store.get_or_create_resource(&resource_attributes("second"));
        let scope = store.get_or_create_scope(resource, &InstrumentationScope::default());
        let metric = store.get_or_create_metric(scope, "m", MetricKind::Histogram);
        store.record_histogram(metric, AttributeMap::new(), 2.0, 0, 1);

        let batch = store.flatten();
        assert_eq!(batch.resource_metrics.len(), 1);
        assert_eq!(
            batch.resource_metrics[0]
                .resource
                .attributes
                .get_string("service.name")
                .as_deref(),
            Some("second")
        );
        assert_eq!(batch.metric_count(), 1);
    }
}
