// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-trace state and the metrics derived from it once the trace's spans
//! have all been seen.

use std::collections::BTreeMap;

use apm_pdata::trace::{Span, SpanKind};
use apm_pdata::AttributeMap;
use hashbrown::HashMap;
use tracing::debug;

use crate::apdex::{Apdex, ApdexBucket};
use crate::metric_store::{MetricKind, MetricStore, ScopeId};
use crate::sql_parser::SqlParser;

pub const TRANSACTION_DURATION: &str = "apm.service.transaction.duration";
pub const OVERVIEW_WEB: &str = "apm.service.overview.web";
pub const OVERVIEW_OTHER: &str = "apm.service.overview.other";
pub const TRANSACTION_OVERVIEW: &str = "apm.service.transaction.overview";
pub const DATASTORE_OPERATION_DURATION: &str = "apm.service.datastore.operation.duration";
pub const EXTERNAL_HOST_DURATION: &str = "apm.service.external.host.duration";
pub const TIMESLICE_VALUE: &str = "newrelic.timeslice.value";
pub const APDEX: &str = "apm.service.apdex";
pub const ERROR_COUNT: &str = "apm.service.error.count";

pub const TRANSACTION_TYPE: &str = "transactionType";
pub const TRANSACTION_NAME: &str = "transactionName";
pub const METRIC_TIMESLICE_NAME: &str = "metricTimesliceName";
pub const SCOPE: &str = "scope";
pub const SEGMENT_NAME: &str = "segmentName";
pub const APDEX_VALUE: &str = "apdex.value";
pub const APDEX_BUCKET: &str = "apdex.bucket";

const NANOS_PER_SECOND: f64 = 1e9;

pub fn nanos_to_seconds(nanos: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let nanos = nanos as f64;
    nanos / NANOS_PER_SECOND
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionType {
    Web,
    Other,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "Web",
            Self::Other => "Other",
        }
    }

    pub fn name_prefix(self) -> &'static str {
        match self {
            Self::Web => "WebTransaction",
            Self::Other => "OtherTransaction",
        }
    }

    pub fn overview_metric(self) -> &'static str {
        match self {
            Self::Web => OVERVIEW_WEB,
            Self::Other => OVERVIEW_OTHER,
        }
    }
}

/// Name of the breakdown segment a measurement is charged to. Some segments
/// depend on the transaction type, which is only known at finalize time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentRule {
    Constant(String),
    ByTransactionType { web: String, other: String },
}

impl SegmentRule {
    pub fn resolve(&self, transaction_type: TransactionType) -> &str {
        match self {
            Self::Constant(name) => name,
            Self::ByTransactionType { web, other } => match transaction_type {
                TransactionType::Web => web,
                TransactionType::Other => other,
            },
        }
    }
}

/// Derives the transaction name and type from a root span's attributes.
pub fn transaction_name(span: &Span) -> (String, TransactionType) {
    let transaction_type = TransactionType::Web;
    let prefix = transaction_type.name_prefix();
    let attributes = &span.attributes;
    let mut name = if let Some(route) = attributes.get_string("http.route") {
        format!("{prefix}/http.route{route}")
    } else if let Some(path) = attributes.get_string("url.path") {
        format!("{prefix}/Uri{path}")
    } else {
        format!("{prefix}/Other/unknown")
    };
    let method = attributes
        .get_string("http.method")
        .or_else(|| attributes.get_string("http.request.method"));
    if let Some(method) = method {
        name.push_str(&format!(" ({method})"));
    }
    (name, transaction_type)
}

/// A classified non-root span waiting for its exclusive time to be known.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub span_id: String,
    pub metric_name: &'static str,
    pub duration_nanos: i64,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: AttributeMap,
    pub segment: SegmentRule,
    pub timeslice_name: String,
}

impl Measurement {
    fn from_span(
        span: &Span,
        metric_name: &'static str,
        attributes: AttributeMap,
        segment: SegmentRule,
        timeslice_name: String,
    ) -> Self {
        Self {
            span_id: span.span_id.clone(),
            metric_name,
            duration_nanos: span.duration_nanos(),
            start_time_unix_nano: span.start_time_unix_nano,
            end_time_unix_nano: span.end_time_unix_nano,
            attributes,
            segment,
            timeslice_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct RootSpan {
    span_id: String,
    duration_nanos: i64,
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    is_error: bool,
    name: String,
    transaction_type: TransactionType,
}

/// Aggregate view of one trace within a batch.
#[derive(Debug)]
pub struct Transaction {
    sdk_language: String,
    scope: ScopeId,
    root: Option<RootSpan>,
    /// Summed durations of the children of each span, keyed by parent id.
    span_to_child_duration: HashMap<String, i64>,
    measurements: BTreeMap<String, Measurement>,
}

impl Transaction {
    #[must_use]
    pub fn new(sdk_language: impl Into<String>, scope: ScopeId) -> Self {
        Self {
            sdk_language: sdk_language.into(),
            scope,
            root: None,
            span_to_child_duration: HashMap::new(),
            measurements: BTreeMap::new(),
        }
    }

    pub fn sdk_language(&self) -> &str {
        &self.sdk_language
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.values()
    }

    /// Summed duration of the spans recorded as children of `span_id`.
    pub fn child_duration(&self, span_id: &str) -> i64 {
        self.span_to_child_duration
            .get(span_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn add_span(&mut self, span: &Span, sql_parser: &SqlParser) {
        if span.kind == SpanKind::Server {
            self.set_root(span);
            return;
        }

        let child_nanos = self
            .span_to_child_duration
            .entry(span.parent_span_id.clone())
            .or_insert(0);
        *child_nanos = child_nanos.saturating_add(span.duration_nanos());

        if span.kind == SpanKind::Client {
            if span.has_parent() {
                self.process_client_span(span, sql_parser);
            } else {
                debug!(
                    "Dropping client span {} of trace {} without a parent",
                    span.span_id, span.trace_id
                );
            }
        } else {
            self.process_generic_span(span);
        }
    }

    fn set_root(&mut self, span: &Span) {
        if let Some(root) = &self.root {
            debug!(
                "Ignoring server span {} of trace {}, root already set to {}",
                span.span_id, span.trace_id, root.span_id
            );
            return;
        }
        let (name, transaction_type) = transaction_name(span);
        self.root = Some(RootSpan {
            span_id: span.span_id.clone(),
            duration_nanos: span.duration_nanos(),
            start_time_unix_nano: span.start_time_unix_nano,
            end_time_unix_nano: span.end_time_unix_nano,
            is_error: span.is_error(),
            name,
            transaction_type,
        });
    }

    fn process_client_span(&mut self, span: &Span, sql_parser: &SqlParser) {
        if !self.process_database_span(span, sql_parser) {
            self.process_external_span(span);
        }
    }

    fn process_database_span(&mut self, span: &Span, sql_parser: &SqlParser) -> bool {
        let attributes = &span.attributes;
        let (Some(system), Some(operation)) = (
            attributes.get_string("db.system"),
            attributes.get_string("db.operation"),
        ) else {
            return false;
        };
        let table = sql_parser.get_db_table(span);
        let timeslice_name = format!("Datastore/statement/{system}/{table}/{operation}");

        let mut dimensions = AttributeMap::with_capacity(4);
        dimensions.put_str("db.operation", &*operation);
        dimensions.put_str("db.system", &*system);
        dimensions.put_str("db.sql.table", table);

        self.insert_measurement(Measurement::from_span(
            span,
            DATASTORE_OPERATION_DURATION,
            dimensions,
            SegmentRule::Constant(system.into_owned()),
            timeslice_name,
        ));
        true
    }

    fn process_external_span(&mut self, span: &Span) -> bool {
        let Some(address) = span.attributes.get_string("server.address") else {
            return false;
        };
        let timeslice_name = format!("External/{address}/all");

        let mut dimensions = AttributeMap::with_capacity(2);
        dimensions.put_str("external.host", &*address);

        self.insert_measurement(Measurement::from_span(
            span,
            EXTERNAL_HOST_DURATION,
            dimensions,
            SegmentRule::ByTransactionType {
                web: "Web external".to_string(),
                other: "Background external".to_string(),
            },
            timeslice_name,
        ));
        true
    }

    fn process_generic_span(&mut self, span: &Span) {
        self.insert_measurement(Measurement::from_span(
            span,
            TIMESLICE_VALUE,
            AttributeMap::new(),
            SegmentRule::Constant(self.sdk_language.clone()),
            format!("Custom/{}", span.name),
        ));
    }

    fn insert_measurement(&mut self, measurement: Measurement) {
        self.measurements
            .insert(measurement.span_id.clone(), measurement);
    }

    /// Writes every metric of this transaction into `store`.
    ///
    /// Returns `false`, emitting nothing, when no server span was seen for the
    /// trace.
    pub fn finalize(self, store: &mut MetricStore, apdex: &Apdex) -> bool {
        let Some(root) = &self.root else {
            return false;
        };
        let transaction_type = root.transaction_type.as_str();
        let root_seconds = nanos_to_seconds(root.duration_nanos);

        let mut dimensions = AttributeMap::with_capacity(2);
        dimensions.put_str(TRANSACTION_TYPE, transaction_type);
        dimensions.put_str(TRANSACTION_NAME, root.name.as_str());
        let metric =
            store.get_or_create_metric(self.scope, TRANSACTION_DURATION, MetricKind::Histogram);
        store.record_histogram(
            metric,
            dimensions,
            root_seconds,
            root.start_time_unix_nano,
            root.end_time_unix_nano,
        );

        if root.is_error {
            let mut dimensions = AttributeMap::with_capacity(1);
            dimensions.put_str(TRANSACTION_TYPE, transaction_type);
            let metric = store.get_or_create_metric(self.scope, ERROR_COUNT, MetricKind::Sum);
            store.record_sum(
                metric,
                dimensions,
                1,
                root.start_time_unix_nano,
                root.end_time_unix_nano,
            );
        }

        let bucket = if root.is_error {
            ApdexBucket::Frustrating
        } else {
            apdex.classify(root_seconds)
        };
        let mut dimensions = AttributeMap::with_capacity(3);
        dimensions.put_str(TRANSACTION_TYPE, transaction_type);
        dimensions.insert(APDEX_VALUE, apdex.threshold());
        dimensions.put_str(APDEX_BUCKET, bucket.as_str());
        let metric = store.get_or_create_metric(self.scope, APDEX, MetricKind::Sum);
        store.record_sum(
            metric,
            dimensions,
            1,
            root.start_time_unix_nano,
            root.end_time_unix_nano,
        );

        let mut breakdown: BTreeMap<&str, i64> = BTreeMap::new();
        let mut total_breakdown_nanos: i64 = 0;
        for measurement in self.measurements.values() {
            let exclusive_nanos = self.exclusive_duration(measurement);
            self.record_measurement(store, measurement, root, exclusive_nanos);

            let segment_nanos = breakdown
                .entry(measurement.segment.resolve(root.transaction_type))
                .or_insert(0);
            *segment_nanos = segment_nanos.saturating_add(exclusive_nanos);
            total_breakdown_nanos = total_breakdown_nanos.saturating_add(exclusive_nanos);
        }

        let remaining_nanos = root.duration_nanos.saturating_sub(total_breakdown_nanos);
        if remaining_nanos > 0 {
            let segment_nanos = breakdown.entry(self.sdk_language.as_str()).or_insert(0);
            *segment_nanos = segment_nanos.saturating_add(remaining_nanos);
        }

        let metric = store.get_or_create_metric(
            self.scope,
            root.transaction_type.overview_metric(),
            MetricKind::Histogram,
        );
        for (segment, nanos) in breakdown {
            let mut dimensions = AttributeMap::with_capacity(1);
            dimensions.put_str(SEGMENT_NAME, segment);
            store.record_histogram(
                metric,
                dimensions,
                nanos_to_seconds(nanos),
                root.start_time_unix_nano,
                root.end_time_unix_nano,
            );
        }
        true
    }

    /// Own duration minus the time spent in direct children, never below zero.
    fn exclusive_duration(&self, measurement: &Measurement) -> i64 {
        measurement
            .duration_nanos
            .saturating_sub(self.child_duration(&measurement.span_id))
            .max(0)
    }

    fn record_measurement(
        &self,
        store: &mut MetricStore,
        measurement: &Measurement,
        root: &RootSpan,
        exclusive_nanos: i64,
    ) {
        let mut dimensions = measurement.attributes.clone();
        dimensions.put_str(METRIC_TIMESLICE_NAME, measurement.timeslice_name.as_str());
        let metric = store.get_or_create_metric(
            self.scope,
            measurement.metric_name,
            MetricKind::Histogram,
        );
        store.record_histogram(
            metric,
            dimensions,
            nanos_to_seconds(measurement.duration_nanos),
            measurement.start_time_unix_nano,
            measurement.end_time_unix_nano,
        );

        let mut dimensions = AttributeMap::with_capacity(4);
        dimensions.put_str(METRIC_TIMESLICE_NAME, measurement.timeslice_name.as_str());
        dimensions.put_str(TRANSACTION_TYPE, root.transaction_type.as_str());
        dimensions.put_str(SCOPE, root.name.as_str());
        dimensions.put_str(TRANSACTION_NAME, root.name.as_str());
        let metric =
            store.get_or_create_metric(self.scope, TRANSACTION_OVERVIEW, MetricKind::Histogram);
        store.record_histogram(
            metric,
            dimensions,
            nanos_to_seconds(exclusive_nanos),
            measurement.start_time_unix_nano,
            measurement.end_time_unix_nano,
        );
    }
}
