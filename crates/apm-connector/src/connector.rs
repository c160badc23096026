// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry point turning a batch of spans into a batch of APM metrics and,
//! optionally, a batch of transaction logs.

use std::sync::Arc;

use apm_pdata::consumer::{ConsumerError, LogsConsumer, MetricsConsumer};
use apm_pdata::logs::LogsBatch;
use apm_pdata::metrics::MetricsBatch;
use apm_pdata::trace::{Span, TracesBatch};
use apm_pdata::AttributeMap;
use hashbrown::HashSet;
use tracing::{debug, error, info, warn};

use crate::apdex::Apdex;
use crate::attribute_filter::{AttributeFilter, HOST_NAME, SERVICE_INSTANCE_ID};
use crate::config::{Config, DEFAULT_APDEX_T};
use crate::metric_store::{MetricKind, MetricStore, ResourceId, ScopeId};
use crate::sql_parser::SqlParser;
use crate::transaction_logs;
use crate::transactions::TransactionsMap;

pub const INSTANCE_COUNT: &str = "apm.service.instance.count";
pub const INSTANCE_NAME: &str = "instanceName";
pub const HOST_DISPLAY_NAME: &str = "host.displayName";

const SDK_LANGUAGE: &str = "telemetry.sdk.language";
const UNKNOWN_SDK_LANGUAGE: &str = "unknown";

pub struct ApmConnector {
    config: Config,
    apdex: Apdex,
    filter: AttributeFilter,
    sql_parser: SqlParser,
    next: Option<Arc<dyn MetricsConsumer>>,
    logs_next: Option<Arc<dyn LogsConsumer>>,
}

impl ApmConnector {
    /// Builds a connector forwarding metrics to `next`. An Apdex threshold
    /// that is zero, negative or not finite falls back to
    /// [`DEFAULT_APDEX_T`].
    #[must_use]
    pub fn new(mut config: Config, next: Option<Arc<dyn MetricsConsumer>>) -> Self {
        if config.validate().is_err() {
            if config.apdex_t != 0.0 {
                warn!(
                    "Invalid Apdex threshold {}, using {DEFAULT_APDEX_T}s",
                    config.apdex_t
                );
            }
            config.apdex_t = DEFAULT_APDEX_T;
        }
        Self {
            apdex: Apdex::new(config.apdex_t),
            config,
            filter: AttributeFilter::new(),
            sql_parser: SqlParser::new(),
            next,
            logs_next: None,
        }
    }

    /// Also hands one transaction log record per server span to `logs_next`.
    #[must_use]
    pub fn with_logs_consumer(mut self, logs_next: Arc<dyn LogsConsumer>) -> Self {
        self.logs_next = Some(logs_next);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn start(&self) {
        info!(
            "Starting the APM connector with Apdex threshold {}s",
            self.config.apdex_t
        );
    }

    pub fn shutdown(&self) {
        info!("Stopping the APM connector");
    }

    /// Converts `traces` and hands the results to the configured consumers.
    /// Empty results are not forwarded. Metrics go first, and a metrics
    /// delivery failure skips the logs.
    pub async fn consume_traces(&self, traces: &TracesBatch) -> Result<(), ConsumerError> {
        if let Some(next) = &self.next {
            let metrics = self.convert_traces(traces);
            if metrics.is_empty() {
                debug!("No metrics derived from {} spans", traces.span_count());
            } else {
                next.consume_metrics(metrics).await.map_err(|e| {
                    error!("Failed to forward APM metrics: {e}");
                    e
                })?;
            }
        }

        if let Some(logs_next) = &self.logs_next {
            let logs = self.build_transactions(traces);
            if logs.is_empty() {
                debug!("No server spans among {} spans", traces.span_count());
            } else {
                logs_next.consume_logs(logs).await.map_err(|e| {
                    error!("Failed to forward transaction logs: {e}");
                    e
                })?;
            }
        }
        Ok(())
    }

    /// Builds one transaction log record per server span of `traces`.
    pub fn build_transactions(&self, traces: &TracesBatch) -> LogsBatch {
        transaction_logs::build_transactions(traces, &self.filter)
    }

    /// Derives every APM metric of one batch of spans.
    ///
    /// Each call works on its own store and transaction registry, so nothing
    /// leaks from one batch into the next.
    pub fn convert_traces(&self, traces: &TracesBatch) -> MetricsBatch {
        let mut store = MetricStore::new();
        let mut transactions = TransactionsMap::new();
        let mut counted_instances: HashSet<ResourceId> = HashSet::new();
        let mut span_count = 0_usize;

        for resource_spans in &traces.resource_spans {
            let resource_attributes = &resource_spans.resource.attributes;
            let filtered = self.filter.filter(resource_attributes);
            let sdk_language = resource_attributes
                .get_string(SDK_LANGUAGE)
                .unwrap_or(UNKNOWN_SDK_LANGUAGE.into());
            let resource = store.get_or_create_resource(&filtered);

            for scope_spans in &resource_spans.scope_spans {
                let scope = store.get_or_create_scope(resource, &scope_spans.scope);
                for span in &scope_spans.spans {
                    if self.config.emit_instance_count
                        && !counted_instances.contains(&resource)
                        && record_instance(&mut store, scope, &filtered, span)
                    {
                        counted_instances.insert(resource);
                    }
                    transactions.add_span(span, &sdk_language, scope, &self.sql_parser);
                    span_count += 1;
                }
            }
        }

        let transaction_count = transactions.len();
        let summary = transactions.process_all(&mut store, &self.apdex);
        let metrics = store.flatten();
        debug!(
            "Converted {span_count} spans in {transaction_count} traces: \
             {} transactions finalized, {} dropped, {} data points",
            summary.finalized,
            summary.dropped,
            metrics.data_point_count()
        );
        metrics
    }
}

/// Records the instance count data point of a resource. Returns `false` when
/// the resource has no host name to report.
fn record_instance(
    store: &mut MetricStore,
    scope: ScopeId,
    filtered: &AttributeMap,
    span: &Span,
) -> bool {
    let Some(host_name) = filtered.get_string(HOST_NAME) else {
        return false;
    };
    let mut dimensions = AttributeMap::with_capacity(2);
    if let Some(instance) = filtered.get_string(SERVICE_INSTANCE_ID) {
        dimensions.put_str(INSTANCE_NAME, instance.into_owned());
    }
    dimensions.put_str(HOST_DISPLAY_NAME, host_name.into_owned());

    let metric = store.get_or_create_metric(scope, INSTANCE_COUNT, MetricKind::Sum);
    store.record_sum(
        metric,
        dimensions,
        1,
        span.start_time_unix_nano,
        span.end_time_unix_nano,
    );
    true
}
