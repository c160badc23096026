// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transaction events: one log record per server span.

use apm_pdata::logs::{LogRecord, LogsBatch, ResourceLogs, ScopeLogs};
use apm_pdata::trace::{Resource, Span, SpanKind, TracesBatch};

use crate::attribute_filter::AttributeFilter;
use crate::transaction::{
    nanos_to_seconds, transaction_name, TRANSACTION_NAME, TRANSACTION_TYPE,
};

pub const EVENT_TYPE: &str = "eventType";
pub const TRANSACTION_EVENT: &str = "Transaction";
pub const DURATION: &str = "duration";
pub const ERROR: &str = "error";

/// Builds one transaction record for every server span of `traces`. Records
/// keep the grouping of their spans, under the filtered resource.
pub fn build_transactions(traces: &TracesBatch, filter: &AttributeFilter) -> LogsBatch {
    let mut batch = LogsBatch::default();
    for resource_spans in &traces.resource_spans {
        let scope_logs: Vec<ScopeLogs> = resource_spans
            .scope_spans
            .iter()
            .filter_map(|scope_spans| {
                let log_records: Vec<LogRecord> = scope_spans
                    .spans
                    .iter()
                    .filter(|span| span.kind == SpanKind::Server)
                    .map(transaction_record)
                    .collect();
                (!log_records.is_empty()).then(|| ScopeLogs {
                    scope: scope_spans.scope.clone(),
                    log_records,
                })
            })
            .collect();
        if scope_logs.is_empty() {
            continue;
        }
        batch.resource_logs.push(ResourceLogs {
            resource: Resource::new(filter.filter(&resource_spans.resource.attributes)),
            scope_logs,
        });
    }
    batch
}

fn transaction_record(span: &Span) -> LogRecord {
    let (name, transaction_type) = transaction_name(span);
    let mut attributes = span.attributes.clone();
    attributes.put_str(EVENT_TYPE, TRANSACTION_EVENT);
    attributes.put_str(TRANSACTION_NAME, name.as_str());
    attributes.put_str(TRANSACTION_TYPE, transaction_type.as_str());
    attributes.insert(DURATION, nanos_to_seconds(span.duration_nanos()));
    attributes.insert(ERROR, span.is_error());
    LogRecord {
        time_unix_nano: span.start_time_unix_nano,
        trace_id: span.trace_id.clone(),
        span_id: span.span_id.clone(),
        body: name,
        attributes,
    }
}
