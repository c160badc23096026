// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Input model: spans grouped by resource and instrumentation scope.

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeMap;

/// Role of a span within its trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

/// A single timed operation. Timestamps are nanoseconds since the Unix epoch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    /// Empty for the root span of a trace.
    pub parent_span_id: String,
    pub kind: SpanKind,
    pub name: String,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub status: StatusCode,
    pub attributes: AttributeMap,
}

impl Span {
    /// Duration in nanoseconds; zero when the end precedes the start.
    pub fn duration_nanos(&self) -> i64 {
        let nanos = self
            .end_time_unix_nano
            .saturating_sub(self.start_time_unix_nano);
        i64::try_from(nanos).unwrap_or(i64::MAX)
    }

    pub fn has_parent(&self) -> bool {
        !self.parent_span_id.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.status == StatusCode::Error
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub attributes: AttributeMap,
}

impl Resource {
    #[must_use]
    pub fn new(attributes: AttributeMap) -> Self {
        Self { attributes }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
    pub attributes: AttributeMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<Span>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

/// One batch of spans as delivered by the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracesBatch {
    pub resource_spans: Vec<ResourceSpans>,
}

impl TracesBatch {
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum()
    }
}
