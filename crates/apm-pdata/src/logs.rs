// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log model: records grouped by resource and instrumentation scope, like
//! the spans they describe.

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeMap;
use crate::trace::{InstrumentationScope, Resource};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    pub time_unix_nano: u64,
    pub trace_id: String,
    pub span_id: String,
    pub body: String,
    pub attributes: AttributeMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeLogs {
    pub scope: InstrumentationScope,
    pub log_records: Vec<LogRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLogs {
    pub resource: Resource,
    pub scope_logs: Vec<ScopeLogs>,
}

/// One batch of log records handed to the next pipeline stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsBatch {
    pub resource_logs: Vec<ResourceLogs>,
}

impl LogsBatch {
    pub fn is_empty(&self) -> bool {
        self.log_record_count() == 0
    }

    pub fn log_record_count(&self) -> usize {
        self.log_records().count()
    }

    /// Iterates over every record of every resource and scope.
    pub fn log_records(&self) -> impl Iterator<Item = &LogRecord> {
        self.resource_logs
            .iter()
            .flat_map(|rl| rl.scope_logs.iter())
            .flat_map(|sl| sl.log_records.iter())
    }
}
