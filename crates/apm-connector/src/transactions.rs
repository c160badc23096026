// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use apm_pdata::trace::Span;
use hashbrown::HashMap;
use tracing::debug;

use crate::apdex::Apdex;
use crate::metric_store::{MetricStore, ScopeId};
use crate::sql_parser::SqlParser;
use crate::transaction::Transaction;

/// Outcome of finalizing every transaction of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub finalized: usize,
    pub dropped: usize,
}

/// Batch-scoped registry of transactions keyed by trace id, kept in
/// first-seen order.
#[derive(Debug, Default)]
pub struct TransactionsMap {
    transactions: Vec<Transaction>,
    by_trace_id: HashMap<String, usize>,
}

impl TransactionsMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transaction of `trace_id`, creating it with `sdk_language`
    /// and `scope` on first sight. Later calls keep the original values.
    pub fn get_or_create(
        &mut self,
        trace_id: &str,
        sdk_language: &str,
        scope: ScopeId,
    ) -> &mut Transaction {
        let index = match self.by_trace_id.get(trace_id) {
            Some(&index) => index,
            None => {
                let index = self.transactions.len();
                self.transactions.push(Transaction::new(sdk_language, scope));
                self.by_trace_id.insert(trace_id.to_string(), index);
                index
            }
        };
        &mut self.transactions[index]
    }

    /// Routes `span` into the transaction of its trace.
    pub fn add_span(
        &mut self,
        span: &Span,
        sdk_language: &str,
        scope: ScopeId,
        sql_parser: &SqlParser,
    ) {
        self.get_or_create(&span.trace_id, sdk_language, scope)
            .add_span(span, sql_parser);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Finalizes every transaction into `store`, consuming the map.
    pub fn process_all(self, store: &mut MetricStore, apdex: &Apdex) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        for transaction in self.transactions {
            if transaction.finalize(store, apdex) {
                summary.finalized += 1;
            } else {
                summary.dropped += 1;
            }
        }
        if summary.dropped > 0 {
            debug!(
                "Dropped {} transactions without a server span",
                summary.dropped
            );
        }
        summary
    }
}
