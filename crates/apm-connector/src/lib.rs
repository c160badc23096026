// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace to metric connector.
//!
//! Spans are grouped into per-trace transactions anchored at their server
//! span. Once a batch has been routed, every transaction is finalized into
//! duration histograms, Apdex and error sums, and a breakdown of where the
//! transaction's time was spent. Server spans can also be reported as one
//! transaction log record each.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod apdex;
pub mod attribute_filter;
pub mod config;
pub mod connector;
pub mod errors;
pub mod metric_store;
pub mod sql_parser;
pub mod transaction;
pub mod transaction_logs;
pub mod transactions;

pub use config::Config;
pub use connector::ApmConnector;
