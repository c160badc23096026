// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data model shared by the APM pipeline components.
//!
//! - [`trace`]: spans grouped by resource and instrumentation scope (input)
//! - [`metrics`]: histograms, sums and gauges grouped the same way (output)
//! - [`logs`]: one record per finished transaction, grouped the same way
//! - [`attributes`]: typed attribute maps used by both
//! - [`key`]: order-independent identity for attribute maps
//! - [`consumer`]: the boundary traits between pipeline stages

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod attributes;
pub mod consumer;
pub mod key;
pub mod logs;
pub mod metrics;
pub mod trace;

pub use attributes::{AttributeMap, AttributeValue};
pub use consumer::{ConsumerError, LogsConsumer, MetricsConsumer};
pub use key::{canonical_key, AttributeKey};
pub use logs::LogsBatch;
pub use metrics::MetricsBatch;
pub use trace::TracesBatch;
